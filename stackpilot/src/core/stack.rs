//! Stack definitions: the unit of provisioning.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::store::OutputKey;

/// An opaque handle to an external declarative template.
///
/// The orchestrator never inspects template contents; it only forwards the
/// handle to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateRef(pub String);

impl TemplateRef {
    /// Creates a new template reference.
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Returns the raw handle.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TemplateRef {
    fn from(handle: String) -> Self {
        Self(handle)
    }
}

impl From<&str> for TemplateRef {
    fn from(handle: &str) -> Self {
        Self(handle.to_string())
    }
}

/// A stack parameter value: either a literal string or a reference to an
/// output produced by an earlier stack in the same run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// A literal string value.
    Literal(String),
    /// A reference to `(stack, output)` resolved at apply time.
    OutputRef(OutputKey),
}

impl ParameterValue {
    /// Creates a literal parameter value.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Creates an output-reference parameter value.
    #[must_use]
    pub fn output_ref(stack: impl Into<String>, output: impl Into<String>) -> Self {
        Self::OutputRef(OutputKey::new(stack, output))
    }

    /// Returns the output reference, if this value is one.
    #[must_use]
    pub fn as_output_ref(&self) -> Option<&OutputKey> {
        match self {
            Self::Literal(_) => None,
            Self::OutputRef(key) => Some(key),
        }
    }
}

/// A named unit of infrastructure with a parameter set and declared
/// dependencies.
///
/// Dependencies are kept in declaration order; ordering ties among stacks
/// with no remaining dependency are broken by declaration order, so the
/// computed deployment sequence is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDefinition {
    /// The unique stack name.
    pub name: String,
    /// Handle to the external declarative template.
    pub template: TemplateRef,
    /// Parameters submitted with the template.
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterValue>,
    /// Names of stacks that must complete before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl StackDefinition {
    /// Creates a new stack definition.
    #[must_use]
    pub fn new(name: impl Into<String>, template: impl Into<TemplateRef>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            parameters: BTreeMap::new(),
            depends_on: Vec::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: ParameterValue) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Adds a literal parameter.
    #[must_use]
    pub fn with_literal(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .insert(key.into(), ParameterValue::literal(value));
        self
    }

    /// Adds a parameter referencing another stack's output.
    #[must_use]
    pub fn with_output_ref(
        mut self,
        key: impl Into<String>,
        stack: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        self.parameters
            .insert(key.into(), ParameterValue::output_ref(stack, output));
        self
    }

    /// Adds a dependency, ignoring duplicates.
    #[must_use]
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        let dep = dep.into();
        if !self.depends_on.contains(&dep) {
            self.depends_on.push(dep);
        }
        self
    }

    /// Returns the output references among this stack's parameters.
    pub fn output_refs(&self) -> impl Iterator<Item = (&str, &OutputKey)> {
        self.parameters
            .iter()
            .filter_map(|(name, value)| value.as_output_ref().map(|key| (name.as_str(), key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let stack = StackDefinition::new("storage", "templates/storage.yaml")
            .with_literal("BucketPrefix", "site")
            .with_output_ref("VpcId", "network", "VpcId")
            .with_dependency("network");

        assert_eq!(stack.name, "storage");
        assert_eq!(stack.template.as_str(), "templates/storage.yaml");
        assert_eq!(stack.parameters.len(), 2);
        assert_eq!(stack.depends_on, vec!["network".to_string()]);
    }

    #[test]
    fn test_duplicate_dependency_ignored() {
        let stack = StackDefinition::new("backend", "t")
            .with_dependency("network")
            .with_dependency("network");

        assert_eq!(stack.depends_on.len(), 1);
    }

    #[test]
    fn test_output_refs_iterator() {
        let stack = StackDefinition::new("backend", "t")
            .with_literal("Env", "prod")
            .with_output_ref("PoolId", "auth", "UserPoolId");

        let refs: Vec<_> = stack.output_refs().collect();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].0, "PoolId");
        assert_eq!(refs[0].1, &OutputKey::new("auth", "UserPoolId"));
    }

    #[test]
    fn test_parameter_value_untagged_serde() {
        let literal: ParameterValue = serde_json::from_str(r#""prod""#).unwrap();
        assert_eq!(literal, ParameterValue::literal("prod"));

        let reference: ParameterValue =
            serde_json::from_str(r#"{"stack":"network","output":"VpcId"}"#).unwrap();
        assert_eq!(reference, ParameterValue::output_ref("network", "VpcId"));
    }
}
