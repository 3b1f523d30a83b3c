//! Named environment definitions.
//!
//! An environment is data: its stack set, what to verify afterwards, and
//! an optional CI trust grant. Adding a stack to a deployment is an edit
//! here, not a new script.

use serde::{Deserialize, Serialize};

use crate::core::{ParameterValue, StackDefinition};
use crate::errors::{OrchestrationError, UnresolvedOutputError};
use crate::store::OutputStore;
use crate::trust::TrustGrant;
use crate::verify::VerifyTarget;

/// A named environment's stack set and post-deploy expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    /// The environment name (e.g. `staging`, `production`).
    pub name: String,
    /// The stacks to provision, with their dependencies.
    pub stacks: Vec<StackDefinition>,
    /// What to verify once the full sequence completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationSpec>,
    /// CI trust grant for this environment, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust: Option<TrustGrant>,
}

impl EnvironmentSpec {
    /// Creates an empty environment.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stacks: Vec::new(),
            verification: None,
            trust: None,
        }
    }

    /// Adds a stack.
    #[must_use]
    pub fn with_stack(mut self, stack: StackDefinition) -> Self {
        self.stacks.push(stack);
        self
    }

    /// Sets the verification spec.
    #[must_use]
    pub fn with_verification(mut self, verification: VerificationSpec) -> Self {
        self.verification = Some(verification);
        self
    }

    /// Sets the trust grant.
    #[must_use]
    pub fn with_trust(mut self, trust: TrustGrant) -> Self {
        self.trust = Some(trust);
        self
    }

    /// Parses an environment from JSON.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` on malformed input.
    pub fn from_json(input: &str) -> Result<Self, OrchestrationError> {
        serde_json::from_str(input).map_err(|err| OrchestrationError::Serialization(err.to_string()))
    }
}

fn default_expected_objects() -> Vec<String> {
    vec!["index.html".to_string()]
}

/// What to verify after deployment, with values that may reference stack
/// outputs resolved at verification time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSpec {
    /// The stack whose health anchors verification.
    pub stack: String,
    /// The storage bucket, literal or resolved from an output.
    pub bucket: ParameterValue,
    /// Objects that must exist; defaults to the entry-point object.
    #[serde(default = "default_expected_objects")]
    pub expected_objects: Vec<String>,
    /// The edge distribution, if the environment has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_id: Option<ParameterValue>,
    /// The infrastructure-native domain, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_domain: Option<ParameterValue>,
    /// The custom domain, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<ParameterValue>,
}

impl VerificationSpec {
    /// Creates a spec anchored on a stack with a bucket value.
    #[must_use]
    pub fn new(stack: impl Into<String>, bucket: ParameterValue) -> Self {
        Self {
            stack: stack.into(),
            bucket,
            expected_objects: default_expected_objects(),
            distribution_id: None,
            native_domain: None,
            custom_domain: None,
        }
    }

    /// Replaces the expected-object set.
    #[must_use]
    pub fn with_expected_objects(
        mut self,
        objects: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.expected_objects = objects.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the distribution value.
    #[must_use]
    pub fn with_distribution(mut self, value: ParameterValue) -> Self {
        self.distribution_id = Some(value);
        self
    }

    /// Sets the native domain value.
    #[must_use]
    pub fn with_native_domain(mut self, value: ParameterValue) -> Self {
        self.native_domain = Some(value);
        self
    }

    /// Sets the custom domain value.
    #[must_use]
    pub fn with_custom_domain(mut self, value: ParameterValue) -> Self {
        self.custom_domain = Some(value);
        self
    }

    /// Resolves output references against the store, producing a concrete
    /// verification target.
    ///
    /// # Errors
    ///
    /// `UnresolvedOutputError` if a referenced output is absent.
    pub fn resolve(&self, store: &OutputStore) -> Result<VerifyTarget, OrchestrationError> {
        let mut target = VerifyTarget::new(&self.stack, self.resolve_value("bucket", &self.bucket, store)?);

        for object in &self.expected_objects {
            target = target.with_expected_object(object);
        }
        if let Some(value) = &self.distribution_id {
            target = target.with_distribution(self.resolve_value("distribution_id", value, store)?);
        }
        if let Some(value) = &self.native_domain {
            target = target.with_native_domain(self.resolve_value("native_domain", value, store)?);
        }
        if let Some(value) = &self.custom_domain {
            target = target.with_custom_domain(self.resolve_value("custom_domain", value, store)?);
        }

        Ok(target)
    }

    fn resolve_value(
        &self,
        field: &str,
        value: &ParameterValue,
        store: &OutputStore,
    ) -> Result<String, OrchestrationError> {
        match value {
            ParameterValue::Literal(literal) => Ok(literal.clone()),
            ParameterValue::OutputRef(key) => {
                store.get(key).ok_or_else(|| {
                    UnresolvedOutputError {
                        stack: self.stack.clone(),
                        parameter: field.to_string(),
                        referenced_stack: key.stack.clone(),
                        referenced_output: key.output.clone(),
                    }
                    .into()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ParameterValue;

    #[test]
    fn test_environment_from_json() {
        let input = r#"{
            "name": "staging",
            "stacks": [
                {"name": "network", "template": "templates/network.yaml"},
                {
                    "name": "storage",
                    "template": "templates/storage.yaml",
                    "parameters": {"VpcId": {"stack": "network", "output": "VpcId"}},
                    "depends_on": ["network"]
                }
            ],
            "verification": {
                "stack": "storage",
                "bucket": {"stack": "storage", "output": "BucketName"}
            },
            "trust": {
                "organization": "acme",
                "repository": "website",
                "branch_pattern": "main",
                "role_name": "ci-deployer"
            }
        }"#;

        let env = EnvironmentSpec::from_json(input).unwrap();
        assert_eq!(env.name, "staging");
        assert_eq!(env.stacks.len(), 2);
        assert_eq!(env.stacks[1].depends_on, vec!["network".to_string()]);

        let verification = env.verification.unwrap();
        assert_eq!(verification.expected_objects, vec!["index.html".to_string()]);
        assert_eq!(env.trust.unwrap().organization, "acme");
    }

    #[test]
    fn test_malformed_json_is_serialization_error() {
        let err = EnvironmentSpec::from_json("{not json").unwrap_err();
        assert!(matches!(err, OrchestrationError::Serialization(_)));
    }

    #[test]
    fn test_resolve_verification_spec() {
        let store = OutputStore::new();
        store.record(
            "storage",
            [
                ("BucketName".to_string(), "site-bucket".to_string()),
                ("DistributionId".to_string(), "dist-1".to_string()),
                ("Domain".to_string(), "d111.cdn.example.net".to_string()),
            ]
            .into_iter()
            .collect(),
        );

        let spec = VerificationSpec::new("storage", ParameterValue::output_ref("storage", "BucketName"))
            .with_distribution(ParameterValue::output_ref("storage", "DistributionId"))
            .with_native_domain(ParameterValue::output_ref("storage", "Domain"))
            .with_custom_domain(ParameterValue::literal("www.example.com"));

        let target = spec.resolve(&store).unwrap();
        assert_eq!(target.bucket, "site-bucket");
        assert_eq!(target.distribution_id.as_deref(), Some("dist-1"));
        assert_eq!(target.native_domain.as_deref(), Some("d111.cdn.example.net"));
        assert_eq!(target.custom_domain.as_deref(), Some("www.example.com"));
        assert_eq!(target.expected_objects, vec!["index.html".to_string()]);
    }

    #[test]
    fn test_resolve_missing_output_fails() {
        let store = OutputStore::new();
        let spec =
            VerificationSpec::new("storage", ParameterValue::output_ref("storage", "BucketName"));

        let err = spec.resolve(&store).unwrap_err();
        assert!(matches!(err, OrchestrationError::UnresolvedOutput(_)));
    }
}
