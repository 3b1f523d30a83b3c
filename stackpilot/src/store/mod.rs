//! In-memory store for outputs produced by completed stacks.
//!
//! The store is scoped to a single orchestration run and discarded when the
//! run ends; re-entry after a partial failure re-resolves outputs from the
//! live backend rather than from any persisted state.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identifies one output value: `(stack_name, output_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputKey {
    /// The stack that produced the output.
    pub stack: String,
    /// The output name within that stack.
    pub output: String,
}

impl OutputKey {
    /// Creates a new output key.
    #[must_use]
    pub fn new(stack: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            output: output.into(),
        }
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.stack, self.output)
    }
}

/// A thread-safe store of per-stack outputs.
///
/// Written only by the deployment executor after a stack reaches a
/// successful terminal status; read-only everywhere else. Re-applying an
/// already-complete stack refreshes its entry.
#[derive(Debug, Default)]
pub struct OutputStore {
    outputs: RwLock<HashMap<String, BTreeMap<String, String>>>,
}

impl OutputStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outputs of a completed stack, replacing any prior entry.
    pub fn record(&self, stack: impl Into<String>, outputs: BTreeMap<String, String>) {
        self.outputs.write().insert(stack.into(), outputs);
    }

    /// Resolves one output value.
    #[must_use]
    pub fn get(&self, key: &OutputKey) -> Option<String> {
        self.outputs
            .read()
            .get(&key.stack)
            .and_then(|entry| entry.get(&key.output))
            .cloned()
    }

    /// Returns all outputs recorded for a stack.
    #[must_use]
    pub fn outputs_for(&self, stack: &str) -> Option<BTreeMap<String, String>> {
        self.outputs.read().get(stack).cloned()
    }

    /// Checks whether any outputs are recorded for a stack.
    #[must_use]
    pub fn contains_stack(&self, stack: &str) -> bool {
        self.outputs.read().contains_key(stack)
    }

    /// Returns the number of stacks with recorded outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.read().len()
    }

    /// Returns true if no outputs are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.read().is_empty()
    }

    /// Returns a copy of the full store contents.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, BTreeMap<String, String>> {
        self.outputs.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outputs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_record_and_get() {
        let store = OutputStore::new();
        store.record("network", outputs(&[("VpcId", "vpc-0a1b")]));

        let key = OutputKey::new("network", "VpcId");
        assert_eq!(store.get(&key), Some("vpc-0a1b".to_string()));
        assert!(store.contains_stack("network"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_output_is_none() {
        let store = OutputStore::new();
        store.record("network", outputs(&[("VpcId", "vpc-0a1b")]));

        assert_eq!(store.get(&OutputKey::new("network", "SubnetId")), None);
        assert_eq!(store.get(&OutputKey::new("storage", "BucketName")), None);
    }

    #[test]
    fn test_reapply_refreshes_entry() {
        let store = OutputStore::new();
        store.record("storage", outputs(&[("BucketName", "site-old")]));
        store.record("storage", outputs(&[("BucketName", "site-new")]));

        let key = OutputKey::new("storage", "BucketName");
        assert_eq!(store.get(&key), Some("site-new".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_output_key_display() {
        let key = OutputKey::new("network", "VpcId");
        assert_eq!(key.to_string(), "network.VpcId");
    }
}
