//! Scripted mock implementations of the external interfaces.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::backend::{
    DistributionState, EdgeInspector, FederationClient, HttpProber, OperationHandle,
    ProvisioningBackend, StackObservation, StorageInspector,
};
use crate::core::{StackStatus, TemplateRef};
use crate::errors::BackendError;

#[derive(Debug, Default)]
struct StackScript {
    queue: VecDeque<StackObservation>,
    /// Returned once the queue is empty, instead of repeating the last
    /// scripted observation.
    after: Option<StackObservation>,
    last: Option<StackObservation>,
    describe_count: usize,
}

#[derive(Debug, Clone)]
struct Submission {
    parameters: BTreeMap<String, String>,
}

/// A provisioning backend driven by scripted describe observations.
///
/// Each `describe` consumes the next scripted observation; once the
/// script is exhausted the last observation repeats (or a configured
/// hold state takes over). An unscripted stack reports `NotFound`.
#[derive(Debug, Default)]
pub struct MockBackend {
    scripts: Mutex<HashMap<String, StackScript>>,
    submissions: Mutex<HashMap<String, Vec<Submission>>>,
    submit_errors: Mutex<HashMap<String, VecDeque<BackendError>>>,
    deletes: Mutex<Vec<String>>,
    operations: Mutex<usize>,
}

impl MockBackend {
    /// Creates an empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the observations returned by successive describes.
    pub fn script_describe(&self, stack: &str, observations: Vec<StackObservation>) {
        let mut scripts = self.scripts.lock();
        let entry = scripts.entry(stack.to_string()).or_default();
        entry.queue.extend(observations);
    }

    /// Keeps reporting `InProgress` for a stack.
    pub fn hold_in_progress(&self, stack: &str) {
        self.scripts.lock().entry(stack.to_string()).or_default().after =
            Some(StackObservation::status(StackStatus::InProgress));
    }

    /// Reports `InProgress` once the scripted observations are consumed.
    pub fn hold_in_progress_after_script(&self, stack: &str) {
        self.hold_in_progress(stack);
    }

    /// Keeps reporting `Complete` with no outputs.
    pub fn hold_complete(&self, stack: &str) {
        self.scripts.lock().entry(stack.to_string()).or_default().after =
            Some(StackObservation::complete(BTreeMap::new()));
    }

    /// Keeps reporting `Complete` with the given outputs.
    pub fn hold_complete_with(&self, stack: &str, outputs: BTreeMap<String, String>) {
        self.scripts.lock().entry(stack.to_string()).or_default().after =
            Some(StackObservation::complete(outputs));
    }

    /// Fails the next submit for a stack with the given error.
    pub fn fail_next_submit(&self, stack: &str, error: BackendError) {
        self.submit_errors
            .lock()
            .entry(stack.to_string())
            .or_default()
            .push_back(error);
    }

    /// Returns how many times a stack was submitted.
    #[must_use]
    pub fn submit_count(&self, stack: &str) -> usize {
        self.submissions.lock().get(stack).map_or(0, Vec::len)
    }

    /// Returns how many times a stack was described.
    #[must_use]
    pub fn describe_count(&self, stack: &str) -> usize {
        self.scripts.lock().get(stack).map_or(0, |s| s.describe_count)
    }

    /// Returns how many times a stack was deleted.
    #[must_use]
    pub fn delete_count(&self, stack: &str) -> usize {
        self.deletes.lock().iter().filter(|name| *name == stack).count()
    }

    /// Returns every delete call, in order.
    #[must_use]
    pub fn delete_order(&self) -> Vec<String> {
        self.deletes.lock().clone()
    }

    /// Returns the parameters from the most recent submit of a stack.
    #[must_use]
    pub fn last_submitted_parameters(&self, stack: &str) -> Option<BTreeMap<String, String>> {
        self.submissions
            .lock()
            .get(stack)
            .and_then(|subs| subs.last())
            .map(|sub| sub.parameters.clone())
    }

    fn next_observation(&self, stack: &str) -> StackObservation {
        let mut scripts = self.scripts.lock();
        let entry = scripts.entry(stack.to_string()).or_default();
        entry.describe_count += 1;

        if let Some(observation) = entry.queue.pop_front() {
            entry.last = Some(observation.clone());
            return observation;
        }
        if let Some(after) = &entry.after {
            return after.clone();
        }
        if let Some(last) = &entry.last {
            return last.clone();
        }
        StackObservation::status(StackStatus::NotFound)
    }

    fn next_handle(&self) -> OperationHandle {
        let mut operations = self.operations.lock();
        *operations += 1;
        OperationHandle::new(format!("op-{}", *operations))
    }
}

#[async_trait]
impl ProvisioningBackend for MockBackend {
    async fn submit(
        &self,
        name: &str,
        _template: &TemplateRef,
        parameters: &BTreeMap<String, String>,
    ) -> Result<OperationHandle, BackendError> {
        if let Some(error) = self
            .submit_errors
            .lock()
            .get_mut(name)
            .and_then(VecDeque::pop_front)
        {
            // NoChanges still counts as a submission attempt
            self.submissions
                .lock()
                .entry(name.to_string())
                .or_default()
                .push(Submission {
                    parameters: parameters.clone(),
                });
            return Err(error);
        }

        self.submissions
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(Submission {
                parameters: parameters.clone(),
            });
        Ok(self.next_handle())
    }

    async fn describe(&self, name: &str) -> Result<StackObservation, BackendError> {
        Ok(self.next_observation(name))
    }

    async fn delete(&self, name: &str) -> Result<OperationHandle, BackendError> {
        self.deletes.lock().push(name.to_string());
        Ok(self.next_handle())
    }
}

/// An in-memory storage inspector.
#[derive(Debug, Default)]
pub struct MockStorage {
    objects: Mutex<HashSet<(String, String)>>,
    policies: Mutex<HashSet<String>>,
    object_checks: Mutex<usize>,
}

impl MockStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places an object in a bucket.
    pub fn put_object(&self, bucket: &str, key: &str) {
        self.objects
            .lock()
            .insert((bucket.to_string(), key.to_string()));
    }

    /// Attaches a policy to a bucket.
    pub fn attach_policy(&self, bucket: &str) {
        self.policies.lock().insert(bucket.to_string());
    }

    /// Returns how many object-existence checks were made.
    #[must_use]
    pub fn object_checks(&self) -> usize {
        *self.object_checks.lock()
    }
}

#[async_trait]
impl StorageInspector for MockStorage {
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, BackendError> {
        *self.object_checks.lock() += 1;
        Ok(self
            .objects
            .lock()
            .contains(&(bucket.to_string(), key.to_string())))
    }

    async fn policy_attached(&self, bucket: &str) -> Result<bool, BackendError> {
        Ok(self.policies.lock().contains(bucket))
    }
}

/// An edge inspector with scripted propagation states.
#[derive(Debug, Default)]
pub struct MockEdge {
    states: Mutex<VecDeque<DistributionState>>,
    last: Mutex<Option<DistributionState>>,
}

impl MockEdge {
    /// Creates an inspector that reports `InProgress` until scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an inspector that always reports `Deployed`.
    #[must_use]
    pub fn deployed() -> Self {
        let edge = Self::new();
        *edge.last.lock() = Some(DistributionState::Deployed);
        edge
    }

    /// Creates an inspector that always reports `InProgress`.
    #[must_use]
    pub fn in_progress() -> Self {
        let edge = Self::new();
        *edge.last.lock() = Some(DistributionState::InProgress);
        edge
    }

    /// Scripts the states returned by successive checks; the final state
    /// repeats.
    pub fn script_states(&self, states: Vec<DistributionState>) {
        self.states.lock().extend(states);
    }
}

#[async_trait]
impl EdgeInspector for MockEdge {
    async fn distribution_state(&self, _id: &str) -> Result<DistributionState, BackendError> {
        if let Some(state) = self.states.lock().pop_front() {
            *self.last.lock() = Some(state);
            return Ok(state);
        }
        Ok((*self.last.lock()).unwrap_or(DistributionState::InProgress))
    }
}

/// An HTTP prober answering from a fixed URL table.
///
/// URLs without an entry fail with a connection error.
#[derive(Debug, Default)]
pub struct MockProber {
    responses: Mutex<HashMap<String, u16>>,
}

impl MockProber {
    /// Creates a prober with no reachable URLs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a status code for a URL.
    pub fn respond(&self, url: &str, status: u16) {
        self.responses.lock().insert(url.to_string(), status);
    }
}

#[async_trait]
impl HttpProber for MockProber {
    async fn get_status(&self, url: &str) -> Result<u16, BackendError> {
        self.responses
            .lock()
            .get(url)
            .copied()
            .ok_or_else(|| BackendError::transport(format!("connection refused: {url}")))
    }
}

/// An in-memory federation client.
#[derive(Debug, Default)]
pub struct MockFederation {
    providers: Mutex<HashMap<String, String>>,
    roles: Mutex<HashMap<String, (serde_json::Value, serde_json::Value)>>,
    put_role_calls: Mutex<usize>,
}

impl MockFederation {
    /// Creates a client with no providers configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a federation provider for an issuer.
    #[must_use]
    pub fn with_provider(self, issuer: &str, id: &str) -> Self {
        self.providers
            .lock()
            .insert(issuer.to_string(), id.to_string());
        self
    }

    /// Returns a role's trust policy and permission policy.
    #[must_use]
    pub fn role(&self, name: &str) -> Option<(serde_json::Value, serde_json::Value)> {
        self.roles.lock().get(name).cloned()
    }

    /// Returns the number of distinct roles.
    #[must_use]
    pub fn role_count(&self) -> usize {
        self.roles.lock().len()
    }

    /// Returns the number of `put_role` calls.
    #[must_use]
    pub fn put_role_count(&self) -> usize {
        *self.put_role_calls.lock()
    }
}

#[async_trait]
impl FederationClient for MockFederation {
    async fn find_provider(&self, issuer: &str) -> Result<Option<String>, BackendError> {
        Ok(self.providers.lock().get(issuer).cloned())
    }

    async fn put_role(
        &self,
        name: &str,
        trust_policy: &serde_json::Value,
        permission_policy: &serde_json::Value,
    ) -> Result<String, BackendError> {
        *self.put_role_calls.lock() += 1;
        self.roles.lock().insert(
            name.to_string(),
            (trust_policy.clone(), permission_policy.clone()),
        );
        Ok(format!("role::{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backend_script_consumed_in_order() {
        let backend = MockBackend::new();
        backend.script_describe(
            "network",
            vec![
                StackObservation::status(StackStatus::InProgress),
                StackObservation::complete(BTreeMap::new()),
            ],
        );

        let first = backend.describe("network").await.unwrap();
        let second = backend.describe("network").await.unwrap();
        let third = backend.describe("network").await.unwrap();

        assert_eq!(first.status, StackStatus::InProgress);
        assert_eq!(second.status, StackStatus::Complete);
        // last observation repeats once the script is exhausted
        assert_eq!(third.status, StackStatus::Complete);
        assert_eq!(backend.describe_count("network"), 3);
    }

    #[tokio::test]
    async fn test_backend_unscripted_stack_not_found() {
        let backend = MockBackend::new();
        let observation = backend.describe("ghost").await.unwrap();
        assert_eq!(observation.status, StackStatus::NotFound);
    }

    #[tokio::test]
    async fn test_prober_unknown_url_is_transport_error() {
        let prober = MockProber::new();
        prober.respond("https://known.example/", 200);

        assert_eq!(prober.get_status("https://known.example/").await.unwrap(), 200);
        assert!(prober.get_status("https://unknown.example/").await.is_err());
    }
}
