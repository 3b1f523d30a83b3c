//! External interface seams.
//!
//! The orchestrator depends only on these trait contracts, never on a
//! specific backend's full feature set. Implementations own credential
//! handling and wire formats; the orchestrator owns ordering, polling, and
//! failure attribution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::{StackStatus, TemplateRef};
use crate::errors::BackendError;

#[cfg(feature = "http-probe")]
mod http;

#[cfg(feature = "http-probe")]
pub use http::ReqwestProber;

/// An opaque handle to an in-flight backend operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHandle(pub String);

impl OperationHandle {
    /// Creates a new operation handle.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// One observation of a stack's state, as reported by the backend.
///
/// Queried fresh on every poll; never cached by the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackObservation {
    /// The reported status.
    pub status: StackStatus,
    /// Outputs, present once the stack is complete.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
    /// Backend-reported failure text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl StackObservation {
    /// Creates an observation with just a status.
    #[must_use]
    pub fn status(status: StackStatus) -> Self {
        Self {
            status,
            outputs: BTreeMap::new(),
            failure_reason: None,
        }
    }

    /// Creates a complete observation with outputs.
    #[must_use]
    pub fn complete(outputs: BTreeMap<String, String>) -> Self {
        Self {
            status: StackStatus::Complete,
            outputs,
            failure_reason: None,
        }
    }

    /// Creates a failed observation with a reason.
    #[must_use]
    pub fn failed(status: StackStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            outputs: BTreeMap::new(),
            failure_reason: Some(reason.into()),
        }
    }
}

/// The provisioning backend's tri-verb contract.
#[async_trait]
pub trait ProvisioningBackend: Send + Sync {
    /// Submits a create/update request for a named stack.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NoChanges`] when an update carries no
    /// changes; the executor treats that as the idempotent re-apply case.
    async fn submit(
        &self,
        name: &str,
        template: &TemplateRef,
        parameters: &BTreeMap<String, String>,
    ) -> Result<OperationHandle, BackendError>;

    /// Reports the current state of a named stack.
    ///
    /// A stack the backend has no record of is reported with status
    /// [`StackStatus::NotFound`], not as an error.
    async fn describe(&self, name: &str) -> Result<StackObservation, BackendError>;

    /// Requests deletion of a named stack.
    async fn delete(&self, name: &str) -> Result<OperationHandle, BackendError>;
}

/// Inspection of the provisioned storage resource.
#[async_trait]
pub trait StorageInspector: Send + Sync {
    /// Checks whether an object exists in the given bucket.
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, BackendError>;

    /// Checks whether the bucket has an access policy attached.
    async fn policy_attached(&self, bucket: &str) -> Result<bool, BackendError>;
}

/// Propagation state of an edge/CDN distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionState {
    /// Changes are still propagating to edge locations.
    InProgress,
    /// The distribution is fully deployed.
    Deployed,
}

/// Inspection of the edge/CDN distribution.
#[async_trait]
pub trait EdgeInspector: Send + Sync {
    /// Reports the distribution's propagation state.
    async fn distribution_state(&self, id: &str) -> Result<DistributionState, BackendError>;
}

/// An unauthenticated HTTP reachability probe.
#[async_trait]
pub trait HttpProber: Send + Sync {
    /// Issues a GET and returns the status code.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Transport`] on connection failure.
    async fn get_status(&self, url: &str) -> Result<u16, BackendError>;
}

/// Inspection and management of identity-federation trust.
#[async_trait]
pub trait FederationClient: Send + Sync {
    /// Looks up a federation provider by issuer, returning its identifier.
    async fn find_provider(&self, issuer: &str) -> Result<Option<String>, BackendError>;

    /// Creates or updates a role with the given trust policy and permission
    /// scope, returning the role identifier.
    ///
    /// Must be an upsert: re-issuing an identical role is an update, never
    /// a duplicate resource.
    async fn put_role(
        &self,
        name: &str,
        trust_policy: &serde_json::Value,
        permission_policy: &serde_json::Value,
    ) -> Result<String, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_constructors() {
        let obs = StackObservation::status(StackStatus::InProgress);
        assert_eq!(obs.status, StackStatus::InProgress);
        assert!(obs.outputs.is_empty());

        let mut outputs = BTreeMap::new();
        outputs.insert("VpcId".to_string(), "vpc-1".to_string());
        let obs = StackObservation::complete(outputs);
        assert_eq!(obs.status, StackStatus::Complete);
        assert_eq!(obs.outputs.get("VpcId").map(String::as_str), Some("vpc-1"));

        let obs = StackObservation::failed(StackStatus::RolledBack, "create failed");
        assert_eq!(obs.failure_reason.as_deref(), Some("create failed"));
    }

    #[test]
    fn test_distribution_state_serde() {
        let json = serde_json::to_string(&DistributionState::Deployed).unwrap();
        assert_eq!(json, r#""deployed""#);
    }
}
