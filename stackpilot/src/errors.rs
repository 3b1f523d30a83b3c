//! Error types for stack orchestration.
//!
//! Graph-construction errors abort a run before any backend call is made.
//! Per-stack errors carry the stack name, the verb attempted, and the
//! backend-reported reason verbatim.

use std::time::Duration;
use thiserror::Error;

use crate::core::StackStatus;

/// The main error type for orchestration operations.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// A dependency cycle was detected at graph construction.
    #[error("{0}")]
    Cycle(#[from] CycleError),

    /// A `depends_on` entry names a stack not present in the input set.
    #[error("{0}")]
    UnknownDependency(#[from] UnknownDependencyError),

    /// A parameter references an output that is absent from the store.
    #[error("{0}")]
    UnresolvedOutput(#[from] UnresolvedOutputError),

    /// Polling exceeded the per-stack wall-clock timeout.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),

    /// The backend reported a terminal failure for a stack.
    #[error("{0}")]
    BackendFailure(#[from] BackendFailure),

    /// A required verification probe failed.
    #[error("{0}")]
    Probe(#[from] ProbeFailure),

    /// The identity-federation provider is not configured.
    #[error("{0}")]
    MissingFederationProvider(#[from] MissingFederationProviderError),

    /// The run was cancelled between stack boundaries.
    #[error("Run cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },

    /// A backend call failed at the transport or service level.
    #[error("{0}")]
    Backend(#[from] BackendError),

    /// An environment or stack-set definition is invalid.
    #[error("Invalid definition: {0}")]
    Validation(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// The backend verb in flight when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackVerb {
    /// A create/update submission.
    Submit,
    /// A status query.
    Describe,
    /// A deletion.
    Delete,
}

impl std::fmt::Display for StackVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submit => write!(f, "submit"),
            Self::Describe => write!(f, "describe"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Error raised when the dependency set contains a cycle.
#[derive(Debug, Clone, Error)]
#[error("Dependency cycle: {}", cycle_path.join(" -> "))]
pub struct CycleError {
    /// The stacks forming the cycle, first repeated at the end.
    pub cycle_path: Vec<String>,
}

impl CycleError {
    /// Creates a new cycle error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        Self { cycle_path }
    }
}

/// Error raised when a dependency names a stack outside the input set.
#[derive(Debug, Clone, Error)]
#[error("Stack '{stack}' depends on unknown stack '{dependency}'")]
pub struct UnknownDependencyError {
    /// The stack declaring the dependency.
    pub stack: String,
    /// The missing dependency name.
    pub dependency: String,
}

impl UnknownDependencyError {
    /// Creates a new unknown-dependency error.
    #[must_use]
    pub fn new(stack: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            dependency: dependency.into(),
        }
    }
}

/// Error raised when a referenced output is absent from the store.
///
/// This signals a graph-ordering defect, not a backend error.
#[derive(Debug, Clone, Error)]
#[error(
    "Stack '{stack}' parameter '{parameter}' references output \
     '{referenced_stack}.{referenced_output}' which has not been recorded"
)]
pub struct UnresolvedOutputError {
    /// The stack being applied.
    pub stack: String,
    /// The parameter holding the reference.
    pub parameter: String,
    /// The stack the reference points at.
    pub referenced_stack: String,
    /// The output name the reference points at.
    pub referenced_output: String,
}

/// Error raised when polling exceeds the per-stack timeout.
///
/// The underlying backend operation may still converge out-of-band, so a
/// timeout is reported distinctly from a terminal failure.
#[derive(Debug, Clone, Error)]
#[error(
    "Timed out after {}s waiting for '{stack}' ({verb}); \
     the backend operation may still complete",
    waited.as_secs()
)]
pub struct TimeoutError {
    /// The stack being waited on.
    pub stack: String,
    /// The verb attempted.
    pub verb: StackVerb,
    /// How long the orchestrator waited.
    pub waited: Duration,
}

impl TimeoutError {
    /// Creates a new timeout error.
    #[must_use]
    pub fn new(stack: impl Into<String>, verb: StackVerb, waited: Duration) -> Self {
        Self {
            stack: stack.into(),
            verb,
            waited,
        }
    }
}

/// Error raised when the backend reports a terminal failure for a stack.
#[derive(Debug, Clone, Error)]
#[error("Stack '{stack}' ({verb}) reached {status}: {reason}")]
pub struct BackendFailure {
    /// The stack that failed.
    pub stack: String,
    /// The verb attempted.
    pub verb: StackVerb,
    /// The terminal status the backend reported.
    pub status: StackStatus,
    /// Backend-reported failure text, verbatim.
    pub reason: String,
}

impl BackendFailure {
    /// Creates a new backend failure.
    #[must_use]
    pub fn new(
        stack: impl Into<String>,
        verb: StackVerb,
        status: StackStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            stack: stack.into(),
            verb,
            status,
            reason: reason.into(),
        }
    }
}

/// Error raised when a required verification probe fails.
#[derive(Debug, Clone, Error)]
#[error("Required probe '{probe}' failed: {detail}")]
pub struct ProbeFailure {
    /// The probe name.
    pub probe: String,
    /// Human-readable failure detail.
    pub detail: String,
}

impl ProbeFailure {
    /// Creates a new probe failure.
    #[must_use]
    pub fn new(probe: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            probe: probe.into(),
            detail: detail.into(),
        }
    }
}

/// Error raised when no federation provider matches the expected issuer.
///
/// Creating the provider is a one-time, higher-privilege operation treated
/// as an external precondition; the provisioner never creates it.
#[derive(Debug, Clone, Error)]
#[error(
    "No identity-federation provider found for issuer '{issuer}'; \
     it must be created once by an administrator before trust can be granted"
)]
pub struct MissingFederationProviderError {
    /// The expected issuer.
    pub issuer: String,
}

impl MissingFederationProviderError {
    /// Creates a new missing-provider error.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }
}

/// Errors surfaced by backend trait implementations.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// The submitted update contains no changes.
    ///
    /// The executor treats this as the idempotent re-apply case, not a
    /// failure.
    #[error("No changes to apply")]
    NoChanges,

    /// The named resource does not exist.
    #[error("Not found: {name}")]
    NotFound {
        /// The resource name.
        name: String,
    },

    /// The backend rejected the request.
    #[error("Backend rejected request: {message}")]
    Service {
        /// Backend-reported message, verbatim.
        message: String,
    },

    /// The backend could not be reached.
    #[error("Backend unreachable: {message}")]
    Transport {
        /// Transport-level detail.
        message: String,
    },
}

impl BackendError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates a service error.
    #[must_use]
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_path_formatting() {
        let err = CycleError::new(vec![
            "network".to_string(),
            "storage".to_string(),
            "network".to_string(),
        ]);
        assert!(err.to_string().contains("network -> storage -> network"));
    }

    #[test]
    fn test_unresolved_output_names_both_sides() {
        let err = UnresolvedOutputError {
            stack: "backend".to_string(),
            parameter: "VpcId".to_string(),
            referenced_stack: "network".to_string(),
            referenced_output: "VpcId".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("backend"));
        assert!(msg.contains("network.VpcId"));
    }

    #[test]
    fn test_timeout_is_distinct_from_backend_failure() {
        let err = OrchestrationError::from(TimeoutError::new(
            "storage",
            StackVerb::Submit,
            Duration::from_secs(1800),
        ));
        assert!(matches!(err, OrchestrationError::Timeout(_)));
        assert!(err.to_string().contains("may still complete"));
    }

    #[test]
    fn test_backend_failure_carries_verbatim_reason() {
        let err = BackendFailure::new(
            "auth",
            StackVerb::Submit,
            StackStatus::RolledBack,
            "Resource handler returned message: \"pool limit exceeded\"",
        );
        assert!(err.to_string().contains("pool limit exceeded"));
        assert!(err.to_string().contains("submit"));
    }

    #[test]
    fn test_verb_display() {
        assert_eq!(StackVerb::Submit.to_string(), "submit");
        assert_eq!(StackVerb::Describe.to_string(), "describe");
        assert_eq!(StackVerb::Delete.to_string(), "delete");
    }
}
