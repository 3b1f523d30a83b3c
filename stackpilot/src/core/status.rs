//! Stack status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The provisioning status of a stack as reported by the backend.
///
/// The backend is the source of truth; the orchestrator never caches a
/// status across polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    /// No operation has been submitted yet.
    Pending,
    /// The backend is converging toward a terminal status.
    InProgress,
    /// The operation finished successfully.
    Complete,
    /// The operation failed.
    Failed,
    /// The operation failed and the backend rolled the stack back.
    RolledBack,
    /// The stack does not exist on the backend.
    NotFound,
}

impl Default for StackStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
            Self::RolledBack => write!(f, "rolled_back"),
            Self::NotFound => write!(f, "not_found"),
        }
    }
}

impl StackStatus {
    /// Returns true if no further backend-driven transition can occur
    /// without a new operation.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Complete | Self::Failed | Self::RolledBack | Self::NotFound
        )
    }

    /// Returns true if the status is a terminal failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::RolledBack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(StackStatus::Complete.is_terminal());
        assert!(StackStatus::Failed.is_terminal());
        assert!(StackStatus::RolledBack.is_terminal());
        assert!(StackStatus::NotFound.is_terminal());
        assert!(!StackStatus::Pending.is_terminal());
        assert!(!StackStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_failure_statuses() {
        assert!(StackStatus::Failed.is_failure());
        assert!(StackStatus::RolledBack.is_failure());
        assert!(!StackStatus::Complete.is_failure());
        assert!(!StackStatus::NotFound.is_failure());
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&StackStatus::RolledBack).unwrap();
        assert_eq!(json, r#""rolled_back""#);

        let parsed: StackStatus = serde_json::from_str(r#""in_progress""#).unwrap();
        assert_eq!(parsed, StackStatus::InProgress);
    }
}
