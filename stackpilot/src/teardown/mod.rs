//! Teardown orchestrator: deletes stacks in reverse dependency order.
//!
//! Each stack's teardown is attempted independently; a stuck stack must
//! not prevent cleanup of its successors in the reverse order. Failures
//! are collected and reported in aggregate once the full pass completes.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backend::ProvisioningBackend;
use crate::core::{StackDefinition, StackStatus};
use crate::errors::{BackendError, OrchestrationError, StackVerb};
use crate::events::{EventSink, NoOpEventSink};
use crate::executor::{poll_until_terminal, PollConfig};
use crate::graph::DependencyGraph;

/// Per-stack teardown outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum TeardownOutcome {
    /// The stack was deleted.
    Deleted,
    /// The stack did not exist; nothing to do.
    AlreadyAbsent,
    /// Deletion reached a terminal failure.
    Failed(String),
    /// Deletion did not reach a terminal status within the poll budget.
    TimedOut,
}

impl TeardownOutcome {
    /// Returns true for the two non-error outcomes.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Deleted | Self::AlreadyAbsent)
    }
}

/// One stack's entry in the teardown report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackTeardown {
    /// The stack name.
    pub stack: String,
    /// What happened.
    pub outcome: TeardownOutcome,
}

/// Aggregate result of a full teardown pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeardownReport {
    /// Per-stack entries, in teardown order.
    pub entries: Vec<StackTeardown>,
}

impl TeardownReport {
    /// Returns true if every stack was deleted or already absent.
    #[must_use]
    pub fn all_clean(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_clean())
    }

    /// Returns the entries that did not tear down cleanly.
    #[must_use]
    pub fn failures(&self) -> Vec<&StackTeardown> {
        self.entries.iter().filter(|e| !e.outcome.is_clean()).collect()
    }
}

/// Deletes a stack set in strict reverse dependency order.
pub struct TeardownOrchestrator {
    backend: Arc<dyn ProvisioningBackend>,
    events: Arc<dyn EventSink>,
    poll: PollConfig,
}

impl TeardownOrchestrator {
    /// Creates an orchestrator over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn ProvisioningBackend>) -> Self {
        Self {
            backend,
            events: Arc::new(NoOpEventSink),
            poll: PollConfig::default(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the polling configuration.
    #[must_use]
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Tears down every stack in the graph, consuming the reverse of the
    /// forward order. Always completes the full pass; failures are
    /// collected into the report rather than propagated.
    pub async fn teardown(&self, graph: &DependencyGraph) -> TeardownReport {
        let mut report = TeardownReport::default();

        for stack in graph.reverse_order() {
            let outcome = self.teardown_one(stack).await;
            if !outcome.is_clean() {
                warn!(stack = %stack.name, ?outcome, "Teardown did not complete cleanly");
            }
            report.entries.push(StackTeardown {
                stack: stack.name.clone(),
                outcome,
            });
        }

        report
    }

    async fn teardown_one(&self, stack: &StackDefinition) -> TeardownOutcome {
        self.events.try_emit(
            "stack.delete.started",
            Some(json!({"stack": stack.name})),
        );

        // Pre-check so deleting an absent stack stays an idempotent no-op.
        match self.backend.describe(&stack.name).await {
            Ok(observation) if observation.status == StackStatus::NotFound => {
                info!(stack = %stack.name, "Already absent");
                self.events.try_emit(
                    "stack.delete.skipped",
                    Some(json!({"stack": stack.name, "reason": "already absent"})),
                );
                return TeardownOutcome::AlreadyAbsent;
            }
            Ok(_) => {}
            Err(BackendError::NotFound { .. }) => {
                self.events.try_emit(
                    "stack.delete.skipped",
                    Some(json!({"stack": stack.name, "reason": "already absent"})),
                );
                return TeardownOutcome::AlreadyAbsent;
            }
            Err(err) => {
                self.events.try_emit(
                    "stack.delete.failed",
                    Some(json!({"stack": stack.name, "error": err.to_string()})),
                );
                return TeardownOutcome::Failed(err.to_string());
            }
        }

        if let Err(err) = self.backend.delete(&stack.name).await {
            match err {
                BackendError::NotFound { .. } => return TeardownOutcome::AlreadyAbsent,
                other => {
                    self.events.try_emit(
                        "stack.delete.failed",
                        Some(json!({"stack": stack.name, "error": other.to_string()})),
                    );
                    return TeardownOutcome::Failed(other.to_string());
                }
            }
        }

        match poll_until_terminal(
            self.backend.as_ref(),
            &stack.name,
            &self.poll,
            StackVerb::Delete,
        )
        .await
        {
            Ok(observation) => match observation.status {
                StackStatus::NotFound | StackStatus::Complete => {
                    self.events.try_emit(
                        "stack.delete.completed",
                        Some(json!({"stack": stack.name})),
                    );
                    TeardownOutcome::Deleted
                }
                status => {
                    let reason = observation
                        .failure_reason
                        .unwrap_or_else(|| format!("delete ended in {status}"));
                    self.events.try_emit(
                        "stack.delete.failed",
                        Some(json!({"stack": stack.name, "reason": reason})),
                    );
                    TeardownOutcome::Failed(reason)
                }
            },
            Err(OrchestrationError::Timeout(_)) => TeardownOutcome::TimedOut,
            Err(err) => TeardownOutcome::Failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StackObservation;
    use crate::core::StackDefinition;
    use crate::testing::mocks::MockBackend;
    use std::time::Duration;

    fn fast_poll() -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(200),
        }
    }

    fn four_stack_graph() -> DependencyGraph {
        DependencyGraph::build(vec![
            StackDefinition::new("network", "t"),
            StackDefinition::new("storage", "t").with_dependency("network"),
            StackDefinition::new("auth", "t").with_dependency("network"),
            StackDefinition::new("backend", "t")
                .with_dependency("storage")
                .with_dependency("auth"),
        ])
        .unwrap()
    }

    fn deletes_cleanly(backend: &MockBackend, stack: &str) {
        backend.script_describe(
            stack,
            vec![
                StackObservation::complete(Default::default()),
                StackObservation::status(StackStatus::InProgress),
                StackObservation::status(StackStatus::NotFound),
            ],
        );
    }

    #[tokio::test]
    async fn test_teardown_reverse_order() {
        let backend = Arc::new(MockBackend::new());
        for stack in ["network", "storage", "auth", "backend"] {
            deletes_cleanly(&backend, stack);
        }

        let orchestrator = TeardownOrchestrator::new(backend.clone()).with_poll_config(fast_poll());
        let report = orchestrator.teardown(&four_stack_graph()).await;

        assert!(report.all_clean());
        let order: Vec<_> = report.entries.iter().map(|e| e.stack.as_str()).collect();
        assert_eq!(order[0], "backend");
        assert_eq!(order[3], "network");
        // network is deleted only after both of its dependents
        assert_eq!(backend.delete_order().last().map(String::as_str), Some("network"));
    }

    #[tokio::test]
    async fn test_absent_stack_is_idempotent_noop() {
        let backend = Arc::new(MockBackend::new());
        // describe of an unscripted stack reports NotFound

        let graph = DependencyGraph::build(vec![StackDefinition::new("network", "t")]).unwrap();
        let orchestrator = TeardownOrchestrator::new(backend.clone()).with_poll_config(fast_poll());
        let report = orchestrator.teardown(&graph).await;

        assert!(report.all_clean());
        assert_eq!(report.entries[0].outcome, TeardownOutcome::AlreadyAbsent);
        assert_eq!(backend.delete_count("network"), 0);
    }

    #[tokio::test]
    async fn test_failed_delete_does_not_abort_remaining() {
        let backend = Arc::new(MockBackend::new());
        deletes_cleanly(&backend, "backend");
        deletes_cleanly(&backend, "auth");
        deletes_cleanly(&backend, "network");
        backend.script_describe(
            "storage",
            vec![
                StackObservation::complete(Default::default()),
                StackObservation::failed(StackStatus::Failed, "bucket not empty"),
            ],
        );

        let orchestrator = TeardownOrchestrator::new(backend.clone()).with_poll_config(fast_poll());
        let report = orchestrator.teardown(&four_stack_graph()).await;

        assert!(!report.all_clean());
        assert_eq!(report.failures().len(), 1);
        assert_eq!(report.failures()[0].stack, "storage");
        assert_eq!(
            report.failures()[0].outcome,
            TeardownOutcome::Failed("bucket not empty".to_string())
        );
        // the full pass still ran: network was attempted after storage failed
        assert_eq!(backend.delete_count("network"), 1);
        assert_eq!(report.entries.len(), 4);
    }

    #[tokio::test]
    async fn test_delete_timeout_recorded() {
        let backend = Arc::new(MockBackend::new());
        backend.script_describe(
            "network",
            vec![StackObservation::complete(Default::default())],
        );
        backend.hold_in_progress_after_script("network");

        let graph = DependencyGraph::build(vec![StackDefinition::new("network", "t")]).unwrap();
        let orchestrator = TeardownOrchestrator::new(backend).with_poll_config(PollConfig {
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(30),
        });
        let report = orchestrator.teardown(&graph).await;

        assert_eq!(report.entries[0].outcome, TeardownOutcome::TimedOut);
    }
}
