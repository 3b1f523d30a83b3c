//! Deployment executor: submits one stack and polls to a terminal status.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{ProvisioningBackend, StackObservation};
use crate::core::{ParameterValue, StackDefinition, StackStatus};
use crate::errors::{
    BackendError, BackendFailure, OrchestrationError, StackVerb, TimeoutError,
    UnresolvedOutputError,
};
use crate::events::{EventSink, NoOpEventSink};
use crate::observability::SpanTimer;
use crate::store::OutputStore;

/// Polling cadence and per-stack wall-clock budget.
///
/// The interval is a fixed cadence, not a backoff: provisioning backends
/// expect steady, cheap status queries. Timeouts are per-stack so one slow
/// resource does not silently truncate the rest of the run.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Delay between status queries.
    pub interval: Duration,
    /// Wall-clock budget for one stack to reach a terminal status.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl PollConfig {
    /// Sets the poll interval, clamped to the supported 1-5 s band.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.clamp(Duration::from_secs(1), Duration::from_secs(5));
        self
    }

    /// Sets the per-stack timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The result of applying one stack.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// The terminal status reached.
    pub status: StackStatus,
    /// Outputs reported with the completed stack.
    pub outputs: BTreeMap<String, String>,
}

/// Applies stacks one at a time, wiring resolved outputs into parameters.
pub struct DeploymentExecutor {
    backend: Arc<dyn ProvisioningBackend>,
    store: Arc<OutputStore>,
    events: Arc<dyn EventSink>,
    poll: PollConfig,
}

impl DeploymentExecutor {
    /// Creates an executor over the given backend and output store.
    #[must_use]
    pub fn new(backend: Arc<dyn ProvisioningBackend>, store: Arc<OutputStore>) -> Self {
        Self {
            backend,
            store,
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

    /// Submits a create/update for one stack and polls to terminal status.
    ///
    /// Re-applying an already-complete stack with unchanged parameters is
    /// idempotent: the backend's no-changes response short-circuits to a
    /// describe, and the output store entry is refreshed either way.
    ///
    /// # Errors
    ///
    /// `UnresolvedOutputError` if a referenced output is absent (an
    /// ordering defect, raised before any backend call); `TimeoutError` if
    /// the poll budget is exhausted; `BackendFailure` on a terminal
    /// `Failed`/`RolledBack`, carrying the backend's reason verbatim. No
    /// automatic retry is attempted: retrying infrastructure mutations
    /// blindly risks partial state, so retry is a caller decision.
    pub async fn apply(
        &self,
        stack: &StackDefinition,
    ) -> Result<ApplyOutcome, OrchestrationError> {
        let parameters = self.resolve_parameters(stack)?;
        let timer = SpanTimer::start(&stack.name);

        self.events.try_emit(
            "stack.apply.started",
            Some(json!({
                "stack": stack.name,
                "template": stack.template.as_str(),
            })),
        );

        match self
            .backend
            .submit(&stack.name, &stack.template, &parameters)
            .await
        {
            Ok(handle) => {
                debug!(stack = %stack.name, operation = %handle.0, "Submitted");
            }
            Err(BackendError::NoChanges) => {
                info!(stack = %stack.name, "No changes to apply; refreshing outputs");
            }
            Err(err) => {
                self.events.try_emit(
                    "stack.apply.failed",
                    Some(json!({"stack": stack.name, "error": err.to_string()})),
                );
                return Err(err.into());
            }
        }

        let observation =
            poll_until_terminal(self.backend.as_ref(), &stack.name, &self.poll, StackVerb::Submit)
                .await?;

        match observation.status {
            StackStatus::Complete => {
                self.store.record(&stack.name, observation.outputs.clone());
                self.events.try_emit(
                    "stack.apply.completed",
                    Some(json!({
                        "stack": stack.name,
                        "outputs": observation.outputs.len(),
                        "duration_ms": timer.elapsed_ms(),
                    })),
                );
                Ok(ApplyOutcome {
                    status: StackStatus::Complete,
                    outputs: observation.outputs,
                })
            }
            status @ (StackStatus::Failed | StackStatus::RolledBack) => {
                let reason = observation
                    .failure_reason
                    .unwrap_or_else(|| "(no reason reported)".to_string());
                self.events.try_emit(
                    "stack.apply.failed",
                    Some(json!({"stack": stack.name, "status": status, "reason": reason})),
                );
                Err(BackendFailure::new(&stack.name, StackVerb::Submit, status, reason).into())
            }
            StackStatus::NotFound => {
                warn!(stack = %stack.name, "Stack vanished while waiting for completion");
                Err(BackendFailure::new(
                    &stack.name,
                    StackVerb::Submit,
                    StackStatus::NotFound,
                    "stack no longer exists on the backend",
                )
                .into())
            }
            StackStatus::Pending | StackStatus::InProgress => {
                unreachable!("poll_until_terminal only returns terminal statuses")
            }
        }
    }

    /// Resolves every parameter, substituting output references from the
    /// store.
    ///
    /// # Errors
    ///
    /// `UnresolvedOutputError` for the first absent reference.
    pub fn resolve_parameters(
        &self,
        stack: &StackDefinition,
    ) -> Result<BTreeMap<String, String>, OrchestrationError> {
        let mut resolved = BTreeMap::new();

        for (name, value) in &stack.parameters {
            let resolved_value = match value {
                ParameterValue::Literal(literal) => literal.clone(),
                ParameterValue::OutputRef(key) => {
                    self.store
                        .get(key)
                        .ok_or_else(|| UnresolvedOutputError {
                            stack: stack.name.clone(),
                            parameter: name.clone(),
                            referenced_stack: key.stack.clone(),
                            referenced_output: key.output.clone(),
                        })?
                }
            };
            resolved.insert(name.clone(), resolved_value);
        }

        Ok(resolved)
    }
}

/// Polls `describe` at a fixed cadence until a terminal status or the
/// wall-clock budget runs out.
///
/// Every iteration queries the backend fresh; a timeout is reported
/// distinctly from failure because the backend operation may still
/// converge out-of-band.
pub(crate) async fn poll_until_terminal(
    backend: &dyn ProvisioningBackend,
    name: &str,
    poll: &PollConfig,
    verb: StackVerb,
) -> Result<StackObservation, OrchestrationError> {
    let started = Instant::now();

    loop {
        let observation = match backend.describe(name).await {
            Ok(observation) => observation,
            Err(BackendError::NotFound { .. }) => StackObservation::status(StackStatus::NotFound),
            Err(err) => return Err(err.into()),
        };

        if observation.status.is_terminal() {
            return Ok(observation);
        }

        if started.elapsed() >= poll.timeout {
            return Err(TimeoutError::new(name, verb, started.elapsed()).into());
        }

        debug!(stack = %name, status = %observation.status, "Waiting for terminal status");
        tokio::time::sleep(poll.interval).await;
    }
}
