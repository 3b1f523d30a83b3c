//! Orchestration runs over a named environment.
//!
//! A run is sequential by dependency order: stacks with satisfied
//! dependencies could in principle deploy in parallel, but serializing
//! them keeps output propagation and failure attribution unambiguous.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::backend::{EdgeInspector, FederationClient, HttpProber, ProvisioningBackend, StorageInspector};
use crate::cancellation::CancellationToken;
use crate::environment::EnvironmentSpec;
use crate::errors::OrchestrationError;
use crate::events::{EventSink, NoOpEventSink};
use crate::executor::{DeploymentExecutor, PollConfig};
use crate::graph::DependencyGraph;
use crate::observability::SpanTimer;
use crate::retry::RetryPolicy;
use crate::store::OutputStore;
use crate::teardown::{TeardownOrchestrator, TeardownReport};
use crate::trust::{PermissionScope, TrustProvisioner};
use crate::verify::{VerificationEngine, VerificationReport};


/// Per-stack outcome within one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum StackRunOutcome {
    /// The stack reached a successful terminal status.
    Deployed,
    /// A stack this one transitively depends on failed, so its required
    /// inputs are unavailable.
    Blocked(String),
    /// Applying the stack failed.
    Failed(String),
    /// The run was cancelled before this stack was attempted.
    Cancelled,
}

/// One stack's entry in a run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackRun {
    /// The stack name.
    pub stack: String,
    /// What happened.
    pub outcome: StackRunOutcome,
}

/// Aggregate result of a deployment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique identifier for this run.
    pub run_id: Uuid,
    /// The environment deployed.
    pub environment: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Per-stack outcomes, in application order.
    pub stacks: Vec<StackRun>,
    /// The verification report, when verification ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
    /// The cancellation reason, if the run was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<String>,
    /// Outputs recorded during the run, keyed by stack.
    #[serde(default)]
    pub outputs: HashMap<String, std::collections::BTreeMap<String, String>>,
}

impl RunReport {
    /// Returns true when every stack deployed, nothing was cancelled, and
    /// verification (if it ran) passed. Warnings never flip success.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.cancelled.is_none()
            && self
                .stacks
                .iter()
                .all(|s| s.outcome == StackRunOutcome::Deployed)
            && self
                .verification
                .as_ref()
                .map_or(true, VerificationReport::passed)
    }

    /// Process exit code for the CLI surface: 0 on full success.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.succeeded())
    }
}

/// Orchestrates deployment, verification, teardown, and trust for one
/// backend.
pub struct Orchestrator {
    backend: Arc<dyn ProvisioningBackend>,
    storage: Option<Arc<dyn StorageInspector>>,
    edge: Option<Arc<dyn EdgeInspector>>,
    prober: Option<Arc<dyn HttpProber>>,
    federation: Option<Arc<dyn FederationClient>>,
    events: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
    poll: PollConfig,
    advisory_retry: RetryPolicy,
}

impl Orchestrator {
    /// Creates an orchestrator over a provisioning backend.
    #[must_use]
    pub fn new(backend: Arc<dyn ProvisioningBackend>) -> Self {
        Self {
            backend,
            storage: None,
            edge: None,
            prober: None,
            federation: None,
            events: Arc::new(NoOpEventSink),
            cancel: Arc::new(CancellationToken::new()),
            poll: PollConfig::default(),
            advisory_retry: RetryPolicy::default(),
        }
    }

    /// Attaches the inspection interfaces verification needs.
    #[must_use]
    pub fn with_inspectors(
        mut self,
        storage: Arc<dyn StorageInspector>,
        edge: Arc<dyn EdgeInspector>,
        prober: Arc<dyn HttpProber>,
    ) -> Self {
        self.storage = Some(storage);
        self.edge = Some(edge);
        self.prober = Some(prober);
        self
    }

    /// Attaches the federation client used for trust provisioning.
    #[must_use]
    pub fn with_federation(mut self, federation: Arc<dyn FederationClient>) -> Self {
        self.federation = Some(federation);
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the polling configuration shared by apply and delete.
    #[must_use]
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Sets the retry policy for advisory verification probes.
    #[must_use]
    pub fn with_advisory_retry(mut self, policy: RetryPolicy) -> Self {
        self.advisory_retry = policy;
        self
    }

    /// Returns the cancellation token for this orchestrator.
    ///
    /// Cancelling takes effect between stack boundaries; an in-flight
    /// poll cycle completes first.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        self.cancel.clone()
    }

    /// Deploys an environment's stack set in dependency order.
    ///
    /// # Errors
    ///
    /// Graph-construction errors abort immediately, before any backend
    /// call. Per-stack failures are recorded in the report and block only
    /// that stack's transitive dependents.
    pub async fn deploy(&self, env: &EnvironmentSpec) -> Result<RunReport, OrchestrationError> {
        let (report, _store) = self.run_deploy(env).await?;
        Ok(report)
    }

    /// Deploys, then verifies against the environment's verification spec.
    ///
    /// Verification only runs when every stack deployed; a failed
    /// deployment is already a failed run.
    ///
    /// # Errors
    ///
    /// As [`Orchestrator::deploy`], plus `Validation` if the environment
    /// declares verification but no inspectors are attached.
    pub async fn deploy_and_verify(
        &self,
        env: &EnvironmentSpec,
    ) -> Result<RunReport, OrchestrationError> {
        let (mut report, store) = self.run_deploy(env).await?;

        let all_deployed = report
            .stacks
            .iter()
            .all(|s| s.outcome == StackRunOutcome::Deployed);

        if let Some(spec) = &env.verification {
            if all_deployed && report.cancelled.is_none() {
                let engine = self.verification_engine()?;
                let target = spec.resolve(&store)?;
                info!(environment = %env.name, stack = %target.stack, "Verifying deployment");
                let verification = engine.verify(&target).await;
                if !verification.passed() {
                    error!(environment = %env.name, "Verification failed");
                }
                report.verification = Some(verification);
            }
        }

        Ok(report)
    }

    /// Tears down an environment in reverse dependency order.
    ///
    /// # Errors
    ///
    /// Graph-construction errors only; per-stack teardown failures are
    /// collected in the report so the best-effort pass always completes.
    pub async fn teardown(
        &self,
        env: &EnvironmentSpec,
    ) -> Result<TeardownReport, OrchestrationError> {
        let graph = DependencyGraph::build(env.stacks.clone())?;
        info!(environment = %env.name, stacks = graph.len(), "Tearing down");

        let orchestrator = TeardownOrchestrator::new(self.backend.clone())
            .with_events(self.events.clone())
            .with_poll_config(self.poll);

        Ok(orchestrator.teardown(&graph).await)
    }

    /// Ensures the environment's CI trust grant exists.
    ///
    /// Independent of the deployment sequence; safe to run before or
    /// after it.
    ///
    /// # Errors
    ///
    /// `Validation` if no federation client is attached or the
    /// environment declares no grant; otherwise as
    /// [`TrustProvisioner::ensure_trust`].
    pub async fn ensure_trust(
        &self,
        env: &EnvironmentSpec,
        scope: &PermissionScope,
    ) -> Result<String, OrchestrationError> {
        let federation = self.federation.clone().ok_or_else(|| {
            OrchestrationError::Validation("no federation client attached".to_string())
        })?;
        let grant = env.trust.as_ref().ok_or_else(|| {
            OrchestrationError::Validation(format!(
                "environment '{}' declares no trust grant",
                env.name
            ))
        })?;

        TrustProvisioner::new(federation)
            .with_events(self.events.clone())
            .ensure_trust(grant, scope)
            .await
    }

    async fn run_deploy(
        &self,
        env: &EnvironmentSpec,
    ) -> Result<(RunReport, Arc<OutputStore>), OrchestrationError> {
        let graph = DependencyGraph::build(env.stacks.clone())?;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let timer = SpanTimer::start(&env.name);

        // The store lives exactly as long as the run; re-entry re-resolves
        // outputs from the backend via the idempotent re-apply path.
        let store = Arc::new(OutputStore::new());
        let executor = DeploymentExecutor::new(self.backend.clone(), store.clone())
            .with_events(self.events.clone())
            .with_poll_config(self.poll);

        self.events.try_emit(
            "run.started",
            Some(json!({"run_id": run_id, "environment": env.name})),
        );
        info!(environment = %env.name, run_id = %run_id, stacks = graph.len(), "Deploying");

        let mut stacks = Vec::with_capacity(graph.len());
        // dependent -> the failed stack that blocks it
        let mut blocked: HashMap<String, String> = HashMap::new();
        let mut cancelled: Option<String> = None;

        for stack in graph.forward_order() {
            if cancelled.is_none() && self.cancel.is_cancelled() {
                cancelled = Some(
                    self.cancel
                        .reason()
                        .unwrap_or_else(|| "cancelled".to_string()),
                );
                self.events.try_emit(
                    "run.cancelled",
                    Some(json!({"run_id": run_id, "reason": cancelled.clone()})),
                );
            }

            if cancelled.is_some() {
                stacks.push(StackRun {
                    stack: stack.name.clone(),
                    outcome: StackRunOutcome::Cancelled,
                });
                continue;
            }

            if let Some(on) = blocked.get(&stack.name) {
                info!(stack = %stack.name, blocked_on = %on, "Skipping: dependency failed");
                stacks.push(StackRun {
                    stack: stack.name.clone(),
                    outcome: StackRunOutcome::Blocked(on.clone()),
                });
                continue;
            }

            match executor.apply(stack).await {
                Ok(_) => {
                    stacks.push(StackRun {
                        stack: stack.name.clone(),
                        outcome: StackRunOutcome::Deployed,
                    });
                }
                Err(err) => {
                    error!(stack = %stack.name, error = %err, "Stack failed");
                    for dependent in graph.transitive_dependents(&stack.name) {
                        blocked.entry(dependent).or_insert_with(|| stack.name.clone());
                    }
                    stacks.push(StackRun {
                        stack: stack.name.clone(),
                        outcome: StackRunOutcome::Failed(err.to_string()),
                    });
                }
            }
        }

        let report = RunReport {
            run_id,
            environment: env.name.clone(),
            started_at,
            finished_at: Utc::now(),
            stacks,
            verification: None,
            cancelled,
            outputs: store.snapshot(),
        };

        self.events.try_emit(
            "run.completed",
            Some(json!({
                "run_id": run_id,
                "succeeded": report.succeeded(),
                "duration_ms": timer.finish(),
            })),
        );

        Ok((report, store))
    }

    fn verification_engine(&self) -> Result<VerificationEngine, OrchestrationError> {
        let (Some(storage), Some(edge), Some(prober)) = (
            self.storage.clone(),
            self.edge.clone(),
            self.prober.clone(),
        ) else {
            return Err(OrchestrationError::Validation(
                "verification requires storage, edge, and HTTP inspectors".to_string(),
            ));
        };

        Ok(VerificationEngine::new(self.backend.clone(), storage, edge, prober)
            .with_advisory_retry(self.advisory_retry.clone())
            .with_events(self.events.clone()))
    }
}
