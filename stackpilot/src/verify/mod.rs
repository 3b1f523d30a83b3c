//! Verification engine: health probes over a deployed stack's resources.
//!
//! Required probes are fail-fast; advisory probes (edge convergence,
//! external reachability) degrade to warnings once their bounded retry
//! budget is exhausted, because their success criteria depend on
//! propagation outside the system's control horizon.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;

use crate::backend::{
    DistributionState, EdgeInspector, HttpProber, ProvisioningBackend, StorageInspector,
};
use crate::core::StackStatus;
use crate::events::{EventSink, NoOpEventSink};
use crate::retry::RetryPolicy;

/// Probe names used in reports and events.
pub mod probes {
    /// Required: stack status must be complete.
    pub const STACK_HEALTH: &str = "stack-health";
    /// Required: expected artifacts exist in storage.
    pub const CONTENT_PRESENCE: &str = "content-presence";
    /// Required: the storage access policy is attached.
    pub const ACCESS_POLICY: &str = "access-policy";
    /// Advisory: the edge distribution has finished propagating.
    pub const EDGE_CONVERGENCE: &str = "edge-convergence";
    /// Advisory: the deployment answers over HTTP.
    pub const REACHABILITY: &str = "reachability";
}

/// Per-probe outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The probe succeeded.
    Pass,
    /// The probe failed.
    Fail,
    /// The probe could not confirm success; not a blocker.
    Warn,
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail => write!(f, "fail"),
            Self::Warn => write!(f, "warn"),
        }
    }
}

/// Whether a probe blocks overall success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeSeverity {
    /// Failure blocks overall success.
    Required,
    /// Failure degrades to a warning.
    Advisory,
}

/// The outcome of one probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// The probe name.
    pub probe: String,
    /// Whether the probe blocks overall success.
    pub severity: ProbeSeverity,
    /// The outcome.
    pub outcome: ProbeOutcome,
    /// Human-readable detail.
    pub detail: String,
}

impl ProbeResult {
    /// Creates a passing result.
    #[must_use]
    pub fn pass(probe: &str, severity: ProbeSeverity, detail: impl Into<String>) -> Self {
        Self {
            probe: probe.to_string(),
            severity,
            outcome: ProbeOutcome::Pass,
            detail: detail.into(),
        }
    }

    /// Creates a failing result for a required probe.
    #[must_use]
    pub fn fail(probe: &str, detail: impl Into<String>) -> Self {
        Self {
            probe: probe.to_string(),
            severity: ProbeSeverity::Required,
            outcome: ProbeOutcome::Fail,
            detail: detail.into(),
        }
    }

    /// Creates a warning result for an advisory probe.
    #[must_use]
    pub fn warn(probe: &str, detail: impl Into<String>) -> Self {
        Self {
            probe: probe.to_string(),
            severity: ProbeSeverity::Advisory,
            outcome: ProbeOutcome::Warn,
            detail: detail.into(),
        }
    }
}

/// Aggregated probe results for one verification run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Per-probe results, in execution order.
    pub results: Vec<ProbeResult>,
}

impl VerificationReport {
    /// Overall success: no required probe failed. Warnings never block.
    #[must_use]
    pub fn passed(&self) -> bool {
        !self
            .results
            .iter()
            .any(|r| r.severity == ProbeSeverity::Required && r.outcome == ProbeOutcome::Fail)
    }

    /// Returns the warnings attached to this run.
    #[must_use]
    pub fn warnings(&self) -> Vec<&ProbeResult> {
        self.results
            .iter()
            .filter(|r| r.outcome == ProbeOutcome::Warn)
            .collect()
    }

    /// Returns the required-probe failures.
    #[must_use]
    pub fn failures(&self) -> Vec<&ProbeResult> {
        self.results
            .iter()
            .filter(|r| r.outcome == ProbeOutcome::Fail)
            .collect()
    }
}

/// What to verify, resolved from a completed deployment's outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyTarget {
    /// The stack whose health anchors the run.
    pub stack: String,
    /// The provisioned storage bucket.
    pub bucket: String,
    /// Objects that must exist in the bucket.
    pub expected_objects: Vec<String>,
    /// Edge distribution to check for convergence, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_id: Option<String>,
    /// The infrastructure-native domain, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_domain: Option<String>,
    /// The custom domain, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_domain: Option<String>,
}

impl VerifyTarget {
    /// Creates a target for a stack and bucket.
    #[must_use]
    pub fn new(stack: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            bucket: bucket.into(),
            expected_objects: Vec::new(),
            distribution_id: None,
            native_domain: None,
            custom_domain: None,
        }
    }

    /// Adds an object that must exist in the bucket.
    #[must_use]
    pub fn with_expected_object(mut self, key: impl Into<String>) -> Self {
        self.expected_objects.push(key.into());
        self
    }

    /// Sets the edge distribution to check.
    #[must_use]
    pub fn with_distribution(mut self, id: impl Into<String>) -> Self {
        self.distribution_id = Some(id.into());
        self
    }

    /// Sets the infrastructure-native domain.
    #[must_use]
    pub fn with_native_domain(mut self, domain: impl Into<String>) -> Self {
        self.native_domain = Some(domain.into());
        self
    }

    /// Sets the custom domain.
    #[must_use]
    pub fn with_custom_domain(mut self, domain: impl Into<String>) -> Self {
        self.custom_domain = Some(domain.into());
        self
    }
}

/// Runs the probe sequence against a deployed stack.
pub struct VerificationEngine {
    backend: Arc<dyn ProvisioningBackend>,
    storage: Arc<dyn StorageInspector>,
    edge: Arc<dyn EdgeInspector>,
    prober: Arc<dyn HttpProber>,
    advisory_retry: RetryPolicy,
    events: Arc<dyn EventSink>,
}

impl VerificationEngine {
    /// Creates an engine over the given inspection interfaces.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ProvisioningBackend>,
        storage: Arc<dyn StorageInspector>,
        edge: Arc<dyn EdgeInspector>,
        prober: Arc<dyn HttpProber>,
    ) -> Self {
        Self {
            backend,
            storage,
            edge,
            prober,
            advisory_retry: RetryPolicy::default(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the retry policy shared by the advisory probes.
    #[must_use]
    pub fn with_advisory_retry(mut self, policy: RetryPolicy) -> Self {
        self.advisory_retry = policy;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Runs the probe sequence.
    ///
    /// Stack health gates everything else. Content presence and policy
    /// presence are both required but independent, so they run
    /// concurrently. If all required probes pass, the two advisory probes
    /// run concurrently with each other, each with its own bounded retry
    /// budget.
    pub async fn verify(&self, target: &VerifyTarget) -> VerificationReport {
        let mut report = VerificationReport::default();

        let health = self.probe_stack_health(target).await;
        let health_passed = health.outcome == ProbeOutcome::Pass;
        self.record(&mut report, health);
        if !health_passed {
            return report;
        }

        let (content, policy) = tokio::join!(
            self.probe_content_presence(target),
            self.probe_access_policy(target),
        );
        let required_passed =
            content.outcome == ProbeOutcome::Pass && policy.outcome == ProbeOutcome::Pass;
        self.record(&mut report, content);
        self.record(&mut report, policy);
        if !required_passed {
            return report;
        }

        let (edge, reachability) = tokio::join!(
            self.probe_edge_convergence(target),
            self.probe_reachability(target),
        );
        if let Some(result) = edge {
            self.record(&mut report, result);
        }
        for result in reachability {
            self.record(&mut report, result);
        }

        report
    }

    fn record(&self, report: &mut VerificationReport, result: ProbeResult) {
        let event = match result.outcome {
            ProbeOutcome::Pass => "probe.passed",
            ProbeOutcome::Fail => "probe.failed",
            ProbeOutcome::Warn => "probe.warned",
        };
        self.events.try_emit(
            event,
            Some(json!({"probe": result.probe, "detail": result.detail})),
        );
        report.results.push(result);
    }

    async fn probe_stack_health(&self, target: &VerifyTarget) -> ProbeResult {
        match self.backend.describe(&target.stack).await {
            Ok(observation) if observation.status == StackStatus::Complete => ProbeResult::pass(
                probes::STACK_HEALTH,
                ProbeSeverity::Required,
                format!("stack '{}' is complete", target.stack),
            ),
            Ok(observation) => ProbeResult::fail(
                probes::STACK_HEALTH,
                format!(
                    "stack '{}' status is {}, expected complete",
                    target.stack, observation.status
                ),
            ),
            Err(err) => ProbeResult::fail(
                probes::STACK_HEALTH,
                format!("could not describe stack '{}': {err}", target.stack),
            ),
        }
    }

    async fn probe_content_presence(&self, target: &VerifyTarget) -> ProbeResult {
        let mut missing = Vec::new();

        for key in &target.expected_objects {
            match self.storage.object_exists(&target.bucket, key).await {
                Ok(true) => {}
                Ok(false) => missing.push(key.clone()),
                Err(err) => {
                    return ProbeResult::fail(
                        probes::CONTENT_PRESENCE,
                        format!("could not inspect '{}/{key}': {err}", target.bucket),
                    );
                }
            }
        }

        if missing.is_empty() {
            ProbeResult::pass(
                probes::CONTENT_PRESENCE,
                ProbeSeverity::Required,
                format!(
                    "{} expected object(s) present in '{}'",
                    target.expected_objects.len(),
                    target.bucket
                ),
            )
        } else {
            ProbeResult::fail(
                probes::CONTENT_PRESENCE,
                format!(
                    "missing from '{}': {}",
                    target.bucket,
                    missing.join(", ")
                ),
            )
        }
    }

    async fn probe_access_policy(&self, target: &VerifyTarget) -> ProbeResult {
        match self.storage.policy_attached(&target.bucket).await {
            Ok(true) => ProbeResult::pass(
                probes::ACCESS_POLICY,
                ProbeSeverity::Required,
                format!("access policy attached to '{}'", target.bucket),
            ),
            Ok(false) => ProbeResult::fail(
                probes::ACCESS_POLICY,
                format!(
                    "no access policy attached to '{}'; the deployment is unreachable or insecure",
                    target.bucket
                ),
            ),
            Err(err) => ProbeResult::fail(
                probes::ACCESS_POLICY,
                format!("could not inspect policy on '{}': {err}", target.bucket),
            ),
        }
    }

    /// Polls the distribution with exponential backoff until it reports
    /// deployed or the budget runs out; then downgrades to a warning. Edge
    /// propagation is known to take 10-15 minutes.
    async fn probe_edge_convergence(&self, target: &VerifyTarget) -> Option<ProbeResult> {
        let id = target.distribution_id.as_deref()?;

        let mut attempt = 0u32;
        loop {
            match self.edge.distribution_state(id).await {
                Ok(DistributionState::Deployed) => {
                    return Some(ProbeResult::pass(
                        probes::EDGE_CONVERGENCE,
                        ProbeSeverity::Advisory,
                        format!("distribution '{id}' is deployed"),
                    ));
                }
                Ok(DistributionState::InProgress) => {}
                Err(err) => {
                    return Some(ProbeResult::warn(
                        probes::EDGE_CONVERGENCE,
                        format!("could not inspect distribution '{id}': {err}"),
                    ));
                }
            }

            attempt += 1;
            if attempt >= self.advisory_retry.max_attempts {
                return Some(ProbeResult::warn(
                    probes::EDGE_CONVERGENCE,
                    format!(
                        "distribution '{id}' still propagating after {attempt} check(s); \
                         edge propagation can take 10-15 minutes"
                    ),
                ));
            }
            tokio::time::sleep(self.advisory_retry.delay_for(attempt - 1)).await;
        }
    }

    /// Probes each configured domain, retrying within the advisory budget.
    /// A domain that never answers 2xx yields a warning, not a failure:
    /// DNS convergence is outside the system's control horizon.
    async fn probe_reachability(&self, target: &VerifyTarget) -> Vec<ProbeResult> {
        let domains = [target.native_domain.as_deref(), target.custom_domain.as_deref()]
            .into_iter()
            .flatten();

        futures::future::join_all(domains.map(|domain| self.probe_one_domain(domain))).await
    }

    async fn probe_one_domain(&self, domain: &str) -> ProbeResult {
        let url = probe_url(domain);
        let mut attempt = 0u32;

        loop {
            let outcome = self.prober.get_status(&url).await;
            match outcome {
                Ok(code) if (200..300).contains(&code) => {
                    return ProbeResult::pass(
                        probes::REACHABILITY,
                        ProbeSeverity::Advisory,
                        format!("{url} answered {code}"),
                    );
                }
                Ok(code) => {
                    attempt += 1;
                    if attempt >= self.advisory_retry.max_attempts {
                        return ProbeResult::warn(
                            probes::REACHABILITY,
                            format!(
                                "{url} answered {code}; DNS propagation may still be in flight"
                            ),
                        );
                    }
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.advisory_retry.max_attempts {
                        return ProbeResult::warn(
                            probes::REACHABILITY,
                            format!(
                                "{url} unreachable ({err}); DNS propagation may still be in flight"
                            ),
                        );
                    }
                }
            }
            tokio::time::sleep(self.advisory_retry.delay_for(attempt - 1)).await;
        }
    }
}

/// Normalizes a domain into a probe URL.
fn probe_url(domain: &str) -> String {
    if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.to_string()
    } else {
        format!("https://{domain}/")
    }
}
