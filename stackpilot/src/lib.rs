//! # Stackpilot
//!
//! Dependency-ordered provisioning of multi-stack cloud deployments.
//!
//! Stackpilot turns a named environment's stack set into a deterministic
//! deployment run:
//!
//! - **Dependency graph**: stacks declare dependencies; cycles and unknown
//!   references are rejected before any backend call
//! - **Output wiring**: outputs of completed stacks resolve into the
//!   parameters of their dependents
//! - **Polling executor**: fixed-cadence status polling with per-stack
//!   timeouts, idempotent re-apply, verbatim failure surfacing
//! - **Verification**: required health probes plus advisory edge and
//!   reachability probes that degrade to warnings
//! - **Teardown**: best-effort deletion in reverse dependency order
//! - **Trust federation**: idempotent repository/branch-scoped CI trust
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stackpilot::prelude::*;
//!
//! let env = EnvironmentSpec::from_json(&std::fs::read_to_string("staging.json")?)?;
//! let orchestrator = Orchestrator::new(backend)
//!     .with_inspectors(storage, edge, prober);
//!
//! let report = orchestrator.deploy_and_verify(&env).await?;
//! std::process::exit(report.exit_code());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod backend;
pub mod cancellation;
pub mod core;
pub mod environment;
pub mod errors;
pub mod events;
pub mod executor;
pub mod graph;
pub mod observability;
pub mod retry;
pub mod run;
pub mod store;
pub mod teardown;
pub mod testing;
pub mod trust;
pub mod verify;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::{
        DistributionState, EdgeInspector, FederationClient, HttpProber, OperationHandle,
        ProvisioningBackend, StackObservation, StorageInspector,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::core::{ParameterValue, StackDefinition, StackStatus, TemplateRef};
    pub use crate::environment::{EnvironmentSpec, VerificationSpec};
    pub use crate::errors::{
        BackendError, BackendFailure, CycleError, MissingFederationProviderError,
        OrchestrationError, ProbeFailure, StackVerb, TimeoutError, UnknownDependencyError,
        UnresolvedOutputError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::executor::{ApplyOutcome, DeploymentExecutor, PollConfig};
    pub use crate::graph::DependencyGraph;
    pub use crate::retry::{Backoff, RetryPolicy};
    pub use crate::run::{Orchestrator, RunReport, StackRun, StackRunOutcome};
    pub use crate::store::{OutputKey, OutputStore};
    pub use crate::teardown::{
        StackTeardown, TeardownOrchestrator, TeardownOutcome, TeardownReport,
    };
    pub use crate::trust::{PermissionScope, TrustGrant, TrustProvisioner};
    pub use crate::verify::{
        ProbeOutcome, ProbeResult, ProbeSeverity, VerificationEngine, VerificationReport,
        VerifyTarget,
    };

    #[cfg(feature = "http-probe")]
    pub use crate::backend::ReqwestProber;
}
