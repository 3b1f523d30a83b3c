//! Trust federation provisioner.
//!
//! Idempotently grants a CI identity, scoped to one repository/branch
//! pair, the right to obtain short-lived credentials via web-identity
//! exchange. The federation provider itself is a one-time, higher
//! privilege setup step and is never created here.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::backend::FederationClient;
use crate::errors::{MissingFederationProviderError, OrchestrationError};
use crate::events::{EventSink, NoOpEventSink};

/// The default token issuer for repository-scoped CI identities.
pub const DEFAULT_ISSUER: &str = "token.actions.githubusercontent.com";

/// A scoped trust relationship: which repository/branch may assume which
/// role.
///
/// Re-issuing a grant with the same key is an update, never a duplicate
/// resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustGrant {
    /// The source organization.
    pub organization: String,
    /// The repository within the organization.
    pub repository: String,
    /// The branch pattern the grant is restricted to (e.g. `main`).
    pub branch_pattern: String,
    /// The role to create or update.
    pub role_name: String,
}

impl TrustGrant {
    /// Creates a new grant.
    #[must_use]
    pub fn new(
        organization: impl Into<String>,
        repository: impl Into<String>,
        branch_pattern: impl Into<String>,
        role_name: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            repository: repository.into(),
            branch_pattern: branch_pattern.into(),
            role_name: role_name.into(),
        }
    }

    /// The exact subject claim the trust policy is restricted to.
    #[must_use]
    pub fn subject_claim(&self) -> String {
        format!(
            "repo:{}/{}:ref:refs/heads/{}",
            self.organization, self.repository, self.branch_pattern
        )
    }
}

/// A minimum permission scope attached to a provisioned role.
///
/// Deliberately never a broad managed administrator policy: the scope
/// enumerates the actions and resources the environment's stack set
/// actually needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionScope {
    statements: Vec<ScopeStatement>,
}

/// One allow-statement in a permission scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeStatement {
    /// Allowed actions.
    pub actions: Vec<String>,
    /// Resources the actions apply to.
    pub resources: Vec<String>,
}

impl PermissionScope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an allow-statement.
    #[must_use]
    pub fn allow(
        mut self,
        actions: impl IntoIterator<Item = impl Into<String>>,
        resources: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.statements.push(ScopeStatement {
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Returns true if no statements were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Renders the scope as a policy document.
    #[must_use]
    pub fn to_policy_document(&self) -> Value {
        json!({
            "Version": "2012-10-17",
            "Statement": self
                .statements
                .iter()
                .map(|statement| {
                    json!({
                        "Effect": "Allow",
                        "Action": statement.actions,
                        "Resource": statement.resources,
                    })
                })
                .collect::<Vec<_>>(),
        })
    }
}

/// Creates or updates the federation trust for one grant.
pub struct TrustProvisioner {
    client: Arc<dyn FederationClient>,
    issuer: String,
    events: Arc<dyn EventSink>,
}

impl TrustProvisioner {
    /// Creates a provisioner expecting the default issuer.
    #[must_use]
    pub fn new(client: Arc<dyn FederationClient>) -> Self {
        Self {
            client,
            issuer: DEFAULT_ISSUER.to_string(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Overrides the expected issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Ensures the trust relationship exists and returns the role
    /// identifier for downstream secret storage.
    ///
    /// Safe to re-run: an existing role with the same name is updated in
    /// place.
    ///
    /// # Errors
    ///
    /// `MissingFederationProviderError` if no provider matches the
    /// expected issuer; backend errors from the federation client.
    pub async fn ensure_trust(
        &self,
        grant: &TrustGrant,
        scope: &PermissionScope,
    ) -> Result<String, OrchestrationError> {
        let provider = self
            .client
            .find_provider(&self.issuer)
            .await?
            .ok_or_else(|| MissingFederationProviderError::new(&self.issuer))?;

        let trust_policy = self.build_trust_policy(&provider, grant);
        let role_id = self
            .client
            .put_role(&grant.role_name, &trust_policy, &scope.to_policy_document())
            .await?;

        info!(
            role = %grant.role_name,
            subject = %grant.subject_claim(),
            "Federation trust ensured"
        );
        self.events.try_emit(
            "trust.ensured",
            Some(json!({"role": role_id, "subject": grant.subject_claim()})),
        );

        Ok(role_id)
    }

    /// Builds the role trust policy restricting web-identity exchange to
    /// the grant's exact subject claim.
    fn build_trust_policy(&self, provider: &str, grant: &TrustGrant) -> Value {
        json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": {"Federated": provider},
                "Action": "sts:AssumeRoleWithWebIdentity",
                "Condition": {
                    "StringLike": {
                        (format!("{}:sub", self.issuer)): grant.subject_claim(),
                    }
                }
            }]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockFederation;

    fn grant() -> TrustGrant {
        TrustGrant::new("acme", "website", "main", "ci-deployer")
    }

    fn scope() -> PermissionScope {
        PermissionScope::new().allow(
            ["storage:PutObject", "storage:ListBucket"],
            ["arn:storage:::site-bucket/*"],
        )
    }

    #[test]
    fn test_subject_claim_format() {
        assert_eq!(
            grant().subject_claim(),
            "repo:acme/website:ref:refs/heads/main"
        );
    }

    #[tokio::test]
    async fn test_missing_provider_is_fatal() {
        let client = Arc::new(MockFederation::new());
        let provisioner = TrustProvisioner::new(client.clone());

        let err = provisioner.ensure_trust(&grant(), &scope()).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::MissingFederationProvider(_)
        ));
        assert_eq!(client.put_role_count(), 0);
    }

    #[tokio::test]
    async fn test_trust_policy_restricted_to_subject() {
        let client = Arc::new(MockFederation::new().with_provider(DEFAULT_ISSUER, "provider-1"));
        let provisioner = TrustProvisioner::new(client.clone());

        provisioner.ensure_trust(&grant(), &scope()).await.unwrap();

        let (trust_policy, _) = client.role("ci-deployer").unwrap();
        let sub_key = format!("{DEFAULT_ISSUER}:sub");
        let condition =
            &trust_policy["Statement"][0]["Condition"]["StringLike"][sub_key.as_str()];
        assert_eq!(condition, "repo:acme/website:ref:refs/heads/main");
        assert_eq!(
            trust_policy["Statement"][0]["Principal"]["Federated"],
            "provider-1"
        );
    }

    #[tokio::test]
    async fn test_ensure_trust_is_idempotent() {
        let client = Arc::new(MockFederation::new().with_provider(DEFAULT_ISSUER, "provider-1"));
        let provisioner = TrustProvisioner::new(client.clone());

        let first = provisioner.ensure_trust(&grant(), &scope()).await.unwrap();
        let second = provisioner.ensure_trust(&grant(), &scope()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.role_count(), 1);
        assert_eq!(client.put_role_count(), 2);
    }

    #[tokio::test]
    async fn test_permission_scope_is_narrow() {
        let client = Arc::new(MockFederation::new().with_provider(DEFAULT_ISSUER, "provider-1"));
        let provisioner = TrustProvisioner::new(client.clone());

        provisioner.ensure_trust(&grant(), &scope()).await.unwrap();

        let (_, permissions) = client.role("ci-deployer").unwrap();
        let actions = &permissions["Statement"][0]["Action"];
        assert_eq!(actions[0], "storage:PutObject");
        // never the broad administrator scope
        assert_ne!(actions[0], "*");
    }

    #[test]
    fn test_scope_policy_document_shape() {
        let doc = scope().to_policy_document();
        assert_eq!(doc["Version"], "2012-10-17");
        assert_eq!(doc["Statement"][0]["Effect"], "Allow");
        assert_eq!(doc["Statement"][0]["Resource"][0], "arn:storage:::site-bucket/*");
    }
}
