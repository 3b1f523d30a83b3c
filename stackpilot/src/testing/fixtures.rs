//! Shared fixtures: a realistic four-stack environment.

use std::collections::BTreeMap;

use crate::core::{ParameterValue, StackDefinition};
use crate::environment::{EnvironmentSpec, VerificationSpec};
use crate::testing::mocks::MockBackend;
use crate::trust::TrustGrant;

/// The classic four-stack set: `network <- {storage, auth} <- backend`.
#[must_use]
pub fn four_stack_environment() -> EnvironmentSpec {
    EnvironmentSpec::new("staging")
        .with_stack(StackDefinition::new("network", "templates/network.yaml"))
        .with_stack(
            StackDefinition::new("storage", "templates/storage.yaml")
                .with_output_ref("VpcId", "network", "VpcId")
                .with_dependency("network"),
        )
        .with_stack(
            StackDefinition::new("auth", "templates/auth.yaml")
                .with_output_ref("VpcId", "network", "VpcId")
                .with_dependency("network"),
        )
        .with_stack(
            StackDefinition::new("backend", "templates/backend.yaml")
                .with_output_ref("BucketName", "storage", "BucketName")
                .with_output_ref("UserPoolId", "auth", "UserPoolId")
                .with_dependency("storage")
                .with_dependency("auth"),
        )
        .with_verification(
            VerificationSpec::new("storage", ParameterValue::output_ref("storage", "BucketName"))
                .with_distribution(ParameterValue::output_ref("storage", "DistributionId"))
                .with_native_domain(ParameterValue::output_ref("storage", "Domain")),
        )
        .with_trust(TrustGrant::new("acme", "website", "main", "ci-deployer"))
}

/// Outputs each fixture stack reports when complete.
#[must_use]
pub fn fixture_outputs(stack: &str) -> BTreeMap<String, String> {
    let pairs: &[(&str, &str)] = match stack {
        "network" => &[("VpcId", "vpc-0a1b2c")],
        "storage" => &[
            ("BucketName", "site-bucket"),
            ("DistributionId", "dist-1"),
            ("Domain", "d111.cdn.example.net"),
        ],
        "auth" => &[("UserPoolId", "pool-42")],
        "backend" => &[("ApiUrl", "https://api.example.com")],
        _ => &[],
    };

    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Scripts every fixture stack to complete immediately with its outputs.
pub fn script_happy_deployment(backend: &MockBackend) {
    for stack in ["network", "storage", "auth", "backend"] {
        backend.hold_complete_with(stack, fixture_outputs(stack));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DependencyGraph;

    #[test]
    fn test_fixture_environment_is_a_valid_graph() {
        let env = four_stack_environment();
        let graph = DependencyGraph::build(env.stacks).unwrap();
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn test_fixture_outputs_cover_references() {
        let env = four_stack_environment();
        for stack in &env.stacks {
            for (_, key) in stack.output_refs() {
                let outputs = fixture_outputs(&key.stack);
                assert!(
                    outputs.contains_key(&key.output),
                    "fixture '{}' must produce '{}'",
                    key.stack,
                    key.output
                );
            }
        }
    }
}
