//! Pure, deterministic functions mapping a defaulted [`Agent`] to its
//! desired child objects (spec §4.2). Builders never consult cluster
//! state; they only read the `Agent` and [`OperatorConfig`].

pub mod configmap;
pub mod deployment;
pub mod hpa;
pub mod ingress;
pub mod service;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::crd::Agent;

pub const FINALIZER: &str = "agents.kubeagentic.io/finalizer";
pub const MANAGED_BY: &str = "agent-operator";

/// Labels every owned child carries, keyed on the instance label per
/// spec §3.2 so builders, the Deployment's pod selector, and the
/// Service's selector all agree on the same set.
pub fn labels(agent: &Agent) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), "agent".to_string()),
        (
            "app.kubernetes.io/instance".to_string(),
            agent.name_any(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            MANAGED_BY.to_string(),
        ),
    ])
}

/// Owner-reference pointing back at `agent`, attached to every child
/// object so the API server's garbage collector cascades deletes
/// (spec §3.3's ownership invariant).
pub fn owner_reference(agent: &Agent) -> OwnerReference {
    agent
        .controller_owner_ref(&())
        .expect("Agent has name and uid set by the API server by the time it reaches a reconcile")
}

/// Deterministic child names (spec §3.2, §8 "Name stability"): each is
/// a pure function of the Agent's own name.
pub fn deployment_name(agent: &Agent) -> String {
    agent.name_any()
}

pub fn service_name(agent: &Agent) -> String {
    format!("{}-service", agent.name_any())
}

pub fn configmap_name(agent: &Agent) -> String {
    format!("{}-config", agent.name_any())
}

pub fn hpa_name(agent: &Agent) -> String {
    format!("{}-hpa", agent.name_any())
}

pub fn ingress_name(agent: &Agent) -> String {
    format!("{}-ingress", agent.name_any())
}
