//! Finalizer add/remove for the `Agent` resource, split out of the
//! reconciler since both the creation and deletion branches of spec
//! §4.3 touch it.

use kube::api::{Patch, PatchParams};
use kube::{Api, Client};

use crate::builders::FINALIZER;
use crate::crd::Agent;
use crate::error::Error;

pub async fn add(client: Client, name: &str, namespace: &str) -> Result<Agent, Error> {
    let api: Api<Agent> = Api::namespaced(client, namespace);
    let patch = serde_json::json!({ "metadata": { "finalizers": [FINALIZER] }});
    Ok(api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?)
}

pub async fn remove(client: Client, name: &str, namespace: &str) -> Result<Agent, Error> {
    let api: Api<Agent> = Api::namespaced(client, namespace);
    let patch = serde_json::json!({ "metadata": { "finalizers": null }});
    Ok(api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?)
}

pub fn has_finalizer(agent: &Agent) -> bool {
    agent
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|f| f == FINALIZER))
}
