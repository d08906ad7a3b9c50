use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::deployment::CONTAINER_PORT;
use super::{labels, owner_reference, service_name};
use crate::crd::Agent;

/// Builds the Service fronting the agent Deployment, per spec §4.2.
/// Port 80 targets the container's 8080.
pub fn build(agent: &Agent) -> Service {
    let labels = labels(agent);

    Service {
        metadata: ObjectMeta {
            name: Some(service_name(agent)),
            namespace: agent.metadata.namespace.clone(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(agent)]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                port: 80,
                target_port: Some(IntOrString::Int(CONTAINER_PORT)),
                ..Default::default()
            }]),
            type_: Some(agent.spec.service_type_or_default().as_str().to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
