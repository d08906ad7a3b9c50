use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements as K8sResourceRequirements, SecretKeySelector,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

use super::{deployment_name, labels, owner_reference};
use crate::config::OperatorConfig;
use crate::crd::Agent;

pub const CONTAINER_PORT: i32 = 8080;

/// Builds the Deployment that runs the agent container, per spec §4.2.
pub fn build(agent: &Agent, config: &OperatorConfig) -> Deployment {
    let labels = labels(agent);
    let name = deployment_name(agent);
    let spec = &agent.spec;
    let image = config.resolve_image(spec.image.as_deref());

    Deployment {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: agent.metadata.namespace.clone(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(agent)]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas_or_default()),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container(agent, &image)],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container(agent: &Agent, image: &str) -> Container {
    let spec = &agent.spec;

    Container {
        name: "agent".into(),
        image: Some(image.to_string()),
        ports: Some(vec![ContainerPort {
            container_port: CONTAINER_PORT,
            name: Some("http".into()),
            ..Default::default()
        }]),
        env: Some(env_vars(agent)),
        resources: Some(resource_requirements(agent)),
        liveness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/health".into()),
                port: IntOrString::Int(CONTAINER_PORT),
                ..Default::default()
            }),
            initial_delay_seconds: Some(30),
            period_seconds: Some(10),
            ..Default::default()
        }),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/ready".into()),
                port: IntOrString::Int(CONTAINER_PORT),
                ..Default::default()
            }),
            initial_delay_seconds: Some(5),
            period_seconds: Some(5),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Environment-variable contract the agent container image relies on
/// (spec §6 "Agent-container contract"). The credential itself is never
/// inlined: it's sourced through a `secretKeyRef` indirection.
fn env_vars(agent: &Agent) -> Vec<EnvVar> {
    let spec = &agent.spec;
    let tools_count = spec.tools.as_ref().map_or(0, Vec::len);

    let mut vars = vec![
        EnvVar {
            name: "AGENT_PROVIDER".into(),
            value: Some(spec.provider.as_str().to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "AGENT_MODEL".into(),
            value: Some(spec.model.clone()),
            ..Default::default()
        },
        EnvVar {
            name: "AGENT_SYSTEM_PROMPT".into(),
            value: Some(spec.system_prompt.clone()),
            ..Default::default()
        },
        EnvVar {
            name: "AGENT_FRAMEWORK".into(),
            value: Some(spec.framework.as_str().to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "AGENT_TOOLS_COUNT".into(),
            value: Some(tools_count.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "AGENT_API_KEY".into(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: spec.api_secret_ref.name.clone(),
                    key: spec.api_secret_ref.key.clone(),
                    optional: Some(false),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];

    if let Some(endpoint) = &spec.endpoint {
        vars.push(EnvVar {
            name: "AGENT_ENDPOINT".into(),
            value: Some(endpoint.clone()),
            ..Default::default()
        });
    }

    if let Some(config) = &spec.langgraph_config {
        vars.push(EnvVar {
            name: "AGENT_LANGGRAPH_CONFIG".into(),
            value: Some(
                serde_json::to_string(config).expect("langgraph_config is already valid JSON"),
            ),
            ..Default::default()
        });
    }

    vars
}

/// Default CPU/memory request-and-limit record per spec §3.1, used
/// when `Agent.spec.resources` is absent.
fn resource_requirements(agent: &Agent) -> K8sResourceRequirements {
    let (cpu_req, mem_req, cpu_lim, mem_lim) = match &agent.spec.resources {
        Some(r) => (
            r.requests
                .as_ref()
                .and_then(|q| q.cpu.clone())
                .unwrap_or_else(|| "100m".to_string()),
            r.requests
                .as_ref()
                .and_then(|q| q.memory.clone())
                .unwrap_or_else(|| "256Mi".to_string()),
            r.limits
                .as_ref()
                .and_then(|q| q.cpu.clone())
                .unwrap_or_else(|| "200m".to_string()),
            r.limits
                .as_ref()
                .and_then(|q| q.memory.clone())
                .unwrap_or_else(|| "512Mi".to_string()),
        ),
        None => (
            "100m".to_string(),
            "256Mi".to_string(),
            "200m".to_string(),
            "512Mi".to_string(),
        ),
    };

    let mut requests = BTreeMap::new();
    requests.insert("cpu".to_string(), Quantity(cpu_req));
    requests.insert("memory".to_string(), Quantity(mem_req));
    let mut limits = BTreeMap::new();
    limits.insert("cpu".to_string(), Quantity(cpu_lim));
    limits.insert("memory".to_string(), Quantity(mem_lim));

    K8sResourceRequirements {
        requests: Some(requests),
        limits: Some(limits),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Framework, Provider, SecretKeyRef};
    use kube::api::ObjectMeta as KubeObjectMeta;

    fn test_agent() -> Agent {
        let mut agent = Agent::new(
            "test-agent",
            crate::crd::AgentSpec {
                provider: Provider::Openai,
                model: "gpt-4".into(),
                system_prompt: "hi".into(),
                api_secret_ref: SecretKeyRef {
                    name: "s".into(),
                    key: "k".into(),
                },
                endpoint: None,
                framework: Framework::Direct,
                langgraph_config: None,
                tools: None,
                replicas: Some(1),
                resources: None,
                service_type: None,
                image: None,
            },
        );
        agent.metadata = KubeObjectMeta {
            name: Some("test-agent".into()),
            namespace: Some("default".into()),
            uid: Some("11111111-1111-1111-1111-111111111111".into()),
            ..Default::default()
        };
        agent
    }

    fn test_config() -> OperatorConfig {
        OperatorConfig {
            default_image: "operator-default:latest".into(),
            namespace: "default".into(),
            metrics_addr: "0.0.0.0:8081".parse().unwrap(),
            health_addr: "0.0.0.0:8082".parse().unwrap(),
            webhook_addr: "0.0.0.0:8443".parse().unwrap(),
            webhook_tls_cert_path: "/tmp/tls.crt".into(),
            webhook_tls_key_path: "/tmp/tls.key".into(),
            holder_id: "test".into(),
        }
    }

    #[test]
    fn builds_deployment_with_replica_count_and_owner() {
        let agent = test_agent();
        let deploy = build(&agent, &test_config());
        assert_eq!(deploy.metadata.name.as_deref(), Some("test-agent"));
        assert_eq!(deploy.spec.as_ref().unwrap().replicas, Some(1));
        assert_eq!(deploy.metadata.owner_references.unwrap().len(), 1);
    }

    #[test]
    fn image_resolution_prefers_spec_then_operator_default() {
        let mut agent = test_agent();
        let deploy = build(&agent, &test_config());
        let image = deploy.spec.unwrap().template.spec.unwrap().containers[0]
            .image
            .clone();
        assert_eq!(image.as_deref(), Some("operator-default:latest"));

        agent.spec.image = Some("custom:v2".into());
        let deploy = build(&agent, &test_config());
        let image = deploy.spec.unwrap().template.spec.unwrap().containers[0]
            .image
            .clone();
        assert_eq!(image.as_deref(), Some("custom:v2"));
    }

    #[test]
    fn credential_is_never_inlined() {
        let agent = test_agent();
        let deploy = build(&agent, &test_config());
        let env = deploy.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();
        let api_key = env.iter().find(|e| e.name == "AGENT_API_KEY").unwrap();
        assert!(api_key.value.is_none());
        assert!(api_key.value_from.is_some());
    }

    #[test]
    fn default_resources_applied_when_unset() {
        let agent = test_agent();
        let deploy = build(&agent, &test_config());
        let resources = deploy.spec.unwrap().template.spec.unwrap().containers[0]
            .resources
            .clone()
            .unwrap();
        assert_eq!(
            resources.requests.unwrap().get("cpu").unwrap().0,
            "100m"
        );
        assert_eq!(
            resources.limits.unwrap().get("memory").unwrap().0,
            "512Mi"
        );
    }
}
