use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
    MetricSpec, MetricTarget, ResourceMetricSource,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{deployment_name, hpa_name, labels, owner_reference};
use crate::crd::Agent;

const MAX_REPLICA_MULTIPLIER: i32 = 3;
const CPU_TARGET_UTILIZATION: i32 = 70;
const MEMORY_TARGET_UTILIZATION: i32 = 80;

/// Builds the HorizontalPodAutoscaler targeting the agent Deployment,
/// per spec §4.2. Only created by the reconciler when desired replicas
/// > 1 (spec §3.2, §8's "Conditional children" property) — this
/// function is unconditional; the caller decides whether to apply it.
pub fn build(agent: &Agent) -> HorizontalPodAutoscaler {
    let replicas = agent.spec.replicas_or_default();

    HorizontalPodAutoscaler {
        metadata: ObjectMeta {
            name: Some(hpa_name(agent)),
            namespace: agent.metadata.namespace.clone(),
            labels: Some(labels(agent)),
            owner_references: Some(vec![owner_reference(agent)]),
            ..Default::default()
        },
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: deployment_name(agent),
            },
            min_replicas: Some(replicas),
            max_replicas: replicas * MAX_REPLICA_MULTIPLIER,
            metrics: Some(vec![
                resource_metric("cpu", CPU_TARGET_UTILIZATION),
                resource_metric("memory", MEMORY_TARGET_UTILIZATION),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn resource_metric(name: &str, target_utilization: i32) -> MetricSpec {
    MetricSpec {
        type_: "Resource".to_string(),
        resource: Some(ResourceMetricSource {
            name: name.to_string(),
            target: MetricTarget {
                type_: "Utilization".to_string(),
                average_utilization: Some(target_utilization),
                ..Default::default()
            },
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Framework, Provider, SecretKeyRef};
    use kube::api::ObjectMeta as KubeObjectMeta;

    fn test_agent(replicas: i32) -> Agent {
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
                replicas: Some(replicas),
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

    #[test]
    fn replica_boundary_min_and_max() {
        let hpa = build(&test_agent(2));
        let spec = hpa.spec.unwrap();
        assert_eq!(spec.min_replicas, Some(2));
        assert_eq!(spec.max_replicas, 6);
    }

    #[test]
    fn targets_the_deployment() {
        let hpa = build(&test_agent(3));
        let target = hpa.spec.unwrap().scale_target_ref;
        assert_eq!(target.kind, "Deployment");
        assert_eq!(target.name, "test-agent");
    }

    #[test]
    fn name_is_agent_name_suffixed_with_hpa() {
        let hpa = build(&test_agent(2));
        assert_eq!(hpa.metadata.name.as_deref(), Some("test-agent-hpa"));
    }
}
