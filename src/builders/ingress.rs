use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use super::{ingress_name, labels, owner_reference, service_name};
use crate::crd::Agent;

/// Builds the Ingress fronting the agent Service, per spec §4.2. Only
/// created by the reconciler when `serviceType == LoadBalancer` (spec
/// §3.2, §8) — this function is unconditional; the caller decides
/// whether to apply it.
pub fn build(agent: &Agent) -> Ingress {
    let namespace = agent.namespace().unwrap_or_else(|| "default".to_string());
    let host = format!("{}.{}.local", agent.name_any(), namespace);

    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: service_name(agent),
            port: Some(ServiceBackendPort {
                number: Some(80),
                name: None,
            }),
        }),
        resource: None,
    };

    let rule = IngressRule {
        host: Some(host),
        http: Some(HTTPIngressRuleValue {
            paths: vec![HTTPIngressPath {
                backend,
                path: Some("/".into()),
                path_type: "Prefix".into(),
            }],
        }),
    };

    let mut annotations = BTreeMap::new();
    annotations.insert(
        "nginx.ingress.kubernetes.io/rewrite-target".to_string(),
        "/".to_string(),
    );
    annotations.insert(
        "nginx.ingress.kubernetes.io/ssl-redirect".to_string(),
        "false".to_string(),
    );

    Ingress {
        metadata: ObjectMeta {
            name: Some(ingress_name(agent)),
            namespace: agent.metadata.namespace.clone(),
            labels: Some(labels(agent)),
            annotations: Some(annotations),
            owner_references: Some(vec![owner_reference(agent)]),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![rule]),
            ..Default::default()
        }),
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
            namespace: Some("prod".into()),
            uid: Some("11111111-1111-1111-1111-111111111111".into()),
            ..Default::default()
        };
        agent
    }

    #[test]
    fn host_is_derived_from_name_and_namespace() {
        let ing = build(&test_agent());
        let rule = &ing.spec.unwrap().rules.unwrap()[0];
        assert_eq!(rule.host.as_deref(), Some("test-agent.prod.local"));
    }

    #[test]
    fn backend_targets_service_port_80() {
        let ing = build(&test_agent());
        let rule = &ing.spec.unwrap().rules.unwrap()[0];
        let path = &rule.http.as_ref().unwrap().paths[0];
        assert_eq!(
            path.backend.service.as_ref().unwrap().name,
            "test-agent-service"
        );
        assert_eq!(
            path.backend.service.as_ref().unwrap().port.as_ref().unwrap().number,
            Some(80)
        );
    }
}
