use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{configmap_name, labels, owner_reference};
use crate::crd::Agent;

pub const TOOLS_KEY: &str = "tools.json";
pub const LANGGRAPH_KEY: &str = "langgraph-config.json";

/// Builds the ConfigMap carrying the opaque `tools` and
/// `langgraphConfig` payloads (spec §3.2, §4.2, §9). Always created,
/// even when both sections are empty, so the owned-object set stays
/// uniform across passes (see DESIGN.md). Serialization is canonical
/// (keys sorted via `serde_json::Value`'s own `BTreeMap`-backed object
/// representation) so byte-equal spec inputs produce byte-equal
/// ConfigMap contents, enabling no-op diffs per spec §9.
pub fn build(agent: &Agent) -> ConfigMap {
    let mut data = BTreeMap::new();

    if let Some(tools) = &agent.spec.tools {
        if !tools.is_empty() {
            data.insert(
                TOOLS_KEY.to_string(),
                serde_json::to_string(tools).expect("tools already deserialized from JSON"),
            );
        }
    }

    if let Some(config) = &agent.spec.langgraph_config {
        data.insert(
            LANGGRAPH_KEY.to_string(),
            serde_json::to_string(config).expect("langgraph_config already valid JSON"),
        );
    }

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(configmap_name(agent)),
            namespace: agent.metadata.namespace.clone(),
            labels: Some(labels(agent)),
            owner_references: Some(vec![owner_reference(agent)]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Framework, Provider, SecretKeyRef, ToolSpec};
    use kube::api::ObjectMeta as KubeObjectMeta;

    fn base_agent() -> Agent {
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

    #[test]
    fn omits_keys_when_sections_absent() {
        let cm = build(&base_agent());
        assert_eq!(cm.metadata.name.as_deref(), Some("test-agent-config"));
        assert!(cm.data.unwrap().is_empty());
    }

    #[test]
    fn includes_tools_and_langgraph_when_present() {
        let mut agent = base_agent();
        agent.spec.tools = Some(vec![ToolSpec {
            name: "search".into(),
            description: "web search".into(),
            input_schema: None,
        }]);
        agent.spec.langgraph_config = Some(serde_json::json!({"nodes": ["a"]}));

        let cm = build(&agent);
        let data = cm.data.unwrap();
        assert!(data.contains_key(TOOLS_KEY));
        assert!(data.contains_key(LANGGRAPH_KEY));
    }

    #[test]
    fn identical_inputs_produce_byte_equal_output() {
        let mut a = base_agent();
        let mut b = base_agent();
        a.spec.tools = Some(vec![ToolSpec {
            name: "x".into(),
            description: "d".into(),
            input_schema: None,
        }]);
        b.spec.tools = a.spec.tools.clone();

        assert_eq!(build(&a).data, build(&b).data);
    }
}
