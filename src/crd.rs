use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::{CustomResource, CustomResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The `Agent` custom resource: a declarative description of a
/// long-running AI-agent workload. `spec` is user intent, `status` is
/// what the reconciler last observed.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "agents.kubeagentic.io",
    version = "v1",
    kind = "Agent",
    plural = "agents",
    namespaced
)]
#[kube(status = "AgentStatus")]
#[kube(printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#)]
#[kube(printcolumn = r#"{"name":"Provider", "type":"string", "jsonPath":".spec.provider"}"#)]
#[kube(printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#)]
pub struct AgentSpec {
    pub provider: Provider,

    /// Model name within `provider`'s namespace, e.g. "gpt-4".
    pub model: String,

    pub system_prompt: String,

    pub api_secret_ref: SecretKeyRef,

    /// Override endpoint, used by self-hosted providers (vLLM, Ollama).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub framework: Framework,

    /// Opaque workflow-graph description. Required when `framework ==
    /// Langgraph`. The reconciler never interprets its contents beyond
    /// presence-checking; it is propagated verbatim to the agent
    /// container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub langgraph_config: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,

    /// In [1, 10]. Defaulted to 1 by the admission validator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,

    /// Agent container image. When unset, resolution falls to the
    /// operator's configured default, then to a compiled-in fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Claude,
    Gemini,
    Vllm,
    Ollama,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Openai => "openai",
            Provider::Claude => "claude",
            Provider::Gemini => "gemini",
            Provider::Vllm => "vllm",
            Provider::Ollama => "ollama",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    #[default]
    Direct,
    Langgraph,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Direct => "direct",
            Framework::Langgraph => "langgraph",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::ClusterIP => "ClusterIP",
            ServiceType::NodePort => "NodePort",
            ServiceType::LoadBalancer => "LoadBalancer",
        }
    }
}

/// Reference to a credential secret: the object name plus the key
/// within its `data` map. Never resolved to a value by the reconciler
/// itself — the Deployment builder wires the reference through as a
/// `secretKeyRef`, so the value is never inlined into the Deployment
/// spec.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceQuantities>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceQuantities>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ResourceQuantities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct AgentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<AgentPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_status: Option<ReplicaStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum AgentPhase {
    Pending,
    Running,
    Failed,
    Succeeded,
}

impl AgentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentPhase::Pending => "Pending",
            AgentPhase::Running => "Running",
            AgentPhase::Failed => "Failed",
            AgentPhase::Succeeded => "Succeeded",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct ReplicaStatus {
    pub desired: i32,
    pub ready: i32,
    pub available: i32,
}

pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_DEGRADED: &str = "Degraded";

impl AgentSpec {
    /// Replicas with the admission default applied, for code paths that
    /// run against a spec that may not have gone through the validator
    /// (defense in depth, spec §4.3 step 5).
    pub fn replicas_or_default(&self) -> i32 {
        self.replicas.unwrap_or(1)
    }

    pub fn service_type_or_default(&self) -> ServiceType {
        self.service_type.unwrap_or_default()
    }
}

/// Prints the generated CRD manifest with schemars `format` annotations
/// stripped, since some API servers/OLM bundlers choke on them.
pub fn print_crd_without_formats() -> anyhow::Result<()> {
    let crd = Agent::crd();
    let mut v = serde_json::to_value(&crd)?;
    strip_format_keys(&mut v);
    println!("{}", serde_yaml::to_string(&v)?);
    Ok(())
}

fn strip_format_keys(v: &mut serde_json::Value) {
    use serde_json::Value::*;
    match v {
        Object(map) => {
            map.remove("format");
            for val in map.values_mut() {
                strip_format_keys(val);
            }
        }
        Array(arr) => {
            for val in arr {
                strip_format_keys(val);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replicas_or_default_falls_back_to_one() {
        let spec = AgentSpec {
            replicas: None,
            ..minimal_spec()
        };
        assert_eq!(spec.replicas_or_default(), 1);
    }

    #[test]
    fn service_type_or_default_falls_back_to_cluster_ip() {
        let spec = AgentSpec {
            service_type: None,
            ..minimal_spec()
        };
        assert_eq!(spec.service_type_or_default(), ServiceType::ClusterIP);
    }

    fn minimal_spec() -> AgentSpec {
        AgentSpec {
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
            replicas: None,
            resources: None,
            service_type: None,
            image: None,
        }
    }
}
