use std::net::SocketAddr;

/// Operator-level configuration, read once at process startup from the
/// environment (spec §6 "Process configuration"). Threaded into the
/// builders and into the leader-election/metrics/webhook servers.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Default agent container image, used when `Agent.spec.image` is
    /// unset. Falls back to `DEFAULT_AGENT_IMAGE` when the environment
    /// variable itself is unset.
    pub default_image: String,
    /// Namespace the operator itself (and its leader-election Lease)
    /// runs in.
    pub namespace: String,
    pub metrics_addr: SocketAddr,
    pub health_addr: SocketAddr,
    pub webhook_addr: SocketAddr,
    /// TLS certificate/key serving the admission webhook, typically
    /// injected by cert-manager alongside the `MutatingWebhookConfiguration`.
    pub webhook_tls_cert_path: String,
    pub webhook_tls_key_path: String,
    /// Unique identity for this replica's leader-election bid.
    pub holder_id: String,
}

/// Compiled-in fallback when neither the spec nor the operator
/// configuration name an image (spec §3.1's image resolution order).
pub const DEFAULT_AGENT_IMAGE: &str = "ghcr.io/kubeagentic/agent-runtime:latest";

impl OperatorConfig {
    pub fn from_env() -> Self {
        OperatorConfig {
            default_image: std::env::var("AGENT_OPERATOR_DEFAULT_IMAGE")
                .unwrap_or_else(|_| DEFAULT_AGENT_IMAGE.to_string()),
            namespace: std::env::var("AGENT_OPERATOR_NAMESPACE")
                .unwrap_or_else(|_| "default".to_string()),
            metrics_addr: parse_addr("AGENT_OPERATOR_METRICS_ADDR", "0.0.0.0:8081"),
            health_addr: parse_addr("AGENT_OPERATOR_HEALTH_ADDR", "0.0.0.0:8082"),
            webhook_addr: parse_addr("AGENT_OPERATOR_WEBHOOK_ADDR", "0.0.0.0:8443"),
            webhook_tls_cert_path: std::env::var("AGENT_OPERATOR_TLS_CERT_PATH")
                .unwrap_or_else(|_| "/etc/agent-operator/tls/tls.crt".to_string()),
            webhook_tls_key_path: std::env::var("AGENT_OPERATOR_TLS_KEY_PATH")
                .unwrap_or_else(|_| "/etc/agent-operator/tls/tls.key".to_string()),
            holder_id: std::env::var("POD_NAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .unwrap_or_else(|_| format!("agent-operator-{}", uuid::Uuid::new_v4())),
        }
    }

    /// Resolves the image to run the agent container with, per the
    /// order in spec §3.1: spec-provided image, then operator default,
    /// then the compiled-in fallback.
    pub fn resolve_image(&self, spec_image: Option<&str>) -> String {
        spec_image
            .map(str::to_string)
            .unwrap_or_else(|| self.default_image.clone())
    }
}

fn parse_addr(var: &str, default: &str) -> SocketAddr {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| default.parse().expect("valid default socket address"))
}

/// Default log level, read separately since it's consumed before
/// `OperatorConfig` itself is constructed (the tracing subscriber is
/// installed first thing in `main`).
pub fn log_level() -> String {
    std::env::var("AGENT_OPERATOR_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_image_prefers_spec() {
        let cfg = OperatorConfig {
            default_image: "operator-default:latest".into(),
            namespace: "default".into(),
            metrics_addr: "0.0.0.0:8081".parse().unwrap(),
            health_addr: "0.0.0.0:8082".parse().unwrap(),
            webhook_addr: "0.0.0.0:8443".parse().unwrap(),
            webhook_tls_cert_path: "/tmp/tls.crt".into(),
            webhook_tls_key_path: "/tmp/tls.key".into(),
            holder_id: "test".into(),
        };
        assert_eq!(cfg.resolve_image(Some("spec-image:v1")), "spec-image:v1");
        assert_eq!(cfg.resolve_image(None), "operator-default:latest");
    }
}
