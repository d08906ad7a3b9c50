//! Admission validation and defaulting for `AgentSpec` (spec §4.1).
//!
//! Run twice in the system: synchronously at admission time by
//! [`crate::webhook`], and again at the top of every reconciliation
//! pass as defense in depth (spec §4.3 step 5) in case the webhook is
//! disabled or bypassed.

use crate::crd::{AgentSpec, Framework, ServiceType};
use crate::error::Error;

const MIN_REPLICAS: i32 = 1;
const MAX_REPLICAS: i32 = 10;

/// Validates `spec` and applies defaults in place. Defaulting never
/// overwrites a user-supplied value, and re-running this function
/// against its own output is a no-op (spec §4.1's idempotence
/// requirement) because every default is only applied when the field
/// is `None`.
pub fn validate_and_default(spec: &mut AgentSpec) -> Result<(), Error> {
    if spec.model.trim().is_empty() {
        return Err(Error::Validation("spec.model must not be empty".into()));
    }
    if spec.system_prompt.trim().is_empty() {
        return Err(Error::Validation(
            "spec.systemPrompt must not be empty".into(),
        ));
    }
    if spec.api_secret_ref.name.trim().is_empty() {
        return Err(Error::Validation(
            "spec.apiSecretRef.name must not be empty".into(),
        ));
    }
    if spec.api_secret_ref.key.trim().is_empty() {
        return Err(Error::Validation(
            "spec.apiSecretRef.key must not be empty".into(),
        ));
    }

    if spec.framework == Framework::Langgraph && spec.langgraph_config.is_none() {
        return Err(Error::Validation(
            "spec.langgraphConfig is required when spec.framework is \"langgraph\"".into(),
        ));
    }

    let replicas = spec.replicas.unwrap_or(MIN_REPLICAS);
    if !(MIN_REPLICAS..=MAX_REPLICAS).contains(&replicas) {
        return Err(Error::Validation(format!(
            "spec.replicas must be between {MIN_REPLICAS} and {MAX_REPLICAS}, got {replicas}"
        )));
    }
    spec.replicas = Some(replicas);

    // `provider` and `service_type` are closed Rust enums deserialized
    // directly from the wire representation, so an out-of-enumeration
    // value is already rejected by serde before this function runs;
    // defaulting service_type covers only the "field absent" case.
    spec.service_type = Some(spec.service_type.unwrap_or(ServiceType::ClusterIP));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Provider, SecretKeyRef};

    fn base() -> AgentSpec {
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

    #[test]
    fn defaults_round_trip() {
        let mut spec = base();
        validate_and_default(&mut spec).unwrap();
        assert_eq!(spec.framework, Framework::Direct);
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(spec.service_type, Some(ServiceType::ClusterIP));

        // Re-validating an already-defaulted spec is a no-op.
        let mut twice = spec.clone();
        validate_and_default(&mut twice).unwrap();
        assert_eq!(spec, twice);
    }

    #[test]
    fn defaulting_never_overwrites_user_value() {
        let mut spec = base();
        spec.replicas = Some(5);
        spec.service_type = Some(ServiceType::NodePort);
        validate_and_default(&mut spec).unwrap();
        assert_eq!(spec.replicas, Some(5));
        assert_eq!(spec.service_type, Some(ServiceType::NodePort));
    }

    #[test]
    fn rejects_empty_model() {
        let mut spec = base();
        spec.model = "".into();
        assert!(validate_and_default(&mut spec).is_err());
    }

    #[test]
    fn rejects_empty_system_prompt() {
        let mut spec = base();
        spec.system_prompt = "   ".into();
        assert!(validate_and_default(&mut spec).is_err());
    }

    #[test]
    fn rejects_empty_secret_ref_fields() {
        let mut spec = base();
        spec.api_secret_ref.name = "".into();
        assert!(validate_and_default(&mut spec).is_err());

        let mut spec = base();
        spec.api_secret_ref.key = "".into();
        assert!(validate_and_default(&mut spec).is_err());
    }

    #[test]
    fn langgraph_requires_config() {
        let mut spec = base();
        spec.framework = Framework::Langgraph;
        assert!(validate_and_default(&mut spec).is_err());

        spec.langgraph_config = Some(serde_json::json!({"nodes": []}));
        assert!(validate_and_default(&mut spec).is_ok());
    }

    #[test]
    fn replica_boundary() {
        let mut spec = base();
        spec.replicas = Some(1);
        assert!(validate_and_default(&mut spec).is_ok());

        let mut spec = base();
        spec.replicas = Some(10);
        assert!(validate_and_default(&mut spec).is_ok());

        let mut spec = base();
        spec.replicas = Some(0);
        assert!(validate_and_default(&mut spec).is_err());

        let mut spec = base();
        spec.replicas = Some(11);
        assert!(validate_and_default(&mut spec).is_err());
    }
}
