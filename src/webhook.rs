//! Admission webhook server: a `/validate` and a `/mutate` HTTPS path,
//! following the `warp` + `kube::core::admission` pattern in
//! `other_examples/daaa0434_jyasuu-kubernetes-resource-app__src-main.rs.rs`.
//! Both reuse [`validate_and_default`] so the webhook and the
//! reconciler's defense-in-depth check (spec §4.3 step 5) can never
//! disagree about what's valid.

use json_patch::{AddOperation, Patch as JsonPatch, PatchOperation};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warp::{Filter, Rejection, Reply};

use crate::config::OperatorConfig;
use crate::crd::Agent;
use crate::validation::validate_and_default;

pub async fn validate(body: AdmissionReview<Agent>) -> Result<impl Reply, Rejection> {
    let req: AdmissionRequest<Agent> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            warn!(error = %e, "malformed admission request");
            return Ok(warp::reply::json(
                &AdmissionResponse::invalid(format!("malformed admission request: {e}")).into_review(),
            ));
        }
    };

    let agent = match &req.object {
        Some(agent) => agent,
        None => {
            return Ok(warp::reply::json(
                &AdmissionResponse::invalid("admission request carried no object").into_review(),
            ));
        }
    };

    let mut spec = agent.spec.clone();
    match validate_and_default(&mut spec) {
        Ok(()) => Ok(warp::reply::json(&AdmissionResponse::from(&req).into_review())),
        Err(e) => {
            info!(agent = %agent.metadata.name.clone().unwrap_or_default(), error = %e, "rejected by admission validator");
            Ok(warp::reply::json(&AdmissionResponse::invalid(e.to_string()).into_review()))
        }
    }
}

/// Applies the same defaulting as [`validate_and_default`] as a JSON
/// patch, so `kubectl get` shows the defaulted spec immediately instead
/// of waiting for the reconciler's first pass (spec §4.3 step 5).
pub async fn mutate(body: AdmissionReview<Agent>) -> Result<impl Reply, Rejection> {
    let req: AdmissionRequest<Agent> = match body.try_into() {
        Ok(req) => req,
        Err(e) => {
            return Ok(warp::reply::json(
                &AdmissionResponse::invalid(format!("malformed admission request: {e}")).into_review(),
            ));
        }
    };

    let agent = match &req.object {
        Some(agent) => agent,
        None => {
            return Ok(warp::reply::json(
                &AdmissionResponse::invalid("admission request carried no object").into_review(),
            ));
        }
    };

    let mut defaulted = agent.spec.clone();
    if let Err(e) = validate_and_default(&mut defaulted) {
        return Ok(warp::reply::json(&AdmissionResponse::invalid(e.to_string()).into_review()));
    }

    let mut patches = Vec::new();
    if agent.spec.replicas != defaulted.replicas {
        patches.push(PatchOperation::Add(AddOperation {
            path: "/spec/replicas".parse().unwrap(),
            value: serde_json::json!(defaulted.replicas),
        }));
    }
    if agent.spec.service_type != defaulted.service_type {
        patches.push(PatchOperation::Add(AddOperation {
            path: "/spec/serviceType".parse().unwrap(),
            value: serde_json::json!(defaulted.service_type),
        }));
    }

    let mut response = AdmissionResponse::from(&req);
    if !patches.is_empty() {
        response = response
            .with_patch(JsonPatch(patches))
            .expect("patch paths are well-formed constants");
    }
    Ok(warp::reply::json(&response.into_review()))
}

/// Serves `/validate` and `/mutate` over TLS on `config.webhook_addr`
/// until `shutdown` is cancelled.
pub async fn run(config: OperatorConfig, shutdown: CancellationToken) {
    let validate_route = warp::post()
        .and(warp::path("validate"))
        .and(warp::body::json())
        .and_then(validate);

    let mutate_route = warp::post()
        .and(warp::path("mutate"))
        .and(warp::body::json())
        .and_then(mutate);

    let routes = validate_route.or(mutate_route);

    info!(addr = %config.webhook_addr, "starting admission webhook server");
    let serve = warp::serve(routes)
        .tls()
        .cert_path(&config.webhook_tls_cert_path)
        .key_path(&config.webhook_tls_key_path)
        .run(config.webhook_addr);

    tokio::select! {
        _ = serve => {}
        _ = shutdown.cancelled() => {
            info!("admission webhook server shutting down");
        }
    }
}
