use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Patch, PatchParams};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{error, info, instrument, warn};

use crate::builders::{configmap, deployment, hpa, ingress, service};
use crate::config::OperatorConfig;
use crate::crd::{Agent, AgentPhase, AgentSpec, AgentStatus, ServiceType};
use crate::error::Error;
use crate::finalizer;
use crate::metrics::ControllerMetrics;
use crate::status;
use crate::validation::validate_and_default;

/// Grace interval before re-checking a resource whose spec failed
/// validation or whose credential precondition isn't met (spec §4.3
/// steps 5-6). Not an error-queue backoff: these conditions aren't
/// transient, so we don't want the queue's exponential retry on them.
const VALIDATION_GRACE_INTERVAL: Duration = Duration::from_secs(120);

/// Periodic resync so status drift is noticed even without events
/// (spec §4.3 step 10).
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

const FIELD_MANAGER: &str = "agent-operator";

pub struct Context {
    pub client: Client,
    pub config: OperatorConfig,
    pub metrics: ControllerMetrics,
}

/// Entrypoint for the `Agent` controller. Watches `Agent` plus every
/// owned child kind (spec §4.5), mapping child events back to their
/// owner via `.owns(...)`.
pub async fn run(client: Client, config: OperatorConfig, metrics: ControllerMetrics) {
    let agents: Api<Agent> = Api::all(client.clone());
    let context = Arc::new(Context {
        client: client.clone(),
        config,
        metrics,
    });

    info!("starting Agent controller");
    Controller::new(agents, WatcherConfig::default())
        .owns(Api::<Deployment>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<Service>::all(client.clone()), WatcherConfig::default())
        .owns(Api::<ConfigMap>::all(client.clone()), WatcherConfig::default())
        .owns(
            Api::<HorizontalPodAutoscaler>::all(client.clone()),
            WatcherConfig::default(),
        )
        .owns(Api::<Ingress>::all(client), WatcherConfig::default())
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((object_ref, _action)) => info!(agent = %object_ref.name, "reconciled"),
                Err(err) => error!(error = %err, "reconcile failed"),
            }
        })
        .await;
}

#[instrument(skip_all, fields(agent.name = %agent.name_any(), agent.namespace = agent.namespace().unwrap_or_default()))]
async fn reconcile(agent: Arc<Agent>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = agent.namespace().ok_or(Error::MissingNamespace)?;
    let name = agent.name_any();
    let client = ctx.client.clone();
    let start = std::time::Instant::now();

    ctx.metrics
        .reconcile_counter
        .with_label_values(&[&name, &namespace])
        .inc();

    // Deletion branch. Only cleanup logic runs once the deletion
    // timestamp is set; no new children are created (spec §3.3, §4.3
    // step 3).
    if agent.meta().deletion_timestamp.is_some() {
        let result = handle_deletion(client, &agent, &name, &namespace).await;
        observe(&ctx, &name, &namespace, "Delete", start);
        return result;
    }

    // Finalizer. Added before any children exist, so garbage
    // collection can't outrun us (spec §4.3 step 2, §9).
    if !finalizer::has_finalizer(&agent) {
        finalizer::add(client, &name, &namespace).await?;
        observe(&ctx, &name, &namespace, "AddFinalizer", start);
        return Ok(Action::await_change());
    }

    // Status seed. The first pass after creation writes Pending before
    // anything else happens (spec §4.3 step 4).
    if agent.status.as_ref().and_then(|s| s.phase).is_none() {
        patch_status(client, &name, &namespace, |status| {
            status.phase = Some(AgentPhase::Pending);
            status.message = Some("Agent created, awaiting first reconcile".to_string());
        })
        .await?;
        observe(&ctx, &name, &namespace, "SeedStatus", start);
        return Ok(Action::await_change());
    }

    // Spec validation, defense in depth (spec §4.3 step 5). The
    // admission webhook should already have caught this; re-checking
    // here means a disabled or bypassed webhook can't corrupt cluster
    // state.
    let mut spec = agent.spec.clone();
    if let Err(e) = validate_and_default(&mut spec) {
        warn!(error = %e, "spec validation failed at reconcile time");
        patch_status(client, &name, &namespace, |status| {
            status::set_degraded(status, "InvalidSpec", &e.to_string());
        })
        .await?;
        observe(&ctx, &name, &namespace, "Failed", start);
        return Ok(Action::requeue(VALIDATION_GRACE_INTERVAL));
    }

    // Credential check (spec §4.3 step 6).
    if let Err(e) = check_credential(client.clone(), &namespace, &spec).await {
        warn!(error = %e, "credential precondition unmet");
        patch_status(client, &name, &namespace, |status| {
            status::set_degraded(status, "MissingSecret", &e.to_string());
        })
        .await?;
        observe(&ctx, &name, &namespace, "Failed", start);
        return Ok(Action::requeue(VALIDATION_GRACE_INTERVAL));
    }

    // Child reconciliation, in dependency order: ConfigMap ->
    // Deployment -> Service -> HPA -> Ingress (spec §4.3 step 7).
    let deploy_obj = reconcile_children(client.clone(), &agent, &ctx.config, &spec).await?;

    // Status refresh (spec §4.3 step 9, §4.4).
    let derived = status::derive(spec.replicas_or_default(), deploy_obj.as_ref());
    patch_status(client, &name, &namespace, move |status| {
        status::apply(status, derived);
    })
    .await?;

    observe(&ctx, &name, &namespace, "Reconciled", start);
    Ok(Action::requeue(RESYNC_INTERVAL))
}

async fn handle_deletion(
    client: Client,
    agent: &Agent,
    name: &str,
    namespace: &str,
) -> Result<Action, Error> {
    if !finalizer::has_finalizer(agent) {
        return Ok(Action::await_change());
    }

    info!("tearing down Agent");
    // No external resources to release in the current design (spec
    // §3.4, §9). Owned children are removed by the API server's
    // garbage collector via owner references once the Agent itself is
    // gone, so we don't delete them ourselves here.
    patch_status(client.clone(), name, namespace, |status| {
        status.message = Some("finalizing deletion".to_string());
    })
    .await?;

    finalizer::remove(client, name, namespace).await?;
    Ok(Action::await_change())
}

/// Checks that the referenced secret and key exist (spec §4.3 step 6).
/// Only a 404 on the Secret GET is a terminal precondition failure; any
/// other `kube::Error` (conflict, rate-limit, unavailable, network) is
/// transient and propagates as `Error::Kube` so `error_policy` requeues
/// it with backoff instead of writing `Degraded` status (spec §7).
async fn check_credential(client: Client, namespace: &str, spec: &AgentSpec) -> Result<(), Error> {
    let secrets: Api<Secret> = Api::namespaced(client, namespace);
    let secret = match secrets.get(&spec.api_secret_ref.name).await {
        Ok(secret) => secret,
        Err(kube::Error::Api(e)) if e.code == 404 => {
            return Err(Error::Precondition(format!(
                "secret \"{}\" not found",
                spec.api_secret_ref.name
            )));
        }
        Err(e) => return Err(e.into()),
    };
    let has_key = secret
        .data
        .as_ref()
        .is_some_and(|d| d.contains_key(&spec.api_secret_ref.key));
    if !has_key {
        return Err(Error::Precondition(format!(
            "secret \"{}\" has no key \"{}\"",
            spec.api_secret_ref.name, spec.api_secret_ref.key
        )));
    }
    Ok(())
}

/// Applies every child object in dependency order, then deletes HPA and
/// Ingress when they're no longer desired (spec §4.3 steps 7-8).
/// Returns the observed Deployment so the status engine doesn't need a
/// second round trip to read it.
async fn reconcile_children(
    client: Client,
    agent: &Agent,
    config: &OperatorConfig,
    spec: &AgentSpec,
) -> Result<Option<Deployment>, Error> {
    let namespace = agent.namespace().ok_or(Error::MissingNamespace)?;
    let pp = PatchParams::apply(FIELD_MANAGER).force();

    let cm_api: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);
    let cm = configmap::build(agent);
    cm_api.patch(&cm.name_any(), &pp, &Patch::Apply(&cm)).await?;

    let deploy_api: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    let deploy = deployment::build(agent, config);
    let deploy_obj = deploy_api
        .patch(&deploy.name_any(), &pp, &Patch::Apply(&deploy))
        .await?;

    let svc_api: Api<Service> = Api::namespaced(client.clone(), &namespace);
    let svc = service::build(agent);
    svc_api.patch(&svc.name_any(), &pp, &Patch::Apply(&svc)).await?;

    let hpa_api: Api<HorizontalPodAutoscaler> = Api::namespaced(client.clone(), &namespace);
    let hpa_name = crate::builders::hpa_name(agent);
    if spec.replicas_or_default() > 1 {
        let desired = hpa::build(agent);
        hpa_api.patch(&hpa_name, &pp, &Patch::Apply(&desired)).await?;
    } else {
        delete_if_present(&hpa_api, &hpa_name).await?;
    }

    let ingress_api: Api<Ingress> = Api::namespaced(client, &namespace);
    let ingress_name = crate::builders::ingress_name(agent);
    if spec.service_type_or_default() == ServiceType::LoadBalancer {
        let desired = ingress::build(agent);
        ingress_api
            .patch(&ingress_name, &pp, &Patch::Apply(&desired))
            .await?;
    } else {
        delete_if_present(&ingress_api, &ingress_name).await?;
    }

    Ok(Some(deploy_obj))
}

/// Deletes `name` if present; a 404 counts as success (spec §4.3 step
/// 8's "deletions are idempotent").
async fn delete_if_present<K>(api: &Api<K>, name: &str) -> Result<(), Error>
where
    K: Resource + Clone + std::fmt::Debug + serde::de::DeserializeOwned,
    K::DynamicType: Default,
{
    match api.delete(name, &Default::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Reads the current status, applies `mutate`, and writes it back.
/// `status::upsert_condition`'s merge logic is what keeps repeated
/// passes from drifting `lastTransitionTime`, so this stays a thin
/// read-mutate-write wrapper.
async fn patch_status(
    client: Client,
    name: &str,
    namespace: &str,
    mutate: impl FnOnce(&mut AgentStatus),
) -> Result<(), Error> {
    let api: Api<Agent> = Api::namespaced(client, namespace);
    let current = api.get_status(name).await?;
    let mut status = current.status.clone().unwrap_or_default();
    mutate(&mut status);

    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

fn observe(ctx: &Context, name: &str, namespace: &str, action: &str, start: std::time::Instant) {
    ctx.metrics
        .action_counter
        .with_label_values(&[name, namespace, action])
        .inc();
    ctx.metrics
        .reconcile_histogram
        .with_label_values(&[name, namespace, action])
        .observe(start.elapsed().as_secs_f64());
}

/// Action to take when a reconcile pass returns `Err` — always a
/// transient condition by the time it reaches here (spec §7; terminal
/// conditions are handled inline and never returned as `Err`).
fn error_policy(agent: Arc<Agent>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(agent = %agent.name_any(), error = %error, "reconcile error, requeuing");
    ctx.metrics
        .reconcile_error_counter
        .with_label_values(&[&agent.name_any()])
        .inc();
    Action::requeue(Duration::from_secs(10))
}
