//! Prometheus metrics and a separate health/readiness server, following
//! the `prometheus` + bare `hyper` pattern in
//! `thavlik-vpn-operator/operator/src/metrics.rs`. Kept as an always-on
//! part of the ambient stack rather than feature-gated, since observability
//! here isn't one of the spec's excluded features.

use std::convert::Infallible;
use std::net::SocketAddr;

use const_format::concatcp;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec};
use prometheus::{Encoder, HistogramVec, IntCounterVec, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const METRICS_PREFIX: &str = "agent_operator_";

lazy_static! {
    static ref RECONCILE_TOTAL: IntCounterVec = register_int_counter_vec!(
        concatcp!(METRICS_PREFIX, "reconcile_total"),
        "Number of reconcile passes per Agent",
        &["name", "namespace"]
    )
    .unwrap();
    static ref ACTION_TOTAL: IntCounterVec = register_int_counter_vec!(
        concatcp!(METRICS_PREFIX, "reconcile_action_total"),
        "Number of reconcile passes per Agent, broken down by the action taken",
        &["name", "namespace", "action"]
    )
    .unwrap();
    static ref RECONCILE_ERROR_TOTAL: IntCounterVec = register_int_counter_vec!(
        concatcp!(METRICS_PREFIX, "reconcile_error_total"),
        "Number of reconcile passes that returned an error",
        &["name"]
    )
    .unwrap();
    static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        concatcp!(METRICS_PREFIX, "reconcile_duration_seconds"),
        "Time spent in one reconcile pass",
        &["name", "namespace", "action"]
    )
    .unwrap();
}

/// Handle to the process-wide metrics, cloned into the reconciler's
/// `Context` (spec §3 ambient stack). All four are registered to the
/// global default registry at first access, so `run_metrics_server`
/// only needs `prometheus::gather()`.
#[derive(Clone)]
pub struct ControllerMetrics {
    pub reconcile_counter: IntCounterVec,
    pub action_counter: IntCounterVec,
    pub reconcile_error_counter: IntCounterVec,
    pub reconcile_histogram: HistogramVec,
}

impl ControllerMetrics {
    pub fn new() -> Self {
        ControllerMetrics {
            reconcile_counter: RECONCILE_TOTAL.clone(),
            action_counter: ACTION_TOTAL.clone(),
            reconcile_error_counter: RECONCILE_ERROR_TOTAL.clone(),
            reconcile_histogram: RECONCILE_DURATION.clone(),
        }
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves `/metrics` on `addr` until `shutdown` is cancelled. Runs as
/// its own tokio task, independent from the controller and the health
/// server.
pub async fn run_metrics_server(addr: SocketAddr, metrics: ControllerMetrics, shutdown: CancellationToken) {
    // Force the lazy statics to register before we start answering
    // scrapes, otherwise the first scrape could race an uninitialized
    // metric into existence.
    let _ = &metrics;

    let make_svc =
        make_service_fn(|_conn| async { Ok::<_, Infallible>(service_fn(serve_metrics)) });

    info!(%addr, "starting metrics server");
    let server = Server::bind(&addr).serve(make_svc);
    if let Err(e) = server
        .with_graceful_shutdown(shutdown.cancelled())
        .await
    {
        error!(error = %e, "metrics server exited");
    }
}

async fn serve_metrics(_req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "failed to encode metrics");
        return Ok(Response::builder().status(500).body(Body::empty()).unwrap());
    }
    Ok(Response::builder()
        .header("Content-Type", encoder.format_type())
        .body(Body::from(buffer))
        .unwrap())
}

/// Serves `/healthz` and `/readyz`, both trivial liveness checks — the
/// operator has nothing expensive to probe beyond "the process is
/// running and holds a client" (spec §3 ambient stack). Runs until
/// `shutdown` is cancelled.
pub async fn run_health_server(addr: SocketAddr, shutdown: CancellationToken) {
    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, Infallible>(service_fn(|req: Request<Body>| async move {
            let response = match req.uri().path() {
                "/healthz" | "/readyz" => Response::new(Body::from("ok")),
                _ => Response::builder().status(404).body(Body::empty()).unwrap(),
            };
            Ok::<_, Infallible>(response)
        }))
    });

    info!(%addr, "starting health server");
    let server = Server::bind(&addr).serve(make_svc);
    if let Err(e) = server
        .with_graceful_shutdown(shutdown.cancelled())
        .await
    {
        error!(error = %e, "health server exited");
    }
}
