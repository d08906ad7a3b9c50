//! Leader-election gate around the controller, following the
//! lease-lock loop in
//! `eosin-platform-eosin/storage-operator/src/clusters/reconcile.rs`.
//! Only the replica holding the Lease runs the `Controller`; the rest
//! stand by and keep bidding for it.

use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams, LeaseLockResult};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::OperatorConfig;
use crate::controller;
use crate::metrics::ControllerMetrics;

const LEASE_NAME: &str = "agent-operator-lock";
const LEASE_TTL: Duration = Duration::from_secs(15);
const RENEW_EVERY: Duration = Duration::from_secs(5);

/// Runs the leader-election loop until `shutdown` is cancelled. While
/// this replica holds the lease, the `Agent` controller runs as a
/// spawned task; on leadership loss (or an apiserver error that makes
/// leadership unverifiable) the task is aborted.
pub async fn run(client: Client, config: OperatorConfig, metrics: ControllerMetrics, shutdown: CancellationToken) {
    let lock = LeaseLock::new(
        client.clone(),
        &config.namespace,
        LeaseLockParams {
            holder_id: config.holder_id.clone(),
            lease_name: LEASE_NAME.to_string(),
            lease_ttl: LEASE_TTL,
        },
    );

    let mut controller_task: Option<JoinHandle<()>> = None;
    let mut tick = tokio::time::interval(RENEW_EVERY);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                if let Some(task) = controller_task.take() {
                    task.abort();
                    let _ = task.await;
                }
                info!("leader-election loop shut down");
                return;
            }
            _ = tick.tick() => {}
        }

        let lease = match lock.try_acquire_or_renew().await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(error = %e, "leader election renew/acquire failed, standing down");
                if let Some(task) = controller_task.take() {
                    task.abort();
                }
                continue;
            }
        };

        match lease {
            LeaseLockResult::Acquired(_) => {
                if controller_task.is_none() {
                    info!(holder = %config.holder_id, "acquired leadership, starting controller");
                    let client = client.clone();
                    let config = config.clone();
                    let metrics = metrics.clone();
                    controller_task = Some(tokio::spawn(async move {
                        controller::run(client, config, metrics).await;
                    }));
                }
            }
            LeaseLockResult::NotAcquired => {
                if let Some(task) = controller_task.take() {
                    info!("lost leadership, stopping controller");
                    task.abort();
                    let _ = task.await;
                }
            }
        }

        if let Some(task) = &controller_task {
            if task.is_finished() {
                error!("controller task exited unexpectedly, will re-acquire next tick");
                controller_task = None;
            }
        }
    }
}
