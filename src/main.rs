mod builders;
mod config;
mod controller;
mod crd;
mod error;
mod finalizer;
mod leader;
mod metrics;
mod status;
mod validation;
mod webhook;

use clap::{Parser, Subcommand};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::OperatorConfig;
use crate::crd::print_crd_without_formats;
use crate::metrics::ControllerMetrics;

#[derive(Parser)]
#[command(author, version, about = "Kubernetes operator for Agent workloads", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the leader-elected reconciler, plus its metrics, health and
    /// webhook servers. The default when no subcommand is given.
    Controller,
    /// Run the admission webhook server in isolation.
    Webhook,
    /// Print the generated CustomResourceDefinition manifest to stdout.
    PrintCrd,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(config::log_level())
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Controller) {
        Command::PrintCrd => print_crd_without_formats(),
        Command::Webhook => run_webhook_only().await,
        Command::Controller => run_controller().await,
    }
}

async fn run_controller() -> anyhow::Result<()> {
    let config = OperatorConfig::from_env();
    let client = Client::try_default().await?;
    let metrics = ControllerMetrics::new();

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown_signal.cancel();
    });

    info!(holder_id = %config.holder_id, namespace = %config.namespace, "agent-operator starting");

    tokio::join!(
        leader::run(client, config.clone(), metrics.clone(), shutdown.clone()),
        metrics::run_metrics_server(config.metrics_addr, metrics, shutdown.clone()),
        metrics::run_health_server(config.health_addr, shutdown.clone()),
        webhook::run(config.clone(), shutdown.clone()),
        wait_and_log(shutdown),
    );

    Ok(())
}

async fn run_webhook_only() -> anyhow::Result<()> {
    let config = OperatorConfig::from_env();

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown_signal.cancel();
    });

    webhook::run(config, shutdown).await;
    Ok(())
}

async fn wait_and_log(shutdown: CancellationToken) {
    shutdown.cancelled().await;
    info!("shutdown signal received, draining in-flight work");
}

async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tokio::select! {
        _ = sigterm.recv() => {},
        _ = &mut ctrl_c => {},
    }
}
