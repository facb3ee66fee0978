//! Network Controller - inter-node network measurement
//!
//! Runs as a single-replica Deployment, probing every node pair over the
//! mesh overlay and publishing the cluster's NetworkTopology resource.

use anyhow::{Context, Result};
use kube::Client;
use meshsched_lib::{
    controller::{
        Iperf3Benchmark, KubeNodeSource, NetworkControllerBuilder, PingProbe,
        TailscaleStatusSource,
    },
    health::{components, HealthRegistry},
    observability::{ControllerMetrics, StructuredLogger},
    server::{self, AppState},
    topology::KubeTopologyStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");
const COMPONENT: &str = "network-controller";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = config::ControllerConfig::load()?;
    info!(
        node_name = %config.node_name,
        topology = %config.topology_name,
        interval_secs = config.update_interval_secs,
        "Controller configured"
    );

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let health_registry = HealthRegistry::new();
    health_registry.register(components::RECONCILER).await;
    health_registry.register(components::MESH).await;

    // Register metrics before the first scrape
    let _metrics = ControllerMetrics::new();

    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(COMPONENT, CONTROLLER_VERSION);

    let throughput = Iperf3Benchmark::discover(config.benchmark_duration());
    let controller = NetworkControllerBuilder::new()
        .node_source(Arc::new(KubeNodeSource::new(client.clone())))
        .mesh_status(Arc::new(TailscaleStatusSource::new(
            config.mesh_status_command.clone(),
            Duration::from_secs(10),
        )))
        .latency_probe(Arc::new(PingProbe::new(config.ping_count, config.probe_timeout())))
        .throughput_benchmark(Arc::new(throughput))
        .topology_store(Arc::new(KubeTopologyStore::new(client)))
        .topology_name(config.topology_name.clone())
        .interval(config.update_interval())
        .probe_attempts(config.probe_attempts)
        .max_concurrent_probes(config.max_concurrent_probes)
        .health_registry(health_registry.clone())
        .node_name(config.node_name.clone())
        .build()?;

    let (shutdown_tx, _) = broadcast::channel(1);

    let app_state = Arc::new(AppState::new(health_registry.clone(), COMPONENT));
    let api_handle = tokio::spawn(server::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    let controller_handle = tokio::spawn(controller.run(shutdown_tx.subscribe()));

    health_registry.set_ready(true).await;

    let reason = shutdown_signal().await;
    logger.log_shutdown(COMPONENT, reason);
    let _ = shutdown_tx.send(());

    if let Err(e) = controller_handle.await {
        error!(error = %e, "Controller task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => "SIGINT received",
                    _ = term.recv() => "SIGTERM received",
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT received"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT received"
    }
}
