//! Network-Aware Scheduler - secondary scheduler for network-sensitive pods
//!
//! Places pods that set `schedulerName: network-aware-scheduler`, filtering
//! nodes by declared network requirements and ranking them by the measured
//! NetworkTopology (or node labels when it is unavailable).

use anyhow::{Context, Result};
use kube::Client;
use meshsched_lib::{
    controller::KubeNodeSource,
    health::{components, HealthRegistry},
    observability::{SchedulerMetrics, StructuredLogger},
    scheduler::{default_framework, KubeBinder, KubePodSource, NetworkAwarePlugin, SchedulingLoopBuilder},
    server::{self, AppState},
    topology::KubeTopologyStore,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const SCHEDULER_VERSION: &str = env!("CARGO_PKG_VERSION");
const COMPONENT: &str = "network-aware-scheduler";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = config::SchedulerConfig::load()?;
    info!(
        scheduler = %config.scheduler_name,
        topology = %config.topology_name,
        max_topology_age_secs = config.max_topology_age_secs,
        "Scheduler configured"
    );

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let health_registry = HealthRegistry::new();
    health_registry.register(components::TOPOLOGY_READER).await;
    health_registry.register(components::BINDER).await;

    // Register metrics before the first scrape
    let _metrics = SchedulerMetrics::new();

    let logger = StructuredLogger::new(&config.scheduler_name);
    logger.log_startup(COMPONENT, SCHEDULER_VERSION);

    let plugin = Arc::new(
        NetworkAwarePlugin::new(Arc::new(KubeTopologyStore::new(client.clone())))
            .with_topology_name(config.topology_name.clone())
            .with_read_timeout(config.topology_read_timeout())
            .with_max_age(config.max_topology_age())
            .with_health_registry(health_registry.clone()),
    );

    let scheduling_loop = SchedulingLoopBuilder::new()
        .pod_source(Arc::new(KubePodSource::new(client.clone())))
        .node_source(Arc::new(KubeNodeSource::new(client.clone())))
        .binder(Arc::new(KubeBinder::new(client, &config.scheduler_name)))
        .framework(default_framework(plugin))
        .scheduler_name(config.scheduler_name.clone())
        .poll_interval(config.poll_interval())
        .retry_backoff(config.retry_backoff())
        .health_registry(health_registry.clone())
        .build()?;

    let (shutdown_tx, _) = broadcast::channel(1);

    let app_state = Arc::new(AppState::new(health_registry.clone(), COMPONENT));
    let api_handle = tokio::spawn(server::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    let loop_handle = tokio::spawn(scheduling_loop.run(shutdown_tx.subscribe()));

    health_registry.set_ready(true).await;

    let reason = shutdown_signal().await;
    logger.log_shutdown(COMPONENT, reason);
    let _ = shutdown_tx.send(());

    if let Err(e) = loop_handle.await {
        error!(error = %e, "Scheduling task failed");
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
