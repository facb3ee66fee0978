//! Topology reconciliation loop
//!
//! Runs one reconciliation immediately, then one per tick until shutdown.
//! Reconciliations never overlap: the loop awaits each one inline and skips
//! ticks that fire while it is busy.

use super::{
    build_topology, measure_latency, measure_throughput, AddressTable, LatencyProbe,
    MeshStatusSource, NodeSource, PairMeasurement, ThroughputBenchmark,
};
use crate::health::{components, HealthRegistry};
use crate::models::node_name;
use crate::observability::{ControllerMetrics, StructuredLogger};
use crate::topology::{upsert, TopologyError, TopologyStore, UpsertOutcome, DEFAULT_TOPOLOGY_NAME};
use anyhow::{Context, Result};
use chrono::Utc;
use k8s_openapi::api::core::v1::Node;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the reconciliation loop
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Name of the topology resource to maintain
    pub topology_name: String,
    /// Time between reconciliations (default: 60 seconds)
    pub interval: Duration,
    /// Attempts per probe before a pair is recorded as unmeasured
    pub probe_attempts: u32,
    /// Node pairs probed at the same time
    pub max_concurrent_probes: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            topology_name: DEFAULT_TOPOLOGY_NAME.to_string(),
            interval: Duration::from_secs(60),
            probe_attempts: 3,
            max_concurrent_probes: 8,
        }
    }
}

/// Summary of one successful reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub node_count: u32,
    pub measurement_count: u32,
    pub unmeasured_pairs: u32,
    pub health_score: f64,
    pub outcome: UpsertOutcome,
}

/// Measures the cluster network and keeps the topology resource current
pub struct NetworkController {
    nodes: Arc<dyn NodeSource>,
    mesh: Arc<dyn MeshStatusSource>,
    latency: Arc<dyn LatencyProbe>,
    throughput: Arc<dyn ThroughputBenchmark>,
    store: Arc<dyn TopologyStore>,
    config: ControllerConfig,
    health: HealthRegistry,
    metrics: ControllerMetrics,
    logger: StructuredLogger,
}

impl NetworkController {
    /// Start the loop; returns once `shutdown` fires
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            topology = %self.config.topology_name,
            interval_secs = self.config.interval.as_secs(),
            "Starting network controller"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        result = self.reconcile_once() => self.record(result).await,
                        _ = shutdown.recv() => {
                            info!("Shutdown during reconciliation, discarding in-flight measurements");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down network controller");
                    break;
                }
            }
        }
    }

    /// Run a single measure-and-publish cycle
    pub async fn reconcile_once(&self) -> Result<CycleReport> {
        let start = Instant::now();

        let nodes = self
            .nodes
            .list_nodes()
            .await
            .context("Failed to list cluster nodes")?;

        let table = self.refresh_address_table().await;
        let (measurements, unmeasured_pairs) = self.measure_all(&nodes, &table).await;

        let spec = build_topology(&nodes, &measurements, Utc::now());
        let report_counts = (spec.node_count, spec.measurement_count, spec.health_score);

        let outcome = upsert(self.store.as_ref(), &self.config.topology_name, spec).await?;

        self.metrics
            .observe_reconcile_duration(start.elapsed().as_secs_f64());

        Ok(CycleReport {
            node_count: report_counts.0,
            measurement_count: report_counts.1,
            unmeasured_pairs,
            health_score: report_counts.2,
            outcome,
        })
    }

    /// Rebuild the overlay address table; failures leave it empty so every
    /// node falls back to its InternalIP
    async fn refresh_address_table(&self) -> AddressTable {
        match self.mesh.peers().await {
            Ok(peers) => {
                self.health.set_healthy(components::MESH).await;
                AddressTable::from_peers(&peers)
            }
            Err(e) => {
                warn!(error = %e, "Failed to read mesh status, using node addresses");
                self.health
                    .set_degraded(components::MESH, format!("mesh status unavailable: {e}"))
                    .await;
                AddressTable::default()
            }
        }
    }

    /// Probe every ordered pair of distinct nodes with bounded concurrency.
    ///
    /// Returns the successful measurements sorted by (source, target) and the
    /// number of pairs that stayed unmeasured.
    async fn measure_all(
        &self,
        nodes: &[Node],
        table: &AddressTable,
    ) -> (Vec<PairMeasurement>, u32) {
        let names: Vec<&str> = nodes
            .iter()
            .map(node_name)
            .filter(|n| !n.is_empty())
            .collect();

        let targets: Vec<(&str, Option<IpAddr>)> = nodes
            .iter()
            .filter(|n| !node_name(n).is_empty())
            .map(|n| (node_name(n), table.resolve(n)))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_probes.max(1)));
        let attempts = self.config.probe_attempts;
        let mut tasks = JoinSet::new();
        let mut unmeasured = 0u32;

        for source in &names {
            for (target, addr) in &targets {
                if source == target {
                    continue;
                }
                let Some(addr) = *addr else {
                    debug!(source = %source, target = %target, "No address for target node, skipping pair");
                    continue;
                };

                let semaphore = semaphore.clone();
                let latency = self.latency.clone();
                let throughput = self.throughput.clone();
                let source = source.to_string();
                let target = target.to_string();

                tasks.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok()?;

                    let Some(avg) = measure_latency(latency.as_ref(), addr, attempts).await else {
                        debug!(source = %source, target = %target, "Pair unmeasured after retries");
                        return None;
                    };
                    let mbps = measure_throughput(throughput.as_ref(), addr, attempts).await;

                    let m = PairMeasurement::new(source, target, avg, mbps);
                    debug!(
                        source = %m.source,
                        target = %m.target,
                        latency_ms = m.latency_ms,
                        bandwidth_mbps = m.bandwidth_mbps,
                        cost = m.cost,
                        "Measured network characteristics"
                    );
                    Some(m)
                });
            }
        }

        let mut measurements = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(m)) => measurements.push(m),
                Ok(None) => unmeasured += 1,
                Err(e) => {
                    warn!(error = %e, "Probe task failed");
                    unmeasured += 1;
                }
            }
        }

        if unmeasured > 0 {
            self.metrics.inc_probe_failures(unmeasured as u64);
        }

        measurements.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        (measurements, unmeasured)
    }

    async fn record(&self, result: Result<CycleReport>) {
        match result {
            Ok(report) => {
                self.metrics.set_topology(
                    report.node_count as i64,
                    report.measurement_count as i64,
                    report.health_score,
                );
                self.health.set_healthy(components::RECONCILER).await;
                self.logger.log_reconcile(
                    &self.config.topology_name,
                    report.node_count,
                    report.measurement_count,
                    report.unmeasured_pairs,
                    report.health_score,
                );
            }
            Err(e) => {
                self.metrics.inc_reconcile_errors();
                let conflict = e
                    .downcast_ref::<TopologyError>()
                    .map(TopologyError::is_conflict)
                    .unwrap_or(false);

                if conflict {
                    warn!(
                        topology = %self.config.topology_name,
                        "Topology modified concurrently, retrying on next tick"
                    );
                } else {
                    warn!(error = %e, "Failed to reconcile network topology, retrying on next tick");
                }
                self.health
                    .set_degraded(components::RECONCILER, e.to_string())
                    .await;
            }
        }
    }
}

/// Builder for creating the network controller
pub struct NetworkControllerBuilder {
    nodes: Option<Arc<dyn NodeSource>>,
    mesh: Option<Arc<dyn MeshStatusSource>>,
    latency: Option<Arc<dyn LatencyProbe>>,
    throughput: Option<Arc<dyn ThroughputBenchmark>>,
    store: Option<Arc<dyn TopologyStore>>,
    config: ControllerConfig,
    health: Option<HealthRegistry>,
    node_name: String,
}

impl NetworkControllerBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            nodes: None,
            mesh: None,
            latency: None,
            throughput: None,
            store: None,
            config: ControllerConfig::default(),
            health: None,
            node_name: "unknown".to_string(),
        }
    }

    pub fn node_source(mut self, nodes: Arc<dyn NodeSource>) -> Self {
        self.nodes = Some(nodes);
        self
    }

    pub fn mesh_status(mut self, mesh: Arc<dyn MeshStatusSource>) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn latency_probe(mut self, probe: Arc<dyn LatencyProbe>) -> Self {
        self.latency = Some(probe);
        self
    }

    pub fn throughput_benchmark(mut self, bench: Arc<dyn ThroughputBenchmark>) -> Self {
        self.throughput = Some(bench);
        self
    }

    pub fn topology_store(mut self, store: Arc<dyn TopologyStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn topology_name(mut self, name: impl Into<String>) -> Self {
        self.config.topology_name = name.into();
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn probe_attempts(mut self, attempts: u32) -> Self {
        self.config.probe_attempts = attempts;
        self
    }

    pub fn max_concurrent_probes(mut self, limit: usize) -> Self {
        self.config.max_concurrent_probes = limit;
        self
    }

    pub fn health_registry(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Node the controller runs on, used in structured events
    pub fn node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = name.into();
        self
    }

    pub fn build(self) -> Result<NetworkController> {
        let nodes = self
            .nodes
            .ok_or_else(|| anyhow::anyhow!("Node source is required"))?;
        let mesh = self
            .mesh
            .ok_or_else(|| anyhow::anyhow!("Mesh status source is required"))?;
        let latency = self
            .latency
            .ok_or_else(|| anyhow::anyhow!("Latency probe is required"))?;
        let throughput = self
            .throughput
            .ok_or_else(|| anyhow::anyhow!("Throughput benchmark is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Topology store is required"))?;

        if self.config.interval.is_zero() {
            anyhow::bail!("Reconcile interval must be non-zero");
        }

        Ok(NetworkController {
            nodes,
            mesh,
            latency,
            throughput,
            store,
            config: self.config,
            health: self.health.unwrap_or_default(),
            metrics: ControllerMetrics::new(),
            logger: StructuredLogger::new(self.node_name),
        })
    }
}

impl Default for NetworkControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
