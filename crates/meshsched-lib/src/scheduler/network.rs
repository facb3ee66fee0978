//! The network-aware filter and score plugin

use super::framework::{CycleState, FilterPlugin, FilterVerdict, ScorePlugin};
use crate::health::{components, HealthRegistry};
use crate::models::{
    labels, node_name, values, DataLocality, InternetAccess, NodeLabels, NodeNetworkProfile,
    WorkloadNetworkRequirement,
};
use crate::observability::SchedulerMetrics;
use crate::topology::{NetworkTopology, TopologyStore, DEFAULT_TOPOLOGY_NAME};
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Node;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const PLUGIN_NAME: &str = "NetworkAware";

/// Assumed bandwidth of a node without a `network-speed` label
pub const DEFAULT_NODE_BANDWIDTH_MBPS: u64 = 10;

const AI_WORKER_BONUS: i64 = 100;
const GPU_BONUS: i64 = 50;
const PUBLIC_GATEWAY_BONUS: i64 = 100;
const REMOTE_WEB_BONUS: i64 = 30;
const DATA_LOCALITY_BONUS: i64 = 75;
const HIGH_LATENCY_PENALTY: i64 = 20;

/// Bandwidth a node offers for filtering, in Mbps
pub fn node_bandwidth(node: &Node) -> u64 {
    NodeLabels::of(node)
        .network_speed_mbps()
        .unwrap_or(DEFAULT_NODE_BANDWIDTH_MBPS)
}

/// Latency a node is assumed to add, in milliseconds
pub fn node_latency(node: &Node) -> u64 {
    let node_labels = NodeLabels::of(node);
    match node_labels.network_latency_class() {
        Some("low") => return 5,
        Some("medium") => return 25,
        Some("high") => return 100,
        _ => {}
    }
    if node_labels.is_remote() {
        45
    } else {
        1
    }
}

/// Check every requirement against the node; the first failure rejects
pub fn filter_node(req: &WorkloadNetworkRequirement, node: &Node) -> FilterVerdict {
    let node_labels = NodeLabels::of(node);

    if let Some(required) = req.min_bandwidth_mbps {
        let available = node_bandwidth(node);
        if available < required {
            return FilterVerdict::Rejected(format!(
                "insufficient bandwidth: required {}mbps, available {}mbps",
                required, available
            ));
        }
    }

    if let Some(required) = req.max_latency_ms {
        let latency = node_latency(node);
        if latency > required {
            return FilterVerdict::Rejected(format!(
                "latency too high: required {}ms, node {}ms",
                required, latency
            ));
        }
    }

    if req.data_locality == DataLocality::High && node_labels.is_remote() {
        return FilterVerdict::Rejected(
            "high data locality required, but node is remote".to_string(),
        );
    }

    if req.internet_access == InternetAccess::Required
        && !node_labels.is(labels::ROLE, values::ROLE_PUBLIC_GATEWAY)
        && !node_labels.is_remote()
    {
        return FilterVerdict::Rejected(
            "internet access required, but node has no public access".to_string(),
        );
    }

    FilterVerdict::Eligible
}

/// Network score from measured paths:
/// `max_bandwidth / 10 - min_latency / 5 - min_cost * 50`.
///
/// Empty maps contribute no bandwidth bonus, no latency penalty and the full
/// cost penalty.
pub fn topology_score(profile: &NodeNetworkProfile) -> i64 {
    let bandwidth = (profile.max_bandwidth() / 10) as i64;
    let latency = profile.min_latency().map(|l| (l / 5) as i64).unwrap_or(0);
    let cost = (profile.min_cost().unwrap_or(1.0) * 50.0) as i64;
    bandwidth - latency - cost
}

/// Network score from static labels when no measurement is available
pub fn label_score(node: &Node) -> i64 {
    let node_labels = NodeLabels::of(node);
    let mut score = node_labels
        .network_speed_mbps()
        .map(|speed| (speed / 10) as i64)
        .unwrap_or(0);
    if node_labels.network_latency_class() == Some("high") {
        score -= HIGH_LATENCY_PENALTY;
    }
    score
}

/// Workload-type and locality bonuses, added in both scoring paths
pub fn affinity_score(req: &WorkloadNetworkRequirement, node: &Node) -> i64 {
    let node_labels = NodeLabels::of(node);
    let mut score = 0;

    if req.is_workload_type(values::WORKLOAD_AI) {
        if node_labels.is(labels::ROLE, values::ROLE_AI_WORKER) {
            score += AI_WORKER_BONUS;
        }
        if node_labels.has_gpu() {
            score += GPU_BONUS;
        }
    }

    if req.is_workload_type(values::WORKLOAD_WEB) {
        if node_labels.is(labels::ROLE, values::ROLE_PUBLIC_GATEWAY) {
            score += PUBLIC_GATEWAY_BONUS;
        }
        if node_labels.is_remote() {
            score += REMOTE_WEB_BONUS;
        }
    }

    if req.data_locality == DataLocality::High && node_labels.is_local() {
        score += DATA_LOCALITY_BONUS;
    }

    score
}

/// Where network scores come from, chosen once per scheduling attempt
#[derive(Debug, Clone, Default)]
pub enum ScoringSource {
    /// A fresh topology snapshot; nodes missing from it use their labels
    TopologyBacked(Arc<NetworkTopology>),
    #[default]
    LabelBacked,
}

impl ScoringSource {
    pub fn is_topology_backed(&self) -> bool {
        matches!(self, ScoringSource::TopologyBacked(_))
    }

    /// Full score for `node`: network fitness plus affinity
    pub fn score(&self, req: &WorkloadNetworkRequirement, node: &Node) -> i64 {
        let network = match self {
            ScoringSource::TopologyBacked(topology) => {
                match topology.spec.profile(node_name(node)) {
                    Some(profile) => topology_score(profile),
                    None => label_score(node),
                }
            }
            ScoringSource::LabelBacked => label_score(node),
        };
        network + affinity_score(req, node)
    }
}

/// Filter and score pods by network requirements and measured topology
pub struct NetworkAwarePlugin {
    store: Arc<dyn TopologyStore>,
    topology_name: String,
    read_timeout: Duration,
    max_age: Option<chrono::Duration>,
    health: HealthRegistry,
    metrics: SchedulerMetrics,
}

impl NetworkAwarePlugin {
    pub fn new(store: Arc<dyn TopologyStore>) -> Self {
        Self {
            store,
            topology_name: DEFAULT_TOPOLOGY_NAME.to_string(),
            read_timeout: Duration::from_millis(500),
            max_age: Some(chrono::Duration::minutes(5)),
            health: HealthRegistry::new(),
            metrics: SchedulerMetrics::new(),
        }
    }

    pub fn with_topology_name(mut self, name: impl Into<String>) -> Self {
        self.topology_name = name.into();
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Snapshots older than `max_age` are ignored; `None` accepts any age
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age.and_then(|d| chrono::Duration::from_std(d).ok());
        self
    }

    pub fn with_health_registry(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    /// Read the topology once and pick the scoring source for an attempt.
    ///
    /// Never fails: read errors, timeouts, a missing resource and a stale
    /// snapshot all select [`ScoringSource::LabelBacked`].
    pub async fn load_scoring_source(&self) -> ScoringSource {
        let read = tokio::time::timeout(self.read_timeout, self.store.get(&self.topology_name));

        let topology = match read.await {
            Ok(Ok(Some(topology))) => {
                self.health.set_healthy(components::TOPOLOGY_READER).await;
                topology
            }
            Ok(Ok(None)) => {
                debug!(topology = %self.topology_name, "Network topology not found, using node labels");
                self.health.set_healthy(components::TOPOLOGY_READER).await;
                return self.fallback();
            }
            Ok(Err(e)) => {
                debug!(topology = %self.topology_name, error = %e, "Failed to get network topology, using node labels");
                self.health
                    .set_degraded(components::TOPOLOGY_READER, e.to_string())
                    .await;
                return self.fallback();
            }
            Err(_) => {
                debug!(
                    topology = %self.topology_name,
                    timeout_ms = self.read_timeout.as_millis() as u64,
                    "Network topology read timed out, using node labels"
                );
                self.health
                    .set_degraded(components::TOPOLOGY_READER, "topology read timed out")
                    .await;
                return self.fallback();
            }
        };

        if let Some(max_age) = self.max_age {
            let fresh = topology
                .spec
                .age(Utc::now())
                .map(|age| age <= max_age)
                .unwrap_or(false);
            if !fresh {
                debug!(
                    topology = %self.topology_name,
                    last_updated = ?topology.spec.last_updated,
                    "Network topology is stale, using node labels"
                );
                return self.fallback();
            }
        }

        ScoringSource::TopologyBacked(Arc::new(topology))
    }

    fn fallback(&self) -> ScoringSource {
        self.metrics.inc_label_fallback();
        ScoringSource::LabelBacked
    }
}

impl FilterPlugin for NetworkAwarePlugin {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn filter(&self, state: &CycleState, node: &Node) -> FilterVerdict {
        filter_node(&state.requirement, node)
    }
}

#[async_trait]
impl ScorePlugin for NetworkAwarePlugin {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    async fn pre_score(&self, state: &mut CycleState) {
        state.scoring = self.load_scoring_source().await;
    }

    fn score(&self, state: &CycleState, node: &Node) -> i64 {
        let score = state.scoring.score(&state.requirement, node);
        debug!(
            pod = %state.pod_key(),
            node = %node_name(node),
            score,
            topology_backed = state.scoring.is_topology_backed(),
            "Node scored"
        );
        score
    }
}
