//! Network measurement and topology reconciliation
//!
//! The controller lists cluster nodes, resolves a reachable address for each
//! one (mesh overlay first, node InternalIP second), probes every ordered
//! node pair for latency and throughput, and publishes the result as the
//! cluster's `NetworkTopology`. External tools (`ping`, `iperf3`,
//! `tailscale`) sit behind the traits below so the loop can be driven by
//! mocks in tests.

mod mesh;
mod probe;
mod snapshot;
mod r#loop;


pub use mesh::{AddressTable, MeshPeer, TailscaleStatusSource};
pub use probe::{
    find_in_path, measure_latency, measure_throughput, parse_iperf3_output, parse_ping_output,
    Iperf3Benchmark, PingProbe,
};
pub use r#loop::{ControllerConfig, CycleReport, NetworkController, NetworkControllerBuilder};
pub use snapshot::{
    build_topology, calculate_cost, calculate_health_score, estimate_bandwidth, PairMeasurement,
};

use anyhow::Result;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use kube::Client;
use std::net::IpAddr;
use thiserror::Error;

pub use async_trait::async_trait;

/// Errors from a single probe attempt
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("{tool} exited unsuccessfully: {detail}")]
    CommandFailed { tool: &'static str, detail: String },

    #[error("could not parse {tool} output")]
    Unparseable { tool: &'static str },

    #[error("failed to run probe: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of the current cluster node list
#[async_trait]
pub trait NodeSource: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>>;
}

/// Reports the peers of the mesh overlay network
#[async_trait]
pub trait MeshStatusSource: Send + Sync {
    async fn peers(&self) -> Result<Vec<MeshPeer>>;
}

/// Round-trip latency measurement to one address
#[async_trait]
pub trait LatencyProbe: Send + Sync {
    /// Average round-trip time in milliseconds
    async fn probe(&self, target: IpAddr) -> Result<f64, ProbeError>;
}

/// Throughput benchmark to one address
#[async_trait]
pub trait ThroughputBenchmark: Send + Sync {
    /// Whether the benchmark tool can run at all on this host
    fn is_available(&self) -> bool;

    /// Observed throughput in Mbps
    async fn measure(&self, target: IpAddr) -> Result<f64, ProbeError>;
}

/// Node lister backed by the cluster API
#[derive(Clone)]
pub struct KubeNodeSource {
    api: Api<Node>,
}

impl KubeNodeSource {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl NodeSource for KubeNodeSource {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.api.list(&ListParams::default()).await?.items)
    }
}
