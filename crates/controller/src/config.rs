//! Controller configuration

use anyhow::{Context, Result};
use meshsched_lib::topology::DEFAULT_TOPOLOGY_NAME;
use serde::Deserialize;
use std::time::Duration;

/// Controller configuration, read from `CONTROLLER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Node name from Kubernetes downward API
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// NetworkTopology resource to maintain
    #[serde(default = "default_topology_name")]
    pub topology_name: String,

    /// Reconciliation interval in seconds
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Probe attempts per node pair
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,

    /// Echo requests per ping attempt
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,

    /// Per-reply ping timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Node pairs probed concurrently
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,

    /// iperf3 run length in seconds
    #[serde(default = "default_benchmark_duration")]
    pub benchmark_duration_secs: u64,

    /// Mesh status binary, invoked as `<command> status --json`
    #[serde(default = "default_mesh_status_command")]
    pub mesh_status_command: String,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_topology_name() -> String {
    DEFAULT_TOPOLOGY_NAME.to_string()
}

fn default_update_interval() -> u64 {
    60
}

fn default_probe_attempts() -> u32 {
    3
}

fn default_ping_count() -> u32 {
    3
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_max_concurrent_probes() -> usize {
    8
}

fn default_benchmark_duration() -> u64 {
    3
}

fn default_mesh_status_command() -> String {
    "tailscale".to_string()
}

impl ControllerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix("CONTROLLER"))
    }

    fn from_source(env: config::Environment) -> Result<Self> {
        let config = config::Config::builder().add_source(env).build()?;

        config
            .try_deserialize()
            .context("Invalid CONTROLLER_* configuration")
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn benchmark_duration(&self) -> Duration {
        Duration::from_secs(self.benchmark_duration_secs)
    }
}
