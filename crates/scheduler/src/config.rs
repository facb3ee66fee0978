//! Scheduler configuration

use anyhow::{Context, Result};
use meshsched_lib::scheduler::DEFAULT_SCHEDULER_NAME;
use meshsched_lib::topology::DEFAULT_TOPOLOGY_NAME;
use serde::Deserialize;
use std::time::Duration;

/// Scheduler configuration, read from `SCHEDULER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Value pods put in `spec.schedulerName`
    #[serde(default = "default_scheduler_name")]
    pub scheduler_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_topology_name")]
    pub topology_name: String,

    /// Pending pod poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Budget for one topology read in milliseconds
    #[serde(default = "default_topology_read_timeout")]
    pub topology_read_timeout_ms: u64,

    /// Topology older than this is ignored; 0 accepts any age
    #[serde(default = "default_max_topology_age")]
    pub max_topology_age_secs: u64,

    /// Wait before retrying a pod that fit no node
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
}

fn default_scheduler_name() -> String {
    DEFAULT_SCHEDULER_NAME.to_string()
}

fn default_api_port() -> u16 {
    8081
}

fn default_topology_name() -> String {
    DEFAULT_TOPOLOGY_NAME.to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_topology_read_timeout() -> u64 {
    500
}

fn default_max_topology_age() -> u64 {
    300
}

fn default_retry_backoff() -> u64 {
    30
}

impl SchedulerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("SCHEDULER"))
            .build()?;

        config
            .try_deserialize()
            .context("Invalid SCHEDULER_* configuration")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn topology_read_timeout(&self) -> Duration {
        Duration::from_millis(self.topology_read_timeout_ms)
    }

    pub fn max_topology_age(&self) -> Option<Duration> {
        (self.max_topology_age_secs > 0).then(|| Duration::from_secs(self.max_topology_age_secs))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}
