//! Scheduling loop
//!
//! Polls for pods that name this scheduler and have no node yet, evaluates
//! them through the plugin framework and binds each one to the selected node.
//! Pods no node can accept get a warning event and are retried after a
//! backoff.

use super::framework::{pod_key, Evaluation, Framework};
use super::{Binder, PodSource};
use crate::controller::NodeSource;
use crate::health::{components, HealthRegistry};
use crate::observability::{SchedulerMetrics, StructuredLogger};
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Node, Pod};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Name pods set in `spec.schedulerName` to opt in
pub const DEFAULT_SCHEDULER_NAME: &str = "network-aware-scheduler";

/// Configuration for the scheduling loop
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub scheduler_name: String,
    /// Time between polls for pending pods (default: 2 seconds)
    pub poll_interval: Duration,
    /// Wait before retrying a pod that fit no node
    pub retry_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_name: DEFAULT_SCHEDULER_NAME.to_string(),
            poll_interval: Duration::from_secs(2),
            retry_backoff: Duration::from_secs(30),
        }
    }
}

/// Result of one scheduling attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodOutcome {
    Bound { node: String, score: i64 },
    Unschedulable { message: String },
}

/// Counts from one poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub bound: u32,
    pub unschedulable: u32,
    pub deferred: u32,
    pub failed: u32,
}

pub struct SchedulingLoop {
    pods: Arc<dyn PodSource>,
    nodes: Arc<dyn NodeSource>,
    binder: Arc<dyn Binder>,
    framework: Framework,
    config: SchedulerConfig,
    health: HealthRegistry,
    metrics: SchedulerMetrics,
    logger: StructuredLogger,
    /// Pod key to the earliest time it may be retried
    backoff: HashMap<String, Instant>,
}

impl SchedulingLoop {
    /// Start polling; returns once `shutdown` fires
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            scheduler = %self.config.scheduler_name,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Starting scheduling loop"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(error = %e, "Scheduling poll failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down scheduling loop");
                    break;
                }
            }
        }
    }

    /// Schedule every pending pod once
    pub async fn poll_once(&mut self) -> Result<PollSummary> {
        let pending = self
            .pods
            .pending_pods(&self.config.scheduler_name)
            .await
            .context("Failed to list pending pods")?;

        let mut summary = PollSummary::default();
        if pending.is_empty() {
            self.backoff.clear();
            return Ok(summary);
        }

        let nodes = self
            .nodes
            .list_nodes()
            .await
            .context("Failed to list cluster nodes")?;

        let now = Instant::now();
        let keys: Vec<String> = pending.iter().map(pod_key).collect();
        let still_pending: HashSet<&str> = keys.iter().map(String::as_str).collect();
        self.backoff.retain(|k, _| still_pending.contains(k.as_str()));

        for (pod, key) in pending.into_iter().zip(keys) {
            if self.backoff.get(&key).is_some_and(|until| *until > now) {
                summary.deferred += 1;
                continue;
            }

            match self.schedule_pod(pod, &nodes).await {
                Ok(PodOutcome::Bound { .. }) => {
                    self.backoff.remove(&key);
                    summary.bound += 1;
                }
                Ok(PodOutcome::Unschedulable { .. }) => {
                    self.backoff.insert(key, now + self.config.retry_backoff);
                    summary.unschedulable += 1;
                }
                Err(e) => {
                    warn!(pod = %key, error = %e, "Failed to schedule pod");
                    self.metrics.inc_attempt("error");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Evaluate one pod and act on the decision
    pub async fn schedule_pod(&self, pod: Pod, nodes: &[Node]) -> Result<PodOutcome> {
        let eval = self.framework.evaluate(pod, nodes).await;
        let key = eval.state.pod_key();
        self.report(&key, &eval);

        let Some(selected) = eval.selected() else {
            let message = eval.unschedulable_message();
            self.logger.log_unschedulable(&key, nodes.len(), &message);
            self.metrics.inc_attempt("unschedulable");
            if let Err(e) = self.binder.report_unschedulable(&eval.state.pod, &message).await {
                warn!(pod = %key, error = %e, "Failed to record scheduling event");
            }
            return Ok(PodOutcome::Unschedulable { message });
        };

        if let Err(e) = self.binder.bind(&eval.state.pod, &selected.node).await {
            self.metrics.inc_binding_errors();
            self.health
                .set_degraded(components::BINDER, format!("binding failed: {e}"))
                .await;
            return Err(e.context(format!("Failed to bind {} to {}", key, selected.node)));
        }
        self.health.set_healthy(components::BINDER).await;

        self.metrics.inc_attempt("scheduled");
        self.logger.log_binding(
            &key,
            &selected.node,
            selected.total,
            eval.state.scoring.is_topology_backed(),
        );

        Ok(PodOutcome::Bound {
            node: selected.node.clone(),
            score: selected.total,
        })
    }

    fn report(&self, key: &str, eval: &Evaluation) {
        for m in &eval.state.malformed {
            self.logger.log_malformed_annotation(key, m.key, &m.value);
        }
        for r in &eval.rejections {
            self.metrics.inc_filter_rejection(r.plugin);
            self.logger
                .log_filter_rejection(key, &r.node, r.plugin, &r.reason);
        }
        for s in &eval.scores {
            debug!(pod = %key, node = %s.node, raw = ?s.raw, total = s.total, "Node total score");
        }
    }
}

/// Builder for creating the scheduling loop
pub struct SchedulingLoopBuilder {
    pods: Option<Arc<dyn PodSource>>,
    nodes: Option<Arc<dyn NodeSource>>,
    binder: Option<Arc<dyn Binder>>,
    framework: Option<Framework>,
    config: SchedulerConfig,
    health: Option<HealthRegistry>,
}

impl SchedulingLoopBuilder {
    pub fn new() -> Self {
        Self {
            pods: None,
            nodes: None,
            binder: None,
            framework: None,
            config: SchedulerConfig::default(),
            health: None,
        }
    }

    pub fn pod_source(mut self, pods: Arc<dyn PodSource>) -> Self {
        self.pods = Some(pods);
        self
    }

    pub fn node_source(mut self, nodes: Arc<dyn NodeSource>) -> Self {
        self.nodes = Some(nodes);
        self
    }

    pub fn binder(mut self, binder: Arc<dyn Binder>) -> Self {
        self.binder = Some(binder);
        self
    }

    pub fn framework(mut self, framework: Framework) -> Self {
        self.framework = Some(framework);
        self
    }

    pub fn scheduler_name(mut self, name: impl Into<String>) -> Self {
        self.config.scheduler_name = name.into();
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    pub fn health_registry(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<SchedulingLoop> {
        let pods = self
            .pods
            .ok_or_else(|| anyhow::anyhow!("Pod source is required"))?;
        let nodes = self
            .nodes
            .ok_or_else(|| anyhow::anyhow!("Node source is required"))?;
        let binder = self
            .binder
            .ok_or_else(|| anyhow::anyhow!("Binder is required"))?;
        let framework = self
            .framework
            .ok_or_else(|| anyhow::anyhow!("Framework is required"))?;

        if self.config.poll_interval.is_zero() {
            anyhow::bail!("Poll interval must be non-zero");
        }

        let logger = StructuredLogger::new(self.config.scheduler_name.clone());

        Ok(SchedulingLoop {
            pods,
            nodes,
            binder,
            framework,
            config: self.config,
            health: self.health.unwrap_or_default(),
            metrics: SchedulerMetrics::new(),
            logger,
            backoff: HashMap::new(),
        })
    }
}

impl Default for SchedulingLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
