//! Observability infrastructure for the controller and scheduler
//!
//! Provides:
//! - Prometheus metrics for reconciliation and scheduling
//! - Structured JSON events via tracing

use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for reconciliation duration (in seconds). A cycle probes
/// every node pair, so it runs far longer than a request.
const RECONCILE_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0];

static CONTROLLER_METRICS: OnceLock<ControllerMetricsInner> = OnceLock::new();
static SCHEDULER_METRICS: OnceLock<SchedulerMetricsInner> = OnceLock::new();

struct ControllerMetricsInner {
    reconcile_duration_seconds: Histogram,
    topology_nodes: IntGauge,
    topology_measurements: IntGauge,
    topology_health_score: Gauge,
    probe_failures: IntCounter,
    reconcile_errors: IntCounter,
}

impl ControllerMetricsInner {
    fn new() -> Self {
        Self {
            reconcile_duration_seconds: register_histogram!(
                "network_controller_reconcile_duration_seconds",
                "Time spent measuring the cluster and publishing the topology",
                RECONCILE_BUCKETS.to_vec()
            )
            .expect("Failed to register reconcile_duration_seconds"),

            topology_nodes: register_int_gauge!(
                "network_controller_topology_nodes",
                "Nodes in the last published topology"
            )
            .expect("Failed to register topology_nodes"),

            topology_measurements: register_int_gauge!(
                "network_controller_topology_measurements",
                "Successful pairwise measurements in the last published topology"
            )
            .expect("Failed to register topology_measurements"),

            topology_health_score: register_gauge!(
                "network_controller_topology_health_score",
                "Cluster network health score of the last published topology"
            )
            .expect("Failed to register topology_health_score"),

            probe_failures: register_int_counter!(
                "network_controller_probe_failures_total",
                "Node pairs left unmeasured after all probe attempts"
            )
            .expect("Failed to register probe_failures"),

            reconcile_errors: register_int_counter!(
                "network_controller_reconcile_errors_total",
                "Reconciliations that failed to publish a topology"
            )
            .expect("Failed to register reconcile_errors"),
        }
    }
}

/// Controller metrics handle. Clones share the process-wide registration.
#[derive(Clone)]
pub struct ControllerMetrics {
    _private: (),
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    pub fn new() -> Self {
        CONTROLLER_METRICS.get_or_init(ControllerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ControllerMetricsInner {
        CONTROLLER_METRICS.get_or_init(ControllerMetricsInner::new)
    }

    pub fn observe_reconcile_duration(&self, duration_secs: f64) {
        self.inner().reconcile_duration_seconds.observe(duration_secs);
    }

    pub fn set_topology(&self, nodes: i64, measurements: i64, health_score: f64) {
        let inner = self.inner();
        inner.topology_nodes.set(nodes);
        inner.topology_measurements.set(measurements);
        inner.topology_health_score.set(health_score);
    }

    pub fn inc_probe_failures(&self, count: u64) {
        self.inner().probe_failures.inc_by(count);
    }

    pub fn inc_reconcile_errors(&self) {
        self.inner().reconcile_errors.inc();
    }
}

struct SchedulerMetricsInner {
    scheduling_attempts: IntCounterVec,
    filter_rejections: IntCounterVec,
    label_fallbacks: IntCounter,
    binding_errors: IntCounter,
}

impl SchedulerMetricsInner {
    fn new() -> Self {
        Self {
            scheduling_attempts: register_int_counter_vec!(
                "network_scheduler_attempts_total",
                "Scheduling attempts by result",
                &["result"]
            )
            .expect("Failed to register scheduling_attempts"),

            filter_rejections: register_int_counter_vec!(
                "network_scheduler_filter_rejections_total",
                "Nodes rejected during filtering, by plugin",
                &["plugin"]
            )
            .expect("Failed to register filter_rejections"),

            label_fallbacks: register_int_counter!(
                "network_scheduler_label_fallbacks_total",
                "Scheduling cycles scored from node labels because topology was unavailable"
            )
            .expect("Failed to register label_fallbacks"),

            binding_errors: register_int_counter!(
                "network_scheduler_binding_errors_total",
                "Failed pod bindings"
            )
            .expect("Failed to register binding_errors"),
        }
    }
}

/// Scheduler metrics handle. Clones share the process-wide registration.
#[derive(Clone)]
pub struct SchedulerMetrics {
    _private: (),
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerMetrics {
    pub fn new() -> Self {
        SCHEDULER_METRICS.get_or_init(SchedulerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SchedulerMetricsInner {
        SCHEDULER_METRICS.get_or_init(SchedulerMetricsInner::new)
    }

    /// `result` is one of `scheduled`, `unschedulable`, `error`
    pub fn inc_attempt(&self, result: &str) {
        self.inner()
            .scheduling_attempts
            .with_label_values(&[result])
            .inc();
    }

    pub fn inc_filter_rejection(&self, plugin: &str) {
        self.inner()
            .filter_rejections
            .with_label_values(&[plugin])
            .inc();
    }

    pub fn inc_label_fallback(&self) {
        self.inner().label_fallbacks.inc();
    }

    pub fn inc_binding_errors(&self) {
        self.inner().binding_errors.inc();
    }
}

/// Structured logger for controller and scheduler events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log a published topology
    pub fn log_reconcile(
        &self,
        topology: &str,
        node_count: u32,
        measurement_count: u32,
        unmeasured_pairs: u32,
        health_score: f64,
    ) {
        info!(
            event = "topology_reconciled",
            node = %self.node_name,
            topology = %topology,
            nodes = node_count,
            measurements = measurement_count,
            unmeasured = unmeasured_pairs,
            health_score = health_score,
            "Network topology updated"
        );
    }

    /// Log a node rejected by a filter plugin
    pub fn log_filter_rejection(&self, pod: &str, candidate: &str, plugin: &str, reason: &str) {
        info!(
            event = "filter_rejected",
            node = %self.node_name,
            pod = %pod,
            candidate = %candidate,
            plugin = %plugin,
            reason = %reason,
            "Node rejected for pod"
        );
    }

    /// Log a pod bound to a node
    pub fn log_binding(&self, pod: &str, target: &str, score: i64, topology_backed: bool) {
        info!(
            event = "pod_bound",
            node = %self.node_name,
            pod = %pod,
            target = %target,
            score = score,
            topology_backed = topology_backed,
            "Pod bound to node"
        );
    }

    /// Log a pod no node could accept
    pub fn log_unschedulable(&self, pod: &str, candidates: usize, message: &str) {
        warn!(
            event = "pod_unschedulable",
            node = %self.node_name,
            pod = %pod,
            candidates = candidates,
            message = %message,
            "No node satisfies pod requirements"
        );
    }

    /// Log ignored malformed requirement annotations
    pub fn log_malformed_annotation(&self, pod: &str, key: &str, value: &str) {
        warn!(
            event = "malformed_annotation",
            node = %self.node_name,
            pod = %pod,
            annotation = %key,
            value = %value,
            "Ignoring unparseable network requirement"
        );
    }

    pub fn log_startup(&self, component: &str, version: &str) {
        info!(
            event = "component_started",
            node = %self.node_name,
            component = %component,
            version = %version,
            "Component started"
        );
    }

    pub fn log_shutdown(&self, component: &str, reason: &str) {
        info!(
            event = "component_shutdown",
            node = %self.node_name,
            component = %component,
            reason = %reason,
            "Component shutting down"
        );
    }
}
