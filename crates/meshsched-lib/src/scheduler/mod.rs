//! Network-aware scheduling
//!
//! The [`NetworkAwarePlugin`] filters nodes that cannot meet a pod's network
//! requirements and ranks the rest by measured network fitness plus
//! workload affinity. It reads the cluster `NetworkTopology` once per
//! scheduling attempt and scores from node labels when the topology is
//! missing, unreadable or stale.
//!
//! The plugin runs inside a small framework host ([`SchedulingLoop`]) that
//! polls for pods naming this scheduler and binds them through the cluster
//! API.

mod framework;
mod host;
mod network;
mod node_affinity;
mod taint_toleration;
mod unschedulable;


pub use framework::{
    normalize, pod_key, select, CycleState, Evaluation, FilterPlugin, FilterVerdict, Framework,
    NodeScore, Rejection, ScorePlugin, MAX_NODE_SCORE,
};
pub use host::{
    PodOutcome, PollSummary, SchedulerConfig, SchedulingLoop, SchedulingLoopBuilder,
    DEFAULT_SCHEDULER_NAME,
};
pub use network::{
    affinity_score, filter_node, label_score, node_bandwidth, node_latency, topology_score,
    NetworkAwarePlugin, ScoringSource, DEFAULT_NODE_BANDWIDTH_MBPS,
};
pub use node_affinity::NodeAffinity;
pub use taint_toleration::TaintToleration;
pub use unschedulable::NodeUnschedulable;

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Binding, ObjectReference, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use std::sync::Arc;

/// The default framework: cordon, placement constraints and taints, then
/// network requirements and scoring
pub fn default_framework(plugin: Arc<NetworkAwarePlugin>) -> Framework {
    Framework::new()
        .with_filter(Arc::new(NodeUnschedulable))
        .with_filter(Arc::new(NodeAffinity))
        .with_filter(Arc::new(TaintToleration))
        .with_filter(plugin.clone())
        .with_scorer(plugin)
}

/// Source of pods waiting for this scheduler
#[async_trait]
pub trait PodSource: Send + Sync {
    /// Pods with `spec.schedulerName == scheduler_name` and no node assigned
    async fn pending_pods(&self, scheduler_name: &str) -> Result<Vec<Pod>>;
}

/// Applies scheduling decisions to the cluster
#[async_trait]
pub trait Binder: Send + Sync {
    async fn bind(&self, pod: &Pod, node: &str) -> Result<()>;

    /// Surface why no node could take the pod
    async fn report_unschedulable(&self, pod: &Pod, message: &str) -> Result<()>;
}

/// Pending pod lister backed by the cluster API
#[derive(Clone)]
pub struct KubePodSource {
    api: Api<Pod>,
}

impl KubePodSource {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl PodSource for KubePodSource {
    async fn pending_pods(&self, scheduler_name: &str) -> Result<Vec<Pod>> {
        let params = ListParams::default()
            .fields(&format!("spec.schedulerName={},spec.nodeName=", scheduler_name));
        let pods = self.api.list(&params).await?.items;

        Ok(pods
            .into_iter()
            .filter(|p| p.metadata.deletion_timestamp.is_none())
            .collect())
    }
}

/// Binds through the `pods/binding` subresource and records events
#[derive(Clone)]
pub struct KubeBinder {
    client: Client,
    reporter: Reporter,
}

impl KubeBinder {
    pub fn new(client: Client, scheduler_name: &str) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: scheduler_name.to_string(),
                instance: std::env::var("HOSTNAME").ok(),
            },
        }
    }
}

#[async_trait]
impl Binder for KubeBinder {
    async fn bind(&self, pod: &Pod, node: &str) -> Result<()> {
        let name = pod
            .metadata
            .name
            .as_deref()
            .context("Pod has no name")?;
        let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");

        let binding = Binding {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                uid: pod.metadata.uid.clone(),
                ..Default::default()
            },
            target: ObjectReference {
                api_version: Some("v1".to_string()),
                kind: Some("Node".to_string()),
                name: Some(node.to_string()),
                ..Default::default()
            },
        };

        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.create_subresource::<serde_json::Value>(
            "binding",
            name,
            &PostParams::default(),
            serde_json::to_vec(&binding)?,
        )
        .await
        .with_context(|| format!("Binding {}/{} to {} was rejected", namespace, name, node))?;
        Ok(())
    }

    async fn report_unschedulable(&self, pod: &Pod, message: &str) -> Result<()> {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), pod.object_ref(&()));
        recorder
            .publish(Event {
                type_: EventType::Warning,
                reason: "FailedScheduling".to_string(),
                note: Some(message.to_string()),
                action: "Scheduling".to_string(),
                secondary: None,
            })
            .await
            .context("Failed to publish FailedScheduling event")?;
        Ok(())
    }
}
