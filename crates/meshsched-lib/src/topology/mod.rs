//! The cluster-wide `NetworkTopology` resource and its typed accessor
//!
//! The controller is the only writer, the scheduler only reads. Writes use the
//! resource version of the last read so concurrent writers surface as
//! [`TopologyError::Conflict`] instead of silently overwriting each other.

mod memory;
mod store;

pub use memory::InMemoryTopologyStore;
pub use store::KubeTopologyStore;

use crate::models::NodeNetworkProfile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// Name of the singleton topology resource
pub const DEFAULT_TOPOLOGY_NAME: &str = "cluster-network";

/// Condition type set after every successful reconciliation
pub const CONDITION_READY: &str = "Ready";

/// Measured inter-node network characteristics for the whole cluster.
///
/// The summary fields live next to `nodes` so that a single write replaces
/// the whole snapshot.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "meshsched.dev",
    version = "v1",
    kind = "NetworkTopology",
    plural = "networktopologies",
    shortname = "ntopo",
    printcolumn = r#"{"name":"Nodes","type":"integer","jsonPath":".spec.nodeCount"}"#,
    printcolumn = r#"{"name":"Health","type":"number","jsonPath":".spec.healthScore"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkTopologySpec {
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeNetworkProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub node_count: u32,
    /// Successful pairwise probes in the last cycle
    #[serde(default)]
    pub measurement_count: u32,
    /// Cluster network health in `[0.0, 1.0]`
    #[serde(default)]
    pub health_score: f64,
    #[serde(default)]
    pub conditions: Vec<TopologyCondition>,
}

impl NetworkTopologySpec {
    pub fn profile(&self, node: &str) -> Option<&NodeNetworkProfile> {
        self.nodes.get(node)
    }

    /// Age of the snapshot relative to `now`; `None` if never stamped
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.last_updated.map(|t| now - t)
    }

    pub fn ready_condition(&self) -> Option<&TopologyCondition> {
        self.conditions.iter().find(|c| c.type_ == CONDITION_READY)
    }
}

/// A status condition on the topology resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopologyCondition {
    #[serde(rename = "type")]
    pub type_: String,
    /// `"True"`, `"False"` or `"Unknown"`
    pub status: String,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl TopologyCondition {
    pub fn ready(measurement_count: u32, now: DateTime<Utc>) -> Self {
        Self {
            type_: CONDITION_READY.to_string(),
            status: "True".to_string(),
            reason: "MeasurementComplete".to_string(),
            message: format!(
                "Successfully measured {} network connections",
                measurement_count
            ),
            last_transition_time: now,
        }
    }
}

/// Errors from topology resource access
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The resource version used for the write is no longer current
    #[error("topology {0} was modified concurrently")]
    Conflict(String),

    #[error("topology {0} already exists")]
    AlreadyExists(String),

    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),
}

impl TopologyError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, TopologyError::Conflict(_))
    }
}

/// Typed get/create/replace access to the topology resource
#[async_trait]
pub trait TopologyStore: Send + Sync {
    /// Fetch the resource, `None` if it does not exist
    async fn get(&self, name: &str) -> Result<Option<NetworkTopology>, TopologyError>;

    /// Create the resource; fails if it already exists
    async fn create(&self, topology: &NetworkTopology) -> Result<NetworkTopology, TopologyError>;

    /// Replace the resource. `topology.metadata.resource_version` must match
    /// the stored version or the call fails with [`TopologyError::Conflict`].
    async fn replace(&self, topology: &NetworkTopology) -> Result<NetworkTopology, TopologyError>;
}

/// Outcome of a create-or-update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Write `spec` as the complete content of topology `name`.
///
/// Creates the resource when absent, otherwise replaces it wholesale using the
/// version token just read. No retry on conflict; the caller decides when to
/// try again.
pub async fn upsert(
    store: &dyn TopologyStore,
    name: &str,
    spec: NetworkTopologySpec,
) -> Result<UpsertOutcome, TopologyError> {
    let mut topology = NetworkTopology::new(name, spec);

    match store.get(name).await? {
        None => {
            info!(name = %name, "Creating network topology");
            store.create(&topology).await?;
            Ok(UpsertOutcome::Created)
        }
        Some(existing) => {
            topology.metadata.resource_version = existing.metadata.resource_version;
            topology.metadata.uid = existing.metadata.uid;
            debug!(name = %name, "Updating network topology");
            store.replace(&topology).await?;
            Ok(UpsertOutcome::Updated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_condition_message() {
        let now = Utc::now();
        let cond = TopologyCondition::ready(6, now);
        assert_eq!(cond.type_, CONDITION_READY);
        assert_eq!(cond.status, "True");
        assert!(cond.message.contains("6 network connections"));
    }

    #[test]
    fn test_spec_serializes_camel_case() {
        let spec = NetworkTopologySpec {
            node_count: 2,
            measurement_count: 2,
            health_score: 0.5,
            ..Default::default()
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["nodeCount"], 2);
        assert_eq!(json["measurementCount"], 2);
        assert_eq!(json["healthScore"], 0.5);
    }

    #[test]
    fn test_age() {
        let now = Utc::now();
        let spec = NetworkTopologySpec {
            last_updated: Some(now - chrono::Duration::seconds(90)),
            ..Default::default()
        };
        assert_eq!(spec.age(now), Some(chrono::Duration::seconds(90)));
        assert_eq!(NetworkTopologySpec::default().age(now), None);
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let store = InMemoryTopologyStore::new();

        let first = upsert(&store, DEFAULT_TOPOLOGY_NAME, NetworkTopologySpec::default())
            .await
            .unwrap();
        assert_eq!(first, UpsertOutcome::Created);

        let spec = NetworkTopologySpec {
            node_count: 3,
            ..Default::default()
        };
        let second = upsert(&store, DEFAULT_TOPOLOGY_NAME, spec).await.unwrap();
        assert_eq!(second, UpsertOutcome::Updated);

        let stored = store.get(DEFAULT_TOPOLOGY_NAME).await.unwrap().unwrap();
        assert_eq!(stored.spec.node_count, 3);
    }

    #[tokio::test]
    async fn test_upsert_replaces_node_map_wholesale() {
        let store = InMemoryTopologyStore::new();

        let mut spec = NetworkTopologySpec::default();
        spec.nodes.insert("a".into(), NodeNetworkProfile::default());
        spec.nodes.insert("b".into(), NodeNetworkProfile::default());
        upsert(&store, DEFAULT_TOPOLOGY_NAME, spec).await.unwrap();

        let mut spec = NetworkTopologySpec::default();
        spec.nodes.insert("a".into(), NodeNetworkProfile::default());
        upsert(&store, DEFAULT_TOPOLOGY_NAME, spec).await.unwrap();

        let stored = store.get(DEFAULT_TOPOLOGY_NAME).await.unwrap().unwrap();
        assert_eq!(stored.spec.nodes.len(), 1);
        assert!(!stored.spec.nodes.contains_key("b"));
    }
}
