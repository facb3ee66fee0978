//! In-process topology store for tests and offline runs

use super::{NetworkTopology, TopologyError, TopologyStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Topology store kept in memory, with the same resource-version semantics as
/// the API server
#[derive(Debug, Default)]
pub struct InMemoryTopologyStore {
    objects: DashMap<String, NetworkTopology>,
    version: AtomicU64,
}

impl InMemoryTopologyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `topology` directly, bypassing version checks
    pub fn seed(&self, mut topology: NetworkTopology) {
        let name = topology.metadata.name.clone().unwrap_or_default();
        topology.metadata.resource_version = Some(self.next_version());
        self.objects.insert(name, topology);
    }

    pub fn remove(&self, name: &str) -> Option<NetworkTopology> {
        self.objects.remove(name).map(|(_, v)| v)
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }
}

#[async_trait]
impl TopologyStore for InMemoryTopologyStore {
    async fn get(&self, name: &str) -> Result<Option<NetworkTopology>, TopologyError> {
        Ok(self.objects.get(name).map(|r| r.value().clone()))
    }

    async fn create(&self, topology: &NetworkTopology) -> Result<NetworkTopology, TopologyError> {
        let name = topology.metadata.name.clone().unwrap_or_default();
        let mut stored = topology.clone();

        match self.objects.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(TopologyError::AlreadyExists(name)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                stored.metadata.resource_version = Some(self.next_version());
                slot.insert(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn replace(&self, topology: &NetworkTopology) -> Result<NetworkTopology, TopologyError> {
        let name = topology.metadata.name.clone().unwrap_or_default();

        let mut entry = self
            .objects
            .get_mut(&name)
            .ok_or_else(|| TopologyError::Conflict(name.clone()))?;

        if entry.metadata.resource_version != topology.metadata.resource_version {
            return Err(TopologyError::Conflict(name));
        }

        let mut stored = topology.clone();
        stored.metadata.resource_version = Some(self.next_version());
        *entry = stored.clone();
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::NetworkTopologySpec;

    #[tokio::test]
    async fn test_create_twice_fails() {
        let store = InMemoryTopologyStore::new();
        let topo = NetworkTopology::new("t", NetworkTopologySpec::default());

        store.create(&topo).await.unwrap();
        let err = store.create(&topo).await.unwrap_err();
        assert!(matches!(err, TopologyError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_replace_with_stale_version_conflicts() {
        let store = InMemoryTopologyStore::new();
        let created = store
            .create(&NetworkTopology::new("t", NetworkTopologySpec::default()))
            .await
            .unwrap();

        // A concurrent writer moves the version forward
        store.replace(&created).await.unwrap();

        let err = store.replace(&created).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_replace_bumps_version() {
        let store = InMemoryTopologyStore::new();
        let created = store
            .create(&NetworkTopology::new("t", NetworkTopologySpec::default()))
            .await
            .unwrap();

        let replaced = store.replace(&created).await.unwrap();
        assert_ne!(
            created.metadata.resource_version,
            replaced.metadata.resource_version
        );
    }
}
