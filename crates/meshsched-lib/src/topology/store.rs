//! Kubernetes API backed topology store

use super::{NetworkTopology, TopologyError, TopologyStore};
use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::Client;

/// Topology store talking to the cluster API
#[derive(Clone)]
pub struct KubeTopologyStore {
    api: Api<NetworkTopology>,
}

impl KubeTopologyStore {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl TopologyStore for KubeTopologyStore {
    async fn get(&self, name: &str) -> Result<Option<NetworkTopology>, TopologyError> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn create(&self, topology: &NetworkTopology) -> Result<NetworkTopology, TopologyError> {
        let name = topology.metadata.name.clone().unwrap_or_default();
        self.api
            .create(&PostParams::default(), topology)
            .await
            .map_err(|e| classify(e, &name))
    }

    async fn replace(&self, topology: &NetworkTopology) -> Result<NetworkTopology, TopologyError> {
        let name = topology.metadata.name.clone().unwrap_or_default();
        self.api
            .replace(&name, &PostParams::default(), topology)
            .await
            .map_err(|e| classify(e, &name))
    }
}

/// Map 409 responses onto the typed variants
fn classify(error: kube::Error, name: &str) -> TopologyError {
    match &error {
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            TopologyError::AlreadyExists(name.to_string())
        }
        kube::Error::Api(resp) if resp.code == 409 => TopologyError::Conflict(name.to_string()),
        _ => TopologyError::Api(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "test".into(),
            reason: reason.into(),
            code,
        })
    }

    #[test]
    fn test_classify_conflict() {
        let err = classify(api_error(409, "Conflict"), "cluster-network");
        assert!(err.is_conflict());
    }

    #[test]
    fn test_classify_already_exists() {
        let err = classify(api_error(409, "AlreadyExists"), "cluster-network");
        assert!(matches!(err, TopologyError::AlreadyExists(_)));
    }

    #[test]
    fn test_classify_other() {
        let err = classify(api_error(500, "InternalError"), "cluster-network");
        assert!(matches!(err, TopologyError::Api(_)));
    }
}
