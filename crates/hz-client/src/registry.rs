//! In-process client registry
//!
//! The cluster controller inserts a client once it reaches a member, and
//! removes it when the cluster goes away. Data-structure and
//! job reconcilers read from it through [`ClientProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::{ClientProvider, ClusterClient, ClusterRef};

/// Registry of ready cluster clients
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<ClusterRef, Arc<dyn ClusterClient>>,
}

impl ClientRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the client for `cluster`
    pub fn insert(&self, cluster: ClusterRef, client: Arc<dyn ClusterClient>) {
        debug!(cluster = %cluster, members = client.connected_members().len(), "Registering cluster client");
        self.clients.insert(cluster, client);
    }

    /// Drop the client for `cluster`
    pub fn remove(&self, cluster: &ClusterRef) -> Option<Arc<dyn ClusterClient>> {
        self.clients.remove(cluster).map(|(_, client)| client)
    }

    /// Client for `cluster`, if registered
    pub fn get(&self, cluster: &ClusterRef) -> Option<Arc<dyn ClusterClient>> {
        self.clients.get(cluster).map(|entry| Arc::clone(entry.value()))
    }

    /// Whether a client is registered for `cluster`
    pub fn contains(&self, cluster: &ClusterRef) -> bool {
        self.clients.contains_key(cluster)
    }
}

#[async_trait]
impl ClientProvider for ClientRegistry {
    async fn acquire(&self, cluster: &ClusterRef) -> Result<Arc<dyn ClusterClient>, hz_common::Error> {
        let client = self
            .get(cluster)
            .ok_or_else(|| hz_common::Error::not_ready(cluster.to_string(), "no client connected"))?;
        if client.connected_members().is_empty() {
            return Err(hz_common::Error::not_ready(
                cluster.to_string(),
                "all member connections are closed",
            ));
        }
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockClusterClient;

    fn client_with_members(members: Vec<String>) -> Arc<dyn ClusterClient> {
        let mut client = MockClusterClient::new();
        let known = members.clone();
        client.expect_members().returning(move || known.clone());
        client.expect_connected_members().returning(move || members.clone());
        Arc::new(client)
    }

    #[tokio::test]
    async fn unknown_cluster_is_not_ready() {
        let registry = ClientRegistry::new();
        let err = registry
            .acquire(&ClusterRef::new("default", "hazelcast"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, hz_common::Error::NotReady { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn registered_cluster_is_acquired() {
        let registry = ClientRegistry::new();
        let cluster = ClusterRef::new("default", "hazelcast");
        registry.insert(cluster.clone(), client_with_members(vec!["10.0.0.1:5701".into()]));

        let client = registry.acquire(&cluster).await.unwrap();
        assert_eq!(client.members(), vec!["10.0.0.1:5701".to_string()]);
        assert!(registry
            .acquire(&ClusterRef::new("other", "hazelcast"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn client_without_live_members_is_not_ready() {
        let registry = ClientRegistry::new();
        let cluster = ClusterRef::new("default", "hazelcast");
        registry.insert(cluster.clone(), client_with_members(Vec::new()));
        assert!(registry.acquire(&cluster).await.is_err());

        registry.remove(&cluster);
        assert!(!registry.contains(&cluster));
    }
}
