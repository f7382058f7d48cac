//! Reads the admission checks need from the API server

use async_trait::async_trait;
use hz_common::crd::{Hazelcast, JetJob};
use hz_common::Result;
use kube::api::ListParams;
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

/// Cluster state consulted by the JetJob checks
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AdmissionStore: Send + Sync {
    /// Every JetJob in `namespace`
    async fn list_jet_jobs(&self, namespace: &str) -> Result<Vec<JetJob>>;

    /// The Hazelcast resource `name` in `namespace`, if it exists
    async fn get_hazelcast(&self, namespace: &str, name: &str) -> Result<Option<Hazelcast>>;
}

/// [`AdmissionStore`] backed by the Kubernetes API
pub struct KubeAdmissionStore {
    client: Client,
}

impl KubeAdmissionStore {
    /// Create a store using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AdmissionStore for KubeAdmissionStore {
    async fn list_jet_jobs(&self, namespace: &str) -> Result<Vec<JetJob>> {
        let api: Api<JetJob> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_hazelcast(&self, namespace: &str, name: &str) -> Result<Option<Hazelcast>> {
        let api: Api<Hazelcast> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}
