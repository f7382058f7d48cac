//! Cluster config snapshot reader
//!
//! Reads the target cluster's authoritative configuration for one object.
//! The production reader takes it from the cluster's persisted
//! configuration Secret, the document members load on restart.

use async_trait::async_trait;
use hz_client::ClusterRef;
use hz_common::{config_secret_name, Result, CONFIG_SECRET_KEY};
use hz_protocol::{ConfigKind, WireConfig};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::document;

/// Source of persisted configuration snapshots
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SnapshotReader: Send + Sync {
    /// Persisted config of `kind`/`name` on `cluster`, or `None` if the
    /// cluster has not persisted it
    async fn read_snapshot(
        &self,
        cluster: &ClusterRef,
        kind: ConfigKind,
        name: &str,
    ) -> Result<Option<WireConfig>>;
}

/// Reads snapshots from the `<cluster>-config` Secret
pub struct SecretSnapshotReader {
    client: Client,
}

impl SecretSnapshotReader {
    /// Create a reader using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SnapshotReader for SecretSnapshotReader {
    async fn read_snapshot(
        &self,
        cluster: &ClusterRef,
        kind: ConfigKind,
        name: &str,
    ) -> Result<Option<WireConfig>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &cluster.namespace);
        let secret_name = config_secret_name(&cluster.name);
        let Some(secret) = api.get_opt(&secret_name).await? else {
            debug!(cluster = %cluster, secret = %secret_name, "Persisted config not rendered yet");
            return Ok(None);
        };
        let Some(raw) = secret
            .data
            .as_ref()
            .and_then(|data| data.get(CONFIG_SECRET_KEY))
        else {
            return Ok(None);
        };
        let text = std::str::from_utf8(&raw.0).map_err(|e| {
            hz_common::Error::observation(format!("{secret_name}/{CONFIG_SECRET_KEY}: {e}"))
        })?;
        document::extract(text, kind, name)
    }
}
