//! Client Provider interface
//!
//! Reconcilers only ever see these traits. Handles are shared read-only
//! between workers; the reconcilers never touch connection state, they only
//! issue request/response calls.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use hz_protocol::ClientMessage;

#[cfg(test)]
use mockall::automock;

use crate::TransportError;

/// Identity of a target cluster: the `Hazelcast` resource it is declared by
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterRef {
    /// Namespace of the Hazelcast resource
    pub namespace: String,
    /// Name of the Hazelcast resource
    pub name: String,
}

impl ClusterRef {
    /// Build a reference
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Request/response access to one cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Addresses of every known member, connected or not.
    ///
    /// Broadcasts address all of them, so a member the client lost shows up
    /// as unreachable instead of silently missing the request.
    fn members(&self) -> Vec<String>;

    /// Addresses of the members currently connected
    fn connected_members(&self) -> Vec<String>;

    /// Send `request` to one member and wait for its answer
    async fn invoke_on_member(
        &self,
        member: &str,
        request: ClientMessage,
    ) -> Result<ClientMessage, TransportError>;

    /// Send `request` to any connected member
    async fn invoke(&self, request: ClientMessage) -> Result<ClientMessage, TransportError>;
}

/// Resolves target clusters to ready clients
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClientProvider: Send + Sync {
    /// Ready client for `cluster`, or `Error::NotReady`
    async fn acquire(&self, cluster: &ClusterRef) -> Result<Arc<dyn ClusterClient>, hz_common::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_ref_displays_namespaced() {
        assert_eq!(ClusterRef::new("data", "hazelcast").to_string(), "data/hazelcast");
    }
}
