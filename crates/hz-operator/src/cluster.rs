//! Hazelcast cluster controller
//!
//! Keeps one connected client per `Hazelcast` resource in the shared
//! [`ClientRegistry`] and renders the cluster's persisted configuration
//! Secret from every data structure that was submitted to it.
//!
//! A registered client whose connections all dropped, or that was connected
//! for an older generation of the resource, is replaced on the next
//! reconcile. Deleting the resource drops its client.

use std::sync::Arc;

use async_trait::async_trait;
use hz_client::tcp::{ConnectOptions, TcpClusterClient};
use hz_client::{ClientRegistry, ClusterClient, ClusterRef, TransportError};
use hz_common::crd::{
    Hazelcast, HazelcastPhase, HazelcastStatus, Map, MultiMap, Queue, ReplicatedMap, Topic,
};
use hz_common::events::{actions, reasons, EventPublisher};
use hz_common::retry::RetryConfig;
use hz_common::{
    config_secret_name, ControllerConfig, Error, CONFIG_SECRET_KEY, FIELD_MANAGER, FINALIZER,
};
use hz_datastructure::{document, ManagedDataStructure};
use hz_protocol::WireConfig;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, ListParams, ObjectMeta, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

/// Connection attempts per member before a reconcile gives up
const CONNECT_ATTEMPTS: u32 = 3;

/// Kubernetes reads and writes of the cluster controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Wire configs of every data structure targeting `cluster` that was
    /// submitted (`Persisting` or `Persisted`)
    async fn submitted_configs(&self, cluster: &ClusterRef) -> Result<Vec<WireConfig>, Error>;

    /// Create or update the `<name>-config` Secret holding `document`
    async fn apply_config_secret(&self, hz: &Hazelcast, document: &str) -> Result<(), Error>;

    /// Write `status`, guarded by the resource version `hz` was read at
    async fn patch_status(&self, hz: &Hazelcast, status: &HazelcastStatus) -> Result<(), Error>;

    /// Add the finalizer
    async fn add_finalizer(&self, hz: &Hazelcast) -> Result<(), Error>;

    /// Remove the finalizer
    async fn remove_finalizer(&self, hz: &Hazelcast) -> Result<(), Error>;
}

/// Opens clients to clusters
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Connect to the members in `options`
    async fn connect(&self, options: ConnectOptions)
        -> Result<Arc<dyn ClusterClient>, TransportError>;
}

/// [`ClusterConnector`] over the TCP transport
pub struct TcpConnector;

#[async_trait]
impl ClusterConnector for TcpConnector {
    async fn connect(
        &self,
        options: ConnectOptions,
    ) -> Result<Arc<dyn ClusterClient>, TransportError> {
        let client = TcpClusterClient::connect(options).await?;
        Ok(Arc::new(client))
    }
}

/// [`ClusterStore`] backed by the Kubernetes API
pub struct KubeClusterStore {
    client: Client,
}

impl KubeClusterStore {
    /// Create a store using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, hz: &Hazelcast) -> Api<Hazelcast> {
        Api::namespaced(self.client.clone(), &hz.namespace().unwrap_or_default())
    }

    async fn submitted<K: ManagedDataStructure>(
        &self,
        cluster: &ClusterRef,
    ) -> Result<Vec<WireConfig>, Error> {
        let api: Api<K> = Api::namespaced(self.client.clone(), &cluster.namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list
            .items
            .iter()
            .filter(|obj| obj.hazelcast_resource_name() == cluster.name)
            .filter(|obj| obj.status().is_some_and(|s| s.state.is_submitted()))
            .map(|obj| obj.desired_config())
            .collect())
    }
}

#[async_trait]
impl ClusterStore for KubeClusterStore {
    async fn submitted_configs(&self, cluster: &ClusterRef) -> Result<Vec<WireConfig>, Error> {
        let mut configs = self.submitted::<ReplicatedMap>(cluster).await?;
        configs.extend(self.submitted::<Map>(cluster).await?);
        configs.extend(self.submitted::<MultiMap>(cluster).await?);
        configs.extend(self.submitted::<Queue>(cluster).await?);
        configs.extend(self.submitted::<Topic>(cluster).await?);
        Ok(configs)
    }

    async fn apply_config_secret(&self, hz: &Hazelcast, document: &str) -> Result<(), Error> {
        let name = config_secret_name(&hz.name_any());
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: hz.namespace(),
                owner_references: hz.controller_owner_ref(&()).map(|r| vec![r]),
                ..Default::default()
            },
            data: Some(
                [(
                    CONFIG_SECRET_KEY.to_string(),
                    ByteString(document.as_bytes().to_vec()),
                )]
                .into(),
            ),
            ..Default::default()
        };
        let api: Api<Secret> =
            Api::namespaced(self.client.clone(), &hz.namespace().unwrap_or_default());
        api.patch(
            &name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&secret),
        )
        .await?;
        Ok(())
    }

    async fn patch_status(&self, hz: &Hazelcast, status: &HazelcastStatus) -> Result<(), Error> {
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": hz.resource_version() },
            "status": status,
        });
        self.api(hz)
            .patch_status(&hz.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn add_finalizer(&self, hz: &Hazelcast) -> Result<(), Error> {
        let mut finalizers = hz.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        self.api(hz)
            .patch(&hz.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn remove_finalizer(&self, hz: &Hazelcast) -> Result<(), Error> {
        let finalizers: Vec<String> = hz
            .finalizers()
            .iter()
            .filter(|f| *f != FINALIZER)
            .cloned()
            .collect();
        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        match self
            .api(hz)
            .patch(&hz.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Collaborators of the cluster controller
pub struct ClusterContext {
    /// Kubernetes reads and writes
    pub store: Arc<dyn ClusterStore>,
    /// Opens cluster clients
    pub connector: Arc<dyn ClusterConnector>,
    /// Clients shared with the data-structure and JetJob controllers
    pub registry: Arc<ClientRegistry>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Requeue delays and call deadlines
    pub config: ControllerConfig,
}

/// Reconcile one Hazelcast resource
#[instrument(skip(hz, ctx), fields(name = %hz.name_any()))]
pub async fn reconcile(hz: Arc<Hazelcast>, ctx: Arc<ClusterContext>) -> Result<Action, Error> {
    let cluster = ClusterRef::new(hz.namespace().unwrap_or_default(), hz.name_any());
    let has_finalizer = hz.finalizers().iter().any(|f| f == FINALIZER);

    if hz.meta().deletion_timestamp.is_some() {
        if ctx.registry.remove(&cluster).is_some() {
            info!(cluster = %cluster, "Dropped cluster client");
        }
        if has_finalizer {
            ctx.store.remove_finalizer(&hz).await?;
        }
        return Ok(Action::await_change());
    }
    if !has_finalizer {
        ctx.store.add_finalizer(&hz).await?;
    }

    let configs = ctx.store.submitted_configs(&cluster).await?;
    let rendered = document::render(&configs)?;
    ctx.store.apply_config_secret(&hz, &rendered).await?;
    debug!(cluster = %cluster, configs = configs.len(), "Rendered persisted config");

    let connection = ensure_client(&hz, &cluster, &ctx).await;
    let status = match &connection {
        Ok(connection) => {
            let members = connection.members().to_vec();
            HazelcastStatus {
                phase: HazelcastPhase::Running,
                ready_members: Some(format!("{}/{}", members.len(), hz.spec.cluster_size)),
                members,
                message: None,
                observed_generation: hz.meta().generation,
            }
        }
        Err(e) => {
            warn!(cluster = %cluster, error = %e, "Cluster not reachable");
            HazelcastStatus {
                phase: if e.is_retryable() {
                    HazelcastPhase::Pending
                } else {
                    HazelcastPhase::Failed
                },
                members: Vec::new(),
                ready_members: Some(format!("0/{}", hz.spec.cluster_size)),
                message: Some(e.to_string()),
                observed_generation: hz.meta().generation,
            }
        }
    };

    if hz.status.as_ref() != Some(&status) {
        ctx.store.patch_status(&hz, &status).await?;
    }

    // A new client replaces the registered one only once its status landed
    if let Ok(Connection::Fresh { client, members }) = connection {
        info!(cluster = %cluster, members = members.len(), "Registering new cluster client");
        ctx.registry.insert(cluster.clone(), client);
        ctx.events
            .publish(
                &hz.object_ref(&()),
                EventType::Normal,
                reasons::CLUSTER_CONNECTED,
                actions::RECONCILE,
                Some(format!("Connected to {} member(s)", members.len())),
            )
            .await;
    }
    Ok(Action::requeue(ctx.config.cluster_not_ready))
}

/// Client a reconcile ends up with
enum Connection {
    /// The registered client is still usable
    Registered(Vec<String>),
    /// A newly connected client, not registered yet
    Fresh {
        client: Arc<dyn ClusterClient>,
        members: Vec<String>,
    },
}

impl Connection {
    /// Connected member addresses
    fn members(&self) -> &[String] {
        match self {
            Connection::Registered(members) => members,
            Connection::Fresh { members, .. } => members,
        }
    }
}

/// Keep the registered client for `cluster`, or connect a new one when
/// there is none, it lost every member, or the spec changed since it
/// connected. A stale client is dropped when reconnecting fails.
async fn ensure_client(
    hz: &Hazelcast,
    cluster: &ClusterRef,
    ctx: &ClusterContext,
) -> Result<Connection, TransportError> {
    let connected_generation = hz.status.as_ref().and_then(|s| s.observed_generation);
    let registered = ctx.registry.get(cluster);
    if let Some(client) = &registered {
        let members = client.connected_members();
        if !members.is_empty() && connected_generation == hz.meta().generation {
            return Ok(Connection::Registered(members));
        }
        info!(cluster = %cluster, members = members.len(), "Replacing cluster client");
    }

    let options = ConnectOptions {
        cluster_name: hz.spec.cluster_name.clone(),
        addresses: hz.member_addresses(),
        connect_timeout: ctx.config.connect_timeout,
        retry: RetryConfig::with_max_attempts(CONNECT_ATTEMPTS),
    };
    match ctx.connector.connect(options).await {
        Ok(client) => {
            let members = client.connected_members();
            Ok(Connection::Fresh { client, members })
        }
        Err(e) => {
            if registered.is_some() {
                ctx.registry.remove(cluster);
            }
            Err(e)
        }
    }
}

/// Requeue after a failed Kubernetes write; stale writes retry quickly
pub fn error_policy(hz: Arc<Hazelcast>, error: &Error, ctx: Arc<ClusterContext>) -> Action {
    if error.is_status_conflict() {
        debug!(name = %hz.name_any(), "Status write conflicted, retrying");
        return Action::requeue(ctx.config.persisting_poll);
    }
    warn!(name = %hz.name_any(), error = %error, "Cluster reconciliation failed");
    Action::requeue(ctx.config.submit_retry)
}
