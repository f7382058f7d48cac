//! Controller runner - builds the controller futures
//!
//! Each `build_*` function returns boxed futures the caller runs together.
//! All controllers share one [`ClientRegistry`]: the cluster controller
//! fills it, the data-structure and JetJob controllers acquire from it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use hz_client::{ClientProvider, ClientRegistry};
use hz_common::crd::{Hazelcast, JetJob, Map, MultiMap, Queue, ReplicatedMap, Topic};
use hz_common::events::KubeEventPublisher;
use hz_common::ControllerConfig;
use hz_datastructure::{
    DataStructureContext, KubeDataStructureClient, ManagedDataStructure, SecretSnapshotReader,
};
use hz_jet::{JetJobContext, KubeJetJobClient};
use kube::core::NamespaceResourceScope;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;

use crate::cluster::{self, ClusterContext, KubeClusterStore, TcpConnector};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// so the API server closes idle watches before the client times out.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// A controller future
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// What every controller shares
#[derive(Clone)]
pub struct RunnerConfig {
    /// Kubernetes client
    pub client: Client,
    /// Restrict watches to one namespace; all namespaces when `None`
    pub watch_namespace: Option<String>,
    /// Requeue delays and call deadlines
    pub controller: ControllerConfig,
}

impl RunnerConfig {
    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
        K::DynamicType: Default,
    {
        match &self.watch_namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }
}

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// The Hazelcast resource a data structure targets
fn target_of<K: ManagedDataStructure>(obj: K) -> Option<ObjectRef<Hazelcast>> {
    let namespace = obj.namespace()?;
    Some(ObjectRef::new(obj.hazelcast_resource_name()).within(&namespace))
}

/// Build the Hazelcast cluster controller.
///
/// Data-structure changes re-render their cluster's persisted config, so
/// every data-structure kind is watched and mapped to its target.
pub fn build_cluster_controller(
    runner: &RunnerConfig,
    registry: Arc<ClientRegistry>,
) -> Vec<ControllerFuture> {
    let ctx = Arc::new(ClusterContext {
        store: Arc::new(KubeClusterStore::new(runner.client.clone())),
        connector: Arc::new(TcpConnector),
        registry,
        events: Arc::new(KubeEventPublisher::new(
            runner.client.clone(),
            "hazelcast-controller",
        )),
        config: runner.controller.clone(),
    });

    tracing::info!("- Hazelcast controller");

    vec![Box::pin(
        Controller::new(runner.api::<Hazelcast>(), watcher_config())
            .watches(runner.api::<ReplicatedMap>(), watcher_config(), target_of)
            .watches(runner.api::<Map>(), watcher_config(), target_of)
            .watches(runner.api::<MultiMap>(), watcher_config(), target_of)
            .watches(runner.api::<Queue>(), watcher_config(), target_of)
            .watches(runner.api::<Topic>(), watcher_config(), target_of)
            .shutdown_on_signal()
            .run(cluster::reconcile, cluster::error_policy, ctx)
            .for_each(log_reconcile_result("Hazelcast")),
    )]
}

fn data_structure_controller<K: ManagedDataStructure>(
    runner: &RunnerConfig,
    clients: Arc<dyn ClientProvider>,
) -> ControllerFuture {
    let reporter = format!("{}-controller", K::CONFIG_KIND.section());
    let ctx = Arc::new(DataStructureContext::<K>::new(
        Arc::new(KubeDataStructureClient::new(runner.client.clone())),
        clients,
        Arc::new(SecretSnapshotReader::new(runner.client.clone())),
        Arc::new(KubeEventPublisher::new(runner.client.clone(), &reporter)),
        runner.controller.clone(),
    ));

    tracing::info!("- {} controller", K::CONFIG_KIND);

    Box::pin(
        Controller::new(runner.api::<K>(), watcher_config())
            .shutdown_on_signal()
            .run(
                hz_datastructure::reconcile::<K>,
                hz_datastructure::error_policy::<K>,
                ctx,
            )
            .for_each(log_reconcile_result(K::CONFIG_KIND.section())),
    )
}

/// Build one controller per data-structure kind
pub fn build_data_structure_controllers(
    runner: &RunnerConfig,
    registry: Arc<ClientRegistry>,
) -> Vec<ControllerFuture> {
    let clients: Arc<dyn ClientProvider> = registry;
    vec![
        data_structure_controller::<ReplicatedMap>(runner, Arc::clone(&clients)),
        data_structure_controller::<Map>(runner, Arc::clone(&clients)),
        data_structure_controller::<MultiMap>(runner, Arc::clone(&clients)),
        data_structure_controller::<Queue>(runner, Arc::clone(&clients)),
        data_structure_controller::<Topic>(runner, clients),
    ]
}

/// Build the JetJob controller
pub fn build_jet_controller(
    runner: &RunnerConfig,
    registry: Arc<ClientRegistry>,
) -> Vec<ControllerFuture> {
    let ctx = Arc::new(JetJobContext {
        kube: Arc::new(KubeJetJobClient::new(runner.client.clone())),
        clients: registry,
        events: Arc::new(KubeEventPublisher::new(
            runner.client.clone(),
            "jetjob-controller",
        )),
        config: runner.controller.clone(),
    });

    tracing::info!("- JetJob controller");

    vec![Box::pin(
        Controller::new(runner.api::<JetJob>(), watcher_config())
            .shutdown_on_signal()
            .run(hz_jet::reconcile, hz_jet::error_policy, ctx)
            .for_each(log_reconcile_result("JetJob")),
    )]
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
