//! Data-structure reconciler
//!
//! States:
//!
//! ```text
//! Pending    --submit applied on every member-->     Persisting
//! Pending    --not ready / transport failure-->      Pending (requeued)
//! Pending    --rejected / unobservable outcome-->    Failed
//! Persisting --snapshot absent or different-->       Persisting (requeued)
//! Persisting --snapshot matches-->                   Persisted
//! Persisting --snapshot read error-->                Failed
//! ```
//!
//! A config is never resubmitted once it is `Persisting`: the read-back
//! detects both "not applied yet" and "already applied". A resource whose
//! generation moved past `status.observedGeneration` starts over at
//! `Pending`.
//!
//! Each invocation performs at most one client acquisition, one submit, one
//! snapshot read and one status write. Convergence errors are written to
//! status and never returned; only Kubernetes write failures reach
//! [`error_policy`].

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hz_client::{broadcast, classify, ClientProvider, ClusterRef};
use hz_common::annotations::{encode_spec, records_spec, LAST_SUCCESSFUL_SPEC_ANNOTATION};
use hz_common::crd::{DataStructureState, DataStructureStatus};
use hz_common::events::{actions, reasons, EventPublisher};
use hz_common::{ControllerConfig, Error, FINALIZER};
use hz_protocol::PerMemberStatus;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::{is_converged, ManagedDataStructure, SnapshotReader};

/// Kubernetes writes the reconciler performs on its own resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DataStructureClient<K: ManagedDataStructure>: Send + Sync {
    /// Write `status`, guarded by the resource version `obj` was read at.
    /// A stale write fails with 409.
    async fn patch_status(&self, obj: &K, status: &DataStructureStatus) -> Result<(), Error>;

    /// Add the finalizer and record `spec_json` as the last successful spec
    async fn mark_converged(&self, obj: &K, spec_json: &str) -> Result<(), Error>;

    /// Remove the finalizer
    async fn remove_finalizer(&self, obj: &K) -> Result<(), Error>;
}

/// [`DataStructureClient`] backed by the Kubernetes API
pub struct KubeDataStructureClient {
    client: Client,
}

impl KubeDataStructureClient {
    /// Create a client using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: ManagedDataStructure>(&self, obj: &K) -> Result<Api<K>, Error> {
        let namespace = obj.namespace().ok_or_else(|| {
            Error::internal_with_context("controller", format!("{} has no namespace", obj.name_any()))
        })?;
        Ok(Api::namespaced(self.client.clone(), &namespace))
    }
}

#[async_trait]
impl<K: ManagedDataStructure> DataStructureClient<K> for KubeDataStructureClient {
    async fn patch_status(&self, obj: &K, status: &DataStructureStatus) -> Result<(), Error> {
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": obj.resource_version() },
            "status": status,
        });
        self.api(obj)?
            .patch_status(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn mark_converged(&self, obj: &K, spec_json: &str) -> Result<(), Error> {
        let mut finalizers = obj.finalizers().to_vec();
        if !finalizers.iter().any(|f| f == FINALIZER) {
            finalizers.push(FINALIZER.to_string());
        }
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers,
                "annotations": { LAST_SUCCESSFUL_SPEC_ANNOTATION: spec_json },
            }
        });
        self.api(obj)?
            .patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn remove_finalizer(&self, obj: &K) -> Result<(), Error> {
        let finalizers: Vec<String> = obj
            .finalizers()
            .iter()
            .filter(|f| *f != FINALIZER)
            .cloned()
            .collect();
        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        match self
            .api(obj)?
            .patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Collaborators of one data-structure controller
pub struct DataStructureContext<K: ManagedDataStructure> {
    /// Writes to the reconciled resources
    pub kube: Arc<dyn DataStructureClient<K>>,
    /// Ready clients per target cluster
    pub clients: Arc<dyn ClientProvider>,
    /// Persisted config reader
    pub snapshots: Arc<dyn SnapshotReader>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Requeue delays and call deadlines
    pub config: ControllerConfig,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ManagedDataStructure> DataStructureContext<K> {
    /// Assemble a context
    pub fn new(
        kube: Arc<dyn DataStructureClient<K>>,
        clients: Arc<dyn ClientProvider>,
        snapshots: Arc<dyn SnapshotReader>,
        events: Arc<dyn EventPublisher>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            kube,
            clients,
            snapshots,
            events,
            config,
            _kind: PhantomData,
        }
    }
}

/// Reconcile one data-structure resource
#[instrument(skip(obj, ctx), fields(kind = %K::CONFIG_KIND, name = %obj.name_any()))]
pub async fn reconcile<K: ManagedDataStructure>(
    obj: Arc<K>,
    ctx: Arc<DataStructureContext<K>>,
) -> Result<Action, Error> {
    if obj.meta().deletion_timestamp.is_some() {
        if obj.finalizers().iter().any(|f| f == FINALIZER) {
            info!("Resource deleted, removing finalizer");
            ctx.kube.remove_finalizer(&obj).await?;
        }
        return Ok(Action::await_change());
    }

    let generation = obj.meta().generation;
    let current = obj.status().cloned().unwrap_or_default();
    let state = if current.observed_generation != generation {
        DataStructureState::Pending
    } else {
        current.state
    };
    debug!(state = %state, ?generation, "Reconciling data structure");

    match state {
        DataStructureState::Pending => submit(&*obj, &*ctx, &current).await,
        DataStructureState::Persisting => confirm(&*obj, &*ctx, &current).await,
        DataStructureState::Persisted => {
            ensure_converged_metadata(&*obj, &*ctx).await?;
            Ok(Action::await_change())
        }
        DataStructureState::Failed => Ok(Action::await_change()),
    }
}

/// Pending: acquire a client and broadcast the add-config request
async fn submit<K: ManagedDataStructure>(
    obj: &K,
    ctx: &DataStructureContext<K>,
    current: &DataStructureStatus,
) -> Result<Action, Error> {
    let cluster = obj.target();
    let client = match acquire(ctx, &cluster).await {
        Ok(client) => client,
        Err(e) => return settle_failure(obj, ctx, e, &PerMemberStatus::new()).await,
    };

    let desired = obj.desired_config();
    let request = desired.encode_request();
    let members = broadcast(
        client.as_ref(),
        &request,
        K::CONFIG_KIND.response_type(),
        ctx.config.call_timeout,
    )
    .await;

    match classify(&cluster, &members) {
        Ok(()) => {
            info!(cluster = %cluster, members = members.len(), "Config applied on every member");
            let status = DataStructureStatus {
                state: DataStructureState::Persisting,
                message: None,
                member_statuses: members.to_status_map(),
                observed_generation: obj.meta().generation,
            };
            write_status(obj, ctx, current, status).await?;
            Ok(Action::requeue(ctx.config.persisting_poll))
        }
        Err(e) => settle_failure(obj, ctx, e, &members).await,
    }
}

/// Persisting: read the persisted config back and compare
async fn confirm<K: ManagedDataStructure>(
    obj: &K,
    ctx: &DataStructureContext<K>,
    current: &DataStructureStatus,
) -> Result<Action, Error> {
    let cluster = obj.target();
    let desired = obj.desired_config();

    let snapshot = match tokio::time::timeout(
        ctx.config.call_timeout,
        ctx.snapshots
            .read_snapshot(&cluster, K::CONFIG_KIND, desired.name()),
    )
    .await
    {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(e)) => {
            let e = Error::observation(format!("reading persisted config: {e}"));
            return settle_failure(obj, ctx, e, &PerMemberStatus::new()).await;
        }
        Err(_) => {
            let e = Error::observation(format!(
                "reading persisted config timed out after {}s",
                ctx.config.call_timeout.as_secs()
            ));
            return settle_failure(obj, ctx, e, &PerMemberStatus::new()).await;
        }
    };

    if !is_converged(&desired, snapshot.as_ref()) {
        debug!(present = snapshot.is_some(), "Persisted config does not match yet");
        return Ok(Action::requeue(ctx.config.persisting_poll));
    }

    info!(cluster = %cluster, "Config confirmed persisted");
    let status = DataStructureStatus {
        state: DataStructureState::Persisted,
        message: None,
        member_statuses: current.member_statuses.clone(),
        observed_generation: obj.meta().generation,
    };
    write_status(obj, ctx, current, status).await?;
    ensure_converged_metadata(obj, ctx).await?;
    ctx.events
        .publish(
            &obj.object_ref(&()),
            EventType::Normal,
            reasons::CONFIG_PERSISTED,
            actions::RECONCILE,
            Some(format!(
                "{} {} persisted on {}",
                K::CONFIG_KIND,
                desired.name(),
                cluster
            )),
        )
        .await;
    Ok(Action::await_change())
}

async fn acquire<K: ManagedDataStructure>(
    ctx: &DataStructureContext<K>,
    cluster: &ClusterRef,
) -> Result<Arc<dyn hz_client::ClusterClient>, Error> {
    match tokio::time::timeout(ctx.config.call_timeout, ctx.clients.acquire(cluster)).await {
        Ok(result) => result,
        Err(_) => Err(Error::not_ready(
            cluster.to_string(),
            "timed out waiting for a client",
        )),
    }
}

/// Record a failed attempt: retryable errors stay `Pending` and requeue,
/// anything else is `Failed`
async fn settle_failure<K: ManagedDataStructure>(
    obj: &K,
    ctx: &DataStructureContext<K>,
    error: Error,
    members: &PerMemberStatus,
) -> Result<Action, Error> {
    let current = obj.status().cloned().unwrap_or_default();
    let retryable = error.is_retryable();
    let state = if retryable {
        DataStructureState::Pending
    } else {
        DataStructureState::Failed
    };
    let status = DataStructureStatus {
        state,
        message: Some(error.to_string()),
        member_statuses: if members.is_empty() {
            current.member_statuses.clone()
        } else {
            members.to_status_map()
        },
        observed_generation: obj.meta().generation,
    };
    write_status(obj, ctx, &current, status).await?;

    if retryable {
        let delay = requeue_delay(&ctx.config, &error);
        warn!(error = %error, delay_secs = delay.as_secs(), "Submit failed, will retry");
        return Ok(Action::requeue(delay));
    }

    warn!(error = %error, "Data structure failed");
    ctx.events
        .publish(
            &obj.object_ref(&()),
            EventType::Warning,
            reasons::CONVERGENCE_FAILED,
            actions::SUBMIT,
            Some(error.to_string()),
        )
        .await;
    Ok(Action::await_change())
}

fn requeue_delay(config: &ControllerConfig, error: &Error) -> Duration {
    match error {
        Error::NotReady { .. } => config.cluster_not_ready,
        _ => config.submit_retry,
    }
}

/// Finalizer and last-successful-spec annotation for a persisted resource
async fn ensure_converged_metadata<K: ManagedDataStructure>(
    obj: &K,
    ctx: &DataStructureContext<K>,
) -> Result<(), Error> {
    let has_finalizer = obj.finalizers().iter().any(|f| f == FINALIZER);
    if has_finalizer && records_spec(obj.meta().annotations.as_ref(), obj.spec()) {
        return Ok(());
    }
    ctx.kube.mark_converged(obj, &encode_spec(obj.spec())?).await
}

/// Write status unless it is unchanged
async fn write_status<K: ManagedDataStructure>(
    obj: &K,
    ctx: &DataStructureContext<K>,
    current: &DataStructureStatus,
    status: DataStructureStatus,
) -> Result<(), Error> {
    if obj.status().is_some() && *current == status {
        debug!("Status unchanged, skipping update");
        return Ok(());
    }
    ctx.kube.patch_status(obj, &status).await
}

/// Requeue after a failed status or metadata write
pub fn error_policy<K: ManagedDataStructure>(
    obj: Arc<K>,
    error: &Error,
    ctx: Arc<DataStructureContext<K>>,
) -> Action {
    warn!(
        kind = %K::CONFIG_KIND,
        name = %obj.name_any(),
        error = %error,
        "Data structure reconciliation failed"
    );
    if error.is_status_conflict() {
        // Stale read; the next event carries the fresh object
        return Action::requeue(ctx.config.persisting_poll);
    }
    Action::requeue(ctx.config.submit_retry)
}
