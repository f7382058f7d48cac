//! JetJob reconciler
//!
//! Phases:
//!
//! ```text
//! Pending    --upload accepted / job already listed-->  Persisting
//! Pending    --not ready / transport failure-->         Pending (requeued)
//! Pending    --rejected / unobservable outcome-->       Failed
//! Persisting --job not listed yet-->                    Persisting (requeued)
//! Persisting --job list unreadable-->                   Failed
//! Persisting --job listed-->                            Running | Suspended | terminal
//! Running    <--suspend / resume-->                     Suspended
//! Running    --cancel / finish / failure-->             Cancelled | Completed | Failed
//! ```
//!
//! A job is submitted at most once per cycle: a job already listed under
//! the resource's name is adopted instead of resubmitted. Finished runs and
//! jobs listed before the recorded upload time are never adopted. A `Failed`
//! resource that never got a job id starts over when its generation moves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hz_client::{expect_applied, invoke_with_deadline, ClientProvider, ClusterClient, ClusterRef};
use hz_common::annotations::{encode_spec, records_spec, LAST_SUCCESSFUL_SPEC_ANNOTATION};
use hz_common::crd::{JetJob, JetJobPhase, JetJobState, JetJobStatus};
use hz_common::events::{actions, reasons, EventPublisher};
use hz_common::{ControllerConfig, Error, FINALIZER};
use hz_protocol::codec::jet::{
    decode_get_job_summary_list, encode_get_job_summary_list, encode_resume_job,
    encode_terminate_job, encode_upload_job_metadata, JobSummary, RESUME_JOB_REQUEST,
    TERMINATE_JOB_REQUEST, UPLOAD_JOB_METADATA_REQUEST,
};
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::lifecycle::{control_for, find_job, observed_phase, timestamp, JobControl};

/// Kubernetes writes the reconciler performs on JetJob resources
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JetJobClient: Send + Sync {
    /// Write `status`, guarded by the resource version `jj` was read at
    async fn patch_status(&self, jj: &JetJob, status: &JetJobStatus) -> Result<(), Error>;

    /// Add the finalizer and record `spec_json` as the last successful spec
    async fn mark_converged(&self, jj: &JetJob, spec_json: &str) -> Result<(), Error>;

    /// Remove the finalizer
    async fn remove_finalizer(&self, jj: &JetJob) -> Result<(), Error>;
}

/// [`JetJobClient`] backed by the Kubernetes API
pub struct KubeJetJobClient {
    client: Client,
}

impl KubeJetJobClient {
    /// Create a client using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, jj: &JetJob) -> Api<JetJob> {
        Api::namespaced(self.client.clone(), &jj.namespace().unwrap_or_default())
    }
}

#[async_trait]
impl JetJobClient for KubeJetJobClient {
    async fn patch_status(&self, jj: &JetJob, status: &JetJobStatus) -> Result<(), Error> {
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": jj.resource_version() },
            "status": status,
        });
        self.api(jj)
            .patch_status(&jj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn mark_converged(&self, jj: &JetJob, spec_json: &str) -> Result<(), Error> {
        let mut finalizers = jj.finalizers().to_vec();
        if !finalizers.iter().any(|f| f == FINALIZER) {
            finalizers.push(FINALIZER.to_string());
        }
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers,
                "annotations": { LAST_SUCCESSFUL_SPEC_ANNOTATION: spec_json },
            }
        });
        self.api(jj)
            .patch(&jj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn remove_finalizer(&self, jj: &JetJob) -> Result<(), Error> {
        let finalizers: Vec<String> = jj
            .finalizers()
            .iter()
            .filter(|f| *f != FINALIZER)
            .cloned()
            .collect();
        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        match self
            .api(jj)
            .patch(&jj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Collaborators of the JetJob controller
pub struct JetJobContext {
    /// Writes to JetJob resources
    pub kube: Arc<dyn JetJobClient>,
    /// Ready clients per target cluster
    pub clients: Arc<dyn ClientProvider>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Requeue delays and call deadlines
    pub config: ControllerConfig,
}

/// Reconcile one JetJob
#[instrument(skip(jj, ctx), fields(name = %jj.name_any(), job = %jj.job_name()))]
pub async fn reconcile(jj: Arc<JetJob>, ctx: Arc<JetJobContext>) -> Result<Action, Error> {
    if jj.meta().deletion_timestamp.is_some() {
        if jj.finalizers().iter().any(|f| f == FINALIZER) {
            info!("JetJob deleted, removing finalizer");
            ctx.kube.remove_finalizer(&jj).await?;
        }
        return Ok(Action::await_change());
    }

    let current = jj.status.clone().unwrap_or_default();
    let phase = if current.observed_generation != jj.meta().generation
        && current.job_id.is_none()
        && matches!(current.phase, JetJobPhase::Failed)
    {
        JetJobPhase::Pending
    } else {
        current.phase
    };
    debug!(phase = %phase, desired = %jj.spec.state, "Reconciling JetJob");

    match phase {
        JetJobPhase::Pending => submit(&jj, &ctx, &current).await,
        JetJobPhase::Persisting | JetJobPhase::Running | JetJobPhase::Suspended => {
            track(&jj, &ctx, &current).await
        }
        JetJobPhase::Completed | JetJobPhase::Cancelled | JetJobPhase::Failed => {
            Ok(Action::await_change())
        }
    }
}

fn target(jj: &JetJob) -> ClusterRef {
    ClusterRef::new(
        jj.namespace().unwrap_or_default(),
        jj.spec.hazelcast_resource_name.clone(),
    )
}

/// Pending: upload the job metadata unless the cluster already runs it
async fn submit(jj: &JetJob, ctx: &JetJobContext, current: &JetJobStatus) -> Result<Action, Error> {
    let cluster = target(jj);
    let client = match acquire(ctx, &cluster).await {
        Ok(client) => client,
        Err(e) => return settle_failure(jj, ctx, current, JetJobPhase::Pending, e).await,
    };

    let summaries = match list_jobs(client.as_ref(), &cluster, ctx).await {
        Ok(summaries) => summaries,
        Err(e) => return settle_failure(jj, ctx, current, JetJobPhase::Pending, e).await,
    };
    let job_name = jj.job_name();
    let existing = find_job(&summaries, &job_name, None, None);

    if let Some(summary) = existing {
        info!(job_id = summary.job_id, "Job already on the cluster, adopting it");
    } else {
        let request = encode_upload_job_metadata(&jj.submission());
        let outcome = match invoke_with_deadline(
            client.as_ref(),
            &cluster,
            request,
            ctx.config.call_timeout,
        )
        .await
        {
            Ok(response) => expect_applied(&cluster, &response, UPLOAD_JOB_METADATA_REQUEST + 1),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            return settle_failure(jj, ctx, current, JetJobPhase::Pending, e).await;
        }
        info!(cluster = %cluster, jar = %jj.spec.jar_name, "Job submitted");
    }

    // Until the cluster lists the job, the upload time marks which listed
    // jobs can be ours
    let submission_time = match existing {
        Some(summary) => timestamp(summary.submission_time),
        None => Some(Utc::now()),
    };
    let status = JetJobStatus {
        phase: JetJobPhase::Persisting,
        job_id: existing.map(|s| s.job_id),
        submission_time,
        completion_time: None,
        failure_text: None,
        message: None,
        applied_state: Some(JetJobState::Running),
        observed_generation: jj.meta().generation,
    };
    write_status(jj, ctx, current, status).await?;
    Ok(Action::requeue(ctx.config.persisting_poll))
}

/// Persisting, Running, Suspended: follow the listed job and apply the
/// requested run state
async fn track(jj: &JetJob, ctx: &JetJobContext, current: &JetJobStatus) -> Result<Action, Error> {
    let cluster = target(jj);
    let client = match acquire(ctx, &cluster).await {
        Ok(client) => client,
        Err(e) => return settle_failure(jj, ctx, current, current.phase, e).await,
    };
    let summaries = match list_jobs(client.as_ref(), &cluster, ctx).await {
        Ok(summaries) => summaries,
        Err(e) if current.phase == JetJobPhase::Persisting => {
            let e = Error::observation(format!(
                "could not confirm the job submission on {cluster}: {e}"
            ));
            return settle_failure(jj, ctx, current, current.phase, e).await;
        }
        Err(e) => return settle_failure(jj, ctx, current, current.phase, e).await,
    };

    let uploaded_at = current.job_id.is_none().then_some(current.submission_time).flatten();
    let Some(summary) = find_job(&summaries, &jj.job_name(), current.job_id, uploaded_at) else {
        if current.phase == JetJobPhase::Persisting {
            debug!("Submitted job not listed yet");
            return Ok(Action::requeue(ctx.config.persisting_poll));
        }
        let e = Error::observation(format!(
            "job {} is no longer listed on {cluster}",
            current.job_id.unwrap_or_default()
        ));
        return settle_failure(jj, ctx, current, current.phase, e).await;
    };

    let observed = observed_phase(summary, current.applied_state).unwrap_or(current.phase);
    let mut status = summary_status(jj, current, summary, observed);

    let mut controlled = false;
    if !observed.is_terminal() && observed != JetJobPhase::Persisting {
        if let Some(control) = control_for(jj.spec.state, current.applied_state, observed) {
            if let Err(e) = send_control(client.as_ref(), &cluster, ctx, summary.job_id, control).await
            {
                return settle_failure(jj, ctx, current, observed, e).await;
            }
            info!(job_id = summary.job_id, ?control, desired = %jj.spec.state, "Job control sent");
            ctx.events
                .publish(
                    &jj.object_ref(&()),
                    EventType::Normal,
                    reasons::JOB_STATE_REQUESTED,
                    actions::JOB_CONTROL,
                    Some(format!("requested {} for job {}", jj.spec.state, summary.job_id)),
                )
                .await;
            controlled = true;
        }
        status.applied_state = Some(jj.spec.state);
    }

    write_status(jj, ctx, current, status).await?;
    announce_transition(jj, ctx, current.phase, observed, summary).await?;

    if observed.is_terminal() {
        return Ok(Action::await_change());
    }
    if controlled || observed == JetJobPhase::Persisting {
        return Ok(Action::requeue(ctx.config.persisting_poll));
    }
    Ok(Action::requeue(ctx.config.job_poll))
}

fn summary_status(
    jj: &JetJob,
    current: &JetJobStatus,
    summary: &JobSummary,
    phase: JetJobPhase,
) -> JetJobStatus {
    JetJobStatus {
        phase,
        job_id: Some(summary.job_id),
        submission_time: timestamp(summary.submission_time),
        completion_time: timestamp(summary.completion_time),
        failure_text: summary.failure_text.clone(),
        message: None,
        applied_state: current.applied_state,
        observed_generation: jj.meta().generation,
    }
}

/// Metadata and Events for a phase change
async fn announce_transition(
    jj: &JetJob,
    ctx: &JetJobContext,
    previous: JetJobPhase,
    observed: JetJobPhase,
    summary: &JobSummary,
) -> Result<(), Error> {
    if observed == JetJobPhase::Running {
        ensure_converged_metadata(jj, ctx).await?;
    }
    if observed == previous {
        return Ok(());
    }
    match observed {
        JetJobPhase::Running => {
            info!(job_id = summary.job_id, "Job running");
            ctx.events
                .publish(
                    &jj.object_ref(&()),
                    EventType::Normal,
                    reasons::JOB_RUNNING,
                    actions::RECONCILE,
                    Some(format!("job {} running", summary.job_id)),
                )
                .await;
        }
        phase if phase.is_terminal() => {
            let type_ = if phase == JetJobPhase::Failed {
                EventType::Warning
            } else {
                EventType::Normal
            };
            info!(job_id = summary.job_id, phase = %phase, "Job finished");
            ctx.events
                .publish(
                    &jj.object_ref(&()),
                    type_,
                    reasons::JOB_FINISHED,
                    actions::RECONCILE,
                    Some(match &summary.failure_text {
                        Some(text) => format!("job {} {phase}: {text}", summary.job_id),
                        None => format!("job {} {phase}", summary.job_id),
                    }),
                )
                .await;
        }
        _ => {}
    }
    Ok(())
}

async fn acquire(ctx: &JetJobContext, cluster: &ClusterRef) -> Result<Arc<dyn ClusterClient>, Error> {
    match tokio::time::timeout(ctx.config.call_timeout, ctx.clients.acquire(cluster)).await {
        Ok(result) => result,
        Err(_) => Err(Error::not_ready(
            cluster.to_string(),
            "timed out waiting for a client",
        )),
    }
}

async fn list_jobs(
    client: &dyn ClusterClient,
    cluster: &ClusterRef,
    ctx: &JetJobContext,
) -> Result<Vec<JobSummary>, Error> {
    let response = invoke_with_deadline(
        client,
        cluster,
        encode_get_job_summary_list(),
        ctx.config.call_timeout,
    )
    .await?;
    Ok(decode_get_job_summary_list(&response)?)
}

async fn send_control(
    client: &dyn ClusterClient,
    cluster: &ClusterRef,
    ctx: &JetJobContext,
    job_id: i64,
    control: JobControl,
) -> Result<(), Error> {
    let (request, request_type) = match control {
        JobControl::Terminate(mode) => (encode_terminate_job(job_id, mode), TERMINATE_JOB_REQUEST),
        JobControl::Resume => (encode_resume_job(job_id), RESUME_JOB_REQUEST),
    };
    let response = invoke_with_deadline(client, cluster, request, ctx.config.call_timeout).await?;
    expect_applied(cluster, &response, request_type + 1)
}

/// Record a failed attempt: retryable errors keep `phase` and requeue,
/// anything else is `Failed`
async fn settle_failure(
    jj: &JetJob,
    ctx: &JetJobContext,
    current: &JetJobStatus,
    phase: JetJobPhase,
    error: Error,
) -> Result<Action, Error> {
    let retryable = error.is_retryable();
    let status = JetJobStatus {
        phase: if retryable { phase } else { JetJobPhase::Failed },
        message: Some(error.to_string()),
        observed_generation: jj.meta().generation,
        ..current.clone()
    };
    write_status(jj, ctx, current, status).await?;

    if retryable {
        let delay = requeue_delay(&ctx.config, &error);
        warn!(error = %error, delay_secs = delay.as_secs(), "JetJob step failed, will retry");
        return Ok(Action::requeue(delay));
    }

    warn!(error = %error, "JetJob failed");
    ctx.events
        .publish(
            &jj.object_ref(&()),
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

async fn ensure_converged_metadata(jj: &JetJob, ctx: &JetJobContext) -> Result<(), Error> {
    let has_finalizer = jj.finalizers().iter().any(|f| f == FINALIZER);
    if has_finalizer && records_spec(jj.meta().annotations.as_ref(), &jj.spec) {
        return Ok(());
    }
    ctx.kube.mark_converged(jj, &encode_spec(&jj.spec)?).await
}

/// Write status unless it is unchanged
async fn write_status(
    jj: &JetJob,
    ctx: &JetJobContext,
    current: &JetJobStatus,
    status: JetJobStatus,
) -> Result<(), Error> {
    if jj.status.is_some() && *current == status {
        debug!("Status unchanged, skipping update");
        return Ok(());
    }
    ctx.kube.patch_status(jj, &status).await
}

/// Requeue after a failed status or metadata write
pub fn error_policy(jj: Arc<JetJob>, error: &Error, ctx: Arc<JetJobContext>) -> Action {
    warn!(name = %jj.name_any(), error = %error, "JetJob reconciliation failed");
    if error.is_status_conflict() {
        return Action::requeue(ctx.config.persisting_poll);
    }
    Action::requeue(ctx.config.submit_retry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hz_client::TransportError;
    use hz_common::crd::JetJobSpec;
    use hz_common::events::NoopEventPublisher;
    use hz_protocol::codec::error::{encode_error_response, ErrorHolder};
    use hz_protocol::codec::jet::{
        encode_ack_response, encode_job_summary_list_response, request_job_id, JobStatus,
        TerminateMode, GET_JOB_SUMMARY_LIST_REQUEST,
    };
    use hz_protocol::ClientMessage;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use mockall::mock;
    use std::sync::Mutex;

    mock! {
        pub Provider {}

        #[async_trait::async_trait]
        impl ClientProvider for Provider {
            async fn acquire(&self, cluster: &ClusterRef) -> Result<Arc<dyn ClusterClient>, Error>;
        }
    }

    mock! {
        pub Cluster {}

        #[async_trait::async_trait]
        impl ClusterClient for Cluster {
            fn members(&self) -> Vec<String>;
            fn connected_members(&self) -> Vec<String>;
            async fn invoke_on_member(
                &self,
                member: &str,
                request: ClientMessage,
            ) -> Result<ClientMessage, TransportError>;
            async fn invoke(&self, request: ClientMessage) -> Result<ClientMessage, TransportError>;
        }
    }

    const JOB_ID: i64 = 7;

    // =========================================================================
    // Test Helpers
    // =========================================================================

    /// Jobs the fake cluster lists, and every request type it received
    #[derive(Default)]
    struct FakeJet {
        jobs: Mutex<Vec<JobSummary>>,
        requests: Mutex<Vec<i32>>,
        reject_upload: Option<&'static str>,
    }

    impl FakeJet {
        fn with_job(status: JobStatus) -> Arc<Self> {
            let fake = Self::default();
            fake.jobs.lock().unwrap().push(running_job(status));
            Arc::new(fake)
        }

        fn requests(&self) -> Vec<i32> {
            self.requests.lock().unwrap().clone()
        }

        fn answer(&self, request: &ClientMessage) -> ClientMessage {
            let message_type = request.message_type().unwrap();
            self.requests.lock().unwrap().push(message_type);
            match message_type {
                GET_JOB_SUMMARY_LIST_REQUEST => {
                    encode_job_summary_list_response(&self.jobs.lock().unwrap())
                }
                UPLOAD_JOB_METADATA_REQUEST => {
                    if let Some(class) = self.reject_upload {
                        return encode_error_response(&[ErrorHolder::new(
                            9,
                            class,
                            Some("jar not found on member"),
                        )]);
                    }
                    let mut job = running_job(JobStatus::Starting);
                    job.submission_time = Utc::now().timestamp_millis();
                    self.jobs.lock().unwrap().push(job);
                    encode_ack_response(message_type)
                }
                TERMINATE_JOB_REQUEST | RESUME_JOB_REQUEST => {
                    assert_eq!(request_job_id(request).unwrap(), JOB_ID);
                    encode_ack_response(message_type)
                }
                other => panic!("unexpected request type {other:#x}"),
            }
        }

        fn set_status(&self, status: JobStatus) {
            for job in self.jobs.lock().unwrap().iter_mut() {
                job.status = status;
            }
        }
    }

    fn running_job(status: JobStatus) -> JobSummary {
        JobSummary {
            light_job: false,
            job_id: JOB_ID,
            execution_id: 70,
            name_or_id: "word-count".into(),
            status,
            submission_time: 1_700_000_000_000,
            completion_time: 0,
            failure_text: None,
        }
    }

    fn provider_with(fake: Arc<FakeJet>) -> MockProvider {
        let mut provider = MockProvider::new();
        provider.expect_acquire().returning(move |_| {
            let fake = Arc::clone(&fake);
            let mut cluster = MockCluster::new();
            cluster
                .expect_invoke()
                .returning(move |request| Ok(fake.answer(&request)));
            Ok(Arc::new(cluster) as Arc<dyn ClusterClient>)
        });
        provider
    }

    fn word_count(status: Option<JetJobStatus>) -> JetJob {
        let spec: JetJobSpec = serde_json::from_value(serde_json::json!({
            "hazelcastResourceName": "hazelcast",
            "jarName": "word-count.jar",
        }))
        .unwrap();
        let mut jj = JetJob::new("word-count", spec);
        jj.metadata = ObjectMeta {
            name: Some("word-count".into()),
            namespace: Some("default".into()),
            generation: Some(1),
            resource_version: Some("12".into()),
            ..Default::default()
        };
        jj.status = status;
        jj
    }

    fn with_status(mut jj: JetJob, status: &JetJobStatus) -> JetJob {
        jj.status = Some(status.clone());
        jj
    }

    fn recording_kube(writes: Arc<Mutex<Vec<JetJobStatus>>>) -> MockJetJobClient {
        let mut kube = MockJetJobClient::new();
        kube.expect_patch_status().returning(move |_, status| {
            writes.lock().unwrap().push(status.clone());
            Ok(())
        });
        kube.expect_mark_converged().returning(|_, _| Ok(()));
        kube
    }

    fn context(kube: MockJetJobClient, provider: MockProvider) -> Arc<JetJobContext> {
        Arc::new(JetJobContext {
            kube: Arc::new(kube),
            clients: Arc::new(provider),
            events: Arc::new(NoopEventPublisher),
            config: ControllerConfig::default(),
        })
    }

    fn last(writes: &Arc<Mutex<Vec<JetJobStatus>>>) -> JetJobStatus {
        writes.lock().unwrap().last().cloned().unwrap()
    }

    // =========================================================================
    // Story: Submit, confirm, run
    // =========================================================================
    //
    // Pending uploads the job metadata and moves to Persisting. While the
    // cluster reports the job as starting it stays Persisting; once it is
    // running the resource is Running with the cluster's job id and the
    // converged metadata is recorded.

    #[tokio::test]
    async fn story_submit_confirm_run() {
        let fake = Arc::new(FakeJet::default());
        let writes = Arc::new(Mutex::new(Vec::new()));

        // Chapter 1: Pending -> Persisting
        let jj = word_count(None);
        let ctx = context(recording_kube(writes.clone()), provider_with(fake.clone()));
        let action = reconcile(Arc::new(jj.clone()), ctx).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(1)));
        assert_eq!(
            fake.requests(),
            vec![GET_JOB_SUMMARY_LIST_REQUEST, UPLOAD_JOB_METADATA_REQUEST]
        );
        let persisting = last(&writes);
        assert_eq!(persisting.phase, JetJobPhase::Persisting);
        assert_eq!(persisting.applied_state, Some(JetJobState::Running));

        // Chapter 2: job starting, stay Persisting but learn the id
        let jj = with_status(jj, &persisting);
        let ctx = context(recording_kube(writes.clone()), provider_with(fake.clone()));
        let action = reconcile(Arc::new(jj.clone()), ctx).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(1)));
        let starting = last(&writes);
        assert_eq!(starting.phase, JetJobPhase::Persisting);
        assert_eq!(starting.job_id, Some(JOB_ID));

        // Chapter 3: job running
        fake.set_status(JobStatus::Running);
        let jj = with_status(jj, &starting);
        let mut kube = MockJetJobClient::new();
        let w = writes.clone();
        kube.expect_patch_status().returning(move |_, status| {
            w.lock().unwrap().push(status.clone());
            Ok(())
        });
        kube.expect_mark_converged()
            .times(1)
            .withf(|_, spec_json| spec_json.contains("word-count.jar"))
            .returning(|_, _| Ok(()));
        let ctx = context(kube, provider_with(fake.clone()));
        let action = reconcile(Arc::new(jj), ctx).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(15)));
        let running = last(&writes);
        assert_eq!(running.phase, JetJobPhase::Running);
        assert!(running.submission_time.is_some());
        assert_eq!(
            fake.requests()
                .iter()
                .filter(|t| **t == UPLOAD_JOB_METADATA_REQUEST)
                .count(),
            1,
            "submitted exactly once"
        );
    }

    #[tokio::test]
    async fn listed_job_is_adopted_not_resubmitted() {
        let fake = FakeJet::with_job(JobStatus::Running);
        let writes = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(recording_kube(writes.clone()), provider_with(fake.clone()));

        reconcile(Arc::new(word_count(None)), ctx).await.unwrap();

        assert_eq!(fake.requests(), vec![GET_JOB_SUMMARY_LIST_REQUEST]);
        let status = last(&writes);
        assert_eq!(status.phase, JetJobPhase::Persisting);
        assert_eq!(status.job_id, Some(JOB_ID));
    }

    #[tokio::test]
    async fn finished_run_is_not_mistaken_for_a_new_submission() {
        // An earlier run of the same job completed; the new upload is not
        // listed yet
        let fake = FakeJet::with_job(JobStatus::Completed);
        let writes = Arc::new(Mutex::new(Vec::new()));
        let uploaded = JetJobStatus {
            phase: JetJobPhase::Persisting,
            applied_state: Some(JetJobState::Running),
            observed_generation: Some(1),
            ..Default::default()
        };
        let ctx = context(recording_kube(writes.clone()), provider_with(fake.clone()));

        let action = reconcile(Arc::new(word_count(Some(uploaded.clone()))), ctx)
            .await
            .unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(1)));
        assert!(writes.lock().unwrap().is_empty(), "status left as Persisting");

        // A live run from before the recorded upload is not ours either
        fake.set_status(JobStatus::Running);
        let since_upload = JetJobStatus {
            submission_time: Some(Utc::now()),
            ..uploaded
        };
        let ctx = context(recording_kube(writes.clone()), provider_with(fake));

        reconcile(Arc::new(word_count(Some(since_upload))), ctx)
            .await
            .unwrap();

        assert!(writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_job_list_fails_a_persisting_job() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut provider = MockProvider::new();
        provider.expect_acquire().returning(|_| {
            let mut cluster = MockCluster::new();
            cluster
                .expect_invoke()
                .returning(|_| Err(TransportError::Closed("10.0.0.1:5701".into())));
            Ok(Arc::new(cluster) as Arc<dyn ClusterClient>)
        });
        let ctx = context(recording_kube(writes.clone()), provider);
        let jj = word_count(Some(JetJobStatus {
            phase: JetJobPhase::Persisting,
            applied_state: Some(JetJobState::Running),
            observed_generation: Some(1),
            ..Default::default()
        }));

        let action = reconcile(Arc::new(jj), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        let status = last(&writes);
        assert_eq!(status.phase, JetJobPhase::Failed);
        assert!(status.message.unwrap().contains("could not confirm"));
    }

    // =========================================================================
    // Story: Run-state changes
    // =========================================================================

    fn tracked(phase: JetJobPhase, applied: JetJobState, desired: JetJobState) -> JetJob {
        let mut jj = word_count(Some(JetJobStatus {
            phase,
            job_id: Some(JOB_ID),
            applied_state: Some(applied),
            observed_generation: Some(1),
            ..Default::default()
        }));
        jj.spec.state = desired;
        jj
    }

    #[tokio::test]
    async fn story_suspend_then_resume() {
        let fake = FakeJet::with_job(JobStatus::Running);
        let writes = Arc::new(Mutex::new(Vec::new()));

        // Chapter 1: Running, Suspended requested
        let jj = tracked(JetJobPhase::Running, JetJobState::Running, JetJobState::Suspended);
        let ctx = context(recording_kube(writes.clone()), provider_with(fake.clone()));
        let action = reconcile(Arc::new(jj), ctx).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(1)));
        assert!(fake.requests().contains(&TERMINATE_JOB_REQUEST));
        assert_eq!(last(&writes).applied_state, Some(JetJobState::Suspended));

        // Chapter 2: cluster reports Suspended, nothing else sent
        fake.set_status(JobStatus::Suspended);
        let jj = tracked(JetJobPhase::Running, JetJobState::Suspended, JetJobState::Suspended);
        let ctx = context(recording_kube(writes.clone()), provider_with(fake.clone()));
        reconcile(Arc::new(jj), ctx).await.unwrap();

        assert_eq!(last(&writes).phase, JetJobPhase::Suspended);
        let terminates = fake
            .requests()
            .iter()
            .filter(|t| **t == TERMINATE_JOB_REQUEST)
            .count();
        assert_eq!(terminates, 1);

        // Chapter 3: Running requested again, resume
        let jj = tracked(JetJobPhase::Suspended, JetJobState::Suspended, JetJobState::Running);
        let ctx = context(recording_kube(writes.clone()), provider_with(fake.clone()));
        reconcile(Arc::new(jj), ctx).await.unwrap();

        assert_eq!(fake.requests().last(), Some(&RESUME_JOB_REQUEST));
        assert_eq!(last(&writes).applied_state, Some(JetJobState::Running));
    }

    #[tokio::test]
    async fn cancellation_ends_in_cancelled() {
        let fake = FakeJet::with_job(JobStatus::Failed);
        fake.jobs.lock().unwrap()[0].failure_text =
            Some("java.util.concurrent.CancellationException".into());
        let writes = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(recording_kube(writes.clone()), provider_with(fake.clone()));

        let jj = tracked(JetJobPhase::Running, JetJobState::Canceled, JetJobState::Canceled);
        let action = reconcile(Arc::new(jj), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        let status = last(&writes);
        assert_eq!(status.phase, JetJobPhase::Cancelled);
        assert!(status.failure_text.unwrap().contains("Cancellation"));
        assert!(!fake.requests().contains(&TERMINATE_JOB_REQUEST));
    }

    #[tokio::test]
    async fn cancel_request_sends_cancel_graceful() {
        let fake = Arc::new(FakeJet::default());
        fake.jobs.lock().unwrap().push(running_job(JobStatus::Running));
        let sent = Arc::new(Mutex::new(None));
        let mut provider = MockProvider::new();
        let (f, s) = (fake.clone(), sent.clone());
        provider.expect_acquire().returning(move |_| {
            let (f, s) = (f.clone(), s.clone());
            let mut cluster = MockCluster::new();
            cluster.expect_invoke().returning(move |request| {
                if request.message_type().unwrap() == TERMINATE_JOB_REQUEST {
                    *s.lock().unwrap() = Some(request.clone());
                }
                Ok(f.answer(&request))
            });
            Ok(Arc::new(cluster) as Arc<dyn ClusterClient>)
        });
        let ctx = context(recording_kube(Arc::new(Mutex::new(Vec::new()))), provider);

        let jj = tracked(JetJobPhase::Running, JetJobState::Running, JetJobState::Canceled);
        reconcile(Arc::new(jj), ctx).await.unwrap();

        let request = sent.lock().unwrap().clone().unwrap();
        assert_eq!(
            request,
            encode_terminate_job(JOB_ID, TerminateMode::CancelGraceful)
        );
    }

    // =========================================================================
    // Story: Failures
    // =========================================================================

    #[tokio::test]
    async fn cluster_not_ready_stays_pending() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut provider = MockProvider::new();
        provider
            .expect_acquire()
            .returning(|cluster| Err(Error::not_ready(cluster.to_string(), "no client connected")));
        let ctx = context(recording_kube(writes.clone()), provider);

        let action = reconcile(Arc::new(word_count(None)), ctx).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(30)));
        let status = last(&writes);
        assert_eq!(status.phase, JetJobPhase::Pending);
        assert!(status.message.unwrap().contains("not ready"));
    }

    #[tokio::test]
    async fn rejected_upload_fails() {
        let fake = Arc::new(FakeJet {
            reject_upload: Some("java.lang.IllegalArgumentException"),
            ..Default::default()
        });
        let writes = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(recording_kube(writes.clone()), provider_with(fake));

        let action = reconcile(Arc::new(word_count(None)), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        let status = last(&writes);
        assert_eq!(status.phase, JetJobPhase::Failed);
        assert!(status.message.unwrap().contains("IllegalArgumentException"));
    }

    #[tokio::test]
    async fn vanished_job_fails() {
        let fake = Arc::new(FakeJet::default());
        let writes = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(recording_kube(writes.clone()), provider_with(fake));

        let jj = tracked(JetJobPhase::Running, JetJobState::Running, JetJobState::Running);
        let action = reconcile(Arc::new(jj), ctx).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(last(&writes).phase, JetJobPhase::Failed);
    }

    #[tokio::test]
    async fn failed_without_job_retries_after_spec_change() {
        let fake = Arc::new(FakeJet::default());
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut jj = word_count(Some(JetJobStatus {
            phase: JetJobPhase::Failed,
            observed_generation: Some(1),
            ..Default::default()
        }));

        // Same generation: terminal
        let mut kube = MockJetJobClient::new();
        kube.expect_patch_status().never();
        let ctx = context(kube, provider_with(fake.clone()));
        assert_eq!(
            reconcile(Arc::new(jj.clone()), ctx).await.unwrap(),
            Action::await_change()
        );

        // New generation: submitted again
        jj.metadata.generation = Some(2);
        let ctx = context(recording_kube(writes.clone()), provider_with(fake.clone()));
        reconcile(Arc::new(jj), ctx).await.unwrap();
        assert!(fake.requests().contains(&UPLOAD_JOB_METADATA_REQUEST));
        assert_eq!(last(&writes).phase, JetJobPhase::Persisting);
    }

    #[tokio::test]
    async fn deletion_only_removes_the_finalizer() {
        let mut jj = tracked(JetJobPhase::Running, JetJobState::Running, JetJobState::Running);
        jj.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
        jj.metadata.deletion_timestamp = Some(Time(k8s_openapi::chrono::Utc::now()));

        let mut kube = MockJetJobClient::new();
        kube.expect_remove_finalizer().times(1).returning(|_| Ok(()));
        kube.expect_patch_status().never();
        let mut provider = MockProvider::new();
        provider.expect_acquire().never();
        let ctx = context(kube, provider);

        assert_eq!(reconcile(Arc::new(jj), ctx).await.unwrap(), Action::await_change());
    }
}
