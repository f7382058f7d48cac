//! Pure job lifecycle rules: which cluster job is ours, what phase it is
//! in, and which control request moves it toward the requested run state.

use chrono::{DateTime, Utc};
use hz_common::crd::{JetJobPhase, JetJobState};
use hz_protocol::codec::jet::{JobStatus, JobSummary, TerminateMode};

const CANCELLATION_EXCEPTION: &str = "CancellationException";

/// Allowed drift between the operator clock and member clocks when
/// matching a listed job against the upload that created it
pub const SUBMISSION_CLOCK_SKEW_MILLIS: i64 = 60_000;

/// Find the cluster job backing a resource.
///
/// A known job id wins. Otherwise the most recently submitted live job with
/// the resource's job name is used; finished runs are never adopted. With
/// `uploaded_at` set, jobs submitted before that upload are skipped too.
pub fn find_job<'a>(
    summaries: &'a [JobSummary],
    job_name: &str,
    job_id: Option<i64>,
    uploaded_at: Option<DateTime<Utc>>,
) -> Option<&'a JobSummary> {
    if let Some(id) = job_id {
        return summaries.iter().find(|s| s.job_id == id);
    }
    let not_before = uploaded_at
        .map(|at| at.timestamp_millis().saturating_sub(SUBMISSION_CLOCK_SKEW_MILLIS))
        .unwrap_or(i64::MIN);
    summaries
        .iter()
        .filter(|s| !s.light_job && s.name_or_id == job_name)
        .filter(|s| !s.status.is_terminal() && s.submission_time >= not_before)
        .max_by_key(|s| s.submission_time)
}

/// Phase reported by a job summary, or `None` while the job is between
/// states (starting, completing, exporting a snapshot).
pub fn observed_phase(summary: &JobSummary, applied: Option<JetJobState>) -> Option<JetJobPhase> {
    let cancelled_by_request = applied == Some(JetJobState::Canceled);
    match summary.status {
        JobStatus::Running => Some(JetJobPhase::Running),
        JobStatus::Suspended => Some(JetJobPhase::Suspended),
        JobStatus::Completed if cancelled_by_request => Some(JetJobPhase::Cancelled),
        JobStatus::Completed => Some(JetJobPhase::Completed),
        JobStatus::Failed if cancelled_by_request || is_cancellation(summary) => {
            Some(JetJobPhase::Cancelled)
        }
        JobStatus::Failed => Some(JetJobPhase::Failed),
        JobStatus::NotRunning
        | JobStatus::Starting
        | JobStatus::Completing
        | JobStatus::SuspendedExportingSnapshot => None,
    }
}

fn is_cancellation(summary: &JobSummary) -> bool {
    summary
        .failure_text
        .as_deref()
        .is_some_and(|text| text.contains(CANCELLATION_EXCEPTION))
}

/// Epoch millis to a timestamp; 0 means "not set"
pub fn timestamp(millis: i64) -> Option<DateTime<Utc>> {
    if millis <= 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(millis)
}

/// Control request for a running or suspended job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobControl {
    /// Send TerminateJob with this mode
    Terminate(TerminateMode),
    /// Send ResumeJob
    Resume,
}

/// Decide how to move a job toward `desired`.
///
/// Returns `None` when the request is already satisfied, or cannot apply
/// in `phase` (e.g. suspending a job that already finished). The caller
/// records `desired` as applied either way.
pub fn control_for(
    desired: JetJobState,
    applied: Option<JetJobState>,
    phase: JetJobPhase,
) -> Option<JobControl> {
    if applied.unwrap_or_default() == desired {
        return None;
    }
    match (desired, phase) {
        (JetJobState::Running, JetJobPhase::Suspended) => Some(JobControl::Resume),
        (JetJobState::Suspended, JetJobPhase::Running) => {
            Some(JobControl::Terminate(TerminateMode::SuspendGraceful))
        }
        (JetJobState::Canceled, JetJobPhase::Running | JetJobPhase::Suspended) => {
            Some(JobControl::Terminate(TerminateMode::CancelGraceful))
        }
        (JetJobState::Restarted, JetJobPhase::Running) => {
            Some(JobControl::Terminate(TerminateMode::RestartGraceful))
        }
        _ => None,
    }
}
