//! Controller timing configuration shared by every reconciler

use std::time::Duration;

/// Requeue delays and call deadlines
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Delay between snapshot reads while a config is persisting
    pub persisting_poll: Duration,
    /// Delay before resubmitting after a transient submit failure
    pub submit_retry: Duration,
    /// Delay while the target cluster has no ready client
    pub cluster_not_ready: Duration,
    /// Delay between job status polls
    pub job_poll: Duration,
    /// Deadline for each cluster call (acquire, submit, read)
    pub call_timeout: Duration,
    /// Bound on connecting and authenticating to one member
    pub connect_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            persisting_poll: Duration::from_secs(1),
            submit_retry: Duration::from_secs(10),
            cluster_not_ready: Duration::from_secs(30),
            job_poll: Duration::from_secs(15),
            call_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}
