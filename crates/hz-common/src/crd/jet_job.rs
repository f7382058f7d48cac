//! JetJob CRD types
//!
//! Defines `JetJob`, a stream-processing job submitted to the Jet engine of
//! a Hazelcast cluster from a jar already present on the members.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hz_protocol::codec::jet::JobSubmission;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Desired state
// =============================================================================

/// Run state requested by the user
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum JetJobState {
    /// Job should be running; the only value accepted on create
    #[default]
    Running,
    /// Job should be suspended
    Suspended,
    /// Job should be cancelled
    Canceled,
    /// Job should be restarted once
    Restarted,
}

impl std::fmt::Display for JetJobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Suspended => write!(f, "Suspended"),
            Self::Canceled => write!(f, "Canceled"),
            Self::Restarted => write!(f, "Restarted"),
        }
    }
}

// =============================================================================
// Observed phase
// =============================================================================

/// Lifecycle phase of a JetJob
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum JetJobPhase {
    /// Not yet submitted, or waiting to resubmit
    #[default]
    Pending,
    /// Submitted, not yet seen in the cluster's job list
    Persisting,
    /// Running on the cluster
    Running,
    /// Suspended by request
    Suspended,
    /// Finished successfully
    Completed,
    /// Cancelled by request
    Cancelled,
    /// Failed on the cluster or rejected by it
    Failed,
}

impl JetJobPhase {
    /// Whether the job can no longer change phase
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for JetJobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Persisting => write!(f, "Persisting"),
            Self::Running => write!(f, "Running"),
            Self::Suspended => write!(f, "Suspended"),
            Self::Completed => write!(f, "Completed"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Remote sources
// =============================================================================

/// Bucket the job jar is fetched from
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BucketConfiguration {
    /// Full bucket URI, e.g. `s3://bucket/path`
    #[serde(rename = "bucketURI")]
    pub bucket_uri: String,

    /// Secret holding the bucket credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Deprecated alias of `secret`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,

    /// Bucket region hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Additional provider options
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl BucketConfiguration {
    /// Credential secret, preferring `secret` over the deprecated field
    pub fn secret_name(&self) -> &str {
        self.secret
            .as_deref()
            .or(self.secret_name.as_deref())
            .unwrap_or_default()
    }
}

// =============================================================================
// CRD
// =============================================================================

/// Stream-processing job submitted to a Hazelcast cluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "hazelcast.com",
    version = "v1alpha1",
    kind = "JetJob",
    plural = "jetjobs",
    shortname = "jj",
    namespaced,
    status = "JetJobStatus",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Id","type":"string","jsonPath":".status.id"}"#,
    printcolumn = r#"{"name":"Submitted","type":"string","jsonPath":".status.submissionTime"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct JetJobSpec {
    /// Job name on the cluster; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Hazelcast resource the job runs on
    pub hazelcast_resource_name: String,

    /// Requested run state
    #[serde(default)]
    pub state: JetJobState,

    /// Jar file name
    pub jar_name: String,

    /// Entry point class; read from the jar manifest when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,

    /// Arguments passed to the entry point
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,

    /// Bucket the jar is downloaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_configuration: Option<BucketConfiguration>,

    /// URL the jar is downloaded from
    #[serde(default, rename = "remoteURL", skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

impl JetJobSpec {
    /// Whether the jar comes from a bucket
    pub fn is_bucket_enabled(&self) -> bool {
        self.bucket_configuration.is_some()
    }

    /// Whether the jar comes from a URL
    pub fn is_remote_url_enabled(&self) -> bool {
        self.remote_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// Status of a JetJob
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JetJobStatus {
    /// Current phase
    #[serde(default)]
    pub phase: JetJobPhase,

    /// Cluster-assigned job id
    #[serde(default, rename = "id", skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i64>,

    /// When the cluster accepted the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_time: Option<DateTime<Utc>>,

    /// When the job finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,

    /// Failure reported by the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_text: Option<String>,

    /// Human-readable message about the last outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last requested run state the operator acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_state: Option<JetJobState>,

    /// Generation this status was computed for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl JetJob {
    /// Job name on the cluster
    pub fn job_name(&self) -> String {
        self.spec.name.clone().unwrap_or_else(|| self.name_any())
    }

    /// Submission request parameters
    pub fn submission(&self) -> JobSubmission {
        JobSubmission {
            job_name: self.job_name(),
            jar_name: self.spec.jar_name.clone(),
            main_class: self.spec.main_class.clone(),
            parameters: self.spec.parameters.clone(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
