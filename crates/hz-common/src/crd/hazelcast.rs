//! Hazelcast CRD
//!
//! A `Hazelcast` resource names a target cluster that data structures and
//! jobs are applied to. The operator connects to the members listed here,
//! reports what it reaches in status, and renders the cluster's persisted
//! config document.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::DEFAULT_MEMBER_PORT;

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a Hazelcast cluster as seen by the operator
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum HazelcastPhase {
    /// Members not reachable yet
    #[default]
    Pending,
    /// Client connected to at least one member
    Running,
    /// Cluster refused the client
    Failed,
}

impl std::fmt::Display for HazelcastPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Jet engine
// =============================================================================

/// Jet engine settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JetEngineConfiguration {
    /// Whether the Jet engine runs; enabled unless set to false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Whether jobs may upload resources (jars) to members
    #[serde(default)]
    pub resource_upload_enabled: bool,
}

impl JetEngineConfiguration {
    /// Whether the Jet engine is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

// =============================================================================
// CRD
// =============================================================================

fn default_cluster_name() -> String {
    "dev".to_string()
}

fn default_cluster_size() -> i32 {
    3
}

/// Target Hazelcast cluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "hazelcast.com",
    version = "v1alpha1",
    kind = "Hazelcast",
    plural = "hazelcasts",
    shortname = "hz",
    namespaced,
    status = "HazelcastStatus",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Members","type":"string","jsonPath":".status.readyMembers"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HazelcastSpec {
    /// Cluster name clients authenticate against
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Expected number of members
    #[serde(default = "default_cluster_size")]
    pub cluster_size: i32,

    /// Member addresses (`host:port`). Defaults to the cluster Service.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub member_addresses: Vec<String>,

    /// Jet engine settings
    #[serde(default)]
    pub jet: JetEngineConfiguration,
}

impl Default for HazelcastSpec {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            cluster_size: default_cluster_size(),
            member_addresses: Vec::new(),
            jet: JetEngineConfiguration::default(),
        }
    }
}

/// Status of a Hazelcast cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HazelcastStatus {
    /// Current phase
    #[serde(default)]
    pub phase: HazelcastPhase,

    /// Addresses of members the operator is connected to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,

    /// `connected/expected`, for `kubectl get`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_members: Option<String>,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Generation the current client was connected for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Hazelcast {
    /// Addresses the operator connects to
    pub fn member_addresses(&self) -> Vec<String> {
        if !self.spec.member_addresses.is_empty() {
            return self.spec.member_addresses.clone();
        }
        let namespace = self.namespace().unwrap_or_else(|| "default".to_string());
        vec![format!(
            "{}.{}.svc.cluster.local:{}",
            self.name_any(),
            namespace,
            DEFAULT_MEMBER_PORT
        )]
    }

    /// Whether the operator currently reports the cluster as running
    pub fn is_running(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.phase == HazelcastPhase::Running)
    }
}
