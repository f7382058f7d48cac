//! Queue CRD

use hz_protocol::config::{MergePolicyConfig, QueueConfig};
use hz_protocol::WireConfig;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{default_backup_count, DataStructureStatus};

fn default_empty_queue_ttl() -> i32 {
    -1
}

/// Queue configured on a Hazelcast cluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "hazelcast.com",
    version = "v1alpha1",
    kind = "Queue",
    plural = "queues",
    shortname = "hzq",
    namespaced,
    status = "DataStructureStatus",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Message","type":"string","priority":1,"jsonPath":".status.message"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct QueueSpec {
    /// Queue name on the cluster; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Hazelcast resource the queue is created on
    pub hazelcast_resource_name: String,

    /// Synchronous backups
    #[serde(default = "default_backup_count")]
    pub backup_count: i32,

    /// Asynchronous backups
    #[serde(default)]
    pub async_backup_count: i32,

    /// Maximum number of items, 0 = unbounded
    #[serde(default)]
    pub max_size: i32,

    /// Seconds an empty queue lives before it is destroyed, -1 = forever
    #[serde(default = "default_empty_queue_ttl")]
    pub empty_queue_ttl_seconds: i32,

    /// Comparator class turning the queue into a priority queue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_comparator_class_name: Option<String>,

    /// User code namespace used to resolve classes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_code_namespace: Option<String>,
}

impl Queue {
    /// Name of the queue on the cluster
    pub fn queue_name(&self) -> String {
        self.spec.name.clone().unwrap_or_else(|| self.name_any())
    }

    /// Wire config derived from the spec
    pub fn wire_config(&self) -> WireConfig {
        let spec = &self.spec;
        WireConfig::Queue(QueueConfig {
            name: self.queue_name(),
            backup_count: spec.backup_count,
            async_backup_count: spec.async_backup_count,
            max_size: spec.max_size,
            empty_queue_ttl: spec.empty_queue_ttl_seconds,
            statistics_enabled: true,
            priority_comparator_class_name: spec.priority_comparator_class_name.clone(),
            merge_policy: MergePolicyConfig::default(),
            user_code_namespace: spec.user_code_namespace.clone(),
        })
        .normalized()
    }
}
