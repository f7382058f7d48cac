//! Map CRD

use hz_protocol::config::{MapConfig, MergePolicyConfig};
use hz_protocol::WireConfig;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{default_backup_count, default_true, DataStructureStatus, InMemoryFormat};

/// Partitioned map configured on a Hazelcast cluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "hazelcast.com",
    version = "v1alpha1",
    kind = "Map",
    plural = "maps",
    shortname = "hzmap",
    namespaced,
    status = "DataStructureStatus",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Message","type":"string","priority":1,"jsonPath":".status.message"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MapSpec {
    /// Map name on the cluster; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Hazelcast resource the map is created on
    pub hazelcast_resource_name: String,

    /// Synchronous backups per partition
    #[serde(default = "default_backup_count")]
    pub backup_count: i32,

    /// Asynchronous backups per partition
    #[serde(default)]
    pub async_backup_count: i32,

    /// Entry time to live in seconds, 0 = forever
    #[serde(default)]
    pub time_to_live_seconds: i32,

    /// Maximum idle time in seconds, 0 = forever
    #[serde(default)]
    pub max_idle_seconds: i32,

    /// BINARY, OBJECT or NATIVE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_memory_format: Option<InMemoryFormat>,

    /// Serve reads from backup replicas
    #[serde(default)]
    pub read_backup_data: bool,

    /// Collect entry statistics
    #[serde(default = "default_true")]
    pub statistics_enabled: bool,

    /// User code namespace used to resolve classes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_code_namespace: Option<String>,
}

impl Map {
    /// Name of the map on the cluster
    pub fn map_name(&self) -> String {
        self.spec.name.clone().unwrap_or_else(|| self.name_any())
    }

    /// Wire config derived from the spec
    pub fn wire_config(&self) -> WireConfig {
        let spec = &self.spec;
        WireConfig::Map(MapConfig {
            name: self.map_name(),
            backup_count: spec.backup_count,
            async_backup_count: spec.async_backup_count,
            time_to_live_seconds: spec.time_to_live_seconds,
            max_idle_seconds: spec.max_idle_seconds,
            in_memory_format: spec
                .in_memory_format
                .unwrap_or(InMemoryFormat::Binary)
                .as_str()
                .to_string(),
            read_backup_data: spec.read_backup_data,
            statistics_enabled: spec.statistics_enabled,
            merge_policy: MergePolicyConfig::default(),
            user_code_namespace: spec.user_code_namespace.clone(),
        })
        .normalized()
    }
}
