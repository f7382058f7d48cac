//! MultiMap CRD

use hz_protocol::config::{MergePolicyConfig, MultiMapConfig};
use hz_protocol::WireConfig;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{default_backup_count, CollectionType, DataStructureStatus};

/// Multi-map configured on a Hazelcast cluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "hazelcast.com",
    version = "v1alpha1",
    kind = "MultiMap",
    plural = "multimaps",
    shortname = "hzmmap",
    namespaced,
    status = "DataStructureStatus",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Message","type":"string","priority":1,"jsonPath":".status.message"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MultiMapSpec {
    /// Multi-map name on the cluster; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Hazelcast resource the multi-map is created on
    pub hazelcast_resource_name: String,

    /// Synchronous backups per partition
    #[serde(default = "default_backup_count")]
    pub backup_count: i32,

    /// Asynchronous backups per partition
    #[serde(default)]
    pub async_backup_count: i32,

    /// Store values in serialized form
    #[serde(default)]
    pub binary: bool,

    /// SET or LIST
    #[serde(default)]
    pub collection_type: CollectionType,

    /// User code namespace used to resolve classes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_code_namespace: Option<String>,
}

impl MultiMap {
    /// Name of the multi-map on the cluster
    pub fn map_name(&self) -> String {
        self.spec.name.clone().unwrap_or_else(|| self.name_any())
    }

    /// Wire config derived from the spec
    pub fn wire_config(&self) -> WireConfig {
        let spec = &self.spec;
        WireConfig::MultiMap(MultiMapConfig {
            name: self.map_name(),
            backup_count: spec.backup_count,
            async_backup_count: spec.async_backup_count,
            binary: spec.binary,
            value_collection_type: spec.collection_type.as_str().to_string(),
            statistics_enabled: true,
            merge_policy: MergePolicyConfig::default(),
            user_code_namespace: spec.user_code_namespace.clone(),
        })
        .normalized()
    }
}
