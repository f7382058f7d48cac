//! ReplicatedMap CRD

use hz_protocol::config::{MergePolicyConfig, ReplicatedMapConfig};
use hz_protocol::WireConfig;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{default_true, DataStructureStatus, InMemoryFormat};

/// Replicated map configured on a Hazelcast cluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "hazelcast.com",
    version = "v1alpha1",
    kind = "ReplicatedMap",
    plural = "replicatedmaps",
    shortname = "hzrmap",
    namespaced,
    status = "DataStructureStatus",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Message","type":"string","priority":1,"jsonPath":".status.message"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ReplicatedMapSpec {
    /// Map name on the cluster; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Hazelcast resource the map is created on
    pub hazelcast_resource_name: String,

    /// OBJECT or BINARY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_memory_format: Option<InMemoryFormat>,

    /// Whether replication to new members happens asynchronously
    #[serde(default = "default_true")]
    pub async_fillup: bool,

    /// User code namespace used to resolve classes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_code_namespace: Option<String>,
}

impl ReplicatedMap {
    /// Name of the map on the cluster
    pub fn map_name(&self) -> String {
        self.spec.name.clone().unwrap_or_else(|| self.name_any())
    }

    /// Wire config derived from the spec
    pub fn wire_config(&self) -> WireConfig {
        WireConfig::ReplicatedMap(ReplicatedMapConfig {
            name: self.map_name(),
            in_memory_format: self
                .spec
                .in_memory_format
                .unwrap_or(InMemoryFormat::Object)
                .as_str()
                .to_string(),
            async_fillup: self.spec.async_fillup,
            statistics_enabled: true,
            merge_policy: MergePolicyConfig::default(),
            split_brain_protection_ref: None,
            user_code_namespace: self.spec.user_code_namespace.clone(),
        })
        .normalized()
    }
}
