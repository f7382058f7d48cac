//! Topic CRD

use hz_protocol::config::TopicConfig;
use hz_protocol::WireConfig;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{default_true, DataStructureStatus};

/// Topic configured on a Hazelcast cluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "hazelcast.com",
    version = "v1alpha1",
    kind = "Topic",
    plural = "topics",
    shortname = "hztopic",
    namespaced,
    status = "DataStructureStatus",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Message","type":"string","priority":1,"jsonPath":".status.message"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TopicSpec {
    /// Topic name on the cluster; defaults to the resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Hazelcast resource the topic is created on
    pub hazelcast_resource_name: String,

    /// Deliver messages to all listeners in the same order
    #[serde(default)]
    pub global_ordering_enabled: bool,

    /// Dispatch messages on multiple threads
    #[serde(default)]
    pub multi_threading_enabled: bool,

    /// Collect publish/receive statistics
    #[serde(default = "default_true")]
    pub statistics_enabled: bool,

    /// User code namespace used to resolve classes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_code_namespace: Option<String>,
}

impl Topic {
    /// Name of the topic on the cluster
    pub fn topic_name(&self) -> String {
        self.spec.name.clone().unwrap_or_else(|| self.name_any())
    }

    /// Wire config derived from the spec
    pub fn wire_config(&self) -> WireConfig {
        let spec = &self.spec;
        WireConfig::Topic(TopicConfig {
            name: self.topic_name(),
            global_ordering_enabled: spec.global_ordering_enabled,
            multi_threading_enabled: spec.multi_threading_enabled,
            statistics_enabled: spec.statistics_enabled,
            user_code_namespace: spec.user_code_namespace.clone(),
        })
        .normalized()
    }
}
