//! Normalized data-structure configs
//!
//! These types are the canonical in-memory shape of a data-structure config.
//! The same value is used to encode the add-config request and to compare
//! against the persisted config document, so the two can never drift apart:
//!
//! ```text
//! CRD spec ──build──▶ WireConfig ──normalized()──┬──▶ encode_request()
//!                                                 └──▶ == snapshot.normalized()
//! persisted document ──from_snapshot()──▶ WireConfig ─┘
//! ```
//!
//! Field names follow the `hazelcast.yaml` (kebab-case) layout. Every field
//! has a default so a persisted document that omits default values decodes
//! to the same value as a spec that spells them out.

use serde::{Deserialize, Serialize};

use crate::codec::dynamic_config;
use crate::error::ProtocolError;
use crate::frame::ClientMessage;
use crate::Result;

/// Default merge policy applied by Hazelcast
pub const DEFAULT_MERGE_POLICY: &str = "com.hazelcast.spi.merge.PutIfAbsentMergePolicy";
/// Default merge batch size applied by Hazelcast
pub const DEFAULT_MERGE_BATCH_SIZE: i32 = 100;

/// Data-structure kinds that can be configured dynamically
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKind {
    /// Replicated map
    ReplicatedMap,
    /// Partitioned map
    Map,
    /// Multi-map
    MultiMap,
    /// Queue
    Queue,
    /// Classic (non-reliable) topic
    Topic,
}

impl ConfigKind {
    /// All kinds, in a stable order
    pub const ALL: [ConfigKind; 5] = [
        ConfigKind::ReplicatedMap,
        ConfigKind::Map,
        ConfigKind::MultiMap,
        ConfigKind::Queue,
        ConfigKind::Topic,
    ];

    /// Section name in the `hazelcast.yaml` document
    pub fn section(self) -> &'static str {
        match self {
            Self::ReplicatedMap => "replicatedmap",
            Self::Map => "map",
            Self::MultiMap => "multimap",
            Self::Queue => "queue",
            Self::Topic => "topic",
        }
    }

    /// Add-config request message type
    pub fn request_type(self) -> i32 {
        match self {
            Self::MultiMap => dynamic_config::ADD_MULTI_MAP_CONFIG_REQUEST,
            Self::ReplicatedMap => dynamic_config::ADD_REPLICATED_MAP_CONFIG_REQUEST,
            Self::Topic => dynamic_config::ADD_TOPIC_CONFIG_REQUEST,
            Self::Queue => dynamic_config::ADD_QUEUE_CONFIG_REQUEST,
            Self::Map => dynamic_config::ADD_MAP_CONFIG_REQUEST,
        }
    }

    /// Add-config response message type
    pub fn response_type(self) -> i32 {
        self.request_type() + 1
    }
}

impl std::fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReplicatedMap => write!(f, "ReplicatedMap"),
            Self::Map => write!(f, "Map"),
            Self::MultiMap => write!(f, "MultiMap"),
            Self::Queue => write!(f, "Queue"),
            Self::Topic => write!(f, "Topic"),
        }
    }
}

/// Merge policy block shared by most data structures
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MergePolicyConfig {
    /// Merge policy class name
    pub class_name: String,
    /// Entries merged per batch
    pub batch_size: i32,
}

impl Default for MergePolicyConfig {
    fn default() -> Self {
        Self {
            class_name: DEFAULT_MERGE_POLICY.to_string(),
            batch_size: DEFAULT_MERGE_BATCH_SIZE,
        }
    }
}

impl MergePolicyConfig {
    fn normalized(self) -> Self {
        Self {
            class_name: normalize_or(self.class_name, DEFAULT_MERGE_POLICY),
            batch_size: self.batch_size,
        }
    }
}

/// Replicated map config
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReplicatedMapConfig {
    /// Object name (the section key, not part of the body)
    #[serde(skip)]
    pub name: String,
    /// OBJECT or BINARY
    pub in_memory_format: String,
    /// Whether the initial fill-up is asynchronous
    pub async_fillup: bool,
    /// Whether statistics are collected
    pub statistics_enabled: bool,
    /// Merge policy
    pub merge_policy: MergePolicyConfig,
    /// Split-brain protection reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_brain_protection_ref: Option<String>,
    /// User code namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_code_namespace: Option<String>,
}

impl Default for ReplicatedMapConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            in_memory_format: "OBJECT".to_string(),
            async_fillup: true,
            statistics_enabled: true,
            merge_policy: MergePolicyConfig::default(),
            split_brain_protection_ref: None,
            user_code_namespace: None,
        }
    }
}

/// Partitioned map config (the subset the operator manages)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MapConfig {
    /// Object name (the section key, not part of the body)
    #[serde(skip)]
    pub name: String,
    /// Synchronous backups
    pub backup_count: i32,
    /// Asynchronous backups
    pub async_backup_count: i32,
    /// Entry time to live, 0 = forever
    pub time_to_live_seconds: i32,
    /// Max idle time, 0 = forever
    pub max_idle_seconds: i32,
    /// BINARY, OBJECT or NATIVE
    pub in_memory_format: String,
    /// Whether reads may be served from backups
    pub read_backup_data: bool,
    /// Whether statistics are collected
    pub statistics_enabled: bool,
    /// Merge policy
    pub merge_policy: MergePolicyConfig,
    /// User code namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_code_namespace: Option<String>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            backup_count: 1,
            async_backup_count: 0,
            time_to_live_seconds: 0,
            max_idle_seconds: 0,
            in_memory_format: "BINARY".to_string(),
            read_backup_data: false,
            statistics_enabled: true,
            merge_policy: MergePolicyConfig::default(),
            user_code_namespace: None,
        }
    }
}

/// Multi-map config
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MultiMapConfig {
    /// Object name (the section key, not part of the body)
    #[serde(skip)]
    pub name: String,
    /// Synchronous backups
    pub backup_count: i32,
    /// Asynchronous backups
    pub async_backup_count: i32,
    /// Whether values are stored in binary form
    pub binary: bool,
    /// SET or LIST
    pub value_collection_type: String,
    /// Whether statistics are collected
    pub statistics_enabled: bool,
    /// Merge policy
    pub merge_policy: MergePolicyConfig,
    /// User code namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_code_namespace: Option<String>,
}

impl Default for MultiMapConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            backup_count: 1,
            async_backup_count: 0,
            binary: false,
            value_collection_type: "SET".to_string(),
            statistics_enabled: true,
            merge_policy: MergePolicyConfig::default(),
            user_code_namespace: None,
        }
    }
}

/// Queue config
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueueConfig {
    /// Object name (the section key, not part of the body)
    #[serde(skip)]
    pub name: String,
    /// Synchronous backups
    pub backup_count: i32,
    /// Asynchronous backups
    pub async_backup_count: i32,
    /// Maximum size, 0 = unbounded
    pub max_size: i32,
    /// Seconds an empty queue lives before destruction, -1 = forever
    pub empty_queue_ttl: i32,
    /// Whether statistics are collected
    pub statistics_enabled: bool,
    /// Comparator class for priority queues
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_comparator_class_name: Option<String>,
    /// Merge policy
    pub merge_policy: MergePolicyConfig,
    /// User code namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_code_namespace: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            backup_count: 1,
            async_backup_count: 0,
            max_size: 0,
            empty_queue_ttl: -1,
            statistics_enabled: true,
            priority_comparator_class_name: None,
            merge_policy: MergePolicyConfig::default(),
            user_code_namespace: None,
        }
    }
}

/// Topic config
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TopicConfig {
    /// Object name (the section key, not part of the body)
    #[serde(skip)]
    pub name: String,
    /// Whether all members see messages in the same order
    pub global_ordering_enabled: bool,
    /// Whether listeners run on multiple threads
    pub multi_threading_enabled: bool,
    /// Whether statistics are collected
    pub statistics_enabled: bool,
    /// User code namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_code_namespace: Option<String>,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            global_ordering_enabled: false,
            multi_threading_enabled: false,
            statistics_enabled: true,
            user_code_namespace: None,
        }
    }
}

/// A data-structure config of any supported kind
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WireConfig {
    /// Replicated map
    ReplicatedMap(ReplicatedMapConfig),
    /// Partitioned map
    Map(MapConfig),
    /// Multi-map
    MultiMap(MultiMapConfig),
    /// Queue
    Queue(QueueConfig),
    /// Topic
    Topic(TopicConfig),
}

impl WireConfig {
    /// Kind of this config
    pub fn kind(&self) -> ConfigKind {
        match self {
            Self::ReplicatedMap(_) => ConfigKind::ReplicatedMap,
            Self::Map(_) => ConfigKind::Map,
            Self::MultiMap(_) => ConfigKind::MultiMap,
            Self::Queue(_) => ConfigKind::Queue,
            Self::Topic(_) => ConfigKind::Topic,
        }
    }

    /// Object name
    pub fn name(&self) -> &str {
        match self {
            Self::ReplicatedMap(c) => &c.name,
            Self::Map(c) => &c.name,
            Self::MultiMap(c) => &c.name,
            Self::Queue(c) => &c.name,
            Self::Topic(c) => &c.name,
        }
    }

    /// Canonical form: trimmed strings, upper-cased enum values, empty
    /// optionals collapsed to `None`.
    pub fn normalized(self) -> Self {
        match self {
            Self::ReplicatedMap(c) => Self::ReplicatedMap(ReplicatedMapConfig {
                name: c.name.trim().to_string(),
                in_memory_format: normalize_enum(c.in_memory_format, "OBJECT"),
                async_fillup: c.async_fillup,
                statistics_enabled: c.statistics_enabled,
                merge_policy: c.merge_policy.normalized(),
                split_brain_protection_ref: normalize_opt(c.split_brain_protection_ref),
                user_code_namespace: normalize_opt(c.user_code_namespace),
            }),
            Self::Map(c) => Self::Map(MapConfig {
                name: c.name.trim().to_string(),
                in_memory_format: normalize_enum(c.in_memory_format, "BINARY"),
                merge_policy: c.merge_policy.normalized(),
                user_code_namespace: normalize_opt(c.user_code_namespace),
                ..c
            }),
            Self::MultiMap(c) => Self::MultiMap(MultiMapConfig {
                name: c.name.trim().to_string(),
                value_collection_type: normalize_enum(c.value_collection_type, "SET"),
                merge_policy: c.merge_policy.normalized(),
                user_code_namespace: normalize_opt(c.user_code_namespace),
                ..c
            }),
            Self::Queue(c) => Self::Queue(QueueConfig {
                name: c.name.trim().to_string(),
                priority_comparator_class_name: normalize_opt(c.priority_comparator_class_name),
                merge_policy: c.merge_policy.normalized(),
                user_code_namespace: normalize_opt(c.user_code_namespace),
                ..c
            }),
            Self::Topic(c) => Self::Topic(TopicConfig {
                name: c.name.trim().to_string(),
                user_code_namespace: normalize_opt(c.user_code_namespace),
                ..c
            }),
        }
    }

    /// Encode the add-config request for this config.
    ///
    /// Encodes the normalized form, so logically equal configs produce
    /// byte-identical requests.
    pub fn encode_request(&self) -> ClientMessage {
        match self.clone().normalized() {
            Self::ReplicatedMap(c) => dynamic_config::encode_add_replicated_map_config(&c),
            Self::Map(c) => dynamic_config::encode_add_map_config(&c),
            Self::MultiMap(c) => dynamic_config::encode_add_multi_map_config(&c),
            Self::Queue(c) => dynamic_config::encode_add_queue_config(&c),
            Self::Topic(c) => dynamic_config::encode_add_topic_config(&c),
        }
    }

    /// Decode a persisted config body (the value under
    /// `hazelcast.<section>.<name>`) into a normalized config.
    pub fn from_snapshot(kind: ConfigKind, name: &str, body: &serde_json::Value) -> Result<Self> {
        // A key with no body (`my-map:`) means "all defaults".
        let body = if body.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            body.clone()
        };
        let invalid = |e: serde_json::Error| ProtocolError::InvalidSnapshot {
            kind: kind.section().to_string(),
            name: name.to_string(),
            reason: e.to_string(),
        };
        let config = match kind {
            ConfigKind::ReplicatedMap => Self::ReplicatedMap(ReplicatedMapConfig {
                name: name.to_string(),
                ..serde_json::from_value(body).map_err(invalid)?
            }),
            ConfigKind::Map => Self::Map(MapConfig {
                name: name.to_string(),
                ..serde_json::from_value(body).map_err(invalid)?
            }),
            ConfigKind::MultiMap => Self::MultiMap(MultiMapConfig {
                name: name.to_string(),
                ..serde_json::from_value(body).map_err(invalid)?
            }),
            ConfigKind::Queue => Self::Queue(QueueConfig {
                name: name.to_string(),
                ..serde_json::from_value(body).map_err(invalid)?
            }),
            ConfigKind::Topic => Self::Topic(TopicConfig {
                name: name.to_string(),
                ..serde_json::from_value(body).map_err(invalid)?
            }),
        };
        Ok(config.normalized())
    }

    /// Render the normalized config body for a persisted config document
    pub fn to_document(&self) -> Result<serde_json::Value> {
        let value = match self.clone().normalized() {
            Self::ReplicatedMap(c) => serde_json::to_value(c)?,
            Self::Map(c) => serde_json::to_value(c)?,
            Self::MultiMap(c) => serde_json::to_value(c)?,
            Self::Queue(c) => serde_json::to_value(c)?,
            Self::Topic(c) => serde_json::to_value(c)?,
        };
        Ok(value)
    }
}

fn normalize_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_or(value: String, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

fn normalize_enum(value: String, default: &str) -> String {
    normalize_or(value, default).to_ascii_uppercase()
}
