//! Dynamic config service: add-config requests
//!
//! Field order follows the protocol definition of each request: fixed-size
//! parameters in the initial frame, then one frame (or null frame) per
//! variable-size parameter. Listener and store configs are never sent by the
//! operator and are always encoded as null.

use crate::codec::{InitialFrameBuilder, MessageBuilder};
use crate::config::{MapConfig, MultiMapConfig, QueueConfig, ReplicatedMapConfig, TopicConfig};
use crate::frame::ClientMessage;

/// DynamicConfig.AddMultiMapConfig
pub const ADD_MULTI_MAP_CONFIG_REQUEST: i32 = 0x1B0100;
/// DynamicConfig.AddReplicatedMapConfig
pub const ADD_REPLICATED_MAP_CONFIG_REQUEST: i32 = 0x1B0600;
/// DynamicConfig.AddTopicConfig
pub const ADD_TOPIC_CONFIG_REQUEST: i32 = 0x1B0700;
/// DynamicConfig.AddQueueConfig
pub const ADD_QUEUE_CONFIG_REQUEST: i32 = 0x1B0B00;
/// DynamicConfig.AddMapConfig
pub const ADD_MAP_CONFIG_REQUEST: i32 = 0x1B0C00;

/// Encode AddReplicatedMapConfig
pub fn encode_add_replicated_map_config(c: &ReplicatedMapConfig) -> ClientMessage {
    let initial = InitialFrameBuilder::request(ADD_REPLICATED_MAP_CONFIG_REQUEST)
        .bool(c.async_fillup)
        .bool(c.statistics_enabled)
        .int(c.merge_policy.batch_size)
        .build();
    MessageBuilder::new(initial)
        .string(&c.name)
        .string(&c.in_memory_format)
        .string(&c.merge_policy.class_name)
        .null() // listener configs
        .nullable_string(c.split_brain_protection_ref.as_deref())
        .nullable_string(c.user_code_namespace.as_deref())
        .build()
}

/// Encode AddMultiMapConfig
pub fn encode_add_multi_map_config(c: &MultiMapConfig) -> ClientMessage {
    let initial = InitialFrameBuilder::request(ADD_MULTI_MAP_CONFIG_REQUEST)
        .bool(c.binary)
        .int(c.backup_count)
        .int(c.async_backup_count)
        .bool(c.statistics_enabled)
        .int(c.merge_policy.batch_size)
        .build();
    MessageBuilder::new(initial)
        .string(&c.name)
        .string(&c.value_collection_type)
        .null() // listener configs
        .null() // split-brain protection
        .string(&c.merge_policy.class_name)
        .nullable_string(c.user_code_namespace.as_deref())
        .build()
}

/// Encode AddQueueConfig
pub fn encode_add_queue_config(c: &QueueConfig) -> ClientMessage {
    let initial = InitialFrameBuilder::request(ADD_QUEUE_CONFIG_REQUEST)
        .int(c.backup_count)
        .int(c.async_backup_count)
        .int(c.max_size)
        .int(c.empty_queue_ttl)
        .bool(c.statistics_enabled)
        .int(c.merge_policy.batch_size)
        .build();
    MessageBuilder::new(initial)
        .string(&c.name)
        .null() // listener configs
        .null() // split-brain protection
        .null() // queue store
        .string(&c.merge_policy.class_name)
        .nullable_string(c.priority_comparator_class_name.as_deref())
        .nullable_string(c.user_code_namespace.as_deref())
        .build()
}

/// Encode AddTopicConfig
pub fn encode_add_topic_config(c: &TopicConfig) -> ClientMessage {
    let initial = InitialFrameBuilder::request(ADD_TOPIC_CONFIG_REQUEST)
        .bool(c.global_ordering_enabled)
        .bool(c.statistics_enabled)
        .bool(c.multi_threading_enabled)
        .build();
    MessageBuilder::new(initial)
        .string(&c.name)
        .null() // listener configs
        .nullable_string(c.user_code_namespace.as_deref())
        .build()
}

/// Cache policy for deserialized values; members default to caching them
/// only for indexed queries
pub const CACHE_DESERIALIZED_VALUES_INDEX_ONLY: &str = "INDEX-ONLY";
/// `MetadataPolicy.CREATE_ON_UPDATE`, the member default
pub const METADATA_POLICY_CREATE_ON_UPDATE: i32 = 0;

/// Encode AddMapConfig.
///
/// Every parameter of the request is written. Fields the operator does not
/// manage carry the member default (fixed-size) or a null frame, which a
/// member reads as "keep the default": eviction, listeners, stores, near
/// cache, WAN, indexes, attributes, query caches, partitioning, hot restart,
/// event journal, merkle tree, data persistence and tiered store.
pub fn encode_add_map_config(c: &MapConfig) -> ClientMessage {
    let initial = InitialFrameBuilder::request(ADD_MAP_CONFIG_REQUEST)
        .int(c.backup_count)
        .int(c.async_backup_count)
        .int(c.time_to_live_seconds)
        .int(c.max_idle_seconds)
        .bool(c.read_backup_data)
        .int(c.merge_policy.batch_size)
        .bool(c.statistics_enabled)
        .int(METADATA_POLICY_CREATE_ON_UPDATE)
        .bool(false) // per-entry stats
        .build();
    MessageBuilder::new(initial)
        .string(&c.name)
        .null() // eviction
        .string(CACHE_DESERIALIZED_VALUES_INDEX_ONLY)
        .string(&c.merge_policy.class_name)
        .string(&c.in_memory_format)
        .null() // entry listener configs
        .null() // partition-lost listener configs
        .null() // split-brain protection
        .null() // map store
        .null() // near cache
        .null() // WAN replication ref
        .null() // index configs
        .null() // attribute configs
        .null() // query cache configs
        .null() // partitioning strategy class name
        .null() // partitioning strategy implementation
        .null() // hot restart
        .null() // event journal
        .null() // merkle tree
        .null() // data persistence
        .null() // tiered store
        .null() // partitioning attribute configs
        .nullable_string(c.user_code_namespace.as_deref())
        .build()
}
