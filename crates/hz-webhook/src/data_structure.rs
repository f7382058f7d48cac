//! Data-structure admission rules

use hz_common::annotations::last_successful_spec;
use hz_common::crd::{InMemoryFormat, Map, MultiMap, Queue, ReplicatedMap, Topic};
use hz_common::field::{FieldError, FieldPath};
use hz_common::{Error, Result};
use hz_datastructure::ManagedDataStructure;
use kube::{Resource, ResourceExt};

/// Hazelcast keeps at most six replicas of a partition
pub const MAX_BACKUP_COUNT: i32 = 6;

/// Spec rules of one data-structure kind
pub trait SpecRules: ManagedDataStructure {
    /// Every violation in the spec
    fn spec_errors(&self) -> Vec<FieldError>;
}

fn spec_path() -> FieldPath {
    FieldPath::new("spec")
}

fn backup_errors(backup_count: i32, async_backup_count: i32) -> Vec<FieldError> {
    let spec = spec_path();
    let mut errors = Vec::new();
    for (field, value) in [("backupCount", backup_count), ("asyncBackupCount", async_backup_count)] {
        if value < 0 {
            errors.push(FieldError::invalid(spec.child(field), value, "must be non-negative"));
        }
    }
    let total = i64::from(backup_count) + i64::from(async_backup_count);
    if total > i64::from(MAX_BACKUP_COUNT) {
        errors.push(FieldError::invalid(
            spec.child("backupCount"),
            total,
            format!("the sum of backupCount and asyncBackupCount can't be larger than {MAX_BACKUP_COUNT}"),
        ));
    }
    errors
}

impl SpecRules for ReplicatedMap {
    fn spec_errors(&self) -> Vec<FieldError> {
        match self.spec.in_memory_format {
            Some(InMemoryFormat::Native) => vec![FieldError::invalid(
                spec_path().child("inMemoryFormat"),
                InMemoryFormat::Native.as_str(),
                "replicated maps support OBJECT and BINARY only",
            )],
            _ => Vec::new(),
        }
    }
}

impl SpecRules for Map {
    fn spec_errors(&self) -> Vec<FieldError> {
        let mut errors = backup_errors(self.spec.backup_count, self.spec.async_backup_count);
        for (field, value) in [
            ("timeToLiveSeconds", self.spec.time_to_live_seconds),
            ("maxIdleSeconds", self.spec.max_idle_seconds),
        ] {
            if value < 0 {
                errors.push(FieldError::invalid(spec_path().child(field), value, "must be non-negative"));
            }
        }
        errors
    }
}

impl SpecRules for MultiMap {
    fn spec_errors(&self) -> Vec<FieldError> {
        backup_errors(self.spec.backup_count, self.spec.async_backup_count)
    }
}

impl SpecRules for Queue {
    fn spec_errors(&self) -> Vec<FieldError> {
        let mut errors = backup_errors(self.spec.backup_count, self.spec.async_backup_count);
        if self.spec.max_size < 0 {
            errors.push(FieldError::invalid(
                spec_path().child("maxSize"),
                self.spec.max_size,
                "must be non-negative, 0 means unbounded",
            ));
        }
        errors
    }
}

impl SpecRules for Topic {
    fn spec_errors(&self) -> Vec<FieldError> {
        if self.spec.global_ordering_enabled && self.spec.multi_threading_enabled {
            return vec![FieldError::invalid(
                spec_path().child("multiThreadingEnabled"),
                true,
                "multi-threading can not be enabled when global ordering is used",
            )];
        }
        Vec::new()
    }
}

/// Spec validity on create
pub fn validate_spec<K: SpecRules>(obj: &K) -> Result<()> {
    let errors = obj.spec_errors();
    if errors.is_empty() {
        return Ok(());
    }
    Err(Error::invalid_spec(K::CONFIG_KIND.to_string(), obj.name_any(), errors))
}

/// Spec validity plus the frozen fields of a converged data structure.
///
/// Once the annotation exists the object's name and target are frozen and
/// its wire config cannot change: a dynamic config cannot be re-added with
/// different content on a running cluster.
pub fn validate_update<K: SpecRules>(obj: &K) -> Result<()> {
    validate_spec(obj)?;

    let kind = K::CONFIG_KIND.to_string();
    let last = match last_successful_spec::<K::Spec>(obj.meta().annotations.as_ref()) {
        Ok(Some(last)) => obj.with_spec(last),
        Ok(None) => return Ok(()),
        Err(e) => {
            return Err(Error::invalid_spec(
                kind,
                obj.name_any(),
                vec![FieldError::internal(spec_path(), e.to_string())],
            ))
        }
    };

    let spec = spec_path();
    let mut errors = Vec::new();
    if obj.structure_name() != last.structure_name() {
        errors.push(FieldError::forbidden(spec.child("name"), "field cannot be updated"));
    }
    if obj.hazelcast_resource_name() != last.hazelcast_resource_name() {
        errors.push(FieldError::forbidden(
            spec.child("hazelcastResourceName"),
            "field cannot be updated",
        ));
    }
    if errors.is_empty() && obj.desired_config() != last.desired_config() {
        errors.push(FieldError::forbidden(
            spec,
            format!("{kind} config cannot be updated once persisted on the cluster"),
        ));
    }
    if errors.is_empty() {
        return Ok(());
    }
    Err(Error::forbidden(kind, obj.name_any(), errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hz_common::annotations::{encode_spec, LAST_SUCCESSFUL_SPEC_ANNOTATION};
    use hz_common::crd::{MapSpec, QueueSpec, ReplicatedMapSpec, TopicSpec};

    fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    fn map(extra: serde_json::Value) -> Map {
        let mut spec = serde_json::json!({ "hazelcastResourceName": "hazelcast" });
        if let (Some(spec), Some(extra)) = (spec.as_object_mut(), extra.as_object()) {
            spec.extend(extra.clone());
        }
        Map::new("orders", from_json::<MapSpec>(spec))
    }

    fn converged<K: ManagedDataStructure>(mut obj: K, last: &K::Spec) -> K {
        obj.meta_mut().annotations = Some(
            [(
                LAST_SUCCESSFUL_SPEC_ANNOTATION.to_string(),
                encode_spec(last).unwrap(),
            )]
            .into(),
        );
        obj
    }

    fn paths(err: &Error) -> Vec<String> {
        err.field_errors().iter().map(|e| e.path.to_string()).collect()
    }

    #[test]
    fn backups_are_capped_at_six() {
        assert!(validate_spec(&map(serde_json::json!({ "backupCount": 3, "asyncBackupCount": 3 }))).is_ok());

        let err = validate_spec(&map(serde_json::json!({ "backupCount": 4, "asyncBackupCount": 3 })))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSpec { .. }));
        assert_eq!(paths(&err), vec!["spec.backupCount"]);
    }

    #[test]
    fn huge_backup_counts_do_not_wrap_past_the_cap() {
        let err = validate_spec(&map(serde_json::json!({
            "backupCount": i32::MAX,
            "asyncBackupCount": 1,
        })))
        .unwrap_err();
        assert_eq!(paths(&err), vec!["spec.backupCount"]);
        assert!(err.field_errors()[0]
            .bad_value
            .as_deref()
            .is_some_and(|v| v == "2147483648"));
    }

    #[test]
    fn negative_queue_size_is_invalid() {
        let queue = Queue::new(
            "jobs",
            from_json::<QueueSpec>(serde_json::json!({
                "hazelcastResourceName": "hazelcast",
                "maxSize": -1,
            })),
        );
        assert_eq!(paths(&validate_spec(&queue).unwrap_err()), vec!["spec.maxSize"]);
    }

    #[test]
    fn topic_ordering_modes_are_exclusive() {
        let topic = Topic::new(
            "events",
            from_json::<TopicSpec>(serde_json::json!({
                "hazelcastResourceName": "hazelcast",
                "globalOrderingEnabled": true,
                "multiThreadingEnabled": true,
            })),
        );
        assert_eq!(
            paths(&validate_spec(&topic).unwrap_err()),
            vec!["spec.multiThreadingEnabled"]
        );
    }

    #[test]
    fn replicated_map_rejects_native_format() {
        let rm = |format: &str| {
            ReplicatedMap::new(
                "sessions",
                from_json::<ReplicatedMapSpec>(serde_json::json!({
                    "hazelcastResourceName": "hazelcast",
                    "inMemoryFormat": format,
                })),
            )
        };
        assert!(validate_spec(&rm("BINARY")).is_ok());
        assert!(validate_spec(&rm("NATIVE")).is_err());
    }

    #[test]
    fn nothing_is_frozen_before_convergence() {
        assert!(validate_update(&map(serde_json::json!({ "backupCount": 2 }))).is_ok());
    }

    #[test]
    fn converged_config_cannot_change() {
        let original = map(serde_json::json!({}));
        let changed = converged(
            map(serde_json::json!({ "backupCount": 2 })),
            &original.spec,
        );
        let err = validate_update(&changed).unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
        assert_eq!(paths(&err), vec!["spec"]);
    }

    #[test]
    fn equivalent_spec_is_not_a_change() {
        let original = map(serde_json::json!({}));
        // Explicit defaults normalize to the same wire config
        let same = converged(
            map(serde_json::json!({ "backupCount": 1, "inMemoryFormat": "BINARY" })),
            &original.spec,
        );
        assert!(validate_update(&same).is_ok());
    }

    #[test]
    fn rename_and_retarget_are_named() {
        let original = map(serde_json::json!({}));
        let moved = converged(
            map(serde_json::json!({ "name": "other", "hazelcastResourceName": "other-cluster" })),
            &original.spec,
        );
        assert_eq!(
            paths(&validate_update(&moved).unwrap_err()),
            vec!["spec.name", "spec.hazelcastResourceName"]
        );
    }

    #[test]
    fn invalid_update_reports_spec_errors_first() {
        let original = map(serde_json::json!({}));
        let invalid = converged(
            map(serde_json::json!({ "backupCount": 7 })),
            &original.spec,
        );
        assert!(matches!(
            validate_update(&invalid).unwrap_err(),
            Error::InvalidSpec { .. }
        ));
    }
}
