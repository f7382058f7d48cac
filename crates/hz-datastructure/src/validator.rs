//! Persistence validator

use hz_protocol::WireConfig;

/// Whether `snapshot` shows `desired` persisted.
///
/// Both sides go through the same normalization the encoder uses, so
/// whitespace, case and unset-vs-default differences never cause a false
/// negative. An absent snapshot is never converged.
pub fn is_converged(desired: &WireConfig, snapshot: Option<&WireConfig>) -> bool {
    snapshot.is_some_and(|snapshot| {
        desired.clone().normalized() == snapshot.clone().normalized()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{extract, render};
    use hz_protocol::config::{
        MapConfig, MultiMapConfig, QueueConfig, ReplicatedMapConfig, TopicConfig,
    };

    fn samples() -> Vec<WireConfig> {
        vec![
            WireConfig::ReplicatedMap(ReplicatedMapConfig {
                name: "sessions".into(),
                in_memory_format: "BINARY".into(),
                async_fillup: false,
                ..Default::default()
            }),
            WireConfig::Map(MapConfig {
                name: "orders".into(),
                backup_count: 2,
                async_backup_count: 1,
                max_idle_seconds: 30,
                read_backup_data: true,
                ..Default::default()
            }),
            WireConfig::MultiMap(MultiMapConfig {
                name: "tags".into(),
                value_collection_type: "LIST".into(),
                binary: true,
                ..Default::default()
            }),
            WireConfig::Queue(QueueConfig {
                name: "jobs".into(),
                max_size: 10,
                empty_queue_ttl: 60,
                priority_comparator_class_name: Some("com.example.ByPriority".into()),
                ..Default::default()
            }),
            WireConfig::Topic(TopicConfig {
                name: "events".into(),
                global_ordering_enabled: true,
                user_code_namespace: Some("ns1".into()),
                ..Default::default()
            }),
        ]
    }

    /// The snapshot a cluster would report after persisting `config`
    fn persisted(config: &WireConfig) -> WireConfig {
        let document = render([config]).unwrap();
        extract(&document, config.kind(), config.name())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn every_config_converges_with_its_own_snapshot() {
        for config in samples() {
            assert!(
                is_converged(&config, Some(&persisted(&config))),
                "{config:?} did not converge"
            );
        }
    }

    #[test]
    fn absent_snapshot_is_not_converged() {
        for config in samples() {
            assert!(!is_converged(&config, None));
        }
    }

    #[test]
    fn any_field_difference_is_not_converged() {
        let WireConfig::Map(base) = samples().remove(1) else {
            unreachable!()
        };
        let variants = [
            MapConfig { backup_count: 3, ..base.clone() },
            MapConfig { async_backup_count: 0, ..base.clone() },
            MapConfig { time_to_live_seconds: 5, ..base.clone() },
            MapConfig { in_memory_format: "OBJECT".into(), ..base.clone() },
            MapConfig { read_backup_data: false, ..base.clone() },
            MapConfig { statistics_enabled: false, ..base.clone() },
            MapConfig { user_code_namespace: Some("ns2".into()), ..base.clone() },
        ];
        let snapshot = persisted(&WireConfig::Map(base));
        for variant in variants {
            assert!(!is_converged(&WireConfig::Map(variant), Some(&snapshot)));
        }
    }

    #[test]
    fn different_kind_or_name_is_not_converged() {
        let queue = samples().remove(3);
        let topic = samples().remove(4);
        assert!(!is_converged(&queue, Some(&persisted(&topic))));

        let WireConfig::Queue(mut renamed) = queue.clone() else {
            unreachable!()
        };
        renamed.name = "other".into();
        assert!(!is_converged(&queue, Some(&WireConfig::Queue(renamed))));
    }

    #[test]
    fn formatting_differences_are_not_mismatches() {
        let desired = WireConfig::ReplicatedMap(ReplicatedMapConfig {
            name: "sessions".into(),
            in_memory_format: "object".into(),
            user_code_namespace: Some("  ".into()),
            ..Default::default()
        });
        let snapshot = WireConfig::ReplicatedMap(ReplicatedMapConfig {
            name: " sessions ".into(),
            ..Default::default()
        });
        assert!(is_converged(&desired, Some(&snapshot)));
    }
}
