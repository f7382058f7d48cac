//! Capability set shared by every data-structure kind

use std::fmt::Debug;

use hz_client::ClusterRef;
use hz_common::crd::{DataStructureStatus, Map, MultiMap, Queue, ReplicatedMap, Topic};
use hz_protocol::{ConfigKind, WireConfig};
use kube::core::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A data-structure resource the reconciler can drive to `Persisted`
pub trait ManagedDataStructure:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Spec recorded in the last-successful-spec annotation
    type Spec: Serialize + DeserializeOwned + Send + Sync;

    /// Wire kind of this resource
    const CONFIG_KIND: ConfigKind;

    /// Name of the object on the cluster
    fn structure_name(&self) -> String;

    /// Name of the `Hazelcast` resource the config targets
    fn hazelcast_resource_name(&self) -> &str;

    /// Normalized wire config, the same value that is encoded and compared
    fn desired_config(&self) -> WireConfig;

    /// The resource spec
    fn spec(&self) -> &Self::Spec;

    /// Current status
    fn status(&self) -> Option<&DataStructureStatus>;

    /// Copy of this resource carrying `spec`, e.g. one read back from the
    /// last-successful-spec annotation
    fn with_spec(&self, spec: Self::Spec) -> Self;

    /// Target cluster, in the resource's own namespace
    fn target(&self) -> ClusterRef {
        ClusterRef::new(
            self.namespace().unwrap_or_default(),
            self.hazelcast_resource_name(),
        )
    }
}

macro_rules! managed_data_structure {
    ($kind:ty, $spec:ty, $config_kind:expr, $name_fn:ident) => {
        impl ManagedDataStructure for $kind {
            type Spec = $spec;

            const CONFIG_KIND: ConfigKind = $config_kind;

            fn structure_name(&self) -> String {
                self.$name_fn()
            }

            fn hazelcast_resource_name(&self) -> &str {
                &self.spec.hazelcast_resource_name
            }

            fn desired_config(&self) -> WireConfig {
                self.wire_config()
            }

            fn spec(&self) -> &Self::Spec {
                &self.spec
            }

            fn status(&self) -> Option<&DataStructureStatus> {
                self.status.as_ref()
            }

            fn with_spec(&self, spec: Self::Spec) -> Self {
                let mut obj = self.clone();
                obj.spec = spec;
                obj
            }
        }
    };
}

managed_data_structure!(
    ReplicatedMap,
    hz_common::crd::ReplicatedMapSpec,
    ConfigKind::ReplicatedMap,
    map_name
);
managed_data_structure!(Map, hz_common::crd::MapSpec, ConfigKind::Map, map_name);
managed_data_structure!(
    MultiMap,
    hz_common::crd::MultiMapSpec,
    ConfigKind::MultiMap,
    map_name
);
managed_data_structure!(Queue, hz_common::crd::QueueSpec, ConfigKind::Queue, queue_name);
managed_data_structure!(Topic, hz_common::crd::TopicSpec, ConfigKind::Topic, topic_name);

#[cfg(test)]
mod tests {
    use super::*;
    use hz_common::crd::{QueueSpec, TopicSpec};

    fn in_namespace<K: Resource>(mut obj: K, namespace: &str) -> K {
        obj.meta_mut().namespace = Some(namespace.to_string());
        obj
    }

    #[test]
    fn target_is_the_hazelcast_resource_in_the_same_namespace() {
        let queue: QueueSpec = serde_json::from_value(serde_json::json!({
            "hazelcastResourceName": "hz"
        }))
        .unwrap();
        let queue = in_namespace(Queue::new("jobs", queue), "data");
        assert_eq!(queue.target(), ClusterRef::new("data", "hz"));
        assert_eq!(queue.structure_name(), "jobs");
        assert_eq!(queue.desired_config().kind(), Queue::CONFIG_KIND);
    }

    #[test]
    fn explicit_name_overrides_resource_name() {
        let topic: TopicSpec = serde_json::from_value(serde_json::json!({
            "name": "audit-events",
            "hazelcastResourceName": "hz"
        }))
        .unwrap();
        let topic = Topic::new("audit", topic);
        assert_eq!(topic.structure_name(), "audit-events");
        assert_eq!(topic.desired_config().name(), "audit-events");
    }
}
