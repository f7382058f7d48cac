//! Custom Resource Definitions served by the operator

mod hazelcast;
mod jet_job;
mod map;
mod multi_map;
mod queue;
mod replicated_map;
mod topic;
mod types;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

pub use hazelcast::{
    Hazelcast, HazelcastPhase, HazelcastSpec, HazelcastStatus, JetEngineConfiguration,
};
pub use jet_job::{
    BucketConfiguration, JetJob, JetJobPhase, JetJobSpec, JetJobState, JetJobStatus,
};
pub use map::{Map, MapSpec};
pub use multi_map::{MultiMap, MultiMapSpec};
pub use queue::{Queue, QueueSpec};
pub use replicated_map::{ReplicatedMap, ReplicatedMapSpec};
pub use topic::{Topic, TopicSpec};
pub use types::{CollectionType, DataStructureState, DataStructureStatus, InMemoryFormat};

/// Definitions of every CRD the operator serves, in install order
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        Hazelcast::crd(),
        ReplicatedMap::crd(),
        Map::crd(),
        MultiMap::crd(),
        Queue::crd(),
        Topic::crd(),
        JetJob::crd(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_crd_is_in_the_hazelcast_group() {
        let crds = all_crds();
        assert_eq!(crds.len(), 7);
        for crd in &crds {
            assert_eq!(crd.spec.group, crate::API_GROUP);
        }
    }

    #[test]
    fn crds_render_as_yaml() {
        let yaml = serde_yaml::to_string(&ReplicatedMap::crd()).unwrap();
        assert!(yaml.contains("replicatedmaps.hazelcast.com"));
    }
}
