//! Data-structure config reconciliation
//!
//! One state machine, written against the [`ManagedDataStructure`]
//! capability set and instantiated per kind (`ReplicatedMap`, `Map`,
//! `MultiMap`, `Queue`, `Topic`).
//!
//! A config is submitted once, then confirmed by reading the cluster's
//! persisted configuration back and comparing it with the desired config.
//! An acknowledgment alone never counts as converged.

pub mod controller;
pub mod document;
pub mod kind;
pub mod snapshot;
pub mod validator;

pub use controller::{
    error_policy, reconcile, DataStructureClient, DataStructureContext, KubeDataStructureClient,
};
pub use kind::ManagedDataStructure;
pub use snapshot::{SecretSnapshotReader, SnapshotReader};
pub use validator::is_converged;
