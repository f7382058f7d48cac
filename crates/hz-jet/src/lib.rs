//! JetJob reconciliation
//!
//! Submits a job from a jar already present on the members, confirms it by
//! finding it in the cluster's job list, follows its status, and applies
//! run-state changes (suspend, resume, cancel, restart) requested on the
//! resource.

pub mod controller;
pub mod lifecycle;

pub use controller::{error_policy, reconcile, JetJobClient, JetJobContext, KubeJetJobClient};
