//! Hazelcast operator: the cluster controller and the wiring that runs it
//! next to the data-structure and JetJob controllers

#![deny(missing_docs)]

/// Hazelcast cluster controller (client registration, persisted config)
pub mod cluster;
/// Builds the controller futures
pub mod controller_runner;
/// CRD installation
pub mod startup;
