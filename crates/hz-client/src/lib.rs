//! Client side of the operator's cluster connections
//!
//! - [`ClientProvider`] resolves a [`ClusterRef`] to a ready
//!   [`ClusterClient`], or reports the cluster as not ready
//! - [`ClientRegistry`] is the in-process provider the cluster controller
//!   fills as clusters come up
//! - [`tcp`] is the transport: one authenticated connection per member
//! - [`broadcast`] sends a request to every member and classifies the
//!   per-member outcome

#![deny(missing_docs)]

pub mod broadcast;
pub mod error;
pub mod provider;
pub mod registry;
pub mod tcp;

pub use broadcast::{broadcast, classify, expect_applied, invoke_with_deadline};
pub use error::TransportError;
pub use provider::{ClientProvider, ClusterClient, ClusterRef};
pub use registry::ClientRegistry;
