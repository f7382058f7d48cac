//! Validating admission webhook
//!
//! Rejects resources the cluster could not safely apply before any
//! reconcile is scheduled:
//!
//! - JetJobs must be created `Running`, use a job name no other job on the
//!   same cluster uses, and target a cluster with the Jet engine and
//!   resource upload enabled. Their identity and artifact fields are frozen
//!   once the job has converged.
//! - Data structures must carry a valid spec and, once persisted, cannot
//!   change their name, target or config.

#![deny(missing_docs)]

pub mod admission;
pub mod data_structure;
pub mod error;
pub mod jet;
pub mod server;
pub mod store;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use hz_common::crd::{Map, MultiMap, Queue, ReplicatedMap, Topic};

pub use error::WebhookError;
pub use server::{start_server, ServerConfig};
pub use store::{AdmissionStore, KubeAdmissionStore};

/// Shared state for webhook handlers
pub struct WebhookState {
    /// Reads for the JetJob uniqueness and precondition checks
    pub store: Arc<dyn AdmissionStore>,
}

impl WebhookState {
    /// Create webhook state backed by `store`
    pub fn new(store: Arc<dyn AdmissionStore>) -> Self {
        Self { store }
    }
}

/// Router with one validation endpoint per kind
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    use admission::{validate_data_structure_handler as data_structure, validate_jet_job_handler};

    Router::new()
        .route("/validate/jetjobs", post(validate_jet_job_handler))
        .route("/validate/replicatedmaps", post(data_structure::<ReplicatedMap>))
        .route("/validate/maps", post(data_structure::<Map>))
        .route("/validate/multimaps", post(data_structure::<MultiMap>))
        .route("/validate/queues", post(data_structure::<Queue>))
        .route("/validate/topics", post(data_structure::<Topic>))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}
