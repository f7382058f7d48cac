//! Common types for the Hazelcast operator: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod annotations;
pub mod config;
pub mod crd;
pub mod error;
pub mod events;
pub mod field;
pub mod retry;
pub mod telemetry;

pub use config::ControllerConfig;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group of every CRD served by the operator
pub const API_GROUP: &str = "hazelcast.com";

/// Finalizer placed on resources that reached their success state
pub const FINALIZER: &str = "hazelcast.com/finalizer";

/// Field manager used for server-side apply and status writes
pub const FIELD_MANAGER: &str = "hazelcast-operator";

/// Port Hazelcast members listen on for client connections
pub const DEFAULT_MEMBER_PORT: u16 = 5701;

/// Suffix of the Secret holding a cluster's persisted configuration
pub const CONFIG_SECRET_SUFFIX: &str = "-config";

/// Key of the persisted configuration document inside the config Secret
pub const CONFIG_SECRET_KEY: &str = "hazelcast.yaml";

/// Name of the config Secret for the cluster `hazelcast`
pub fn config_secret_name(hazelcast: &str) -> String {
    format!("{hazelcast}{CONFIG_SECRET_SUFFIX}")
}
