//! Error types for the Hazelcast operator
//!
//! Admission-time errors (`InvalidSpec`, `Conflict`, `Forbidden`) are
//! returned to whoever tried to write the resource. Reconcile-time errors are
//! classified by [`Error::is_retryable`] and recorded in resource status;
//! they never escape the reconcile loop except for status-write failures.

use hz_protocol::ProtocolError;
use thiserror::Error;

use crate::field::{self, FieldError};

/// Main error type for operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Spec failed admission validation
    #[error("{kind} {name} is invalid: {}", field::join(.errors))]
    InvalidSpec {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Every violation found
        errors: Vec<FieldError>,
    },

    /// Spec collides with another live resource
    #[error("operation cannot be fulfilled on {kind} {name}: {message}")]
    Conflict {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Which resource it collides with
        message: String,
    },

    /// Update touches fields that cannot change after convergence
    #[error("{kind} {name} update is forbidden: {}", field::join(.errors))]
    Forbidden {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Every violating field
        errors: Vec<FieldError>,
    },

    /// Target cluster has no ready client yet
    #[error("cluster {cluster} is not ready: {message}")]
    NotReady {
        /// Target cluster (`namespace/name`)
        cluster: String,
        /// Why no client is available
        message: String,
    },

    /// Request could not be delivered to, or was not applied by, every member
    #[error("transport error on cluster {cluster}: {message}")]
    Transport {
        /// Target cluster (`namespace/name`)
        cluster: String,
        /// Description of what failed
        message: String,
        /// Members that did not apply the request
        failing_members: Vec<String>,
    },

    /// Cluster refused the shape of the request
    #[error("rejected by cluster {cluster}: {message}")]
    RejectedByCluster {
        /// Target cluster (`namespace/name`)
        cluster: String,
        /// Rejection reported by the member
        message: String,
    },

    /// Outcome of an apply cannot be observed
    #[error("cannot observe cluster state: {message}")]
    Observation {
        /// Description of what failed
        message: String,
    },

    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g. "annotation", "controller")
        context: String,
    },
}

impl Error {
    /// Create an invalid-spec error
    pub fn invalid_spec(
        kind: impl Into<String>,
        name: impl Into<String>,
        errors: Vec<FieldError>,
    ) -> Self {
        Self::InvalidSpec {
            kind: kind.into(),
            name: name.into(),
            errors,
        }
    }

    /// Create a conflict error
    pub fn conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a forbidden-update error
    pub fn forbidden(
        kind: impl Into<String>,
        name: impl Into<String>,
        errors: Vec<FieldError>,
    ) -> Self {
        Self::Forbidden {
            kind: kind.into(),
            name: name.into(),
            errors,
        }
    }

    /// Create a not-ready error
    pub fn not_ready(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::NotReady {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create a transport error
    pub fn transport(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transport {
            cluster: cluster.into(),
            message: msg.into(),
            failing_members: Vec::new(),
        }
    }

    /// Create a transport error naming the members that failed
    pub fn transport_partial(
        cluster: impl Into<String>,
        msg: impl Into<String>,
        failing_members: Vec<String>,
    ) -> Self {
        Self::Transport {
            cluster: cluster.into(),
            message: msg.into(),
            failing_members,
        }
    }

    /// Create a rejected-by-cluster error
    pub fn rejected(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::RejectedByCluster {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create an observation error
    pub fn observation(msg: impl Into<String>) -> Self {
        Self::Observation {
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Not-ready and transport failures are transient. Admission errors,
    /// cluster rejections, observation failures and internal errors need a
    /// human. Kubernetes errors are retryable unless they are 4xx, except
    /// 409 which means a stale write that succeeds after a refetch.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::NotReady { .. } | Error::Transport { .. } => true,
            Error::Kube { source } => match source {
                kube::Error::Api(ae) if ae.code == 409 => true,
                kube::Error::Api(ae) => !(400..500).contains(&ae.code),
                _ => true,
            },
            Error::InvalidSpec { .. }
            | Error::Conflict { .. }
            | Error::Forbidden { .. }
            | Error::RejectedByCluster { .. }
            | Error::Observation { .. }
            | Error::Serialization { .. }
            | Error::Internal { .. } => false,
        }
    }

    /// Whether this is a Kubernetes optimistic-concurrency conflict
    pub fn is_status_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }

    /// Whether this error came from the admission checks
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            Error::InvalidSpec { .. } | Error::Conflict { .. } | Error::Forbidden { .. }
        )
    }

    /// Field errors carried by admission errors
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Error::InvalidSpec { errors, .. } | Error::Forbidden { errors, .. } => errors,
            _ => &[],
        }
    }

    /// Get the target cluster if this error is about one
    pub fn cluster(&self) -> Option<&str> {
        match self {
            Error::NotReady { cluster, .. }
            | Error::Transport { cluster, .. }
            | Error::RejectedByCluster { cluster, .. } => Some(cluster),
            _ => None,
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        // A response we cannot decode leaves the apply outcome unknown.
        Error::observation(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
