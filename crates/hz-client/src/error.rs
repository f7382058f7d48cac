//! Transport errors

use hz_protocol::ProtocolError;
use thiserror::Error;

/// Failures delivering a request to a member or reading its answer
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket-level failure
    #[error("i/o error talking to {member}: {source}")]
    Io {
        /// Member address
        member: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Connection closed before the response arrived
    #[error("connection to {0} closed")]
    Closed(String),

    /// No connection to the named member
    #[error("no connection to member {0}")]
    UnknownMember(String),

    /// No member is connected
    #[error("no member connected: {0}")]
    NoMembers(String),

    /// Member refused the client's credentials or cluster name
    #[error("authentication with {member} failed: {reason}")]
    Authentication {
        /// Member address
        member: String,
        /// Status reported by the member
        reason: String,
    },

    /// Request could not be encoded or response could not be framed
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    /// Whether reconnecting may help
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Authentication { .. })
    }
}
