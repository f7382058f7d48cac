//! Protocol error types
//!
//! Every decoding failure surfaces as a [`ProtocolError`]; decoders never
//! panic on malformed input.

use thiserror::Error;

/// Maximum accepted frame size (64 MiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Maximum accepted size of one reassembled message (128 MiB)
pub const MAX_MESSAGE_SIZE: usize = 128 * 1024 * 1024;

/// Errors produced while encoding or decoding client messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not enough bytes to decode the requested value
    #[error("truncated input: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required
        needed: usize,
        /// Bytes present
        available: usize,
    },

    /// Frame length prefix is outside the accepted range
    #[error("invalid frame length {length}")]
    InvalidFrameLength {
        /// Length read from the prefix
        length: i64,
    },

    /// Fragments of one message exceeded the accepted total size
    #[error("message of at least {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge {
        /// Bytes accumulated when the limit was crossed
        size: usize,
        /// Accepted total
        limit: usize,
    },

    /// The message did not contain an expected frame
    #[error("missing frame: {0}")]
    MissingFrame(&'static str),

    /// Response carried an unexpected message type
    #[error("unexpected message type {actual:#x}, expected {expected:#x}")]
    UnexpectedMessageType {
        /// Type the decoder expected
        expected: i32,
        /// Type found in the initial frame
        actual: i32,
    },

    /// A string frame did not hold valid UTF-8
    #[error("invalid utf-8 in string frame: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A nested structure was not properly delimited
    #[error("malformed structure: {0}")]
    MalformedStructure(String),

    /// A persisted config document could not be read as a typed config
    #[error("invalid snapshot for {kind} '{name}': {reason}")]
    InvalidSnapshot {
        /// Config section (e.g. "replicatedmap")
        kind: String,
        /// Object name
        name: String,
        /// Underlying decode failure
        reason: String,
    },

    /// Serialization of a config document failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Build a truncation error
    pub fn truncated(needed: usize, available: usize) -> Self {
        Self::Truncated { needed, available }
    }

    /// Build a malformed-structure error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedStructure(msg.into())
    }
}
