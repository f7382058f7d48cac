//! Hazelcast open binary client protocol
//!
//! This crate is the codec layer of the operator. It is pure: nothing here
//! performs I/O, and every encoder is a deterministic function of its input.
//!
//! - [`frame`] - frames and client messages, the unit of the wire format
//! - [`codec`] - request encoders and response decoders per operation
//! - [`config`] - typed, normalized data-structure configs shared by the
//!   encoder and the persistence check
//! - [`response`] - per-member outcome decoding for broadcast requests

#![deny(missing_docs)]

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod response;

pub use config::{ConfigKind, WireConfig};
pub use error::ProtocolError;
pub use frame::{ClientMessage, Frame};
pub use response::{MemberOutcome, PerMemberStatus};

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
