//! Error types for chain store operations
//!
//! The taxonomy mirrors the failure modes of the pipeline: codec rejections,
//! user serializer rejections, network deadlines, and endpoint failures.
//! Mutating calls that end in [`Error::Timeout`] have an *unknown* outcome:
//! the blob may already be on the server's chain, and only a subsequent
//! `get` can tell.

use std::time::Duration;
use thiserror::Error;

use crate::codec::CodecError;

/// Result type alias for chain store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the chain store pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// The codec rejected a blob while decoding a chain.
    /// `position` is the zero-based index of the offending blob.
    #[error("malformed operation at chain position {position}: {source}")]
    MalformedOperation {
        position: usize,
        #[source]
        source: CodecError,
    },

    /// A user-provided serializer rejected a key or value
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// The network round-trip exceeded the configured deadline.
    /// For mutating calls the outcome is unknown until a later `get`.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint is closed or the store alias is not served
    #[error("store '{alias}' unavailable: {reason}")]
    EntityUnavailable { alias: String, reason: String },

    /// The server rejected a message opcode it does not understand
    #[error("unsupported opcode: {descriptor}")]
    UnsupportedOpcode { descriptor: String },

    /// Connection-level failures (connect, reunite, oversized frames)
    #[error("connection error: {message}")]
    Connection { message: String },

    /// The peer sent bytes that do not parse as a protocol message
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Error::Serialization { message: msg.into() }
    }

    /// Create an entity-unavailable error
    pub fn unavailable<A: Into<String>, R: Into<String>>(alias: A, reason: R) -> Self {
        Error::EntityUnavailable {
            alias: alias.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Error::Connection { message: msg.into() }
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Error::Protocol { message: msg.into() }
    }
}
