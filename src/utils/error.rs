//! The `error` module defines the error types used throughout `tether`.
//!
//! Errors are layered the same way the stack is: `CodecError` for the byte
//! cursor, `ProtocolError` for framing and packet bodies, and `Error` for the
//! public client/server APIs. Codec and protocol errors never reach the remote
//! side; they surface as a closed connection.

use std::io;

/// Failures of the primitive byte cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("buffer too short")]
    BufferTooShort,
    #[error("varint overflow")]
    VarintOverflow,
    #[error("negative length")]
    NegativeLength,
    #[error("invalid utf-8 string")]
    InvalidUtf8,
}

/// Frame and packet level failures. Any of these is fatal for the connection
/// that produced it.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),
    #[error("packet size too large: {0} bytes")]
    PacketTooLarge(usize),
    #[error("inbound packet of {size} bytes exceeds limit of {max}")]
    MessageTooBig { size: usize, max: usize },
    #[error("invalid qos {0}")]
    InvalidQos(u8),
    #[error("unknown data type {0}")]
    UnknownDataType(u8),
    #[error("unknown peer message tag {0}")]
    UnknownPeerMessage(u8),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Returned by the authentication callback to refuse an identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("authentication failed: {0}")]
pub struct AuthError(pub String);

impl AuthError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not connected")]
    NotConnected,
    #[error("connection closed")]
    ConnClosed,
    #[error("connection not found")]
    ConnNotFound,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Protocol(ProtocolError::Codec(e))
    }
}

/// Crate-wide result, defaulting to [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
