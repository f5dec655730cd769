//! Error types for the session hub.
//!
//! Errors are split by who observes them:
//!
//! * [`ServerError`] - infrastructure failures (binding, accepting, upgrading)
//! * [`AdmissionError`] - reasons a connection was refused before registration
//! * [`ProtocolError`] - per-buffer and per-frame failures while processing input
//! * [`HandlerError`] - failures reported by message handlers

use thiserror::Error;

/// Infrastructure-level errors raised by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Network related failures (bind, accept, WebSocket upgrade)
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server failures
    #[error("Internal error: {0}")]
    Internal(String),

    /// The identity store could not be reached or returned garbage
    #[error("Identity store error: {0}")]
    Identity(String),
}

/// Reasons a new connection is refused by the admission controller.
///
/// None of these are ever reported to the peer. They only show up in the
/// server-side access log, and the connection is dropped without a handshake
/// frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("player is banned")]
    Banned,

    #[error("session already exists for uuid")]
    DuplicateSession,

    #[error("too many connections from ip")]
    TooManyConnections,

    #[error("identity lookup failed: {0}")]
    IdentityUnavailable(String),
}

/// Errors produced while validating, splitting and dispatching inbound data.
///
/// The first three reject a whole buffer; the remaining variants are recorded
/// per frame and never stop sibling frames from being processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("bad request size")]
    BadRequestSize,

    #[error("bad byte sequence")]
    BadByteSequence,

    #[error("invalid UTF-8")]
    InvalidUtf8,

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("{tag}: {reason}")]
    Handler { tag: &'static str, reason: String },
}

impl ProtocolError {
    /// Whether this error discarded an entire inbound buffer.
    pub fn is_buffer_rejection(&self) -> bool {
        matches!(
            self,
            Self::BadRequestSize | Self::BadByteSequence | Self::InvalidUtf8
        )
    }
}

/// Failure reported by a message handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Result type returned by every message handler.
pub type HandlerResult = Result<(), HandlerError>;
