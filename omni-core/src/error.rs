//! Domain-specific error types for the omni protocol.
//!
//! All fallible operations return `Result<T, OmniError>`.
//! Decoding never panics on hostile input: every malformed frame maps to a
//! [`ProtocolError`] and the session keeps running.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::state::CorrelationKey;

/// Errors raised while encoding or decoding a single frame.
///
/// A `ProtocolError` on an inbound frame drops that frame only.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame carried no bytes at all (not even a tag).
    #[error("empty frame")]
    Empty,

    /// The leading tag byte does not name a known message.
    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),

    /// The frame is shorter than its tag's fixed layout requires.
    #[error("truncated {what}: need {needed} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        needed: usize,
        actual: usize,
    },

    /// A path field was not valid UTF-8.
    #[error("invalid utf-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A structured (MessagePack) record failed to encode or decode.
    #[error("malformed {what}: {reason}")]
    Malformed { what: &'static str, reason: String },

    /// A chunk exceeded the transfer limit.
    #[error("chunk too large: {size} bytes (max {max})")]
    ChunkTooLarge { size: usize, max: usize },
}

/// The canonical error type for an omni session.
#[derive(Debug, Error)]
pub enum OmniError {
    // ── Connection Errors ────────────────────────────────────────
    /// The socket failed to open, or failed mid-stream.
    #[error("connection error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    /// An operation needed a live socket and there was none.
    #[error("not connected")]
    NotConnected,

    /// The socket closed while a request was awaiting its response.
    #[error("connection closed while awaiting {0}")]
    ConnectionClosed(CorrelationKey),

    /// A connect attempt failed. Every caller that awaited the attempt
    /// gets the same cause.
    #[error("connect failed: {0}")]
    ConnectFailed(Arc<OmniError>),

    /// `close()` was called before the handshake finished.
    #[error("connect aborted by close")]
    ConnectAborted,

    /// A state transition was attempted from the wrong state.
    #[error("invalid connection transition: {0}")]
    InvalidTransition(&'static str),

    /// The session URL could not be built.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The base URL is not http(s) or ws(s), or cannot carry a path.
    #[error("unsupported base url: {0}")]
    UnsupportedUrl(String),

    // ── Protocol Errors ──────────────────────────────────────────
    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    // ── Request Errors ───────────────────────────────────────────
    /// A correlated request did not resolve before its deadline.
    #[error("request {key} timed out after {after:?}")]
    RequestTimeout { key: CorrelationKey, after: Duration },

    /// A correlated request was cancelled by its caller.
    #[error("request {key} was cancelled")]
    Cancelled { key: CorrelationKey },

    /// Another caller is already waiting on the same correlation key.
    #[error("request {key} is already pending")]
    DuplicateRequest { key: CorrelationKey },

    // ── Transfer Errors ──────────────────────────────────────────
    /// The remote returned fewer bytes than the size it reported.
    #[error("transfer of {path} ended early: expected {expected} bytes, received {received}")]
    TransferInconsistency {
        path: String,
        expected: u64,
        received: u64,
    },

    /// A transferred file did not hash to the expected digest.
    #[error("file integrity check failed for {0}")]
    FileIntegrityFailed(String),

    // ── Local Errors ─────────────────────────────────────────────
    /// Local filesystem or stdio failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,
}

impl OmniError {
    /// Returns `true` for errors that concern the socket rather than a
    /// single request.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::NotConnected
                | Self::ConnectionClosed(_)
                | Self::ConnectFailed(_)
                | Self::ConnectAborted
        )
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for OmniError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        OmniError::ChannelClosed
    }
}
