//! Domain-specific error types for the streaming client.
//!
//! All fallible operations return `Result<T, ClientError>`.
//! Every error below the supervisor is terminal to the current session;
//! the supervisor alone decides to retry.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the streaming client.
#[derive(Debug, Error)]
pub enum ClientError {
    // ── Connect Errors ───────────────────────────────────────────
    /// The TCP connection attempt failed (refused, unreachable, …).
    #[error("connect error: {0}")]
    Connect(std::io::Error),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Protocol Errors ──────────────────────────────────────────
    /// The server violated the wire protocol.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// A protocol error carrying server-supplied detail.
    #[error("protocol error: {0}")]
    ProtocolMsg(String),

    /// The server rejected our credentials.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// None of the offered security types is supported.
    #[error("unsupported security type: {0}")]
    UnsupportedSecurity(u8),

    // ── Connection Errors ────────────────────────────────────────
    /// The socket failed mid-stream.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,
}

impl ClientError {
    /// Whether this error came from the connect phase rather than an
    /// established session.
    pub fn is_connect(&self) -> bool {
        matches!(self, ClientError::Connect(_) | ClientError::Timeout(_))
    }
}

// ── Convenient From implementations ──────────────────────────────

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ClientError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ClientError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = ClientError::Protocol("bad rectangle header");
        assert!(e.to_string().contains("rectangle"));

        let e = ClientError::UnsupportedSecurity(19);
        assert!(e.to_string().contains("19"));

        let e = ClientError::Timeout(Duration::from_secs(5));
        assert!(e.to_string().contains("5s"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let e: ClientError = io_err.into();
        assert!(matches!(e, ClientError::Io(_)));
    }

    #[test]
    fn connect_classification() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(ClientError::Connect(io_err).is_connect());
        assert!(ClientError::Timeout(Duration::from_secs(1)).is_connect());
        assert!(!ClientError::ChannelClosed.is_connect());
    }
}
