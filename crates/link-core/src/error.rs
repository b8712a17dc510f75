//! Error handling for the remote voice link
//!
//! A clean remote close is not an error condition for the owning session (it
//! triggers orderly draining); everything else here eventually surfaces as a
//! `LinkFault` once the reconnect budget is spent.

use thiserror::Error;

/// Result type alias for link operations
pub type LinkResult<T> = std::result::Result<T, LinkError>;

/// Error type for voice-endpoint link operations
#[derive(Error, Debug)]
pub enum LinkError {
    /// Socket establishment failed
    #[error("failed to connect to voice endpoint {endpoint}: {reason}")]
    ConnectFailed { endpoint: String, reason: String },

    /// Endpoint did not acknowledge session settings in time
    #[error("voice endpoint handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    /// Endpoint answered the handshake with an error
    #[error("voice endpoint rejected session settings: {reason}")]
    HandshakeRejected { reason: String },

    /// Send queue is full; the caller decides whether to wait or fail
    #[error("link send queue full ({capacity} messages)")]
    Backpressure { capacity: usize },

    /// The remote closed the connection cleanly (end of conversation)
    #[error("voice endpoint closed the connection")]
    Closed,

    /// Malformed traffic from the endpoint
    #[error("protocol error from voice endpoint: {reason}")]
    Protocol { reason: String },

    /// Transient I/O failure, candidate for reconnection
    #[error("link I/O error: {reason}")]
    Io { reason: String },

    /// Connection unrecoverable after the full reconnect budget
    #[error("voice endpoint unreachable after {attempts} reconnect attempts: {reason}")]
    Fault { attempts: u32, reason: String },
}

impl LinkError {
    /// Create a connect-failed error
    pub fn connect_failed(endpoint: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ConnectFailed {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a protocol error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Create a transient I/O error
    pub fn io(reason: impl std::fmt::Display) -> Self {
        Self::Io {
            reason: reason.to_string(),
        }
    }

    /// Whether this is the clean end-of-conversation close
    pub fn is_clean_close(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether reconnection may resolve this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::ConnectFailed { .. } | Self::Backpressure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_close_is_not_recoverable_or_fault() {
        let err = LinkError::Closed;
        assert!(err.is_clean_close());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_io_errors_are_recoverable() {
        assert!(LinkError::io("reset by peer").is_recoverable());
        assert!(!LinkError::HandshakeRejected { reason: "bad config".into() }.is_recoverable());
    }
}
