//! Error handling for bridge sessions
//!
//! `DuplicateSession` is benign (logged, not surfaced to the event source);
//! device and link faults are fatal to the owning session only and never
//! propagate to other sessions or the dispatcher.

use thiserror::Error;

use callbridge_audio_core::AudioError;
use callbridge_link_core::LinkError;

use crate::types::CallId;

/// Result type alias for bridge operations
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Error type for bridge session lifecycle and relay operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// A session already exists for this call; duplicate starts are expected
    /// from flaky event sources and absorbed by the dispatcher
    #[error("bridge session already exists for call {call_id}")]
    DuplicateSession { call_id: CallId },

    /// No session (live or retained) for this call
    #[error("no bridge session for call {call_id}")]
    SessionNotFound { call_id: CallId },

    /// Connecting exceeded its bound; the session completes as Failed
    #[error("session setup timed out after {timeout_ms}ms")]
    SetupTimeout { timeout_ms: u64 },

    /// Draining exceeded its bound; the session is forced to Closed
    #[error("session drain timed out after {timeout_ms}ms, forcing close")]
    DrainTimeout { timeout_ms: u64 },

    /// Audio port open/read/write failure
    #[error("device fault: {0}")]
    Device(#[from] AudioError),

    /// Remote link unrecoverable after its retry budget
    #[error("link fault: {0}")]
    Link(#[from] LinkError),
}

impl BridgeError {
    /// Whether this error is absorbed silently rather than surfaced
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::DuplicateSession { .. } | Self::SessionNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_is_benign() {
        let err = BridgeError::DuplicateSession {
            call_id: CallId::new("call-1"),
        };
        assert!(err.is_benign());
        assert!(!BridgeError::SetupTimeout { timeout_ms: 10_000 }.is_benign());
    }
}
