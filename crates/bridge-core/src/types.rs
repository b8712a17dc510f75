//! Core bridge types
//!
//! Call identity, session states, tunable configuration, and the stats and
//! event payloads exposed through the control surface.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use callbridge_audio_core::AudioFormat;
use callbridge_link_core::LinkConfig;

/// Opaque identity of one telephony call
///
/// Supplied by the external call-event source and stable for the call's
/// duration; this core never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Wrap a call identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CallId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Lifecycle state of a bridge session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Device port and remote link are being set up
    Connecting,
    /// Audio is relayed in both directions
    Active,
    /// Call ended; in-flight audio is flushed, new frames rejected
    Draining,
    /// Orderly terminal state
    Closed,
    /// Unrecoverable fault; resources released immediately
    Failed,
}

impl SessionState {
    /// Whether the session has completed its lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tunable parameters for bridge sessions
///
/// The thresholds are deployment knobs, not constants; the defaults are the
/// values the system has been operated with.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Format used on the device side of every session
    pub device_format: AudioFormat,
    /// Format sent to / received from the voice endpoint
    pub wire_format: AudioFormat,
    /// Bounded playout window in frames; older frames are evicted
    pub playout_window: usize,
    /// Poll interval for the capture pull loop
    pub capture_poll: Duration,
    /// How long the inbound path may block on a full link send queue
    pub send_block_timeout: Duration,
    /// Bound on Connecting before the session fails
    pub setup_timeout: Duration,
    /// Bound on Draining before the session is forced Closed
    pub drain_timeout: Duration,
    /// How long terminal states stay queryable after teardown
    pub retention_window: Duration,
    /// Link behaviour (queues, handshake, reconnect backoff)
    pub link: LinkConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_format: AudioFormat::wire_default(),
            wire_format: AudioFormat::wire_default(),
            playout_window: 2,
            capture_poll: Duration::from_millis(20),
            send_block_timeout: Duration::from_millis(500),
            setup_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(3),
            retention_window: Duration::from_secs(30),
            link: LinkConfig::default(),
        }
    }
}

/// Point-in-time statistics for one session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Call this session serves
    pub call_id: CallId,
    /// Current lifecycle state
    pub state: SessionState,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When a frame last moved in either direction
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Seconds since creation
    pub duration_seconds: f64,
    /// Inbound frames forwarded to the endpoint
    pub frames_sent: u64,
    /// Outbound frames queued for playback
    pub frames_received: u64,
    /// Outbound frames evicted by the playout window
    pub frames_evicted: u64,
    /// Sequence discontinuities observed (diagnostic only)
    pub sequence_gaps: u64,
    /// Successful link reconnects
    pub reconnects: u32,
    /// Endpoint chat id, once connected
    pub chat_id: Option<String>,
    /// Last fault message, if the session failed
    pub last_error: Option<String>,
}

/// Structured events emitted by a session while it runs
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Lifecycle transition
    StateChanged { call_id: CallId, state: SessionState },
    /// Transcript of what the caller said
    TranscriptUser { call_id: CallId, text: String },
    /// Transcript of what the assistant said
    TranscriptAssistant { call_id: CallId, text: String },
    /// Error reported by the voice endpoint (informational)
    EndpointError { call_id: CallId, message: String },
}
