//! Link configuration
//!
//! Connection parameters are supplied by the caller (an external
//! authentication/config provider); this core treats them as opaque. The
//! behavioural knobs live in [`LinkConfig`] so deployments can tune queue
//! depth and timeouts without code changes.

use std::time::Duration;

use crate::protocol::AudioSettings;
use crate::reconnect::ReconnectPolicy;

/// Parameters for one connection to the voice endpoint
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// WebSocket endpoint URL (`wss://…`)
    pub endpoint: String,
    /// API key, sent as a request header; injected, never generated here
    pub api_key: Option<String>,
    /// Voice/prompt configuration identifier understood by the endpoint
    pub config_id: Option<String>,
    /// Audio parameters announced during the handshake
    pub audio: AudioSettings,
}

impl ConnectionParams {
    /// Create parameters for an endpoint with default audio settings
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            config_id: None,
            audio: AudioSettings::default(),
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the voice configuration id
    pub fn with_config_id(mut self, config_id: impl Into<String>) -> Self {
        self.config_id = Some(config_id.into());
        self
    }

    /// Set the announced audio settings
    pub fn with_audio(mut self, audio: AudioSettings) -> Self {
        self.audio = audio;
        self
    }
}

/// Behavioural configuration for a [`RemoteVoiceLink`](crate::RemoteVoiceLink)
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Bounded outbound queue depth; a full queue fails fast
    pub send_queue_capacity: usize,
    /// Bounded inbound event queue depth
    pub event_queue_capacity: usize,
    /// How long to wait for the handshake acknowledgement
    pub handshake_timeout: Duration,
    /// Keepalive ping interval
    pub ping_interval: Duration,
    /// Reconnect backoff policy
    pub reconnect: ReconnectPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            send_queue_capacity: 32,
            event_queue_capacity: 64,
            handshake_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(20),
            reconnect: ReconnectPolicy::default(),
        }
    }
}
