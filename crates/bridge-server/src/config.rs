//! Server configuration
//!
//! Everything an operator tunes lives here, flag- or env-settable. The
//! timeouts and thresholds flow into [`BridgeConfig`]; the endpoint
//! parameters into the default [`ConnectionParams`].

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use callbridge_audio_core::AudioFormat;
use callbridge_bridge_core::BridgeConfig;
use callbridge_link_core::{AudioSettings, ConnectionParams};

/// Call-audio bridge server
#[derive(Debug, Clone, Parser)]
#[command(name = "callbridge-server", version, about)]
pub struct ServerConfig {
    /// Address to serve the control and streaming surface on
    #[arg(long, env = "CALLBRIDGE_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,

    /// WebSocket URL of the conversational-AI voice endpoint
    #[arg(long, env = "VOICE_ENDPOINT_URL")]
    pub endpoint: String,

    /// API key for the voice endpoint
    #[arg(long, env = "VOICE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Voice/prompt configuration identifier
    #[arg(long, env = "VOICE_CONFIG_ID")]
    pub config_id: Option<String>,

    /// Sample rate announced to the voice endpoint (Hz)
    #[arg(long, default_value_t = 16_000)]
    pub wire_sample_rate: u32,

    /// Sample rate used on the device side (Hz)
    #[arg(long, default_value_t = 16_000)]
    pub device_sample_rate: u32,

    /// Name fragment of the capture device (e.g. "CABLE Output")
    #[arg(long, env = "CALLBRIDGE_INPUT_DEVICE")]
    pub input_device: Option<String>,

    /// Name fragment of the playback device (e.g. "CABLE Input")
    #[arg(long, env = "CALLBRIDGE_OUTPUT_DEVICE")]
    pub output_device: Option<String>,

    /// Playout window in frames before oldest-frame eviction
    #[arg(long, default_value_t = 2)]
    pub playout_window: usize,

    /// Bound on session setup, in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub setup_timeout_ms: u64,

    /// Bound on session draining, in milliseconds
    #[arg(long, default_value_t = 3_000)]
    pub drain_timeout_ms: u64,

    /// How long terminal session states stay queryable, in seconds
    #[arg(long, default_value_t = 30)]
    pub retention_secs: u64,

    /// Idle heartbeat interval on the audio WebSocket, in seconds
    #[arg(long, default_value_t = 30)]
    pub heartbeat_secs: u64,

    /// Capacity of the call-event webhook queue
    #[arg(long, default_value_t = 64)]
    pub event_queue: usize,
}

impl ServerConfig {
    /// Bridge tunables derived from the flags
    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            device_format: AudioFormat::new(self.device_sample_rate, 1, 16, 20),
            wire_format: AudioFormat::new(self.wire_sample_rate, 1, 16, 20),
            playout_window: self.playout_window,
            setup_timeout: Duration::from_millis(self.setup_timeout_ms),
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
            retention_window: Duration::from_secs(self.retention_secs),
            ..Default::default()
        }
    }

    /// Default connection parameters for new bridges
    pub fn connection_params(&self) -> ConnectionParams {
        let mut params = ConnectionParams::new(self.endpoint.clone())
            .with_audio(AudioSettings::linear16(self.wire_sample_rate, 1));
        if let Some(api_key) = &self.api_key {
            params = params.with_api_key(api_key.clone());
        }
        if let Some(config_id) = &self.config_id {
            params = params.with_config_id(config_id.clone());
        }
        params
    }

    /// Heartbeat interval for the streaming surface
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}
