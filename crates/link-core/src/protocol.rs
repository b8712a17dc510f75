//! Wire protocol for the voice endpoint
//!
//! The endpoint speaks JSON text messages tagged by `type`, with audio
//! payloads carried as base64-encoded 16-bit linear PCM. The client opens
//! with `session_settings` and the endpoint acknowledges with
//! `chat_metadata` before any audio flows.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{LinkError, LinkResult};

/// Audio parameters announced in `session_settings`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Sample encoding; the endpoint supports `linear16`
    pub encoding: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
}

impl AudioSettings {
    /// Linear PCM settings for the given rate and channel count
    pub fn linear16(sample_rate: u32, channels: u16) -> Self {
        Self {
            encoding: "linear16".to_string(),
            sample_rate,
            channels,
        }
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self::linear16(16_000, 1)
    }
}

/// Messages sent to the voice endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Session negotiation, sent once immediately after connect
    SessionSettings {
        #[serde(skip_serializing_if = "Option::is_none")]
        config_id: Option<String>,
        audio: AudioSettings,
    },
    /// One frame of base64-encoded PCM captured from the call
    AudioInput { data: String },
    /// Suspend endpoint audio processing
    Pause,
    /// Resume endpoint audio processing
    Resume,
}

impl ClientMessage {
    /// Wrap raw PCM bytes as an `audio_input` message
    pub fn audio(pcm: &[u8]) -> Self {
        Self::AudioInput {
            data: BASE64.encode(pcm),
        }
    }

    /// Serialize to the JSON text the endpoint expects
    pub fn to_json(&self) -> LinkResult<String> {
        serde_json::to_string(self).map_err(|e| LinkError::protocol(e.to_string()))
    }
}

/// Transcript payload inside `user_message` / `assistant_message`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptPayload {
    /// Transcribed text
    #[serde(default)]
    pub content: String,
}

/// Messages received from the voice endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake acknowledgement carrying the endpoint chat id
    ChatMetadata {
        #[serde(default)]
        chat_id: Option<String>,
    },
    /// One block of base64-encoded PCM to play into the call
    AudioOutput { data: String },
    /// Transcript of what the caller said
    UserMessage {
        #[serde(default)]
        message: TranscriptPayload,
    },
    /// Transcript of what the assistant said
    AssistantMessage {
        #[serde(default)]
        message: TranscriptPayload,
    },
    /// Endpoint-reported error
    Error {
        #[serde(default)]
        message: String,
    },
    /// Message types this core does not act on (emotion scores, timings, …)
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Parse a JSON text frame from the endpoint
    pub fn parse(text: &str) -> LinkResult<Self> {
        serde_json::from_str(text).map_err(|e| LinkError::protocol(e.to_string()))
    }

    /// Decode the PCM payload of an `audio_output` message
    pub fn audio_bytes(&self) -> LinkResult<Vec<u8>> {
        match self {
            Self::AudioOutput { data } => BASE64
                .decode(data)
                .map_err(|e| LinkError::protocol(format!("invalid audio payload: {e}"))),
            _ => Err(LinkError::protocol("not an audio_output message")),
        }
    }
}
