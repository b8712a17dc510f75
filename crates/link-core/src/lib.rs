//! # Link Core: Remote Voice Endpoint Connection
//!
//! Maintains one persistent, message-framed duplex WebSocket per bridge
//! session to the conversational-AI voice endpoint: connect/handshake,
//! bounded fail-fast sending, an inbound event stream, and reconnection with
//! exponential backoff.
//!
//! Credentials and voice-configuration identifiers are injected by the
//! caller through [`ConnectionParams`]; this crate never issues tokens or
//! manages endpoint configuration.

pub mod config;
pub mod error;
pub mod link;
pub mod protocol;
pub mod reconnect;
pub mod testing;

pub use config::{ConnectionParams, LinkConfig};
pub use error::{LinkError, LinkResult};
pub use link::{LinkEvent, LinkSender, RemoteVoiceLink, API_KEY_HEADER};
pub use protocol::{AudioSettings, ClientMessage, ServerMessage, TranscriptPayload};
pub use reconnect::ReconnectPolicy;
