//! # Bridge Server: Control and Streaming Surface
//!
//! HTTP/WebSocket front for the bridge core:
//!
//! - [`api`]: REST control (start/stop/inspect bridges, statistics) and the
//!   call-event webhook
//! - [`ws`]: the binary audio streaming surface for remote capture
//! - [`devices`]: host-audio device providers for REST-started bridges
//! - [`config`]: flag/env configuration

pub mod api;
pub mod config;
pub mod devices;
pub mod ws;

pub use api::{router, AppState};
pub use config::ServerConfig;
