//! # Audio Core: Frames, Codec, and Device Ports
//!
//! Audio handling for the call-audio bridge: frame and format types, the pure
//! device↔wire frame codec, and scoped device ports over pluggable backends.
//!
//! ## Components
//!
//! - [`types`]: `AudioFormat`, `AudioFrame`, directions and constants
//! - [`codec`]: `FrameCodec` (resampling, channel mixing, boundary padding)
//!   and `FrameChunker` (fixed-duration frame assembly)
//! - [`device`]: the `AudioDevice` trait, `DeviceAudioPort` pairing, and the
//!   cpal / stream / mock backends
//!
//! ## Feature Flags
//!
//! - `device-cpal`: real hardware devices via CPAL
//! - `device-mock`: deterministic in-memory devices for tests

pub mod codec;
pub mod device;
pub mod error;
pub mod types;

pub use codec::{bytes_to_pcm, pcm_to_bytes, FrameChunker, FrameCodec};
pub use device::{open_port_count, AudioDevice, AudioDeviceInfo, DeviceAudioPort, PlaybackHandle};
pub use error::{AudioError, AudioResult};
pub use types::{
    now_timestamp_ms, samples_per_frame, AudioDirection, AudioFormat, AudioFrame, FrameDirection,
    DEFAULT_CHANNELS, DEFAULT_FRAME_SIZE_MS, DEFAULT_WIRE_SAMPLE_RATE,
};
