//! Core audio types
//!
//! Frame and format definitions shared by the device ports, the frame codec,
//! and the bridge session layer.

use serde::{Deserialize, Serialize};

/// Default wire sample rate expected by the remote voice endpoint (Hz)
pub const DEFAULT_WIRE_SAMPLE_RATE: u32 = 16_000;
/// Default channel count (mono)
pub const DEFAULT_CHANNELS: u16 = 1;
/// Default frame duration in milliseconds
pub const DEFAULT_FRAME_SIZE_MS: u32 = 20;

/// Calculate the number of samples in one frame for a mono stream
pub fn samples_per_frame(sample_rate: u32, frame_size_ms: u32) -> usize {
    (sample_rate as usize * frame_size_ms as usize) / 1000
}

/// Audio device direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDirection {
    /// Audio input (capture)
    Input,
    /// Audio output (playback)
    Output,
}

impl AudioDirection {
    /// Short label used in device ids and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioDirection::Input => "input",
            AudioDirection::Output => "output",
        }
    }
}

/// Direction of an audio frame relative to the bridge session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameDirection {
    /// Captured from the device, heading to the remote endpoint
    Inbound,
    /// Received from the remote endpoint, heading to the device
    Outbound,
}

/// Audio format specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Bits per sample (16 for linear PCM)
    pub bits_per_sample: u16,
    /// Frame duration in milliseconds
    pub frame_size_ms: u32,
}

impl AudioFormat {
    /// Create a new audio format
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16, frame_size_ms: u32) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
            frame_size_ms,
        }
    }

    /// Default wire format (16kHz, mono, 16-bit, 20ms frames)
    pub fn wire_default() -> Self {
        Self::new(
            DEFAULT_WIRE_SAMPLE_RATE,
            DEFAULT_CHANNELS,
            16,
            DEFAULT_FRAME_SIZE_MS,
        )
    }

    /// Typical host device format (48kHz, mono, 16-bit, 20ms frames)
    pub fn device_default() -> Self {
        Self::new(48_000, 1, 16, DEFAULT_FRAME_SIZE_MS)
    }

    /// Samples per frame across all channels
    pub fn samples_per_frame(&self) -> usize {
        samples_per_frame(self.sample_rate, self.frame_size_ms) * self.channels as usize
    }

    /// Bytes per frame
    pub fn bytes_per_frame(&self) -> usize {
        self.samples_per_frame() * (self.bits_per_sample / 8) as usize
    }

    /// Check whether two formats describe the same sample layout
    pub fn is_compatible_with(&self, other: &AudioFormat) -> bool {
        self.sample_rate == other.sample_rate
            && self.channels == other.channels
            && self.bits_per_sample == other.bits_per_sample
    }

    /// Human-readable description for errors and logs
    pub fn description(&self) -> String {
        format!(
            "{}Hz/{}ch/{}bit/{}ms",
            self.sample_rate, self.channels, self.bits_per_sample, self.frame_size_ms
        )
    }
}

/// A timestamped, fixed-duration block of PCM samples
///
/// Sequence numbers increase by one per direction per session and exist for
/// drop/duplication diagnostics only; playback always uses arrival order.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Audio samples as interleaved i16 PCM
    pub samples: Vec<i16>,
    /// Format the samples are in
    pub format: AudioFormat,
    /// Frame direction relative to the session
    pub direction: FrameDirection,
    /// Monotonic per-direction sequence number
    pub sequence: u64,
    /// Capture/arrival timestamp in milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Create a new audio frame
    pub fn new(
        samples: Vec<i16>,
        format: AudioFormat,
        direction: FrameDirection,
        sequence: u64,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            samples,
            format,
            direction,
            sequence,
            timestamp_ms,
        }
    }

    /// Create a silent frame of one frame duration
    pub fn silent(
        format: AudioFormat,
        direction: FrameDirection,
        sequence: u64,
        timestamp_ms: u64,
    ) -> Self {
        let samples = vec![0; format.samples_per_frame()];
        Self::new(samples, format, direction, sequence, timestamp_ms)
    }

    /// Duration covered by the samples, in milliseconds
    pub fn duration_ms(&self) -> u64 {
        let per_channel = self.samples.len() as u64 / self.format.channels.max(1) as u64;
        per_channel * 1000 / self.format.sample_rate as u64
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_per_frame() {
        assert_eq!(samples_per_frame(16_000, 20), 320);
        assert_eq!(samples_per_frame(48_000, 20), 960);
        assert_eq!(samples_per_frame(8_000, 20), 160);
    }

    #[test]
    fn test_format_bytes_per_frame() {
        let format = AudioFormat::wire_default();
        assert_eq!(format.samples_per_frame(), 320);
        assert_eq!(format.bytes_per_frame(), 640);
    }

    #[test]
    fn test_frame_duration() {
        let format = AudioFormat::wire_default();
        let frame = AudioFrame::silent(format, FrameDirection::Inbound, 0, 0);
        assert_eq!(frame.duration_ms(), 20);
    }

    #[test]
    fn test_format_compatibility_ignores_frame_size() {
        let a = AudioFormat::new(16_000, 1, 16, 20);
        let b = AudioFormat::new(16_000, 1, 16, 40);
        assert!(a.is_compatible_with(&b));
    }
}
