//! Audio frame codec
//!
//! Pure conversion between the device's native sample layout and the wire
//! format the remote voice endpoint expects: sample-rate conversion by linear
//! interpolation, channel mixing, and chunking into fixed-duration frames.
//! The only state retained is the resampler filter history, which is
//! per-session and reset at session creation.

use crate::error::{AudioError, AudioResult};
use crate::types::AudioFormat;

/// Convert i16 PCM samples to little-endian bytes
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Convert little-endian bytes to i16 PCM samples
///
/// A trailing odd byte is truncated rather than rejected; it can only occur
/// at a stream boundary.
pub fn bytes_to_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Resampler filter history carried across calls
///
/// `position` is the fractional read position into the virtual input stream;
/// `previous` is the last input sample of the prior block, kept so
/// interpolation stays continuous across block boundaries.
#[derive(Debug, Clone, Default)]
struct ResampleState {
    position: f64,
    previous: Option<i16>,
}

impl ResampleState {
    fn reset(&mut self) {
        self.position = 0.0;
        self.previous = None;
    }

    /// Resample one block, carrying interpolation state to the next call
    fn resample(&mut self, input: &[i16], step: f64) -> Vec<i16> {
        if input.is_empty() {
            return Vec::new();
        }

        let mut buffer = Vec::with_capacity(input.len() + 1);
        if let Some(prev) = self.previous {
            buffer.push(prev);
        }
        buffer.extend_from_slice(input);

        let last_index = (buffer.len() - 1) as f64;
        let mut output = Vec::with_capacity((input.len() as f64 / step).ceil() as usize + 1);

        while self.position < last_index {
            let index = self.position.floor() as usize;
            let fraction = self.position - index as f64;
            let a = buffer[index] as f64;
            let b = buffer[index + 1] as f64;
            output.push((a + (b - a) * fraction) as i16);
            self.position += step;
        }

        self.previous = Some(buffer[buffer.len() - 1]);
        self.position -= last_index;
        output
    }
}

/// Mix between channel layouts (mono duplication / stereo averaging)
fn mix_channels(samples: &[i16], from: u16, to: u16) -> AudioResult<Vec<i16>> {
    match (from, to) {
        (a, b) if a == b => Ok(samples.to_vec()),
        (1, 2) => {
            let mut stereo = Vec::with_capacity(samples.len() * 2);
            for &sample in samples {
                stereo.push(sample);
                stereo.push(sample);
            }
            Ok(stereo)
        }
        (2, 1) => {
            let mut mono = Vec::with_capacity(samples.len() / 2);
            for pair in samples.chunks_exact(2) {
                mono.push(((pair[0] as i32 + pair[1] as i32) / 2) as i16);
            }
            Ok(mono)
        }
        (from, to) => Err(AudioError::ConversionFailed {
            source_format: format!("{} channels", from),
            target_format: format!("{} channels", to),
            reason: "unsupported channel configuration".to_string(),
        }),
    }
}

/// Converts between device-native samples and wire-format frames
///
/// `encode` takes one device frame and produces wire bytes; `decode` takes
/// wire bytes and produces device samples. Short input on encode is
/// zero-padded to a whole device frame; odd trailing bytes on decode are
/// truncated.
pub struct FrameCodec {
    device_format: AudioFormat,
    wire_format: AudioFormat,
    encode_state: ResampleState,
    decode_state: ResampleState,
}

impl FrameCodec {
    /// Create a codec for a device/wire format pair
    pub fn new(device_format: AudioFormat, wire_format: AudioFormat) -> AudioResult<Self> {
        if device_format.bits_per_sample != 16 || wire_format.bits_per_sample != 16 {
            return Err(AudioError::ConversionFailed {
                source_format: device_format.description(),
                target_format: wire_format.description(),
                reason: "only 16-bit linear PCM is supported".to_string(),
            });
        }

        Ok(Self {
            device_format,
            wire_format,
            encode_state: ResampleState::default(),
            decode_state: ResampleState::default(),
        })
    }

    /// The device-side format
    pub fn device_format(&self) -> &AudioFormat {
        &self.device_format
    }

    /// The wire-side format
    pub fn wire_format(&self) -> &AudioFormat {
        &self.wire_format
    }

    /// Encode one block of device samples into wire bytes
    pub fn encode(&mut self, samples: &[i16]) -> AudioResult<Vec<u8>> {
        let frame_samples = self.device_format.samples_per_frame();
        let padded;
        let samples = if !samples.is_empty() && samples.len() < frame_samples {
            let mut tail = samples.to_vec();
            tail.resize(frame_samples, 0);
            padded = tail;
            &padded[..]
        } else {
            samples
        };

        let mixed = mix_channels(samples, self.device_format.channels, self.wire_format.channels)?;
        let resampled = if self.device_format.sample_rate == self.wire_format.sample_rate {
            mixed
        } else {
            let step = self.device_format.sample_rate as f64 / self.wire_format.sample_rate as f64;
            self.encode_state.resample(&mixed, step)
        };

        Ok(pcm_to_bytes(&resampled))
    }

    /// Decode wire bytes into device samples
    pub fn decode(&mut self, bytes: &[u8]) -> AudioResult<Vec<i16>> {
        let samples = bytes_to_pcm(bytes);
        let resampled = if self.wire_format.sample_rate == self.device_format.sample_rate {
            samples
        } else {
            let step = self.wire_format.sample_rate as f64 / self.device_format.sample_rate as f64;
            self.decode_state.resample(&samples, step)
        };

        mix_channels(
            &resampled,
            self.wire_format.channels,
            self.device_format.channels,
        )
    }

    /// Reset resampler history (at session creation / codec reuse)
    pub fn reset(&mut self) {
        self.encode_state.reset();
        self.decode_state.reset();
    }
}

/// Accumulates arbitrary-size sample reads into exact frame-duration blocks
///
/// Device callbacks rarely deliver exactly one frame's worth of samples; the
/// chunker buffers the remainder so downstream consumers always see
/// fixed-duration frames.
#[derive(Debug)]
pub struct FrameChunker {
    frame_samples: usize,
    pending: Vec<i16>,
}

impl FrameChunker {
    /// Create a chunker producing frames of the format's frame duration
    pub fn new(format: &AudioFormat) -> Self {
        Self::with_frame_samples(format.samples_per_frame())
    }

    /// Create a chunker with an explicit frame size in samples
    pub fn with_frame_samples(frame_samples: usize) -> Self {
        Self {
            frame_samples: frame_samples.max(1),
            pending: Vec::new(),
        }
    }

    /// Append samples, returning every complete frame now available
    pub fn push(&mut self, samples: &[i16]) -> Vec<Vec<i16>> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let rest = self.pending.split_off(self.frame_samples);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    /// Flush the pending tail as a final zero-padded frame, if any
    pub fn flush(&mut self) -> Option<Vec<i16>> {
        if self.pending.is_empty() {
            return None;
        }
        let mut tail = std::mem::take(&mut self.pending);
        tail.resize(self.frame_samples, 0);
        Some(tail)
    }

    /// Number of buffered samples not yet forming a full frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
