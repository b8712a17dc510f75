//! Mock audio device backend
//!
//! Deterministic in-memory devices for tests: capture is fed by the test via
//! a handle, playback is recorded and can be paused to simulate a stalled
//! device. Enabled with the `device-mock` feature.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::{AudioDevice, AudioDeviceInfo};
use crate::error::{AudioError, AudioResult};
use crate::types::{AudioDirection, AudioFormat};

/// Capacity of the playback drain channel; kept small so a paused sink
/// exercises backpressure quickly
const PLAYBACK_CHANNEL_CAPACITY: usize = 4;

/// Test-side handle for injecting captured samples
#[derive(Debug, Clone)]
pub struct MockCaptureHandle {
    tx: mpsc::Sender<Vec<i16>>,
}

impl MockCaptureHandle {
    /// Inject a block of captured samples
    pub async fn inject(&self, samples: Vec<i16>) {
        let _ = self.tx.send(samples).await;
    }
}

/// Test-side handle observing and throttling playback
#[derive(Debug, Clone)]
pub struct MockPlaybackHandle {
    played: Arc<parking_lot::Mutex<Vec<Vec<i16>>>>,
    paused: Arc<AtomicBool>,
}

impl MockPlaybackHandle {
    /// Stop consuming playback blocks, simulating device underrun upstream
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resume consuming playback blocks
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Number of blocks the device has played
    pub fn played_blocks(&self) -> usize {
        self.played.lock().len()
    }

    /// All played samples, concatenated
    pub fn played_samples(&self) -> Vec<i16> {
        self.played.lock().iter().flatten().copied().collect()
    }
}

/// In-memory audio device for tests
#[derive(Debug)]
pub struct MockAudioDevice {
    info: AudioDeviceInfo,
    active: AtomicBool,
    fail_start: bool,
    capture_rx: parking_lot::Mutex<Option<mpsc::Receiver<Vec<i16>>>>,
    played: Arc<parking_lot::Mutex<Vec<Vec<i16>>>>,
    paused: Arc<AtomicBool>,
}

impl MockAudioDevice {
    /// Create a mock input device and the handle that feeds it
    pub fn input(name: &str) -> (Arc<Self>, MockCaptureHandle) {
        let (tx, rx) = mpsc::channel(super::CAPTURE_CHANNEL_CAPACITY);
        let device = Arc::new(Self {
            info: AudioDeviceInfo::new(
                format!("mock-input-{name}"),
                name.to_string(),
                AudioDirection::Input,
            ),
            active: AtomicBool::new(false),
            fail_start: false,
            capture_rx: parking_lot::Mutex::new(Some(rx)),
            played: Arc::new(parking_lot::Mutex::new(Vec::new())),
            paused: Arc::new(AtomicBool::new(false)),
        });
        (device, MockCaptureHandle { tx })
    }

    /// Create a mock output device and the handle that observes it
    pub fn output(name: &str) -> (Arc<Self>, MockPlaybackHandle) {
        let played = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let paused = Arc::new(AtomicBool::new(false));
        let device = Arc::new(Self {
            info: AudioDeviceInfo::new(
                format!("mock-output-{name}"),
                name.to_string(),
                AudioDirection::Output,
            ),
            active: AtomicBool::new(false),
            fail_start: false,
            capture_rx: parking_lot::Mutex::new(None),
            played: played.clone(),
            paused: paused.clone(),
        });
        (device, MockPlaybackHandle { played, paused })
    }

    /// Create a device whose stream setup always fails
    pub fn failing(name: &str, direction: AudioDirection) -> Arc<Self> {
        Arc::new(Self {
            info: AudioDeviceInfo::new(
                format!("mock-failing-{name}"),
                name.to_string(),
                direction,
            ),
            active: AtomicBool::new(false),
            fail_start: true,
            capture_rx: parking_lot::Mutex::new(None),
            played: Arc::new(parking_lot::Mutex::new(Vec::new())),
            paused: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait::async_trait]
impl AudioDevice for MockAudioDevice {
    fn info(&self) -> &AudioDeviceInfo {
        &self.info
    }

    async fn start_capture(&self, _format: AudioFormat) -> AudioResult<mpsc::Receiver<Vec<i16>>> {
        if self.fail_start {
            return Err(AudioError::platform("mock capture failure"));
        }
        let rx = self.capture_rx.lock().take().ok_or_else(|| AudioError::DeviceInUse {
            device_id: self.info.id.clone(),
        })?;
        self.active.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop_capture(&self) -> AudioResult<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn start_playback(&self, _format: AudioFormat) -> AudioResult<mpsc::Sender<Vec<i16>>> {
        if self.fail_start {
            return Err(AudioError::platform("mock playback failure"));
        }
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(AudioError::DeviceInUse {
                device_id: self.info.id.clone(),
            });
        }

        let (tx, mut rx) = mpsc::channel::<Vec<i16>>(PLAYBACK_CHANNEL_CAPACITY);
        let played = self.played.clone();
        let paused = self.paused.clone();
        tokio::spawn(async move {
            loop {
                while paused.load(Ordering::SeqCst) {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                match rx.recv().await {
                    Some(block) => played.lock().push(block),
                    None => break,
                }
            }
        });
        Ok(tx)
    }

    async fn stop_playback(&self) -> AudioResult<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
