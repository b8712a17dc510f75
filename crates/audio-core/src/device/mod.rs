//! Audio device abstraction
//!
//! Platform-agnostic traits for audio capture/playback plus the
//! [`DeviceAudioPort`] that pairs one input and one output device for a
//! bridge session. Port acquisition is scoped: handles are reserved for the
//! session's lifetime and released on every exit path, so the underlying
//! device is available for the next call.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::codec::FrameChunker;
use crate::error::{AudioError, AudioResult};
use crate::types::{now_timestamp_ms, AudioDirection, AudioFormat, AudioFrame, FrameDirection};

#[cfg(feature = "device-cpal")]
pub mod cpal_backend;
#[cfg(any(feature = "device-mock", test))]
pub mod mock;
pub mod stream;

/// Capacity of the capture channel between a device and its port
const CAPTURE_CHANNEL_CAPACITY: usize = 64;

/// Process-wide count of open device ports, for leak detection
static OPEN_PORTS: AtomicUsize = AtomicUsize::new(0);

/// Number of device ports currently open in this process
pub fn open_port_count() -> usize {
    OPEN_PORTS.load(Ordering::SeqCst)
}

/// Audio device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    /// Device identifier
    pub id: String,
    /// Human-readable device name
    pub name: String,
    /// Device direction
    pub direction: AudioDirection,
    /// Whether this is the host default device
    pub is_default: bool,
    /// Supported sample rates
    pub supported_sample_rates: Vec<u32>,
    /// Supported channel counts
    pub supported_channels: Vec<u16>,
}

impl AudioDeviceInfo {
    /// Create a new device info with common supported formats
    pub fn new(id: String, name: String, direction: AudioDirection) -> Self {
        Self {
            id,
            name,
            direction,
            is_default: false,
            supported_sample_rates: vec![8_000, 16_000, 44_100, 48_000],
            supported_channels: vec![1, 2],
        }
    }

    /// Check if the device supports the given format
    pub fn supports_format(&self, format: &AudioFormat) -> bool {
        self.supported_sample_rates.contains(&format.sample_rate)
            && self.supported_channels.contains(&format.channels)
    }
}

/// Audio device trait
///
/// Capture devices deliver blocks of interleaved i16 samples over a bounded
/// channel; playback devices consume them the same way. Implementations
/// provide the actual I/O (cpal hardware, a network stream, or a mock).
#[async_trait::async_trait]
pub trait AudioDevice: Send + Sync + std::fmt::Debug {
    /// Get device information
    fn info(&self) -> &AudioDeviceInfo;

    /// Check if the device supports the given format
    fn supports_format(&self, format: &AudioFormat) -> bool {
        self.info().supports_format(format)
    }

    /// Start capture, returning a receiver of captured sample blocks
    async fn start_capture(&self, format: AudioFormat) -> AudioResult<mpsc::Receiver<Vec<i16>>>;

    /// Stop capture and release the capture handle
    async fn stop_capture(&self) -> AudioResult<()>;

    /// Start playback, returning a sender for sample blocks to play
    async fn start_playback(&self, format: AudioFormat) -> AudioResult<mpsc::Sender<Vec<i16>>>;

    /// Stop playback and release the playback handle
    async fn stop_playback(&self) -> AudioResult<()>;

    /// Whether the device currently holds an open stream
    fn is_active(&self) -> bool;
}

/// Shared state between a port and its playback pump task
#[derive(Debug)]
struct PlayoutShared {
    queue: parking_lot::Mutex<VecDeque<AudioFrame>>,
    notify: Notify,
    window: usize,
    evicted: AtomicU64,
    closed: AtomicBool,
}

/// Cloneable playback half of a [`DeviceAudioPort`]
///
/// Lets the outbound data path push frames without contending with the
/// capture side for the port itself. Becomes inert once the port is
/// released.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    playout: Arc<PlayoutShared>,
}

impl PlaybackHandle {
    /// Queue an outbound frame, evicting the oldest beyond the window
    pub fn push(&self, frame: AudioFrame) -> AudioResult<()> {
        if self.playout.closed.load(Ordering::SeqCst) {
            return Err(AudioError::io("device port already released"));
        }

        {
            let mut queue = self.playout.queue.lock();
            while queue.len() >= self.playout.window {
                queue.pop_front();
                let evicted = self.playout.evicted.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(evicted, "playout window full, evicting oldest frame");
            }
            queue.push_back(frame);
        }
        self.playout.notify.notify_one();
        Ok(())
    }

    /// Total outbound frames evicted due to device underrun
    pub fn evicted_frames(&self) -> u64 {
        self.playout.evicted.load(Ordering::Relaxed)
    }

    /// Frames currently queued for playback
    pub fn queued(&self) -> usize {
        self.playout.queue.lock().len()
    }
}

/// One session's exclusive pairing of a capture and a playback device
///
/// `pull_captured` assembles device reads into fixed-duration inbound frames;
/// `push_playback` queues outbound frames behind a bounded playout window.
/// When the device cannot drain the window fast enough the oldest unplayed
/// frame is evicted, bounding playback latency instead of growing a backlog.
#[derive(Debug)]
pub struct DeviceAudioPort {
    input: Arc<dyn AudioDevice>,
    output: Arc<dyn AudioDevice>,
    format: AudioFormat,
    capture_rx: mpsc::Receiver<Vec<i16>>,
    chunker: FrameChunker,
    ready: VecDeque<Vec<i16>>,
    capture_sequence: u64,
    playout: Arc<PlayoutShared>,
    pump: JoinHandle<()>,
    released: bool,
}

impl DeviceAudioPort {
    /// Open a port over an input/output device pair
    ///
    /// Both streams are started; if playback setup fails the already-started
    /// capture stream is stopped before returning the error.
    pub async fn open(
        input: Arc<dyn AudioDevice>,
        output: Arc<dyn AudioDevice>,
        format: AudioFormat,
        playout_window: usize,
    ) -> AudioResult<Self> {
        if input.info().direction != AudioDirection::Input {
            return Err(AudioError::configuration(format!(
                "device {} is not an input device",
                input.info().id
            )));
        }
        if output.info().direction != AudioDirection::Output {
            return Err(AudioError::configuration(format!(
                "device {} is not an output device",
                output.info().id
            )));
        }

        let capture_rx = input.start_capture(format.clone()).await?;
        let playback_tx = match output.start_playback(format.clone()).await {
            Ok(tx) => tx,
            Err(e) => {
                let _ = input.stop_capture().await;
                return Err(e);
            }
        };

        let playout = Arc::new(PlayoutShared {
            queue: parking_lot::Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            window: playout_window.max(1),
            evicted: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });
        let pump = tokio::spawn(playback_pump(playout.clone(), playback_tx));

        OPEN_PORTS.fetch_add(1, Ordering::SeqCst);
        debug!(
            input = %input.info().id,
            output = %output.info().id,
            format = %format.description(),
            "opened device port"
        );

        let chunker = FrameChunker::new(&format);
        Ok(Self {
            input,
            output,
            format,
            capture_rx,
            chunker,
            ready: VecDeque::new(),
            capture_sequence: 0,
            playout,
            pump,
            released: false,
        })
    }

    /// The format both devices were opened with
    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Pull the next captured frame, or `None` if nothing is ready within
    /// the poll interval
    ///
    /// Never blocks past `poll`; the session loop stays responsive to
    /// shutdown signals. A closed capture stream is an I/O error, not an
    /// empty poll.
    pub async fn pull_captured(&mut self, poll: Duration) -> AudioResult<Option<AudioFrame>> {
        if self.ready.is_empty() {
            let rx = &mut self.capture_rx;
            let chunker = &mut self.chunker;
            let ready = &mut self.ready;
            let fill = async {
                loop {
                    match rx.recv().await {
                        Some(block) => {
                            let frames = chunker.push(&block);
                            if !frames.is_empty() {
                                ready.extend(frames);
                                return Ok(());
                            }
                        }
                        None => return Err(AudioError::io("capture stream ended")),
                    }
                }
            };
            match tokio::time::timeout(poll, fill).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => return Ok(None),
            }
        }

        let Some(samples) = self.ready.pop_front() else {
            return Ok(None);
        };
        let frame = AudioFrame::new(
            samples,
            self.format.clone(),
            FrameDirection::Inbound,
            self.capture_sequence,
            now_timestamp_ms(),
        );
        self.capture_sequence += 1;
        Ok(Some(frame))
    }

    /// Cloneable playback half of this port
    pub fn playback_handle(&self) -> PlaybackHandle {
        PlaybackHandle {
            playout: self.playout.clone(),
        }
    }

    /// Queue an outbound frame for playback
    ///
    /// If the playout window is full the oldest unplayed frame is evicted
    /// and counted; the call itself never blocks.
    pub fn push_playback(&self, frame: AudioFrame) -> AudioResult<()> {
        if self.released {
            return Err(AudioError::io("device port already released"));
        }
        self.playback_handle().push(frame)
    }

    /// Total outbound frames evicted due to device underrun
    pub fn evicted_frames(&self) -> u64 {
        self.playout.evicted.load(Ordering::Relaxed)
    }

    /// Frames currently queued for playback
    pub fn queued_playback(&self) -> usize {
        self.playout.queue.lock().len()
    }

    /// Release both device handles
    ///
    /// Idempotent; called on every session exit path, orderly or not.
    pub async fn release(&mut self) -> AudioResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        self.playout.closed.store(true, Ordering::SeqCst);
        self.playout.notify.notify_waiters();
        self.pump.abort();

        let capture = self.input.stop_capture().await;
        let playback = self.output.stop_playback().await;
        OPEN_PORTS.fetch_sub(1, Ordering::SeqCst);
        debug!(input = %self.input.info().id, output = %self.output.info().id, "released device port");

        capture?;
        playback?;
        Ok(())
    }
}

impl Drop for DeviceAudioPort {
    fn drop(&mut self) {
        if !self.released {
            // Backstop for abnormal teardown: the pump dies with the task
            // handle and the open-port accounting stays truthful, but the
            // devices' async stop hooks cannot run here.
            self.released = true;
            self.playout.closed.store(true, Ordering::SeqCst);
            self.pump.abort();
            OPEN_PORTS.fetch_sub(1, Ordering::SeqCst);
            warn!(input = %self.input.info().id, "device port dropped without release");
        }
    }
}

/// Forwards queued playout frames into the playback device at its own pace
async fn playback_pump(shared: Arc<PlayoutShared>, tx: mpsc::Sender<Vec<i16>>) {
    loop {
        let frame = loop {
            if shared.closed.load(Ordering::SeqCst) {
                return;
            }
            let next = shared.queue.lock().pop_front();
            match next {
                Some(frame) => break frame,
                None => shared.notify.notified().await,
            }
        };

        if tx.send(frame.samples).await.is_err() {
            debug!("playback device channel closed");
            return;
        }
    }
}
