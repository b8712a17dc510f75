//! Channel-backed audio devices
//!
//! When audio capture is remote rather than local to the process, raw sample
//! blocks arrive over a transport (the server's binary WebSocket surface) and
//! must still flow through a [`DeviceAudioPort`](super::DeviceAudioPort). A
//! `StreamAudioDevice` adapts a bounded channel pair to the device trait so
//! the session layer cannot tell the difference.
//!
//! A stream device serves a single session; its streams cannot be restarted
//! after `stop_capture`/`stop_playback`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::{AudioDevice, AudioDeviceInfo};
use crate::error::{AudioError, AudioResult};
use crate::types::{AudioDirection, AudioFormat};

/// Capacity of the channel between the transport and the device
const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Producer side of a stream input device
#[derive(Debug, Clone)]
pub struct StreamSource {
    tx: mpsc::Sender<Vec<i16>>,
}

impl StreamSource {
    /// Push a block of samples into the capture stream
    ///
    /// Waits for channel space; the transport applies its own bounds before
    /// this point.
    pub async fn push(&self, samples: Vec<i16>) -> AudioResult<()> {
        self.tx
            .send(samples)
            .await
            .map_err(|_| AudioError::io("stream capture device closed"))
    }
}

/// Consumer side of a stream output device
#[derive(Debug)]
pub struct StreamSink {
    rx: mpsc::Receiver<Vec<i16>>,
}

impl StreamSink {
    /// Receive the next playback block; `None` when the device side closed
    pub async fn next(&mut self) -> Option<Vec<i16>> {
        self.rx.recv().await
    }
}

/// Audio device backed by bounded channels instead of hardware
#[derive(Debug)]
pub struct StreamAudioDevice {
    info: AudioDeviceInfo,
    active: AtomicBool,
    capture_rx: parking_lot::Mutex<Option<mpsc::Receiver<Vec<i16>>>>,
    playback_tx: parking_lot::Mutex<Option<mpsc::Sender<Vec<i16>>>>,
}

impl StreamAudioDevice {
    /// Create an input device fed by the returned [`StreamSource`]
    pub fn input(name: &str) -> (Arc<Self>, StreamSource) {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let device = Arc::new(Self {
            info: AudioDeviceInfo::new(
                format!("stream-input-{name}"),
                name.to_string(),
                AudioDirection::Input,
            ),
            active: AtomicBool::new(false),
            capture_rx: parking_lot::Mutex::new(Some(rx)),
            playback_tx: parking_lot::Mutex::new(None),
        });
        (device, StreamSource { tx })
    }

    /// Create an output device draining into the returned [`StreamSink`]
    pub fn output(name: &str) -> (Arc<Self>, StreamSink) {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let device = Arc::new(Self {
            info: AudioDeviceInfo::new(
                format!("stream-output-{name}"),
                name.to_string(),
                AudioDirection::Output,
            ),
            active: AtomicBool::new(false),
            capture_rx: parking_lot::Mutex::new(None),
            playback_tx: parking_lot::Mutex::new(Some(tx)),
        });
        (device, StreamSink { rx })
    }
}

#[async_trait::async_trait]
impl AudioDevice for StreamAudioDevice {
    fn info(&self) -> &AudioDeviceInfo {
        &self.info
    }

    async fn start_capture(&self, _format: AudioFormat) -> AudioResult<mpsc::Receiver<Vec<i16>>> {
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
        let tx = self.playback_tx.lock().take().ok_or_else(|| AudioError::DeviceInUse {
            device_id: self.info.id.clone(),
        })?;
        self.active.store(true, Ordering::SeqCst);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceAudioPort;
    use crate::types::{AudioFrame, FrameDirection};
    use std::time::Duration;

    #[tokio::test]
    #[serial_test::serial(device_ports)]
    async fn test_stream_devices_relay_through_port() {
        let (input, source) = StreamAudioDevice::input("ws");
        let (output, mut sink) = StreamAudioDevice::output("ws");
        let format = AudioFormat::wire_default();

        let mut port = DeviceAudioPort::open(input, output, format.clone(), 2)
            .await
            .unwrap();

        source.push(vec![42i16; 320]).await.unwrap();
        let frame = port
            .pull_captured(Duration::from_millis(50))
            .await
            .unwrap()
            .expect("frame ready");
        assert_eq!(frame.samples, vec![42i16; 320]);

        let out = AudioFrame::new(vec![7i16; 320], format, FrameDirection::Outbound, 0, 0);
        port.push_playback(out).unwrap();
        let played = sink.next().await.expect("playback block");
        assert_eq!(played, vec![7i16; 320]);

        port.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_stream_device_is_single_session() {
        let (input, _source) = StreamAudioDevice::input("ws");
        let first = input.start_capture(AudioFormat::wire_default()).await;
        assert!(first.is_ok());
        let second = input.start_capture(AudioFormat::wire_default()).await;
        assert!(matches!(second, Err(AudioError::DeviceInUse { .. })));
    }
}
