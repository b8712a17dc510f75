//! CPAL-based audio device backend
//!
//! Real hardware (and virtual-cable) device support behind the `device-cpal`
//! feature. Virtual loopback devices such as VB-Cable are located by name
//! substring, which is how operators identify them on every platform.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{AudioDevice, AudioDeviceInfo, CAPTURE_CHANNEL_CAPACITY};
use crate::error::{AudioError, AudioResult};
use crate::types::{AudioDirection, AudioFormat};

/// CPAL-backed audio device
pub struct CpalAudioDevice {
    info: AudioDeviceInfo,
    device: Device,
    active: Arc<AtomicBool>,
    shutdown_tx: parking_lot::Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
}

impl std::fmt::Debug for CpalAudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalAudioDevice")
            .field("info", &self.info)
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}

impl CpalAudioDevice {
    fn new(info: AudioDeviceInfo, device: Device) -> Self {
        Self {
            info,
            device,
            active: Arc::new(AtomicBool::new(false)),
            shutdown_tx: parking_lot::Mutex::new(None),
        }
    }

    fn stream_config(&self, format: &AudioFormat) -> StreamConfig {
        StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(
                format.sample_rate * format.frame_size_ms / 1000,
            ),
        }
    }

    fn signal_shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

/// Convert cpal f32 samples to i16 PCM
fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect()
}

/// Convert i16 PCM to cpal f32 samples
fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect()
}

#[async_trait::async_trait]
impl AudioDevice for CpalAudioDevice {
    fn info(&self) -> &AudioDeviceInfo {
        &self.info
    }

    async fn start_capture(&self, format: AudioFormat) -> AudioResult<mpsc::Receiver<Vec<i16>>> {
        if self.info.direction != AudioDirection::Input {
            return Err(AudioError::configuration("cannot capture on output device"));
        }
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(AudioError::DeviceInUse {
                device_id: self.info.id.clone(),
            });
        }

        let (tx, rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let config = self.stream_config(&format);
        let device = self.device.clone();
        let device_name = self.info.name.clone();
        let active = self.active.clone();

        // CPAL streams are not Send; manage the stream on a dedicated thread
        std::thread::spawn(move || {
            let stream = match device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if tx.try_send(f32_to_i16(data)).is_err() {
                        debug!("capture consumer lagging, dropping device block");
                    }
                },
                |err| error!(error = %err, "audio capture stream error"),
                None,
            ) {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, "failed to build input stream");
                    active.store(false, Ordering::SeqCst);
                    return;
                }
            };

            if let Err(e) = stream.play() {
                error!(error = %e, "failed to start input stream");
                active.store(false, Ordering::SeqCst);
                return;
            }
            info!(device = %device_name, "started audio capture");

            let _ = shutdown_rx.blocking_recv();
            active.store(false, Ordering::SeqCst);
            info!(device = %device_name, "stopped audio capture");
        });

        Ok(rx)
    }

    async fn stop_capture(&self) -> AudioResult<()> {
        self.signal_shutdown();
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn start_playback(&self, format: AudioFormat) -> AudioResult<mpsc::Sender<Vec<i16>>> {
        if self.info.direction != AudioDirection::Output {
            return Err(AudioError::configuration("cannot play back on input device"));
        }
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(AudioError::DeviceInUse {
                device_id: self.info.id.clone(),
            });
        }

        let (tx, mut rx) = mpsc::channel::<Vec<i16>>(CAPTURE_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let config = self.stream_config(&format);
        let device = self.device.clone();
        let device_name = self.info.name.clone();
        let active = self.active.clone();

        std::thread::spawn(move || {
            let buffer = Arc::new(parking_lot::Mutex::new(Vec::<f32>::new()));
            let callback_buffer = buffer.clone();

            let stream = match device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut buffer = callback_buffer.lock();
                    let available = buffer.len().min(data.len());
                    data[..available].copy_from_slice(&buffer[..available]);
                    buffer.drain(..available);
                    // underrun: pad with silence rather than stall the device
                    data[available..].fill(0.0);
                },
                |err| error!(error = %err, "audio playback stream error"),
                None,
            ) {
                Ok(stream) => stream,
                Err(e) => {
                    error!(error = %e, "failed to build output stream");
                    active.store(false, Ordering::SeqCst);
                    return;
                }
            };

            if let Err(e) = stream.play() {
                error!(error = %e, "failed to start output stream");
                active.store(false, Ordering::SeqCst);
                return;
            }
            info!(device = %device_name, "started audio playback");

            // Feed the callback buffer until shutdown or channel close
            let rt = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
                Ok(rt) => rt,
                Err(e) => {
                    error!(error = %e, "failed to build playback feeder runtime");
                    active.store(false, Ordering::SeqCst);
                    return;
                }
            };
            rt.block_on(async {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    tokio::select! {
                        block = rx.recv() => match block {
                            Some(samples) => buffer.lock().extend(i16_to_f32(&samples)),
                            None => break,
                        },
                        _ = &mut shutdown_rx => break,
                    }
                }
            });

            active.store(false, Ordering::SeqCst);
            info!(device = %device_name, "stopped audio playback");
        });

        Ok(tx)
    }

    async fn stop_playback(&self) -> AudioResult<()> {
        self.signal_shutdown();
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Host-level device enumeration and lookup
pub struct CpalHost {
    host: Host,
}

impl CpalHost {
    /// Create a host using the platform default audio backend
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    fn devices_for(&self, direction: AudioDirection) -> AudioResult<Vec<Device>> {
        let devices = match direction {
            AudioDirection::Input => self.host.input_devices(),
            AudioDirection::Output => self.host.output_devices(),
        }
        .map_err(|e| AudioError::platform(format!(
            "failed to enumerate {} devices: {}",
            direction.as_str(),
            e
        )))?;
        Ok(devices.collect())
    }

    fn describe(device: &Device, direction: AudioDirection, index: usize) -> AudioDeviceInfo {
        let name = device
            .name()
            .unwrap_or_else(|_| format!("Unknown Device {index}"));

        let configs: Vec<_> = match direction {
            AudioDirection::Input => device
                .supported_input_configs()
                .map(|c| c.collect())
                .unwrap_or_default(),
            AudioDirection::Output => device
                .supported_output_configs()
                .map(|c| c.collect())
                .unwrap_or_default(),
        };

        let mut info = AudioDeviceInfo::new(
            format!("cpal-{}-{}", direction.as_str(), index),
            name,
            direction,
        );
        if !configs.is_empty() {
            let mut sample_rates = Vec::new();
            let mut channels = Vec::new();
            for config in &configs {
                sample_rates.push(config.min_sample_rate().0);
                sample_rates.push(config.max_sample_rate().0);
                channels.push(config.channels());
            }
            sample_rates.sort_unstable();
            sample_rates.dedup();
            channels.sort_unstable();
            channels.dedup();
            info.supported_sample_rates = sample_rates;
            info.supported_channels = channels;
        }
        info
    }

    /// List available devices in one direction
    pub fn list_devices(&self, direction: AudioDirection) -> AudioResult<Vec<AudioDeviceInfo>> {
        Ok(self
            .devices_for(direction)?
            .iter()
            .enumerate()
            .map(|(index, device)| Self::describe(device, direction, index))
            .collect())
    }

    /// Get the host default device for a direction
    pub fn default_device(&self, direction: AudioDirection) -> AudioResult<Arc<dyn AudioDevice>> {
        let device = match direction {
            AudioDirection::Input => self.host.default_input_device(),
            AudioDirection::Output => self.host.default_output_device(),
        }
        .ok_or_else(|| AudioError::device_not_found(format!("default-{}", direction.as_str())))?;

        let mut info = Self::describe(&device, direction, 0);
        info.id = format!("cpal-default-{}", direction.as_str());
        info.is_default = true;
        Ok(Arc::new(CpalAudioDevice::new(info, device)))
    }

    /// Find a device whose name contains the given substring
    ///
    /// This is how virtual cables ("CABLE Output" / "CABLE Input") are
    /// located; falls back to an error, not the default device, so a missing
    /// cable is diagnosed rather than silently bridging the wrong audio.
    pub fn find_device(
        &self,
        name_fragment: &str,
        direction: AudioDirection,
    ) -> AudioResult<Arc<dyn AudioDevice>> {
        let fragment = name_fragment.to_lowercase();
        for (index, device) in self.devices_for(direction)?.into_iter().enumerate() {
            let info = Self::describe(&device, direction, index);
            if info.name.to_lowercase().contains(&fragment) {
                debug!(device = %info.name, id = %info.id, "matched audio device by name");
                return Ok(Arc::new(CpalAudioDevice::new(info, device)));
            }
        }
        Err(AudioError::device_not_found(name_fragment))
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}
