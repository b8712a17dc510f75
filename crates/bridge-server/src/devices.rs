//! Device providers for REST-started bridges
//!
//! A bridge started over the control API (or by a call event) captures from
//! the host's audio layer, typically a virtual cable pair that loops the
//! softphone's audio. Bridges started over the streaming WebSocket bring
//! their own channel-backed devices and bypass the provider entirely.

use std::sync::Arc;

use callbridge_audio_core::{AudioDevice, AudioError, AudioResult};
use callbridge_bridge_core::{CallId, DeviceProvider};

#[cfg(feature = "device-cpal")]
use callbridge_audio_core::AudioDirection;
#[cfg(feature = "device-cpal")]
use callbridge_audio_core::device::cpal_backend::CpalHost;

/// Provider backed by host audio devices, located by name fragment
#[cfg(feature = "device-cpal")]
pub struct HostDeviceProvider {
    input_name: Option<String>,
    output_name: Option<String>,
}

#[cfg(feature = "device-cpal")]
impl HostDeviceProvider {
    /// Use the named devices, falling back to the host defaults
    pub fn new(input_name: Option<String>, output_name: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            input_name,
            output_name,
        })
    }
}

#[cfg(feature = "device-cpal")]
#[async_trait::async_trait]
impl DeviceProvider for HostDeviceProvider {
    async fn acquire(
        &self,
        _call_id: &CallId,
    ) -> AudioResult<(Arc<dyn AudioDevice>, Arc<dyn AudioDevice>)> {
        let host = CpalHost::new();
        let input = match &self.input_name {
            Some(name) => host.find_device(name, AudioDirection::Input)?,
            None => host.default_device(AudioDirection::Input)?,
        };
        let output = match &self.output_name {
            Some(name) => host.find_device(name, AudioDirection::Output)?,
            None => host.default_device(AudioDirection::Output)?,
        };
        Ok((input, output))
    }
}

/// Provider for builds without host-audio support
///
/// Bridges can still be driven over the streaming WebSocket surface; only
/// provider-backed starts are refused.
pub struct UnavailableDeviceProvider;

impl UnavailableDeviceProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait::async_trait]
impl DeviceProvider for UnavailableDeviceProvider {
    async fn acquire(
        &self,
        _call_id: &CallId,
    ) -> AudioResult<(Arc<dyn AudioDevice>, Arc<dyn AudioDevice>)> {
        Err(AudioError::configuration(
            "host audio devices unavailable; rebuild with the device-cpal feature \
             or stream audio over /ws/audio",
        ))
    }
}
