// Shared fixtures for bridge-server integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use callbridge_audio_core::device::stream::{StreamAudioDevice, StreamSink, StreamSource};
use callbridge_audio_core::{AudioDevice, AudioFormat, AudioResult};
use callbridge_bridge_core::{
    BridgeConfig, BridgeController, CallEventDispatcher, CallId, DeviceProvider,
};
use callbridge_link_core::{ConnectionParams, LinkConfig, ReconnectPolicy};
use callbridge_server::api::AppState;

/// Bridge configuration with test-friendly bounds
pub fn quick_bridge_config() -> BridgeConfig {
    BridgeConfig {
        device_format: AudioFormat::wire_default(),
        wire_format: AudioFormat::wire_default(),
        playout_window: 2,
        capture_poll: Duration::from_millis(10),
        send_block_timeout: Duration::from_millis(200),
        setup_timeout: Duration::from_secs(2),
        drain_timeout: Duration::from_secs(2),
        retention_window: Duration::from_millis(300),
        link: LinkConfig {
            handshake_timeout: Duration::from_secs(2),
            ping_interval: Duration::from_secs(60),
            reconnect: ReconnectPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                multiplier: 2.0,
                jitter: false,
            },
            ..Default::default()
        },
    }
}

/// Device provider handing out channel-backed stream pairs
///
/// The feed/drain handles are retained so the capture streams stay open for
/// the sessions' lifetimes; tests can take them to drive audio.
pub struct StreamPairProvider {
    handles: parking_lot::Mutex<HashMap<CallId, (StreamSource, StreamSink)>>,
}

impl StreamPairProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handles: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// Take the audio handles for a call started through this provider
    pub fn take(&self, call_id: &CallId) -> Option<(StreamSource, StreamSink)> {
        self.handles.lock().remove(call_id)
    }
}

#[async_trait::async_trait]
impl DeviceProvider for StreamPairProvider {
    async fn acquire(
        &self,
        call_id: &CallId,
    ) -> AudioResult<(Arc<dyn AudioDevice>, Arc<dyn AudioDevice>)> {
        let (input, source) = StreamAudioDevice::input(call_id.as_str());
        let (output, sink) = StreamAudioDevice::output(call_id.as_str());
        self.handles.lock().insert(call_id.clone(), (source, sink));
        Ok((input, output))
    }
}

/// App state wired like the binary, pointed at a test endpoint
pub fn test_state(endpoint_url: String, provider: Arc<dyn DeviceProvider>) -> AppState {
    let params = ConnectionParams::new(endpoint_url).with_api_key("test-key");
    let controller = BridgeController::new(quick_bridge_config(), params.clone(), provider.clone());
    let (events_tx, dispatcher) = CallEventDispatcher::new(controller.clone(), 16);
    tokio::spawn(dispatcher.run());

    AppState {
        controller,
        provider,
        params,
        events_tx,
        heartbeat: Duration::from_secs(30),
    }
}

/// Poll a condition until it holds or the deadline passes
pub async fn wait_until<F>(wait: Duration, what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let satisfied = tokio::time::timeout(wait, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(satisfied.is_ok(), "timed out waiting for {what}");
}
