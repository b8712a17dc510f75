// Shared fixtures for bridge-core integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use callbridge_audio_core::device::mock::{MockAudioDevice, MockCaptureHandle, MockPlaybackHandle};
use callbridge_audio_core::{AudioDevice, AudioFormat, AudioResult};
use callbridge_bridge_core::{
    BridgeConfig, BridgeSession, CallId, DeviceProvider, SessionState,
};
use callbridge_link_core::{ConnectionParams, LinkConfig, ReconnectPolicy};

/// Samples in one 20ms wire frame at 16kHz mono
pub const FRAME_SAMPLES: usize = 320;

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
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                multiplier: 2.0,
                jitter: false,
            },
            ..Default::default()
        },
    }
}

/// One frame's worth of samples, all set to `value`
pub fn frame_block(value: i16) -> Vec<i16> {
    vec![value; FRAME_SAMPLES]
}

/// Wait until the session reports the wanted state
pub async fn wait_for_state(session: &BridgeSession, want: SessionState, wait: Duration) {
    let mut states = session.state_watch();
    let reached = tokio::time::timeout(wait, async {
        loop {
            if *states.borrow_and_update() == want {
                return;
            }
            if states.changed().await.is_err() {
                return;
            }
        }
    })
    .await;
    assert!(
        reached.is_ok() && session.state() == want,
        "session did not reach {want}, stuck in {}",
        session.state()
    );
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

/// Device provider backed by prepared mock pairs
///
/// Unprepared calls get a fresh mock pair whose handles are retained so the
/// capture stream stays open for the session's lifetime.
pub struct MockDeviceProvider {
    prepared:
        parking_lot::Mutex<HashMap<CallId, (Arc<dyn AudioDevice>, Arc<dyn AudioDevice>)>>,
    retained: parking_lot::Mutex<Vec<(MockCaptureHandle, MockPlaybackHandle)>>,
}

impl MockDeviceProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            prepared: parking_lot::Mutex::new(HashMap::new()),
            retained: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn prepare(
        &self,
        call_id: impl Into<CallId>,
        input: Arc<dyn AudioDevice>,
        output: Arc<dyn AudioDevice>,
    ) {
        self.prepared.lock().insert(call_id.into(), (input, output));
    }
}

#[async_trait::async_trait]
impl DeviceProvider for MockDeviceProvider {
    async fn acquire(
        &self,
        call_id: &CallId,
    ) -> AudioResult<(Arc<dyn AudioDevice>, Arc<dyn AudioDevice>)> {
        if let Some(pair) = self.prepared.lock().remove(call_id) {
            return Ok(pair);
        }
        let (input, capture) = MockAudioDevice::input(call_id.as_str());
        let (output, playback) = MockAudioDevice::output(call_id.as_str());
        self.retained.lock().push((capture, playback));
        Ok((input, output))
    }
}

/// Connection parameters pointing at a test endpoint
pub fn params_for(url: String) -> ConnectionParams {
    ConnectionParams::new(url).with_api_key("test-key")
}
