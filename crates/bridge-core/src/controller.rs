//! Bridge controller
//!
//! The control interface exposed to collaborators: start a bridge for a
//! call, stop it, inspect its state. Device acquisition is pluggable so the
//! same controller serves hardware-backed calls (cpal, virtual cables) and
//! remote audio fed over the server's streaming surface.

use std::sync::Arc;

use tracing::{debug, info};

use callbridge_audio_core::{AudioDevice, AudioResult};
use callbridge_link_core::ConnectionParams;

use crate::error::{BridgeError, BridgeResult};
use crate::registry::SessionRegistry;
use crate::session::BridgeSession;
use crate::types::{BridgeConfig, CallId, SessionState, SessionStats};

/// Supplies the device pair for a new session
///
/// Implementations decide what "the device" means for a deployment: the
/// host's virtual cable pair, a specific hardware device, or channel-backed
/// stream devices fed by a transport.
#[async_trait::async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Acquire an input/output device pair for the given call
    async fn acquire(
        &self,
        call_id: &CallId,
    ) -> AudioResult<(Arc<dyn AudioDevice>, Arc<dyn AudioDevice>)>;
}

/// Control surface over the session registry
pub struct BridgeController {
    registry: Arc<SessionRegistry>,
    config: BridgeConfig,
    params: ConnectionParams,
    devices: Arc<dyn DeviceProvider>,
}

impl BridgeController {
    /// Create a controller with default connection parameters and a device
    /// provider for event-driven starts
    pub fn new(
        config: BridgeConfig,
        params: ConnectionParams,
        devices: Arc<dyn DeviceProvider>,
    ) -> Arc<Self> {
        let registry = SessionRegistry::new(config.retention_window);
        Arc::new(Self {
            registry,
            config,
            params,
            devices,
        })
    }

    /// The underlying registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start a bridge using the configured device provider and parameters
    pub async fn start_bridge(&self, call_id: CallId) -> BridgeResult<Arc<BridgeSession>> {
        // cheap pre-check; try_create below is the authoritative gate
        if self.registry.get(&call_id).is_some() {
            return Err(BridgeError::DuplicateSession { call_id });
        }
        let (input, output) = self.devices.acquire(&call_id).await?;
        self.start_bridge_with(call_id, self.params.clone(), input, output)
    }

    /// Start a bridge with explicit connection parameters and devices
    pub fn start_bridge_with(
        &self,
        call_id: CallId,
        params: ConnectionParams,
        input: Arc<dyn AudioDevice>,
        output: Arc<dyn AudioDevice>,
    ) -> BridgeResult<Arc<BridgeSession>> {
        let registry = self.registry.clone();
        let config = self.config.clone();
        let session = self.registry.try_create(&call_id, || {
            BridgeSession::spawn(call_id.clone(), config, params, input, output, registry)
        })?;
        info!(%call_id, "bridge accepted");
        Ok(session)
    }

    /// Signal a bridge to begin draining; false when no live session exists
    pub fn stop_bridge(&self, call_id: &CallId) -> bool {
        match self.registry.get(call_id) {
            Some(session) => {
                info!(%call_id, "bridge stop requested");
                session.begin_drain();
                true
            }
            None => {
                debug!(%call_id, "stop for unknown bridge ignored");
                false
            }
        }
    }

    /// Force a bridge to fail immediately; false when no live session exists
    pub fn fail_bridge(&self, call_id: &CallId) -> bool {
        match self.registry.get(call_id) {
            Some(session) => {
                session.fail();
                true
            }
            None => false,
        }
    }

    /// Lifecycle state of a live or recently finished bridge
    pub fn session_state(&self, call_id: &CallId) -> Option<SessionState> {
        self.registry.get_state(call_id)
    }

    /// Statistics for every live bridge
    pub fn stats(&self) -> Vec<SessionStats> {
        self.registry.stats()
    }
}

impl std::fmt::Debug for BridgeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeController")
            .field("active_sessions", &self.registry.len())
            .finish()
    }
}
