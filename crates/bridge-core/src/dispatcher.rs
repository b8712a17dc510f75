//! Call event dispatcher
//!
//! Consumes call-lifecycle notifications from the external call-event source
//! and drives session creation and teardown. The source may duplicate or
//! reorder Started/Ended events, so every path here is idempotent: duplicate
//! starts and late or early stop events are absorbed at low severity, never
//! treated as errors. Signaling a session is non-blocking, so one wedged
//! session can never stall event delivery for other calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::controller::BridgeController;
use crate::error::BridgeError;
use crate::types::CallId;

/// Kinds of call-lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallEventKind {
    /// The call was answered; a bridge should exist
    Started,
    /// The call ended; the bridge should drain
    Ended,
    /// The call failed; the bridge should fail immediately
    Failed,
}

/// One notification from the call-event source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEvent {
    /// Which call the event concerns
    pub call_id: CallId,
    /// What happened
    pub kind: CallEventKind,
}

impl CallEvent {
    /// Convenience constructor
    pub fn new(call_id: impl Into<CallId>, kind: CallEventKind) -> Self {
        Self {
            call_id: call_id.into(),
            kind,
        }
    }
}

/// Drives bridge lifecycle from an external event feed
pub struct CallEventDispatcher {
    controller: Arc<BridgeController>,
    events: mpsc::Receiver<CallEvent>,
}

impl CallEventDispatcher {
    /// Create a dispatcher and the bounded sender its event source feeds
    pub fn new(
        controller: Arc<BridgeController>,
        queue_capacity: usize,
    ) -> (mpsc::Sender<CallEvent>, Self) {
        let (tx, events) = mpsc::channel(queue_capacity);
        (
            tx,
            Self {
                controller,
                events,
            },
        )
    }

    /// Consume events until the source closes its sender
    pub async fn run(mut self) {
        info!("call event dispatcher running");
        while let Some(event) = self.events.recv().await {
            self.handle(event).await;
        }
        info!("call event source closed, dispatcher stopping");
    }

    async fn handle(&self, event: CallEvent) {
        let CallEvent { call_id, kind } = event;
        match kind {
            CallEventKind::Started => match self.controller.start_bridge(call_id.clone()).await {
                Ok(_) => {}
                Err(BridgeError::DuplicateSession { .. }) => {
                    // flaky event sources repeat Started; absorb silently
                    debug!(%call_id, "duplicate call-started ignored");
                }
                Err(e) => {
                    warn!(%call_id, error = %e, "failed to start bridge for call");
                }
            },
            CallEventKind::Ended => {
                if !self.controller.stop_bridge(&call_id) {
                    debug!(%call_id, "call-ended for absent session ignored");
                }
            }
            CallEventKind::Failed => {
                if !self.controller.fail_bridge(&call_id) {
                    debug!(%call_id, "call-failed for absent session ignored");
                }
            }
        }
    }
}
