//! # Bridge Core: Session Lifecycle and Relay Orchestration
//!
//! The real-time call-audio bridge: one [`session::BridgeSession`] per live
//! call relays audio between a device port and the remote voice endpoint,
//! the [`registry::SessionRegistry`] guarantees at most one session per call,
//! and the [`dispatcher::CallEventDispatcher`] turns external call-lifecycle
//! notifications into session creation and teardown.
//!
//! Faults are contained: a device or link failure kills only the owning
//! session, releases its resources, and leaves a queryable terminal state
//! behind for a short retention window.

pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod session;
pub mod types;

pub use controller::{BridgeController, DeviceProvider};
pub use dispatcher::{CallEvent, CallEventDispatcher, CallEventKind};
pub use error::{BridgeError, BridgeResult};
pub use registry::{RegistryTotals, SessionRegistry};
pub use session::BridgeSession;
pub use types::{BridgeConfig, CallId, SessionEvent, SessionState, SessionStats};
