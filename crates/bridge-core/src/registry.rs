//! Session registry
//!
//! Process-wide table of live bridge sessions keyed by call identity. This
//! is the single synchronization point in the system: creation is an atomic
//! check-and-insert, so concurrent Started events for the same call yield
//! exactly one session. Terminal sessions stay queryable as tombstones for a
//! short post-mortem retention window before being swept.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use crate::error::{BridgeError, BridgeResult};
use crate::session::BridgeSession;
use crate::types::{CallId, SessionState, SessionStats};

/// Retained state of a finished session
#[derive(Debug, Clone, Copy)]
struct Tombstone {
    state: SessionState,
    retired_at: Instant,
}

/// Aggregate registry counters
#[derive(Debug, Clone, Serialize)]
pub struct RegistryTotals {
    /// Sessions currently live
    pub active: usize,
    /// Sessions ever created
    pub created: u64,
    /// Sessions that reached Closed
    pub terminated: u64,
    /// Sessions that reached Failed
    pub failed: u64,
}

/// Process-wide table of bridge sessions
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<CallId, Arc<BridgeSession>>,
    terminal: DashMap<CallId, Tombstone>,
    retention: Duration,
    created: AtomicU64,
    terminated: AtomicU64,
    failed: AtomicU64,
}

impl SessionRegistry {
    /// Create a registry with the given terminal-state retention window
    pub fn new(retention: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            terminal: DashMap::new(),
            retention,
            created: AtomicU64::new(0),
            terminated: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    /// Atomically register a new session for a call
    ///
    /// Exactly one concurrent caller succeeds for a given id; the session is
    /// built only when the slot is actually vacant. A fresh start for a call
    /// whose previous session is still in retention clears the tombstone.
    pub fn try_create<F>(&self, call_id: &CallId, build: F) -> BridgeResult<Arc<BridgeSession>>
    where
        F: FnOnce() -> Arc<BridgeSession>,
    {
        match self.sessions.entry(call_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BridgeError::DuplicateSession {
                call_id: call_id.clone(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let session = build();
                slot.insert(session.clone());
                self.terminal.remove(call_id);
                self.created.fetch_add(1, Ordering::Relaxed);
                debug!(%call_id, "registered bridge session");
                Ok(session)
            }
        }
    }

    /// Look up a live session
    pub fn get(&self, call_id: &CallId) -> Option<Arc<BridgeSession>> {
        self.sessions.get(call_id).map(|entry| entry.value().clone())
    }

    /// Lifecycle state of a live or recently finished session
    ///
    /// Expired tombstones are swept on access, so a terminal state stops
    /// being observable once the retention window lapses.
    pub fn get_state(&self, call_id: &CallId) -> Option<SessionState> {
        if let Some(session) = self.sessions.get(call_id) {
            return Some(session.state());
        }
        if let Some(entry) = self.terminal.get(call_id) {
            if entry.retired_at.elapsed() <= self.retention {
                return Some(entry.state);
            }
            drop(entry);
            self.terminal.remove(call_id);
        }
        None
    }

    /// Forget a call entirely; absent ids are a no-op
    pub fn remove(&self, call_id: &CallId) {
        self.sessions.remove(call_id);
        self.terminal.remove(call_id);
    }

    /// Move a finished session from the live table to the retention table
    pub(crate) fn retire(&self, call_id: &CallId, state: SessionState) {
        self.sessions.remove(call_id);
        self.terminal.insert(
            call_id.clone(),
            Tombstone {
                state,
                retired_at: Instant::now(),
            },
        );
        match state {
            SessionState::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.terminated.fetch_add(1, Ordering::Relaxed);
            }
        }
        debug!(%call_id, %state, "retired bridge session");
    }

    /// Drop tombstones past the retention window, returning how many
    pub fn sweep(&self) -> usize {
        let retention = self.retention;
        let before = self.terminal.len();
        self.terminal
            .retain(|_, tombstone| tombstone.retired_at.elapsed() <= retention);
        before - self.terminal.len()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are live
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Statistics for every live session
    pub fn stats(&self) -> Vec<SessionStats> {
        self.sessions
            .iter()
            .map(|entry| entry.value().stats())
            .collect()
    }

    /// Aggregate counters
    pub fn totals(&self) -> RegistryTotals {
        RegistryTotals {
            active: self.sessions.len(),
            created: self.created.load(Ordering::Relaxed),
            terminated: self.terminated.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
