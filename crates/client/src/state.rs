//! Shared dashboard state container.
//!
//! One explicitly owned store holds the system snapshot, the append-only
//! optimization delta log, the busy flag, and the most recent error. Exactly
//! one reducer or action mutates it per event; presentation layers read
//! cloned views concurrently.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use greenwave_shared::{OptimizationDelta, ServerMessage, SystemState};

#[derive(Debug, Default)]
struct StoreInner {
    snapshot: SystemState,
    deltas: Vec<OptimizationDelta>,
    busy: bool,
    error: Option<String>,
}

/// Cloneable handle to the dashboard store.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    inner: Arc<RwLock<StoreInner>>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Current snapshot of remote system state.
    pub fn snapshot(&self) -> SystemState {
        self.read().snapshot.clone()
    }

    /// The optimization delta log, in arrival order. Unbounded; display
    /// layers truncate for presentation if they need to.
    pub fn deltas(&self) -> Vec<OptimizationDelta> {
        self.read().deltas.clone()
    }

    /// True while an action request is in flight.
    pub fn is_busy(&self) -> bool {
        self.read().busy
    }

    /// Most recent connection- or request-level error, if any.
    pub fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    /// Replace the whole snapshot (initial fetch result).
    pub fn replace_snapshot(&self, snapshot: SystemState) {
        let mut inner = self.write();
        inner.snapshot = snapshot;
        inner.error = None;
    }

    pub(crate) fn set_busy(&self, busy: bool) {
        self.write().busy = busy;
    }

    pub(crate) fn set_error(&self, message: impl Into<String>) {
        self.write().error = Some(message.into());
    }

    pub(crate) fn clear_error(&self) {
        self.write().error = None;
    }

    /// Fold one inbound message into the store.
    ///
    /// Each message type touches only its own snapshot fields, so messages of
    /// different types may be applied in any relative order. A full
    /// `system_state` replaces the snapshot atomically but never erases the
    /// delta log.
    pub fn apply(&self, message: ServerMessage) {
        let mut inner = self.write();
        match message {
            ServerMessage::SystemState(snapshot) => {
                inner.snapshot = snapshot;
                inner.error = None;
            }
            ServerMessage::LiveCounts(payload) => {
                inner.snapshot.live_counts = payload.counts;
            }
            ServerMessage::PhaseUpdate(payload) => {
                inner.snapshot.phase_active = Some(payload.phase);
                inner.snapshot.remaining_seconds = payload.remaining_seconds;
            }
            ServerMessage::CyclePlan(payload) => {
                inner.snapshot.cycle_plan = Some(payload.plan);
            }
            ServerMessage::OptimizationDelta(deltas) => {
                inner.deltas.extend(deltas);
            }
            ServerMessage::DetectionsMeta(_) => {
                debug!("ignoring detections metadata frame");
            }
        }
    }
}
