//! In-memory lifecycle flags for one backend's index.
//!
//! The flags live on the manager instance, so independent managers (and
//! parallel tests) never share state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};

use crate::guard::{FlightGuard, SingleFlight};

/// Process-local readiness and rebuild flags.
#[derive(Debug, Default)]
pub struct LifecycleState {
    initialized: AtomicBool,
    rebuilding: SingleFlight,
    ready: AtomicBool,
    last_error: ArcSwapOption<String>,
}

/// Point-in-time copy of the flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub initialized: bool,
    pub rebuilding: bool,
    pub ready: bool,
    pub last_error: Option<String>,
}

impl LifecycleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// One-shot gate. Returns `true` only for the caller that flipped it.
    pub fn mark_initialized(&self) -> bool {
        self.initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Claim the single-flight rebuild slot.
    pub fn try_begin_rebuild(&self) -> Option<FlightGuard> {
        self.rebuilding.try_acquire()
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.is_in_flight()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Lock-free read, safe to call from every search request.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.load_full().map(|error| (*error).clone())
    }

    /// Mark the index trustworthy without touching `last_error`.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Successful rebuild: clear the error, then open the gate.
    pub fn record_success(&self) {
        self.set_last_error(None);
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Failed rebuild or runtime query fault: close the gate first.
    pub fn record_failure(&self, error: String) {
        self.ready.store(false, Ordering::SeqCst);
        self.set_last_error(Some(error));
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            initialized: self.is_initialized(),
            rebuilding: self.is_rebuilding(),
            ready: self.is_ready(),
            last_error: self.last_error(),
        }
    }

    fn set_last_error(&self, error: Option<String>) {
        self.last_error.store(error.map(Arc::new));
    }
}
