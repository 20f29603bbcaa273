//! Single-flight guard for index rebuilds.
//!
//! At most one rebuild runs per backend. A second attempt while one is in
//! flight is dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lock-free single-flight gate.
///
/// `try_acquire` hands out a [`FlightGuard`] to exactly one caller at a time.
/// The gate reopens when that guard is dropped.
#[derive(Debug, Default)]
pub struct SingleFlight {
    in_flight: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt to start the guarded operation.
    ///
    /// Returns `None` if another holder is still running.
    pub fn try_acquire(&self) -> Option<FlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlightGuard {
                flag: self.in_flight.clone(),
            })
    }

    /// Check whether a guard is currently held.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// RAII guard that reopens the gate when dropped.
///
/// Dropping during a panic unwind also clears the flag.
#[derive(Debug)]
pub struct FlightGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
