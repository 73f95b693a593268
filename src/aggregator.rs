//! Shared entry counter between the worker pool and the reporter
//!
//! Workers add to it after every successful page; the reporter drains it once
//! per tick. Both operations take the same lock, so each `add` lands wholly
//! before or wholly after any given drain.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Entries fetched since the last drain
#[derive(Debug, Default)]
pub struct ThroughputAggregator {
    counter: Mutex<u64>,
}

impl ThroughputAggregator {
    /// Create an aggregator starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `n` freshly fetched entries
    pub fn add(&self, n: u64) {
        let mut counter = self.lock();
        *counter = counter.saturating_add(n);
    }

    /// Take the current count and reset it to zero
    pub fn drain_and_reset(&self) -> u64 {
        std::mem::take(&mut *self.lock())
    }

    /// Current count without resetting it
    pub fn pending(&self) -> u64 {
        *self.lock()
    }

    // The guarded value is a plain integer, so a panic elsewhere cannot leave it
    // half-updated
    fn lock(&self) -> MutexGuard<'_, u64> {
        self.counter.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
