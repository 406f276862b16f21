//! Switch state shared by the host handlers and the push timer.
//!
//! A single atomic flag: the timer task and host callbacks may run on
//! different worker threads, so every transition is one atomic operation.

use std::sync::atomic::{AtomicBool, Ordering};

/// Phase of the linked accessory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessoryPhase {
    /// Switch off, no detection pending.
    Idle,
    /// Switch on, detection fires at the next tick.
    Armed,
}

/// Thread-safe `on` flag of the accessory.
pub struct AccessoryState {
    on: AtomicBool,
}

impl AccessoryState {
    pub fn new() -> Self {
        Self {
            on: AtomicBool::new(false),
        }
    }

    pub fn get(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: bool) {
        self.on.store(value, Ordering::SeqCst);
    }

    /// Clear the flag and return what it held.
    pub fn take(&self) -> bool {
        self.on.swap(false, Ordering::SeqCst)
    }

    pub fn phase(&self) -> AccessoryPhase {
        if self.get() {
            AccessoryPhase::Armed
        } else {
            AccessoryPhase::Idle
        }
    }
}

impl Default for AccessoryState {
    fn default() -> Self {
        Self::new()
    }
}
