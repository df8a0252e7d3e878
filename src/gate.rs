//! Activity Gate
//!
//! Process-wide on/off switch for message processing. Starts inactive;
//! flipped by the operator. Flipping it never cancels an event that has
//! already passed the gate.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct ActivityGate {
    active: AtomicBool,
}

impl ActivityGate {
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Set the state; returns the previous one
    pub fn set_active(&self, active: bool) -> bool {
        let previous = self.active.swap(active, Ordering::AcqRel);
        if previous != active {
            info!("Activity gate: {}", if active { "ACTIVE" } else { "INACTIVE" });
        }
        previous
    }
}
