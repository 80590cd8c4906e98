//! Session state for the two-phase dispense/reload protocol
//!
//! A session brackets a burst of dispense calls so that the reload step
//! (advancing a unit to its next item) runs once per dispensed position
//! when the batch completes, not once per dispense.

use std::collections::BTreeSet;
use tracing::trace;

/// Tracks which positions were dispensed since the session opened.
#[derive(Debug, Default)]
pub struct Session {
    in_session: bool,
    dispensed: BTreeSet<u32>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session, clearing any previously recorded positions.
    /// Idempotent while open: the in-progress set is left untouched.
    pub fn start(&mut self) {
        if !self.in_session {
            self.dispensed.clear();
            self.in_session = true;
            trace!("Session started");
        }
    }

    pub fn is_open(&self) -> bool {
        self.in_session
    }

    /// Record a successfully dispensed position. Recording is
    /// unconditional: positions dispensed outside a session are kept
    /// until the next `start` clears them or an end-of-session flush
    /// consumes them.
    pub fn record(&mut self, position: u32) {
        self.dispensed.insert(position);
    }

    /// Positions awaiting their reload step, ascending.
    pub fn pending(&self) -> Vec<u32> {
        self.dispensed.iter().copied().collect()
    }

    /// Remove a position whose reload step completed.
    pub fn mark_reloaded(&mut self, position: u32) {
        self.dispensed.remove(&position);
    }

    /// Close the session once the pending set has drained.
    pub fn close(&mut self) {
        self.in_session = false;
        trace!("Session closed");
    }
}
