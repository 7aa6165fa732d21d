//! Per-link session bookkeeping
//!
//! An [`ActiveSession`] tracks one established link from connect to its
//! terminal disconnect. The platform can report the same disconnect more
//! than once (and an adapter loss can race a remote drop); `complete`
//! hands back the cause only the first time, which is what makes the
//! "exactly one alert per lost link" guarantee hold.

use perilink_core::types::{DisconnectCause, PeripheralHandle};

#[derive(Debug)]
pub struct ActiveSession {
    peripheral: PeripheralHandle,
    terminal: Option<DisconnectCause>,
}

impl ActiveSession {
    pub fn new(peripheral: PeripheralHandle) -> Self {
        Self {
            peripheral,
            terminal: None,
        }
    }

    pub fn peripheral(&self) -> &PeripheralHandle {
        &self.peripheral
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    /// Record the end of the link. The first call returns the cause;
    /// every later call returns `None` and leaves the recorded cause
    /// untouched.
    pub fn complete(&mut self, cause: DisconnectCause) -> Option<DisconnectCause> {
        if self.terminal.is_some() {
            return None;
        }
        self.terminal = Some(cause);
        Some(cause)
    }
}
