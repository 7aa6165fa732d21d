//! Session tuning knobs

use std::time::Duration;

use perilink_core::types::Capability;

/// Timing and gating parameters for a session.
///
/// The defaults match a handheld central talking to slow-advertising
/// peripherals: a generous discovery window, a connect deadline well past
/// typical link setup, and an unhurried reconnect poll.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a discovery window stays open before giving up.
    pub scan_window: Duration,

    /// Deadline for a connect attempt the platform never answers.
    pub connect_timeout: Duration,

    /// How often the reconnect poller wakes up.
    pub poll_interval: Duration,

    /// Capabilities that must be granted before any radio work.
    pub required: Vec<Capability>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_window: Duration::from_secs(8),
            connect_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            required: vec![Capability::Scan, Capability::Connect],
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_required(mut self, required: Vec<Capability>) -> Self {
        self.required = required;
        self
    }
}
