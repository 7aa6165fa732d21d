//! Reconnect polling policy
//!
//! While the session is idle, the orchestrator periodically asks the
//! platform whether some other process on this host already holds a link
//! to a peripheral. The answer is reflected into the snapshot for
//! display; this session never adopts or tears down such a link. The
//! timer itself never stops -- only the decision of whether a tick turns
//! into a query depends on the phase, so no restart logic is needed when
//! phases change.

use std::time::Duration;

use perilink_core::types::SessionPhase;

#[derive(Debug, Clone)]
pub struct ReconnectPoller {
    interval: Duration,
}

impl ReconnectPoller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether a tick in the given phase should issue a query. Only an
    /// idle session cares about externally-held links; during its own
    /// radio work the answer would be stale by the time it lands.
    pub fn should_query(&self, phase: SessionPhase) -> bool {
        phase == SessionPhase::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queries_only_when_idle() {
        let poller = ReconnectPoller::new(Duration::from_secs(5));
        assert!(poller.should_query(SessionPhase::Idle));

        for phase in [
            SessionPhase::AwaitingPermission,
            SessionPhase::Scanning,
            SessionPhase::Connecting,
            SessionPhase::Connected,
            SessionPhase::Disconnecting,
            SessionPhase::AdapterOff,
        ] {
            assert!(!poller.should_query(phase), "{phase} must not query");
        }
    }
}
