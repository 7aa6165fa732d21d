//! Adapter state fan-out
//!
//! Exactly one place in the process receives adapter power notifications
//! from the platform: the orchestrator publishes them into an
//! [`AdapterMonitor`], and any number of subscribers observe them.
//! Subscribers always see the latest state immediately on subscribe, so a
//! consumer that attaches after the radio powered off still learns about
//! it.

use tokio::sync::watch;

use perilink_core::types::AdapterState;

/// Single owner of the adapter power state.
#[derive(Debug)]
pub struct AdapterMonitor {
    tx: watch::Sender<AdapterState>,
}

impl AdapterMonitor {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AdapterState::default());
        Self { tx }
    }

    /// Record a state pushed by the platform. Repeats of the current
    /// state are dropped without waking subscribers.
    pub fn publish(&self, state: AdapterState) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    pub fn current(&self) -> AdapterState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> AdapterSubscription {
        AdapterSubscription {
            rx: self.tx.subscribe(),
            cancelled: false,
        }
    }
}

impl Default for AdapterMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's view of the adapter state.
#[derive(Debug)]
pub struct AdapterSubscription {
    rx: watch::Receiver<AdapterState>,
    cancelled: bool,
}

impl AdapterSubscription {
    /// Latest published state, available immediately after subscribing.
    pub fn current(&self) -> AdapterState {
        *self.rx.borrow()
    }

    /// Wait for the next state change. Returns `None` once cancelled or
    /// after the monitor is dropped.
    pub async fn changed(&mut self) -> Option<AdapterState> {
        if self.cancelled {
            return None;
        }
        match self.rx.changed().await {
            Ok(()) => Some(*self.rx.borrow_and_update()),
            Err(_) => None,
        }
    }

    /// Stop observing. Safe to call more than once.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }
}
