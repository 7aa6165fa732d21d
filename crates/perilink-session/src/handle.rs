//! Facade handle
//!
//! The only entry point into a running session. Requests are queued into
//! the orchestrator inbox; state comes back out on a watch channel, so
//! `session_state` never blocks and a fresh subscriber immediately sees
//! the latest snapshot.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use perilink_core::prelude::*;
use perilink_core::types::{SelectionPredicate, SessionSnapshot};

use crate::monitor::{AdapterMonitor, AdapterSubscription};
use crate::orchestrator::{ConnectOutcome, Inbound, SessionCommand};

#[derive(Clone)]
pub struct SessionHandle {
    inbox: mpsc::UnboundedSender<Inbound>,
    state: watch::Receiver<SessionSnapshot>,
    adapter: Arc<AdapterMonitor>,
}

impl SessionHandle {
    pub(crate) fn new(
        inbox: mpsc::UnboundedSender<Inbound>,
        state: watch::Receiver<SessionSnapshot>,
        adapter: Arc<AdapterMonitor>,
    ) -> Self {
        Self {
            inbox,
            state,
            adapter,
        }
    }

    /// Latest snapshot. Cheap; reads the watch channel without touching
    /// the orchestrator.
    pub fn session_state(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Queue a scan-and-connect without waiting for its outcome.
    /// Progress and the terminal result are observed through
    /// [`subscribe_state`](Self::subscribe_state).
    pub fn enqueue_scan_and_connect(&self, predicate: SelectionPredicate) -> Result<()> {
        let (reply, _) = oneshot::channel();
        self.send_scan_request(predicate, reply)
    }

    /// Scan for a peripheral matching `predicate` and connect to the
    /// first match. Resolves when the attempt reaches a terminal
    /// outcome: connected, no match within the window, or an error.
    pub async fn request_scan_and_connect(
        &self,
        predicate: SelectionPredicate,
    ) -> Result<ConnectOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send_scan_request(predicate, reply)?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    fn send_scan_request(
        &self,
        predicate: SelectionPredicate,
        reply: oneshot::Sender<Result<ConnectOutcome>>,
    ) -> Result<()> {
        if !predicate.is_satisfiable() {
            return Err(Error::UnmatchablePredicate);
        }
        self.inbox
            .send(Inbound::Command(SessionCommand::ScanAndConnect {
                predicate,
                reply,
            }))
            .map_err(|_| Error::ChannelClosed)
    }

    /// Tear down the current link. Resolves once the platform confirms.
    /// Idempotent: succeeds immediately when nothing is connected.
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(Inbound::Command(SessionCommand::Disconnect { reply }))
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Clear the pending unexpected-disconnect alert and stop any
    /// sustained alert output.
    pub fn acknowledge_alert(&self) -> Result<()> {
        self.inbox
            .send(Inbound::Command(SessionCommand::AcknowledgeAlert))
            .map_err(|_| Error::ChannelClosed)
    }

    /// Stop the session: cancels any scan, tears down the link, silences
    /// a sustained alert, then ends the orchestrator task. Resolves once
    /// teardown is done; calling it on an already-stopped session is a
    /// no-op.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self
            .inbox
            .send(Inbound::Command(SessionCommand::Shutdown { reply }))
            .is_err()
        {
            return;
        }
        let _ = rx.await;
    }

    /// Observe snapshot changes. The subscription starts at the latest
    /// snapshot, never an empty one.
    pub fn subscribe_state(&self) -> StateSubscription {
        StateSubscription {
            rx: self.state.clone(),
        }
    }

    /// Observe adapter power changes.
    pub fn subscribe_adapter(&self) -> AdapterSubscription {
        self.adapter.subscribe()
    }
}

/// One subscriber's view of the session snapshot stream.
pub struct StateSubscription {
    rx: watch::Receiver<SessionSnapshot>,
}

impl StateSubscription {
    pub fn current(&self) -> SessionSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot change. `None` once the session is
    /// gone.
    pub async fn next(&mut self) -> Option<SessionSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait until a snapshot satisfies `predicate` (checking the current
    /// one first) and return it.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Option<SessionSnapshot> {
        self.rx.wait_for(predicate).await.ok().map(|s| (*s).clone())
    }
}
