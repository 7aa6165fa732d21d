//! Session orchestrator
//!
//! One task owns every piece of session state and consumes every input:
//! facade commands, platform events, and its own timer wakeups all land
//! in a single `select!` loop, so no transition ever races another.
//! State leaves the task only as [`SessionSnapshot`] values on a watch
//! channel.
//!
//! Timer wakeups (scan window, connect deadline) are posted back into
//! the inbox tagged with a generation counter; a wakeup whose generation
//! is stale is discarded, which is what keeps a late scan deadline from
//! cancelling the next scan.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use perilink_core::prelude::*;
use perilink_core::types::{
    AdapterState, Advertisement, AlertEvent, DisconnectCause, PeripheralHandle, PeripheralId,
    PermissionSet, SelectionPredicate, SessionPhase, SessionSnapshot,
};
use perilink_radio::protocol::{ConnectFailure, PlatformCommand, PlatformEvent, PlatformLink};

use crate::config::SessionConfig;
use crate::connection::ActiveSession;
use crate::gate::{GateOutcome, PermissionGate};
use crate::handle::SessionHandle;
use crate::matcher::ScanMatcher;
use crate::monitor::AdapterMonitor;
use crate::poller::ReconnectPoller;

// ─────────────────────────────────────────────────────────
// Public surface
// ─────────────────────────────────────────────────────────

/// Terminal outcome of a scan-and-connect request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A matching peripheral was found and the link is up.
    Connected(PeripheralHandle),
    /// The discovery window closed without a match. Not an error: the
    /// session returns to idle and the caller may simply retry.
    NoMatch,
}

/// Start a session against the given platform boundary.
///
/// The returned handle is the only way in; cloning it is cheap and all
/// clones talk to the same orchestrator task.
pub fn spawn_session(config: SessionConfig, link: PlatformLink) -> SessionHandle {
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(SessionSnapshot::default());
    let monitor = Arc::new(AdapterMonitor::new());

    let orchestrator = Orchestrator::new(
        config,
        link,
        Arc::clone(&monitor),
        inbox_tx.clone(),
        inbox_rx,
        state_tx,
    );
    tokio::spawn(orchestrator.run());

    SessionHandle::new(inbox_tx, state_rx, monitor)
}

// ─────────────────────────────────────────────────────────
// Inbox
// ─────────────────────────────────────────────────────────

/// Facade requests, as queued into the orchestrator inbox.
pub(crate) enum SessionCommand {
    ScanAndConnect {
        predicate: SelectionPredicate,
        reply: oneshot::Sender<Result<ConnectOutcome>>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<()>>,
    },
    AcknowledgeAlert,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) enum Inbound {
    Command(SessionCommand),
    ScanDeadline { generation: u64 },
    ConnectDeadline { generation: u64 },
}

/// A scan-and-connect request from acceptance to terminal outcome.
struct PendingAttempt {
    predicate: SelectionPredicate,
    reply: oneshot::Sender<Result<ConnectOutcome>>,
}

// ─────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────

struct Orchestrator {
    config: SessionConfig,
    gate: PermissionGate,
    poller: ReconnectPoller,
    monitor: Arc<AdapterMonitor>,

    commands: mpsc::UnboundedSender<PlatformCommand>,
    events: mpsc::UnboundedReceiver<PlatformEvent>,
    inbox_tx: mpsc::UnboundedSender<Inbound>,
    inbox: mpsc::UnboundedReceiver<Inbound>,
    state_tx: watch::Sender<SessionSnapshot>,

    snapshot: SessionSnapshot,
    /// Bumped whenever an in-flight timer becomes meaningless.
    generation: u64,
    matcher: Option<ScanMatcher>,
    session: Option<ActiveSession>,
    pending: Option<PendingAttempt>,
    pending_disconnect: Option<oneshot::Sender<Result<()>>>,
    foreground: bool,
    alert_sustained: bool,
}

impl Orchestrator {
    fn new(
        config: SessionConfig,
        link: PlatformLink,
        monitor: Arc<AdapterMonitor>,
        inbox_tx: mpsc::UnboundedSender<Inbound>,
        inbox: mpsc::UnboundedReceiver<Inbound>,
        state_tx: watch::Sender<SessionSnapshot>,
    ) -> Self {
        let gate = PermissionGate::new(config.required.clone());
        let poller = ReconnectPoller::new(config.poll_interval);
        Self {
            config,
            gate,
            poller,
            monitor,
            commands: link.commands,
            events: link.events,
            inbox_tx,
            inbox,
            state_tx,
            snapshot: SessionSnapshot::default(),
            generation: 0,
            matcher: None,
            session: None,
            pending: None,
            pending_disconnect: None,
            foreground: true,
            alert_sustained: false,
        }
    }

    async fn run(mut self) {
        // Ask up front so the session can leave AwaitingPermission
        // without the user doing anything, when already granted.
        self.send(PlatformCommand::RequestPermissions(
            self.gate.required().to_vec(),
        ));
        self.publish();

        let mut poll = tokio::time::interval(self.poller.interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first interval tick completes immediately; swallow it.
        poll.tick().await;

        loop {
            tokio::select! {
                inbound = self.inbox.recv() => match inbound {
                    Some(inbound) => {
                        if !self.handle_inbound(inbound) {
                            break;
                        }
                    }
                    None => break,
                },
                event = self.events.recv() => match event {
                    Some(event) => {
                        trace!("platform event: {}", event.summary());
                        self.handle_platform(event);
                    }
                    None => {
                        self.platform_lost();
                        break;
                    }
                },
                _ = poll.tick() => self.handle_poll_tick(),
            }
        }
    }

    // ─────────────────────────────────────────────────────────
    // Inbox handling
    // ─────────────────────────────────────────────────────────

    /// Returns `false` once the session should stop running.
    fn handle_inbound(&mut self, inbound: Inbound) -> bool {
        match inbound {
            Inbound::Command(cmd) => return self.handle_command(cmd),
            Inbound::ScanDeadline { generation } => self.handle_scan_deadline(generation),
            Inbound::ConnectDeadline { generation } => self.handle_connect_deadline(generation),
        }
        true
    }

    fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::ScanAndConnect { predicate, reply } => {
                self.handle_scan_request(predicate, reply)
            }
            SessionCommand::Disconnect { reply } => self.handle_disconnect_request(reply),
            SessionCommand::AcknowledgeAlert => self.handle_acknowledge(),
            SessionCommand::Shutdown { reply } => {
                self.handle_shutdown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    /// Wind down whatever is in flight. Safe when nothing ever started.
    fn handle_shutdown(&mut self) {
        info!("session shutting down");
        if self.snapshot.phase == SessionPhase::Scanning {
            self.send(PlatformCommand::StopScan);
            self.matcher = None;
        }
        if let Some(session) = self.session.as_mut() {
            if !session.is_terminal() {
                let id = session.peripheral().id.clone();
                session.complete(DisconnectCause::LocalRequest);
                self.send(PlatformCommand::Disconnect(id));
            }
        }
        if self.alert_sustained {
            self.alert_sustained = false;
            self.send(PlatformCommand::StopAlert);
        }
        if let Some(attempt) = self.pending.take() {
            let _ = attempt.reply.send(Err(Error::ChannelClosed));
        }
        if let Some(reply) = self.pending_disconnect.take() {
            let _ = reply.send(Ok(()));
        }
        self.snapshot.phase = SessionPhase::Idle;
        self.snapshot.peripheral = None;
        self.publish();
    }

    fn handle_scan_request(
        &mut self,
        predicate: SelectionPredicate,
        reply: oneshot::Sender<Result<ConnectOutcome>>,
    ) {
        if !predicate.is_satisfiable() {
            let _ = reply.send(Err(Error::UnmatchablePredicate));
            return;
        }
        if self.snapshot.phase == SessionPhase::Scanning {
            // A new request supersedes the window already open; the
            // superseded one resolves as empty.
            info!("new scan request supersedes the open window");
            self.send(PlatformCommand::StopScan);
            self.matcher = None;
            self.generation += 1;
            if let Some(attempt) = self.pending.take() {
                let _ = attempt.reply.send(Ok(ConnectOutcome::NoMatch));
            }
        }
        let busy = self.pending.is_some()
            || matches!(
                self.snapshot.phase,
                SessionPhase::Connecting | SessionPhase::Connected | SessionPhase::Disconnecting
            );
        if busy {
            let _ = reply.send(Err(Error::AdapterBusy));
            return;
        }

        self.session = None;
        self.pending = Some(PendingAttempt { predicate, reply });
        // Never trust a cached answer; the user may have changed system
        // settings since the last request.
        self.send(PlatformCommand::RequestPermissions(
            self.gate.required().to_vec(),
        ));
    }

    fn handle_disconnect_request(&mut self, reply: oneshot::Sender<Result<()>>) {
        if self.snapshot.phase.is_connected() {
            if let Some(session) = self.session.as_ref() {
                let id = session.peripheral().id.clone();
                info!("disconnecting from {id}");
                self.snapshot.phase = SessionPhase::Disconnecting;
                self.pending_disconnect = Some(reply);
                self.send(PlatformCommand::Disconnect(id));
                self.publish();
                return;
            }
        }
        // Nothing to tear down; disconnect is idempotent.
        let _ = reply.send(Ok(()));
    }

    fn handle_acknowledge(&mut self) {
        if self.snapshot.alert.take().is_some() {
            debug!("alert acknowledged");
        }
        if self.alert_sustained {
            self.alert_sustained = false;
            self.send(PlatformCommand::StopAlert);
        }
        self.publish();
    }

    fn handle_scan_deadline(&mut self, generation: u64) {
        if generation != self.generation || self.snapshot.phase != SessionPhase::Scanning {
            return;
        }
        info!("scan window closed without a match");
        self.send(PlatformCommand::StopScan);
        self.matcher = None;
        self.generation += 1;
        self.snapshot.phase = SessionPhase::Idle;
        self.snapshot.reason = Some("scan window closed without a match".to_string());
        if let Some(attempt) = self.pending.take() {
            let _ = attempt.reply.send(Ok(ConnectOutcome::NoMatch));
        }
        self.publish();
    }

    fn handle_connect_deadline(&mut self, generation: u64) {
        if generation != self.generation || self.snapshot.phase != SessionPhase::Connecting {
            return;
        }
        warn!("connect attempt timed out");
        self.generation += 1;
        if let Some(handle) = self.snapshot.peripheral.take() {
            // Cancel whatever the platform still has in flight.
            self.send(PlatformCommand::Disconnect(handle.id));
        }
        self.snapshot.phase = self.resting_phase();
        self.fail_attempt(Error::ConnectTimeout);
    }

    fn handle_poll_tick(&mut self) {
        if self.poller.should_query(self.snapshot.phase) {
            self.send(PlatformCommand::QueryExternalConnection);
        }
    }

    // ─────────────────────────────────────────────────────────
    // Platform event handling
    // ─────────────────────────────────────────────────────────

    fn handle_platform(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::Permissions(answer) => self.handle_permissions(answer),
            PlatformEvent::AdapterState(state) => self.handle_adapter_state(state),
            PlatformEvent::Discovered(adv) => self.handle_discovered(adv),
            PlatformEvent::ConnectResult { id, result } => self.handle_connect_result(id, result),
            PlatformEvent::Disconnected { id, cause } => self.handle_disconnected(id, cause),
            PlatformEvent::ExternalConnection(answer) => self.handle_external(answer),
            PlatformEvent::AppForeground(foreground) => {
                self.foreground = foreground;
            }
        }
    }

    fn handle_permissions(&mut self, answer: PermissionSet) {
        match self.gate.evaluate(&answer) {
            GateOutcome::Granted => {
                self.snapshot.missing.clear();
                if self.snapshot.phase == SessionPhase::AwaitingPermission {
                    self.snapshot.phase = self.resting_phase();
                    self.snapshot.reason = None;
                }
                self.publish();
                if self.pending.is_some() {
                    self.begin_scan();
                }
            }
            GateOutcome::Missing(missing) => {
                let err = Error::permission_denied(missing.clone());
                warn!("permissions refused: {err}");
                self.snapshot.missing = missing;
                self.snapshot.phase = SessionPhase::AwaitingPermission;
                self.snapshot.reason = Some(err.to_string());
                if let Some(attempt) = self.pending.take() {
                    let _ = attempt.reply.send(Err(err));
                }
                self.publish();
            }
        }
    }

    fn handle_adapter_state(&mut self, state: AdapterState) {
        self.monitor.publish(state);

        if state.is_ready() {
            if self.snapshot.phase == SessionPhase::AdapterOff {
                info!("adapter back: {state}");
                self.snapshot.phase = SessionPhase::Idle;
                self.snapshot.reason = None;
                self.publish();
            }
            return;
        }

        // The radio went away underneath whatever we were doing.
        match self.snapshot.phase {
            SessionPhase::Connected => {
                let lost = match self.session.as_mut() {
                    Some(session) => session
                        .complete(DisconnectCause::AdapterLost)
                        .map(|_| session.peripheral().id.clone()),
                    None => None,
                };
                if let Some(id) = lost {
                    warn!("adapter lost while connected to {id}");
                    self.raise_alert(id);
                }
                self.snapshot.reason = Some(Error::adapter_not_ready(state).to_string());
            }
            SessionPhase::Scanning => {
                self.send(PlatformCommand::StopScan);
                self.matcher = None;
                self.generation += 1;
                self.snapshot.phase = SessionPhase::AdapterOff;
                self.fail_attempt(Error::adapter_not_ready(state));
            }
            SessionPhase::Connecting => {
                self.generation += 1;
                self.snapshot.phase = SessionPhase::AdapterOff;
                self.snapshot.peripheral = None;
                self.fail_attempt(Error::adapter_not_ready(state));
            }
            SessionPhase::Disconnecting => {
                // The link is gone either way; the local request is done.
                if let Some(session) = self.session.as_mut() {
                    session.complete(DisconnectCause::LocalRequest);
                }
                self.session = None;
                if let Some(reply) = self.pending_disconnect.take() {
                    let _ = reply.send(Ok(()));
                }
            }
            SessionPhase::AwaitingPermission
            | SessionPhase::Idle
            | SessionPhase::AdapterOff => {}
        }

        if self.snapshot.phase != SessionPhase::AwaitingPermission {
            self.snapshot.phase = SessionPhase::AdapterOff;
        }
        self.snapshot.peripheral = None;
        self.publish();
    }

    fn handle_discovered(&mut self, adv: Advertisement) {
        if self.snapshot.phase != SessionPhase::Scanning {
            return;
        }
        let Some(matcher) = self.matcher.as_mut() else {
            return;
        };
        if !matcher.offer(&adv) {
            return;
        }
        // The connect deadline belongs to the window that produced the
        // match.
        let generation = matcher.generation();
        info!("matched {} ({})", adv.id, adv.handle().display_name());
        self.matcher = None;
        self.send(PlatformCommand::StopScan);
        self.snapshot.phase = SessionPhase::Connecting;
        self.snapshot.peripheral = Some(adv.handle());
        self.send(PlatformCommand::Connect(adv.id));

        let deadline = self.config.connect_timeout;
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = inbox.send(Inbound::ConnectDeadline { generation });
        });
        self.publish();
    }

    fn handle_connect_result(
        &mut self,
        id: PeripheralId,
        result: std::result::Result<(), ConnectFailure>,
    ) {
        if self.snapshot.phase != SessionPhase::Connecting {
            return;
        }
        let Some(expected) = self.snapshot.peripheral.clone() else {
            return;
        };
        if expected.id != id {
            return;
        }
        // Either way the connect deadline is now meaningless.
        self.generation += 1;

        match result {
            Ok(()) => {
                info!("connected to {} ({})", id, expected.display_name());
                self.session = Some(ActiveSession::new(expected.clone()));
                self.snapshot.phase = SessionPhase::Connected;
                self.snapshot.reason = None;
                if let Some(attempt) = self.pending.take() {
                    let _ = attempt.reply.send(Ok(ConnectOutcome::Connected(expected)));
                }
                self.publish();
            }
            Err(failure) => {
                warn!("connect to {id} failed: {failure:?}");
                self.snapshot.phase = self.resting_phase();
                self.snapshot.peripheral = None;
                self.fail_attempt(Error::from(failure));
            }
        }
    }

    fn handle_disconnected(&mut self, id: PeripheralId, cause: DisconnectCause) {
        // A drop that races our own disconnect request still completes
        // that request; the caller asked for the link to end and it did.
        let cause = if self.snapshot.phase == SessionPhase::Disconnecting {
            DisconnectCause::LocalRequest
        } else {
            cause
        };
        let completed = match self.session.as_mut() {
            Some(session) if session.peripheral().id == id => session.complete(cause),
            _ => return,
        };
        let Some(cause) = completed else {
            trace!("duplicate disconnect for {id} ignored");
            return;
        };

        if cause.is_unsolicited() {
            warn!("link to {id} lost: {cause:?}");
            // The terminal session stays around so a racing duplicate
            // report cannot raise a second alert.
            self.raise_alert(id);
            self.snapshot.reason = Some("connection lost unexpectedly".to_string());
            self.snapshot.phase = self.resting_phase();
        } else {
            info!("disconnected from {id}");
            self.session = None;
            self.snapshot.phase = SessionPhase::Idle;
            self.snapshot.reason = None;
            if let Some(reply) = self.pending_disconnect.take() {
                let _ = reply.send(Ok(()));
            }
        }
        self.snapshot.peripheral = None;
        self.publish();
    }

    fn handle_external(&mut self, answer: Option<PeripheralHandle>) {
        if self.snapshot.external != answer {
            self.snapshot.external = answer;
            self.publish();
        }
    }

    // ─────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────

    fn begin_scan(&mut self) {
        let Some(attempt) = self.pending.as_ref() else {
            return;
        };
        let adapter = self.monitor.current();
        if !adapter.is_ready() {
            self.snapshot.phase = self.resting_phase();
            self.fail_attempt(Error::adapter_not_ready(adapter));
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        self.matcher = Some(ScanMatcher::new(attempt.predicate.clone(), generation));
        self.session = None;
        self.snapshot.phase = SessionPhase::Scanning;
        self.snapshot.peripheral = None;
        self.snapshot.reason = None;
        info!("scan window open ({:?})", self.config.scan_window);
        self.send(PlatformCommand::StartScan);

        let window = self.config.scan_window;
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = inbox.send(Inbound::ScanDeadline { generation });
        });
        self.publish();
    }

    /// Resolve the pending attempt with `err` and record the reason.
    fn fail_attempt(&mut self, err: Error) {
        self.snapshot.reason = Some(err.to_string());
        if let Some(attempt) = self.pending.take() {
            let _ = attempt.reply.send(Err(err));
        }
        self.publish();
    }

    fn raise_alert(&mut self, peripheral: PeripheralId) {
        self.snapshot.alert = Some(AlertEvent::now(peripheral.clone()));
        if self.foreground {
            self.alert_sustained = true;
            self.send(PlatformCommand::StartAlert);
        } else {
            self.send(PlatformCommand::PostAttention(peripheral));
        }
    }

    /// Phase for "nothing in flight", given the adapter's state.
    fn resting_phase(&self) -> SessionPhase {
        if self.monitor.current().is_ready() {
            SessionPhase::Idle
        } else {
            SessionPhase::AdapterOff
        }
    }

    fn platform_lost(&mut self) {
        error!("platform event stream closed");
        self.snapshot.reason = Some(Error::ChannelClosed.to_string());
        if let Some(attempt) = self.pending.take() {
            let _ = attempt.reply.send(Err(Error::ChannelClosed));
        }
        if let Some(reply) = self.pending_disconnect.take() {
            let _ = reply.send(Err(Error::ChannelClosed));
        }
        self.publish();
    }

    fn send(&self, cmd: PlatformCommand) {
        let summary = cmd.summary();
        trace!("platform command: {summary}");
        if self.commands.send(cmd).is_err() {
            error!("platform adapter is gone; dropping {summary}");
        }
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.snapshot.clone());
    }
}
