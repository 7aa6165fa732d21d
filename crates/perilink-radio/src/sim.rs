//! Scripted in-process platform adapter
//!
//! [`SimRadio`] plays the role of a host Bluetooth stack: it answers
//! permission requests, replays advertisements while a scan window is
//! open, resolves connect attempts, and tracks alert state. Tests drive
//! the interesting transitions (power loss, unsolicited drops) through a
//! [`SimHandle`], and inspect everything the core sent via the command
//! log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use perilink_core::prelude::*;
use perilink_core::types::{
    AdapterState, Advertisement, Capability, DisconnectCause, PeripheralHandle, PeripheralId,
    PermissionSet,
};

use crate::protocol::{ConnectFailure, PlatformCommand, PlatformEvent, PlatformLink};

// ─────────────────────────────────────────────────────────
// Script
// ─────────────────────────────────────────────────────────

/// Scripted outcome for a connect attempt against one peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectScript {
    Succeed,
    Reject,
    Busy,
    /// Never answer; lets callers exercise their own deadline.
    Hang,
}

/// Scenario configuration for a [`SimRadio`].
#[derive(Debug, Clone)]
pub struct SimScript {
    /// Adapter state pushed once at startup.
    pub initial_adapter: AdapterState,
    /// Foreground flag pushed once at startup.
    pub initial_foreground: bool,
    /// Answer to every permission request (changeable via
    /// [`SimHandle::set_permissions`]).
    pub permissions: PermissionSet,
    /// Advertisements replayed, each after its delay, on every scan.
    pub advertisements: Vec<(Duration, Advertisement)>,
    /// Connect outcome per peripheral. Peripherals with no entry reject.
    pub connects: HashMap<PeripheralId, ConnectScript>,
    /// Delay before a connect outcome is reported.
    pub connect_latency: Duration,
    /// Answer to external-connection queries.
    pub external: Option<PeripheralHandle>,
}

impl Default for SimScript {
    fn default() -> Self {
        Self {
            initial_adapter: AdapterState::PoweredOn,
            initial_foreground: true,
            permissions: PermissionSet::grant_all(&[Capability::Scan, Capability::Connect]),
            advertisements: Vec::new(),
            connects: HashMap::new(),
            connect_latency: Duration::from_millis(50),
            external: None,
        }
    }
}

impl SimScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay `adv` after `delay` each time a scan window opens.
    pub fn advertise(mut self, delay: Duration, adv: Advertisement) -> Self {
        self.advertisements.push((delay, adv));
        self
    }

    /// Script the connect outcome for one peripheral.
    pub fn on_connect(mut self, id: impl Into<PeripheralId>, outcome: ConnectScript) -> Self {
        self.connects.insert(id.into(), outcome);
        self
    }

    pub fn with_adapter(mut self, state: AdapterState) -> Self {
        self.initial_adapter = state;
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_external(mut self, handle: PeripheralHandle) -> Self {
        self.external = Some(handle);
        self
    }

    pub fn in_background(mut self) -> Self {
        self.initial_foreground = false;
        self
    }
}

// ─────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────

#[derive(Default)]
struct SimState {
    command_log: Mutex<Vec<PlatformCommand>>,
    permissions: Mutex<PermissionSet>,
    external: Mutex<Option<PeripheralHandle>>,
    connected: Mutex<Option<PeripheralId>>,
    alert_active: AtomicBool,
    attention_count: AtomicUsize,
}

// ─────────────────────────────────────────────────────────
// Radio
// ─────────────────────────────────────────────────────────

/// The simulated platform stack. Construct via [`SimRadio::spawn`].
pub struct SimRadio;

impl SimRadio {
    /// Spawn the simulator task. Returns the core's end of the boundary
    /// plus a handle for injecting platform-side happenings.
    pub fn spawn(script: SimScript) -> (PlatformLink, SimHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (evt_tx, evt_rx) = mpsc::unbounded_channel();

        let state = Arc::new(SimState {
            permissions: Mutex::new(script.permissions.clone()),
            external: Mutex::new(script.external.clone()),
            ..SimState::default()
        });

        // Startup pushes, mirroring a real stack reporting its state as
        // soon as the delegate attaches.
        let _ = evt_tx.send(PlatformEvent::AdapterState(script.initial_adapter));
        let _ = evt_tx.send(PlatformEvent::AppForeground(script.initial_foreground));

        tokio::spawn(run(script, cmd_rx, evt_tx.clone(), Arc::clone(&state)));

        let link = PlatformLink {
            commands: cmd_tx,
            events: evt_rx,
        };
        let handle = SimHandle {
            events: evt_tx,
            state,
        };
        (link, handle)
    }
}

async fn run(
    script: SimScript,
    mut commands: mpsc::UnboundedReceiver<PlatformCommand>,
    events: mpsc::UnboundedSender<PlatformEvent>,
    state: Arc<SimState>,
) {
    let mut scan_replay: Option<JoinHandle<()>> = None;

    while let Some(cmd) = commands.recv().await {
        debug!("sim radio: {}", cmd.summary());
        state.command_log.lock().unwrap().push(cmd.clone());

        match cmd {
            PlatformCommand::RequestPermissions(_) => {
                let answer = state.permissions.lock().unwrap().clone();
                let _ = events.send(PlatformEvent::Permissions(answer));
            }
            PlatformCommand::StartScan => {
                if let Some(task) = scan_replay.take() {
                    task.abort();
                }
                scan_replay = Some(tokio::spawn(replay_advertisements(
                    script.advertisements.clone(),
                    events.clone(),
                )));
            }
            PlatformCommand::StopScan => {
                if let Some(task) = scan_replay.take() {
                    task.abort();
                }
            }
            PlatformCommand::Connect(id) => {
                let outcome = script
                    .connects
                    .get(&id)
                    .copied()
                    .unwrap_or(ConnectScript::Reject);
                tokio::spawn(resolve_connect(
                    id,
                    outcome,
                    script.connect_latency,
                    events.clone(),
                    Arc::clone(&state),
                ));
            }
            PlatformCommand::Disconnect(id) => {
                // Only an existing link produces a disconnect callback.
                let held = state.connected.lock().unwrap().take();
                if held.as_ref() == Some(&id) {
                    let _ = events.send(PlatformEvent::Disconnected {
                        id,
                        cause: DisconnectCause::LocalRequest,
                    });
                } else {
                    *state.connected.lock().unwrap() = held;
                }
            }
            PlatformCommand::QueryExternalConnection => {
                let answer = state.external.lock().unwrap().clone();
                let _ = events.send(PlatformEvent::ExternalConnection(answer));
            }
            PlatformCommand::StartAlert => {
                state.alert_active.store(true, Ordering::SeqCst);
            }
            PlatformCommand::StopAlert => {
                state.alert_active.store(false, Ordering::SeqCst);
            }
            PlatformCommand::PostAttention(_) => {
                state.attention_count.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    if let Some(task) = scan_replay.take() {
        task.abort();
    }
}

async fn replay_advertisements(
    advertisements: Vec<(Duration, Advertisement)>,
    events: mpsc::UnboundedSender<PlatformEvent>,
) {
    for (delay, adv) in advertisements {
        tokio::time::sleep(delay).await;
        if events.send(PlatformEvent::Discovered(adv)).is_err() {
            return;
        }
    }
}

async fn resolve_connect(
    id: PeripheralId,
    outcome: ConnectScript,
    latency: Duration,
    events: mpsc::UnboundedSender<PlatformEvent>,
    state: Arc<SimState>,
) {
    tokio::time::sleep(latency).await;
    let result = match outcome {
        ConnectScript::Succeed => {
            *state.connected.lock().unwrap() = Some(id.clone());
            Ok(())
        }
        ConnectScript::Reject => Err(ConnectFailure::Rejected),
        ConnectScript::Busy => Err(ConnectFailure::AdapterBusy),
        ConnectScript::Hang => return,
    };
    let _ = events.send(PlatformEvent::ConnectResult { id, result });
}

// ─────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────

/// Test-side handle to a running [`SimRadio`].
#[derive(Clone)]
pub struct SimHandle {
    events: mpsc::UnboundedSender<PlatformEvent>,
    state: Arc<SimState>,
}

impl SimHandle {
    /// Push an adapter power transition.
    pub fn set_adapter_state(&self, state: AdapterState) {
        let _ = self.events.send(PlatformEvent::AdapterState(state));
    }

    /// Drop the link from the platform side.
    pub fn drop_link(&self, id: impl Into<PeripheralId>, cause: DisconnectCause) {
        let id = id.into();
        let mut connected = self.state.connected.lock().unwrap();
        if connected.as_ref() == Some(&id) {
            *connected = None;
        }
        drop(connected);
        let _ = self.events.send(PlatformEvent::Disconnected { id, cause });
    }

    /// Move the hosting application between foreground and background.
    pub fn set_foreground(&self, foreground: bool) {
        let _ = self.events.send(PlatformEvent::AppForeground(foreground));
    }

    /// Change the answer scripted for future permission requests.
    pub fn set_permissions(&self, permissions: PermissionSet) {
        *self.state.permissions.lock().unwrap() = permissions;
    }

    /// Change the answer scripted for future external-connection queries.
    pub fn set_external(&self, external: Option<PeripheralHandle>) {
        *self.state.external.lock().unwrap() = external;
    }

    /// Every command the core has sent, in order.
    pub fn commands(&self) -> Vec<PlatformCommand> {
        self.state.command_log.lock().unwrap().clone()
    }

    /// Count of logged commands matching `predicate`.
    pub fn command_count(&self, predicate: impl Fn(&PlatformCommand) -> bool) -> usize {
        self.state
            .command_log
            .lock()
            .unwrap()
            .iter()
            .filter(|cmd| predicate(cmd))
            .count()
    }

    /// Whether a sustained alert is currently running.
    pub fn alert_active(&self) -> bool {
        self.state.alert_active.load(Ordering::SeqCst)
    }

    /// How many background attention notifications were posted.
    pub fn attention_count(&self) -> usize {
        self.state.attention_count.load(Ordering::SeqCst)
    }

    /// Peripheral the simulated stack currently holds a link to.
    pub fn connected(&self) -> Option<PeripheralId> {
        self.state.connected.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adv(id: &str, name: &str) -> Advertisement {
        Advertisement {
            id: PeripheralId::new(id),
            name: Some(name.to_string()),
            rssi: -55,
            services: Vec::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_pushes_adapter_and_foreground() {
        let (mut link, _sim) = SimRadio::spawn(SimScript::new());

        assert_eq!(
            link.events.recv().await,
            Some(PlatformEvent::AdapterState(AdapterState::PoweredOn))
        );
        assert_eq!(
            link.events.recv().await,
            Some(PlatformEvent::AppForeground(true))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_replays_advertisements_in_order() {
        let script = SimScript::new()
            .advertise(Duration::from_millis(10), adv("AA", "Cart-01"))
            .advertise(Duration::from_millis(10), adv("BB", "Cart-02"));
        let (mut link, sim) = SimRadio::spawn(script);

        // Drain the startup pushes.
        link.events.recv().await;
        link.events.recv().await;

        link.commands.send(PlatformCommand::StartScan).unwrap();
        assert_eq!(
            link.events.recv().await,
            Some(PlatformEvent::Discovered(adv("AA", "Cart-01")))
        );
        assert_eq!(
            link.events.recv().await,
            Some(PlatformEvent::Discovered(adv("BB", "Cart-02")))
        );

        assert_eq!(sim.commands(), vec![PlatformCommand::StartScan]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_then_local_disconnect() {
        let script = SimScript::new().on_connect("AA", ConnectScript::Succeed);
        let (mut link, sim) = SimRadio::spawn(script);
        link.events.recv().await;
        link.events.recv().await;

        let id = PeripheralId::new("AA");
        link.commands
            .send(PlatformCommand::Connect(id.clone()))
            .unwrap();
        assert_eq!(
            link.events.recv().await,
            Some(PlatformEvent::ConnectResult {
                id: id.clone(),
                result: Ok(())
            })
        );
        assert_eq!(sim.connected(), Some(id.clone()));

        link.commands
            .send(PlatformCommand::Disconnect(id.clone()))
            .unwrap();
        assert_eq!(
            link.events.recv().await,
            Some(PlatformEvent::Disconnected {
                id,
                cause: DisconnectCause::LocalRequest
            })
        );
        assert_eq!(sim.connected(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_peripheral_rejects() {
        let (mut link, _sim) = SimRadio::spawn(SimScript::new());
        link.events.recv().await;
        link.events.recv().await;

        let id = PeripheralId::new("ZZ");
        link.commands
            .send(PlatformCommand::Connect(id.clone()))
            .unwrap();
        assert_eq!(
            link.events.recv().await,
            Some(PlatformEvent::ConnectResult {
                id,
                result: Err(ConnectFailure::Rejected)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_commands_track_state() {
        let (link, sim) = SimRadio::spawn(SimScript::new());

        link.commands.send(PlatformCommand::StartAlert).unwrap();
        link.commands
            .send(PlatformCommand::PostAttention(PeripheralId::new("AA")))
            .unwrap();
        link.commands.send(PlatformCommand::StopAlert).unwrap();

        // Yield until the simulator has drained its inbox.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert!(!sim.alert_active());
        assert_eq!(sim.attention_count(), 1);
    }
}
