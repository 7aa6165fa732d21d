//! Domain types for the BLE central session core

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────
// Adapter
// ─────────────────────────────────────────────────────────

/// Power state of the local Bluetooth adapter.
///
/// Owned by the adapter monitor; updated only from the platform stack's
/// push notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdapterState {
    /// State not yet reported by the platform.
    #[default]
    Unknown,
    /// Radio is off (user toggle or airplane mode).
    PoweredOff,
    /// Radio is on and usable.
    PoweredOn,
    /// Stack is restarting the radio.
    Resetting,
    /// Host has no BLE-capable adapter.
    Unsupported,
    /// This process is not allowed to use the radio.
    Unauthorized,
}

impl AdapterState {
    /// Whether scan/connect operations may be attempted.
    pub fn is_ready(&self) -> bool {
        matches!(self, AdapterState::PoweredOn)
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AdapterState::Unknown => "unknown",
            AdapterState::PoweredOff => "powered off",
            AdapterState::PoweredOn => "powered on",
            AdapterState::Resetting => "resetting",
            AdapterState::Unsupported => "unsupported",
            AdapterState::Unauthorized => "unauthorized",
        };
        write!(f, "{label}")
    }
}

// ─────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────

/// A capability the host OS can gate behind a user prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Discover nearby peripherals.
    Scan,
    /// Establish a link to a peripheral.
    Connect,
    /// Coarse location (older Android maps BLE scanning onto this).
    CoarseLocation,
    /// Fine location.
    FineLocation,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Capability::Scan => "scan",
            Capability::Connect => "connect",
            Capability::CoarseLocation => "coarse-location",
            Capability::FineLocation => "fine-location",
        };
        write!(f, "{label}")
    }
}

/// Resolution of one capability request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// Blocked by device policy; the user cannot grant it from a prompt.
    Restricted,
}

/// Platform answer to a permission request.
///
/// A capability the platform never reported is treated as implicitly
/// granted: on OS versions where it does not exist there is nothing to ask
/// for. Denials are never cached by the core; callers re-request after the
/// user returns from system settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    statuses: HashMap<Capability, PermissionStatus>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set granting every listed capability.
    pub fn grant_all(capabilities: &[Capability]) -> Self {
        let mut set = Self::new();
        for cap in capabilities {
            set.set(*cap, PermissionStatus::Granted);
        }
        set
    }

    pub fn set(&mut self, capability: Capability, status: PermissionStatus) {
        self.statuses.insert(capability, status);
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with(mut self, capability: Capability, status: PermissionStatus) -> Self {
        self.set(capability, status);
        self
    }

    /// Status as reported by the platform, if it reported one.
    pub fn status(&self, capability: Capability) -> Option<PermissionStatus> {
        self.statuses.get(&capability).copied()
    }

    /// Granted, either explicitly or implicitly (capability undefined on
    /// this platform).
    pub fn is_granted(&self, capability: Capability) -> bool {
        !matches!(
            self.statuses.get(&capability),
            Some(PermissionStatus::Denied) | Some(PermissionStatus::Restricted)
        )
    }

    /// The subset of `required` that is not granted.
    pub fn missing_from(&self, required: &[Capability]) -> Vec<Capability> {
        required
            .iter()
            .copied()
            .filter(|cap| !self.is_granted(*cap))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────
// Peripherals
// ─────────────────────────────────────────────────────────

/// Opaque platform identifier for a remote peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A discovered or connected remote peripheral.
///
/// Created on discovery, promoted to "connected" by the session, and
/// dropped on disconnect or when a new scan starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralHandle {
    /// Platform identifier.
    pub id: PeripheralId,

    /// Human-readable name, when advertised.
    pub name: Option<String>,

    /// Signal strength (dBm) at time of discovery.
    pub rssi: Option<i16>,
}

impl PeripheralHandle {
    /// Name for display, falling back when the peripheral did not
    /// advertise one.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed)")
    }
}

/// One discovery callback payload from the platform stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    pub id: PeripheralId,
    pub name: Option<String>,
    /// Signal strength (dBm) for this advertisement.
    pub rssi: i16,
    /// Service UUIDs carried in the advertising data.
    #[serde(default)]
    pub services: Vec<Uuid>,
}

impl Advertisement {
    /// The handle a matching advertisement promotes into.
    pub fn handle(&self) -> PeripheralHandle {
        PeripheralHandle {
            id: self.id.clone(),
            name: self.name.clone(),
            rssi: Some(self.rssi),
        }
    }
}

/// Caller-supplied rule for picking one peripheral out of the discovery
/// stream. Pure: matching reads only the advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectionPredicate {
    /// Advertised name equals the given string.
    NameExact(String),
    /// Advertised name starts with the given prefix.
    NamePrefix(String),
    /// Advertising data contains the given service UUID.
    ServiceUuid(Uuid),
}

impl SelectionPredicate {
    pub fn matches(&self, adv: &Advertisement) -> bool {
        match self {
            SelectionPredicate::NameExact(name) => adv.name.as_deref() == Some(name.as_str()),
            SelectionPredicate::NamePrefix(prefix) => adv
                .name
                .as_deref()
                .is_some_and(|n| n.starts_with(prefix.as_str())),
            SelectionPredicate::ServiceUuid(uuid) => adv.services.contains(uuid),
        }
    }

    /// An empty name can never match anything; callers reject such a
    /// predicate before touching the radio.
    pub fn is_satisfiable(&self) -> bool {
        match self {
            SelectionPredicate::NameExact(name) | SelectionPredicate::NamePrefix(name) => {
                !name.is_empty()
            }
            SelectionPredicate::ServiceUuid(_) => true,
        }
    }
}

// ─────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────

/// Why an active link ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectCause {
    /// This process asked for the disconnect.
    LocalRequest,
    /// The peripheral dropped the link.
    RemoteDropped,
    /// The adapter powered off or was lost underneath the link.
    AdapterLost,
}

impl DisconnectCause {
    /// Causes that must raise an alert (anything not locally requested).
    pub fn is_unsolicited(&self) -> bool {
        !matches!(self, DisconnectCause::LocalRequest)
    }
}

/// Fire-and-forget "link lost unexpectedly" signal. Not persisted; lives
/// in the snapshot until acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// When the disconnect was observed.
    pub at: DateTime<Utc>,
    /// Last known id of the lost peripheral.
    pub peripheral: PeripheralId,
}

impl AlertEvent {
    pub fn now(peripheral: PeripheralId) -> Self {
        Self {
            at: Utc::now(),
            peripheral,
        }
    }
}

/// Orchestrator phase. Exactly one instance per process; mutated only by
/// the orchestrator task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Required capabilities not yet granted.
    #[default]
    AwaitingPermission,
    /// Ready; no radio activity.
    Idle,
    /// Discovery window open.
    Scanning,
    /// Link establishment in flight.
    Connecting,
    /// Link up.
    Connected,
    /// Local disconnect in flight.
    Disconnecting,
    /// Adapter is not powered on; everything suspended until it returns.
    AdapterOff,
}

impl SessionPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionPhase::Connected)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionPhase::AwaitingPermission => "awaiting-permission",
            SessionPhase::Idle => "idle",
            SessionPhase::Scanning => "scanning",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Connected => "connected",
            SessionPhase::Disconnecting => "disconnecting",
            SessionPhase::AdapterOff => "adapter-off",
        };
        write!(f, "{label}")
    }
}

/// Read-only view of the session for the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,

    /// Peripheral this session is connecting to or connected with.
    pub peripheral: Option<PeripheralHandle>,

    /// Connection established outside this process, observed by the
    /// reconnect poller. Reflected for display only, never owned.
    pub external: Option<PeripheralHandle>,

    /// Pending unexpected-disconnect alert, cleared on acknowledge.
    pub alert: Option<AlertEvent>,

    /// Capabilities the platform refused, when phase is AwaitingPermission.
    #[serde(default)]
    pub missing: Vec<Capability>,

    /// Human-readable reason for the last failure or no-match outcome.
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adv(id: &str, name: Option<&str>) -> Advertisement {
        Advertisement {
            id: PeripheralId::new(id),
            name: name.map(str::to_string),
            rssi: -60,
            services: Vec::new(),
        }
    }

    #[test]
    fn test_adapter_ready_only_when_powered_on() {
        assert!(AdapterState::PoweredOn.is_ready());
        for state in [
            AdapterState::Unknown,
            AdapterState::PoweredOff,
            AdapterState::Resetting,
            AdapterState::Unsupported,
            AdapterState::Unauthorized,
        ] {
            assert!(!state.is_ready(), "{state} must not be ready");
        }
    }

    #[test]
    fn test_permission_set_explicit_statuses() {
        let set = PermissionSet::new()
            .with(Capability::Scan, PermissionStatus::Granted)
            .with(Capability::Connect, PermissionStatus::Denied);

        assert!(set.is_granted(Capability::Scan));
        assert!(!set.is_granted(Capability::Connect));
        assert_eq!(
            set.missing_from(&[Capability::Scan, Capability::Connect]),
            vec![Capability::Connect]
        );
    }

    #[test]
    fn test_unknown_capability_is_implicitly_granted() {
        let set = PermissionSet::new();
        assert!(set.is_granted(Capability::FineLocation));
        assert!(set
            .missing_from(&[Capability::Scan, Capability::FineLocation])
            .is_empty());
    }

    #[test]
    fn test_restricted_counts_as_missing() {
        let set = PermissionSet::new().with(Capability::Scan, PermissionStatus::Restricted);
        assert_eq!(set.missing_from(&[Capability::Scan]), vec![Capability::Scan]);
    }

    #[test]
    fn test_predicate_exact_name() {
        let p = SelectionPredicate::NameExact("Cart-01".to_string());
        assert!(p.matches(&adv("AA:BB", Some("Cart-01"))));
        assert!(!p.matches(&adv("AA:BB", Some("Cart-02"))));
        assert!(!p.matches(&adv("AA:BB", None)));
    }

    #[test]
    fn test_predicate_name_prefix() {
        let p = SelectionPredicate::NamePrefix("Cart-".to_string());
        assert!(p.matches(&adv("AA:BB", Some("Cart-17"))));
        assert!(!p.matches(&adv("AA:BB", Some("Trolley-17"))));
    }

    #[test]
    fn test_predicate_service_uuid() {
        let service = Uuid::from_u128(0x1812);
        let mut a = adv("AA:BB", None);
        a.services.push(service);

        let p = SelectionPredicate::ServiceUuid(service);
        assert!(p.matches(&a));
        assert!(!p.matches(&adv("CC:DD", None)));
    }

    #[test]
    fn test_empty_name_predicate_is_unsatisfiable() {
        assert!(!SelectionPredicate::NameExact(String::new()).is_satisfiable());
        assert!(!SelectionPredicate::NamePrefix(String::new()).is_satisfiable());
        assert!(SelectionPredicate::NameExact("x".to_string()).is_satisfiable());
        assert!(SelectionPredicate::ServiceUuid(Uuid::from_u128(0x1812)).is_satisfiable());
    }

    #[test]
    fn test_handle_display_name_fallback() {
        let handle = adv("AA:BB", None).handle();
        assert_eq!(handle.display_name(), "(unnamed)");

        let handle = adv("AA:BB", Some("Cart-01")).handle();
        assert_eq!(handle.display_name(), "Cart-01");
    }

    #[test]
    fn test_unsolicited_causes() {
        assert!(!DisconnectCause::LocalRequest.is_unsolicited());
        assert!(DisconnectCause::RemoteDropped.is_unsolicited());
        assert!(DisconnectCause::AdapterLost.is_unsolicited());
    }

    #[test]
    fn test_snapshot_default_phase() {
        let snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.phase, SessionPhase::AwaitingPermission);
        assert!(snapshot.peripheral.is_none());
        assert!(snapshot.alert.is_none());
    }
}
