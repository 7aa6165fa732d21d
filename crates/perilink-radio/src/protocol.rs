//! Message protocol spoken across the platform boundary
//!
//! The session core never calls into an OS Bluetooth stack directly. It
//! sends [`PlatformCommand`]s down one channel and consumes
//! [`PlatformEvent`]s from another; an adapter task on the far side
//! translates to whatever the host stack actually speaks. Commands are
//! fire-and-forget: every outcome comes back as an event, so the single
//! consumer of the event stream is never blocked on a platform call.

use tokio::sync::mpsc;

use perilink_core::types::{
    AdapterState, Advertisement, Capability, DisconnectCause, PeripheralHandle, PeripheralId,
    PermissionSet,
};
use perilink_core::Error;

// ─────────────────────────────────────────────────────────
// Commands (core -> platform)
// ─────────────────────────────────────────────────────────

/// Request from the session core to the platform adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformCommand {
    /// Prompt the user for the listed capabilities. Answered by
    /// [`PlatformEvent::Permissions`].
    RequestPermissions(Vec<Capability>),

    /// Open a discovery window. Discoveries arrive as
    /// [`PlatformEvent::Discovered`] until `StopScan`.
    StartScan,

    /// Close the discovery window. Safe to send when no scan is running.
    StopScan,

    /// Establish a link. Answered by [`PlatformEvent::ConnectResult`].
    Connect(PeripheralId),

    /// Tear down a link. Answered by [`PlatformEvent::Disconnected`] with
    /// [`DisconnectCause::LocalRequest`].
    Disconnect(PeripheralId),

    /// Ask whether some other process on this host holds a link. Answered
    /// by [`PlatformEvent::ExternalConnection`].
    QueryExternalConnection,

    /// Begin a sustained user alert (vibration / sound).
    StartAlert,

    /// End a sustained user alert. Safe to send when none is running.
    StopAlert,

    /// Post a single background notification about the named peripheral.
    PostAttention(PeripheralId),
}

impl PlatformCommand {
    /// Short description for logging.
    pub fn summary(&self) -> String {
        match self {
            PlatformCommand::RequestPermissions(caps) => {
                format!("request-permissions ({} capabilities)", caps.len())
            }
            PlatformCommand::StartScan => "start-scan".to_string(),
            PlatformCommand::StopScan => "stop-scan".to_string(),
            PlatformCommand::Connect(id) => format!("connect {id}"),
            PlatformCommand::Disconnect(id) => format!("disconnect {id}"),
            PlatformCommand::QueryExternalConnection => "query-external-connection".to_string(),
            PlatformCommand::StartAlert => "start-alert".to_string(),
            PlatformCommand::StopAlert => "stop-alert".to_string(),
            PlatformCommand::PostAttention(id) => format!("post-attention {id}"),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Events (platform -> core)
// ─────────────────────────────────────────────────────────

/// Why a connect attempt did not produce a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// The platform gave up waiting for the peripheral.
    Timeout,
    /// The peripheral refused the link.
    Rejected,
    /// The adapter was busy with another radio operation.
    AdapterBusy,
}

impl From<ConnectFailure> for Error {
    fn from(failure: ConnectFailure) -> Self {
        match failure {
            ConnectFailure::Timeout => Error::ConnectTimeout,
            ConnectFailure::Rejected => Error::ConnectRejected,
            ConnectFailure::AdapterBusy => Error::AdapterBusy,
        }
    }
}

/// Notification pushed by the platform adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    /// Answer to [`PlatformCommand::RequestPermissions`].
    Permissions(PermissionSet),

    /// Adapter power state changed (also pushed once at startup).
    AdapterState(AdapterState),

    /// One advertisement seen while a discovery window is open.
    Discovered(Advertisement),

    /// Answer to [`PlatformCommand::Connect`].
    ConnectResult {
        id: PeripheralId,
        result: Result<(), ConnectFailure>,
    },

    /// A link ended. Pushed both for local requests and for unsolicited
    /// drops; `cause` says which.
    Disconnected {
        id: PeripheralId,
        cause: DisconnectCause,
    },

    /// Answer to [`PlatformCommand::QueryExternalConnection`].
    ExternalConnection(Option<PeripheralHandle>),

    /// The hosting application moved to or from the foreground.
    AppForeground(bool),
}

impl PlatformEvent {
    /// Short description for logging.
    pub fn summary(&self) -> String {
        match self {
            PlatformEvent::Permissions(set) => {
                let missing = set.missing_from(&[Capability::Scan, Capability::Connect]);
                if missing.is_empty() {
                    "permissions (granted)".to_string()
                } else {
                    format!("permissions ({} missing)", missing.len())
                }
            }
            PlatformEvent::AdapterState(state) => format!("adapter-state {state}"),
            PlatformEvent::Discovered(adv) => {
                format!("discovered {} ({})", adv.id, adv.handle().display_name())
            }
            PlatformEvent::ConnectResult { id, result } => match result {
                Ok(()) => format!("connect-result {id} ok"),
                Err(failure) => format!("connect-result {id} failed: {failure:?}"),
            },
            PlatformEvent::Disconnected { id, cause } => {
                format!("disconnected {id} ({cause:?})")
            }
            PlatformEvent::ExternalConnection(Some(handle)) => {
                format!("external-connection {}", handle.id)
            }
            PlatformEvent::ExternalConnection(None) => "external-connection none".to_string(),
            PlatformEvent::AppForeground(fg) => format!("app-foreground {fg}"),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Link
// ─────────────────────────────────────────────────────────

/// The session core's end of the platform boundary.
///
/// Produced by a platform adapter (or [`SimRadio`](crate::sim::SimRadio)
/// in tests); consumed by exactly one orchestrator task.
pub struct PlatformLink {
    /// Commands to the platform adapter.
    pub commands: mpsc::UnboundedSender<PlatformCommand>,
    /// Events from the platform adapter.
    pub events: mpsc::UnboundedReceiver<PlatformEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_failure_maps_to_error() {
        assert_eq!(Error::from(ConnectFailure::Timeout), Error::ConnectTimeout);
        assert_eq!(
            Error::from(ConnectFailure::Rejected),
            Error::ConnectRejected
        );
        assert_eq!(Error::from(ConnectFailure::AdapterBusy), Error::AdapterBusy);
    }

    #[test]
    fn test_command_summary() {
        let cmd = PlatformCommand::Connect(PeripheralId::new("AA:BB:CC"));
        assert_eq!(cmd.summary(), "connect AA:BB:CC");
        assert_eq!(PlatformCommand::StartScan.summary(), "start-scan");
    }

    #[test]
    fn test_event_summary_reports_missing_permissions() {
        let set = PermissionSet::new().with(
            Capability::Scan,
            perilink_core::PermissionStatus::Denied,
        );
        let summary = PlatformEvent::Permissions(set).summary();
        assert_eq!(summary, "permissions (1 missing)");
    }
}
