//! Error taxonomy for the session core
//!
//! Nothing here is fatal to the process: every error translates into an
//! orchestrator state transition plus a user-visible reason string.

use thiserror::Error;

use crate::types::{AdapterState, Capability};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────
    // Gating
    // ─────────────────────────────────────────────────────────
    /// Required capabilities refused by the platform. Retryable after the
    /// user returns from system settings.
    #[error("required permissions not granted: {}", format_capabilities(.missing))]
    PermissionDenied { missing: Vec<Capability> },

    /// Adapter is not powered on. Self-heals once the adapter returns.
    #[error("bluetooth adapter not ready ({state})")]
    AdapterNotReady { state: AdapterState },

    /// The selection predicate can never match (empty name).
    #[error("selection predicate can never match: empty device name")]
    UnmatchablePredicate,

    // ─────────────────────────────────────────────────────────
    // Connect
    // ─────────────────────────────────────────────────────────
    /// Link establishment did not complete within the platform deadline.
    #[error("connection attempt timed out")]
    ConnectTimeout,

    /// The peripheral refused the connection.
    #[error("connection rejected by peripheral")]
    ConnectRejected,

    /// The adapter was busy with another radio operation.
    #[error("adapter busy with another operation")]
    AdapterBusy,

    // ─────────────────────────────────────────────────────────
    // Infrastructure
    // ─────────────────────────────────────────────────────────
    /// The orchestrator (or platform adapter) went away.
    #[error("session channel closed unexpectedly")]
    ChannelClosed,

    /// Logging setup failure.
    #[error("io error: {0}")]
    Io(String),
}

impl Error {
    pub fn permission_denied(missing: Vec<Capability>) -> Self {
        Self::PermissionDenied { missing }
    }

    pub fn adapter_not_ready(state: AdapterState) -> Self {
        Self::AdapterNotReady { state }
    }

    /// Whether re-issuing the request can succeed without restarting the
    /// process.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::ChannelClosed | Error::Io(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

fn format_capabilities(capabilities: &[Capability]) -> String {
    capabilities
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
