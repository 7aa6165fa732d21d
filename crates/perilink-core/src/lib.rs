//! # perilink-core - Core Domain Types
//!
//! Foundation crate for Perilink, the BLE central-role connection session
//! manager. Provides the domain model, error taxonomy, and logging setup.
//! This crate has **zero internal dependencies** -- it only depends on
//! external crates (serde, chrono, thiserror, uuid, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`AdapterState`] - Radio power state as pushed by the platform stack
//! - [`Capability`], [`PermissionSet`] - OS-gated radio capabilities
//! - [`PeripheralHandle`], [`Advertisement`] - Remote device identity
//! - [`SelectionPredicate`] - Pure rule picking one peripheral from a scan
//! - [`SessionPhase`], [`SessionSnapshot`] - Orchestrator state for display
//! - [`DisconnectCause`], [`AlertEvent`] - Link-loss reporting
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Session error taxonomy; nothing here is process-fatal
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use perilink_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod types;

/// Prelude for common imports used throughout all Perilink crates
pub mod prelude {
    pub use super::error::{Error, Result};
    pub use tracing::{debug, error, info, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result};
pub use types::{
    AdapterState, Advertisement, AlertEvent, Capability, DisconnectCause, PeripheralHandle,
    PeripheralId, PermissionSet, PermissionStatus, SelectionPredicate, SessionPhase,
    SessionSnapshot,
};
