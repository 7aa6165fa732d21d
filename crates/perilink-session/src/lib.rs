//! # perilink-session - Connection Session Orchestrator
//!
//! Runs the central-role connection lifecycle: permission gating,
//! adapter monitoring, bounded discovery, single-link sessions, loss
//! alerting, and idle-time reconnect polling.
//!
//! All state lives in one orchestrator task ([`spawn_session`]) fed by a
//! single inbox; callers hold a [`SessionHandle`] and observe state via
//! watch-backed subscriptions.
//!
//! ```no_run
//! use perilink_core::types::SelectionPredicate;
//! use perilink_radio::{SimRadio, SimScript};
//! use perilink_session::{spawn_session, SessionConfig};
//!
//! # async fn demo() -> perilink_core::Result<()> {
//! let (link, _sim) = SimRadio::spawn(SimScript::new());
//! let session = spawn_session(SessionConfig::default(), link);
//! let outcome = session
//!     .request_scan_and_connect(SelectionPredicate::NameExact("Cart-01".into()))
//!     .await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod gate;
pub mod handle;
pub mod matcher;
pub mod monitor;
pub mod orchestrator;
pub mod poller;

pub use config::SessionConfig;
pub use gate::{GateOutcome, PermissionGate};
pub use handle::{SessionHandle, StateSubscription};
pub use monitor::{AdapterMonitor, AdapterSubscription};
pub use orchestrator::{spawn_session, ConnectOutcome};
