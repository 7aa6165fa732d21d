//! # perilink-radio - Platform Boundary
//!
//! Defines the message protocol between the session core and the host
//! Bluetooth stack, plus a scripted simulator for tests and demos.
//!
//! The boundary is two channels, not a trait: commands flow out, events
//! flow back, and every command's outcome arrives as an event. A real
//! platform adapter (CoreBluetooth, BlueZ, a mobile bridge) implements
//! the far side by producing a [`PlatformLink`]; this crate ships only
//! the in-process [`sim::SimRadio`].

pub mod protocol;
pub mod sim;

pub use protocol::{ConnectFailure, PlatformCommand, PlatformEvent, PlatformLink};
pub use sim::{ConnectScript, SimHandle, SimRadio, SimScript};
