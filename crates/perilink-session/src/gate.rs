//! Permission gating
//!
//! Evaluates platform permission answers against the capabilities a
//! session needs. Denials are never cached here: the orchestrator
//! re-requests on every scan attempt, so a user who flips the switch in
//! system settings gets through on their next try.

use perilink_core::types::{Capability, PermissionSet};

/// Result of checking an answer against the required capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Everything required is granted; radio work may proceed.
    Granted,
    /// The listed capabilities are denied or restricted.
    Missing(Vec<Capability>),
}

/// Pure check of a [`PermissionSet`] against a required list.
#[derive(Debug, Clone)]
pub struct PermissionGate {
    required: Vec<Capability>,
}

impl PermissionGate {
    pub fn new(required: Vec<Capability>) -> Self {
        Self { required }
    }

    /// The capabilities this gate demands.
    pub fn required(&self) -> &[Capability] {
        &self.required
    }

    pub fn evaluate(&self, answer: &PermissionSet) -> GateOutcome {
        let missing = answer.missing_from(&self.required);
        if missing.is_empty() {
            GateOutcome::Granted
        } else {
            GateOutcome::Missing(missing)
        }
    }
}
