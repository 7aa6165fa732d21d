//! Discovery stream matching
//!
//! One matcher lives for the duration of one discovery window. It dedups
//! repeated advertisements from the same peripheral and commits to the
//! first one satisfying the predicate; everything after that first match
//! is ignored, so exactly one connect attempt can follow a scan.

use std::collections::HashSet;

use perilink_core::types::{Advertisement, PeripheralId, SelectionPredicate};

#[derive(Debug)]
pub struct ScanMatcher {
    predicate: SelectionPredicate,
    generation: u64,
    seen: HashSet<PeripheralId>,
    matched: bool,
}

impl ScanMatcher {
    /// Open a matcher for one discovery window. `generation` tags the
    /// window so late timer wakeups for older windows can be discarded.
    pub fn new(predicate: SelectionPredicate, generation: u64) -> Self {
        Self {
            predicate,
            generation,
            seen: HashSet::new(),
            matched: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Feed one advertisement. Returns `true` exactly once per window:
    /// for the first previously-unseen advertisement the predicate
    /// accepts.
    pub fn offer(&mut self, adv: &Advertisement) -> bool {
        if self.matched {
            return false;
        }
        if !self.seen.insert(adv.id.clone()) {
            return false;
        }
        if self.predicate.matches(adv) {
            self.matched = true;
            return true;
        }
        false
    }
}
