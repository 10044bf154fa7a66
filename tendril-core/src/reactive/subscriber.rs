//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values. Computeds
//! are lazy subscribers and are never scheduled; effects are eager ones and
//! are what the batch scheduler actually runs.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an eager subscriber.
///
/// Ids come from a monotonically increasing counter, so they also encode
/// creation order. The batch scheduler uses them to deduplicate pending runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Something the scheduler can re-run when its sources change.
///
/// The dependency graph only holds weak references to implementors, so a
/// dropped effect simply stops being scheduled.
pub(crate) trait Rerun {
    /// Re-execute the subscriber.
    fn rerun(&self);
}
