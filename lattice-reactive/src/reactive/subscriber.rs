//! Subscriber types for the reactive system.
//!
//! A Subscriber is anything a [`Dep`] can notify: in practice a
//! [`Watcher`](super::Watcher) (render, computed, watch or effect), though
//! the trait keeps the dependency layer independent of watcher internals.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::dep::{DebuggerEvent, Dep};

/// Unique identifier for a subscriber.
///
/// Ids are handed out in creation order. The scheduler relies on this:
/// a parent component's watchers are always created before its children's,
/// so sorting by id runs parents first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
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

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A subscriber to reactive dependencies.
pub trait Subscriber {
    /// Get the subscriber ID.
    fn id(&self) -> SubscriberId;

    /// Record that `dep` was read while this subscriber was the active
    /// tracking target.
    ///
    /// Implementations are responsible for de-duplication; `Dep::add_sub`
    /// appends unconditionally.
    fn add_dep(&self, dep: &Dep);

    /// Called when one of the subscribed deps changed.
    fn update(&self);

    /// Dev-mode hook invoked when a dep is tracked by this subscriber.
    fn on_track(&self, _event: &DebuggerEvent) {}

    /// Dev-mode hook invoked when a subscribed dep is triggered.
    fn on_trigger(&self, _event: &DebuggerEvent) {}
}
