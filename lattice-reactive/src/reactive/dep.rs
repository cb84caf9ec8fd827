//! Dependency Implementation
//!
//! A `Dep` is the publish/subscribe node behind one reactive slot: one
//! property of an observed object, the "self" slot of an object or array
//! (structural changes), or the cell of a ref.
//!
//! # How Deps Work
//!
//! 1. A read of the slot calls [`Dep::depend`]. If a tracking target is
//!    active, the target is asked to record the dep (`Subscriber::add_dep`),
//!    which in turn calls [`Dep::add_sub`] the first time.
//!
//! 2. A write of the slot calls [`Dep::notify`], which calls `update()` on a
//!    snapshot of the subscriber list.
//!
//! Deps hold their subscribers strongly. Watchers hold their deps weakly, so
//! dropping the owning data releases its deps.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config;

use super::context;
use super::subscriber::{Subscriber, SubscriberId};

/// Unique identifier for a dep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Kind of read reported to `on_track`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// Kind of write reported to `on_trigger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
    ArrayMutation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerEventKind {
    Track(TrackOp),
    Trigger(TriggerOp),
}

/// Extra information attached to a track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub op: TrackOp,
    pub key: Option<String>,
}

/// Extra information attached to a trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerInfo {
    pub op: TriggerOp,
    pub key: Option<String>,
}

/// Event delivered to a watcher's `on_track`/`on_trigger` hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct DebuggerEvent {
    pub effect: SubscriberId,
    pub dep: DepId,
    pub kind: DebuggerEventKind,
    pub key: Option<String>,
}

/// Build track info only when dev mode will consume it.
pub(crate) fn track_info(op: TrackOp, key: Option<&str>) -> Option<TrackInfo> {
    config::config().dev_mode.then(|| TrackInfo {
        op,
        key: key.map(str::to_string),
    })
}

/// Build trigger info only when dev mode will consume it.
pub(crate) fn trigger_info(op: TriggerOp, key: Option<&str>) -> Option<TriggerInfo> {
    config::config().dev_mode.then(|| TriggerInfo {
        op,
        key: key.map(str::to_string),
    })
}

struct DepInner {
    id: DepId,
    subs: RefCell<Vec<Rc<dyn Subscriber>>>,
    /// Server-rendering placeholder: every operation is a no-op.
    mock: bool,
}

/// A reactive dependency node.
#[derive(Clone)]
pub struct Dep(Rc<DepInner>);

impl Dep {
    pub fn new() -> Self {
        Self::with_mock(false)
    }

    /// A dep that never tracks or notifies, used for mocked server-side
    /// reactivity.
    pub fn mock() -> Self {
        Self::with_mock(true)
    }

    fn with_mock(mock: bool) -> Self {
        Self(Rc::new(DepInner {
            id: DepId::next(),
            subs: RefCell::new(Vec::new()),
            mock,
        }))
    }

    pub fn id(&self) -> DepId {
        self.0.id
    }

    pub fn is_mock(&self) -> bool {
        self.0.mock
    }

    /// Append a subscriber. De-duplication is the subscriber's job.
    pub fn add_sub(&self, sub: Rc<dyn Subscriber>) {
        if self.0.mock {
            return;
        }
        tracing::trace!(dep = self.0.id.0, sub = %sub.id(), "subscribe");
        self.0.subs.borrow_mut().push(sub);
    }

    /// Remove a subscriber by identity.
    pub fn remove_sub(&self, id: SubscriberId) {
        let mut subs = self.0.subs.borrow_mut();
        if let Some(pos) = subs.iter().position(|s| s.id() == id) {
            subs.remove(pos);
        }
    }

    /// Register this dep with the active tracking target, if any.
    pub fn depend(&self, info: Option<TrackInfo>) {
        if self.0.mock {
            return;
        }
        let Some(target) = context::current_target() else {
            return;
        };
        target.add_dep(self);

        if let Some(info) = info {
            if config::config().dev_mode {
                target.on_track(&DebuggerEvent {
                    effect: target.id(),
                    dep: self.0.id,
                    kind: DebuggerEventKind::Track(info.op),
                    key: info.key,
                });
            }
        }
    }

    /// Call `update()` on every subscriber.
    pub fn notify(&self, info: Option<TriggerInfo>) {
        if self.0.mock {
            return;
        }
        // Subscribers may unsubscribe (or subscribe others) while we iterate.
        let mut subs = self.0.subs.borrow().clone();
        let cfg = config::config();
        if !cfg.async_mode {
            // Without the scheduler's sort, keep parent-before-child order here.
            subs.sort_by_key(|s| s.id());
        }

        for sub in subs {
            if cfg.dev_mode {
                if let Some(info) = &info {
                    sub.on_trigger(&DebuggerEvent {
                        effect: sub.id(),
                        dep: self.0.id,
                        kind: DebuggerEventKind::Trigger(info.op),
                        key: info.key.clone(),
                    });
                }
            }
            sub.update();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subs.borrow().len()
    }

    pub fn has_subscriber(&self, id: SubscriberId) -> bool {
        self.0.subs.borrow().iter().any(|s| s.id() == id)
    }

    pub fn downgrade(&self) -> WeakDep {
        WeakDep {
            id: self.0.id,
            inner: Rc::downgrade(&self.0),
        }
    }

    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.0.id)
            .field("subscriber_count", &self.subscriber_count())
            .field("mock", &self.0.mock)
            .finish()
    }
}

/// Non-owning handle to a dep, as held by watchers.
#[derive(Clone)]
pub struct WeakDep {
    id: DepId,
    inner: Weak<DepInner>,
}

impl WeakDep {
    pub fn id(&self) -> DepId {
        self.id
    }

    pub fn upgrade(&self) -> Option<Dep> {
        self.inner.upgrade().map(Dep)
    }
}

impl fmt::Debug for WeakDep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WeakDep").field(&self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::context::TargetGuard;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;

    struct MockSubscriber {
        id: SubscriberId,
        this: Weak<MockSubscriber>,
        seen: RefCell<HashSet<DepId>>,
        updates: Cell<usize>,
        log: Option<Rc<RefCell<Vec<SubscriberId>>>>,
    }

    impl MockSubscriber {
        fn new() -> Rc<Self> {
            Self::logging(None)
        }

        fn logging(log: Option<Rc<RefCell<Vec<SubscriberId>>>>) -> Rc<Self> {
            Rc::new_cyclic(|this| Self {
                id: SubscriberId::new(),
                this: this.clone(),
                seen: RefCell::new(HashSet::new()),
                updates: Cell::new(0),
                log,
            })
        }
    }

    impl Subscriber for MockSubscriber {
        fn id(&self) -> SubscriberId {
            self.id
        }

        fn add_dep(&self, dep: &Dep) {
            if self.seen.borrow_mut().insert(dep.id()) {
                if let Some(this) = self.this.upgrade() {
                    dep.add_sub(this);
                }
            }
        }

        fn update(&self) {
            self.updates.set(self.updates.get() + 1);
            if let Some(log) = &self.log {
                log.borrow_mut().push(self.id);
            }
        }
    }

    #[test]
    fn depend_without_target_is_noop() {
        let dep = Dep::new();
        dep.depend(None);
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn depend_registers_active_target() {
        let dep = Dep::new();
        let sub = MockSubscriber::new();
        {
            let _guard = TargetGuard::enter(Some(sub.clone()));
            dep.depend(None);
            dep.depend(None);
        }
        assert_eq!(dep.subscriber_count(), 1);
        assert!(dep.has_subscriber(sub.id));
    }

    #[test]
    fn notify_updates_each_subscriber() {
        let dep = Dep::new();
        let a = MockSubscriber::new();
        let b = MockSubscriber::new();
        dep.add_sub(a.clone());
        dep.add_sub(b.clone());

        dep.notify(None);

        assert_eq!(a.updates.get(), 1);
        assert_eq!(b.updates.get(), 1);
    }

    #[test]
    fn remove_sub_stops_notifications() {
        let dep = Dep::new();
        let sub = MockSubscriber::new();
        dep.add_sub(sub.clone());
        dep.remove_sub(sub.id);
        dep.notify(None);
        assert_eq!(sub.updates.get(), 0);
    }

    #[test]
    fn sync_mode_notifies_in_id_order() {
        config::configure(|c| c.async_mode = false);
        let log = Rc::new(RefCell::new(Vec::new()));
        let first = MockSubscriber::logging(Some(log.clone()));
        let second = MockSubscriber::logging(Some(log.clone()));

        let dep = Dep::new();
        dep.add_sub(second.clone());
        dep.add_sub(first.clone());
        dep.notify(None);

        assert_eq!(log.borrow().as_slice(), &[first.id, second.id]);
        config::set_config(config::Config::default());
    }

    #[test]
    fn mock_dep_is_inert() {
        let dep = Dep::mock();
        let sub = MockSubscriber::new();
        {
            let _guard = TargetGuard::enter(Some(sub.clone()));
            dep.depend(None);
        }
        dep.add_sub(sub.clone());
        dep.notify(None);
        assert_eq!(dep.subscriber_count(), 0);
        assert_eq!(sub.updates.get(), 0);
    }

    #[test]
    fn weak_dep_dies_with_dep() {
        let dep = Dep::new();
        let weak = dep.downgrade();
        assert!(weak.upgrade().is_some());
        drop(dep);
        assert!(weak.upgrade().is_none());
    }
}
