//! Watcher Implementation
//!
//! A Watcher evaluates a getter while registered as the active tracking
//! target, remembers every [`Dep`] the getter read, and reacts when one of
//! them notifies.
//!
//! # Kinds
//!
//! | kind       | on notify                    | on run                         |
//! |------------|------------------------------|--------------------------------|
//! | `Render`   | queue (post phase)           | re-render via the getter       |
//! | `Computed` | mark dirty                   | n/a, re-evaluated on read      |
//! | `Watch`    | queue, or run if `Sync`      | re-get, call back on change    |
//! | `Effect`   | queue, or run if `Sync`      | re-run the getter              |
//!
//! # Dependency bookkeeping
//!
//! Each evaluation collects deps into `new_deps`. Afterwards
//! [`cleanup_deps`](Watcher::cleanup_deps) unsubscribes from deps that were
//! not read this time and swaps the two buffers. A dep read several times in
//! one evaluation is recorded once, and a dep already subscribed from the
//! previous evaluation is not subscribed again.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::error::{handle_error, invoke_with_error_handling, panic_message, ReactiveError};
use crate::observer::value::Value;
use crate::scheduler;

use super::context::TargetGuard;
use super::dep::{DebuggerEvent, Dep, DepId, WeakDep};
use super::scope::{self, WeakScope};
use super::subscriber::{Subscriber, SubscriberId};
use super::traverse::traverse;

/// When a queued watcher runs relative to rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flush {
    /// Before render watchers in the same flush.
    #[default]
    Pre,
    /// After render watchers in the same flush.
    Post,
    /// Immediately on notify, bypassing the scheduler.
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherKind {
    /// Re-renders a component. Runs in the post phase, after its `before`
    /// hook.
    Render,
    /// Lazily re-evaluated cached value.
    Computed,
    /// User watcher with a change callback.
    Watch { deep: bool, flush: Flush },
    /// User side effect without a callback. Never re-queues itself while it
    /// is the running target.
    Effect { flush: Flush },
}

impl WatcherKind {
    pub fn is_lazy(self) -> bool {
        matches!(self, WatcherKind::Computed)
    }

    /// User-registered watchers have their panics reported instead of
    /// re-raised.
    pub fn is_user(self) -> bool {
        matches!(self, WatcherKind::Watch { .. } | WatcherKind::Effect { .. })
    }

    pub fn is_deep(self) -> bool {
        matches!(self, WatcherKind::Watch { deep: true, .. })
    }

    pub fn is_sync(self) -> bool {
        matches!(
            self,
            WatcherKind::Watch { flush: Flush::Sync, .. } | WatcherKind::Effect { flush: Flush::Sync }
        )
    }

    /// Sorted after pre-phase watchers in a flush.
    pub fn is_post(self) -> bool {
        matches!(
            self,
            WatcherKind::Render
                | WatcherKind::Watch { flush: Flush::Post, .. }
                | WatcherKind::Effect { flush: Flush::Post }
        )
    }

    pub fn no_recurse(self) -> bool {
        matches!(self, WatcherKind::Effect { .. })
    }
}

/// The component a render watcher belongs to.
pub trait Owner {
    fn name(&self) -> String {
        "anonymous component".to_string()
    }

    fn is_mounted(&self) -> bool {
        true
    }

    fn is_destroyed(&self) -> bool {
        false
    }

    /// Fired after a flush that re-ran this owner's render watcher.
    fn updated(&self) {}

    /// Fired after a flush for owners passed to
    /// [`queue_activated_component`](crate::scheduler::queue_activated_component).
    fn activated(&self) {}
}

pub type Callback = Box<dyn FnMut(&Value, &Value)>;
pub type ChangePredicate = Box<dyn Fn(&Value, &Value) -> bool>;
pub type DebuggerHook = Box<dyn Fn(&DebuggerEvent)>;

/// Optional parts of a watcher.
#[derive(Default)]
pub struct WatcherOptions {
    /// Label used in diagnostics.
    pub expression: Option<String>,
    /// Called with `(new, old)` when a run produces a changed value.
    pub callback: Option<Callback>,
    /// Overrides the default change test used by `run()`.
    pub changed: Option<ChangePredicate>,
    /// Run by the scheduler right before the watcher.
    pub before: Option<Box<dyn Fn()>>,
    pub owner: Option<Weak<dyn Owner>>,
    pub on_track: Option<DebuggerHook>,
    pub on_trigger: Option<DebuggerHook>,
    /// Run once on teardown.
    pub on_stop: Option<Box<dyn FnOnce()>>,
}

type DepList = SmallVec<[WeakDep; 4]>;

pub struct Watcher {
    id: SubscriberId,
    this: Weak<Watcher>,
    kind: WatcherKind,
    expression: String,
    getter: Box<dyn Fn() -> Value>,
    callback: RefCell<Option<Callback>>,
    changed: Option<ChangePredicate>,
    before: Option<Box<dyn Fn()>>,
    owner: Option<Weak<dyn Owner>>,
    on_track: Option<DebuggerHook>,
    on_trigger: Option<DebuggerHook>,
    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,

    value: RefCell<Value>,
    deps: RefCell<DepList>,
    new_deps: RefCell<DepList>,
    dep_ids: RefCell<HashSet<DepId>>,
    new_dep_ids: RefCell<HashSet<DepId>>,

    /// Computed only: the cached value is stale.
    dirty: Cell<bool>,
    active: Cell<bool>,
    scope: RefCell<Option<WeakScope>>,
}

impl Watcher {
    /// Create a watcher. Non-lazy watchers evaluate their getter immediately
    /// to collect their initial deps.
    pub fn new<F>(getter: F, kind: WatcherKind, options: WatcherOptions) -> Rc<Self>
    where
        F: Fn() -> Value + 'static,
    {
        let WatcherOptions {
            expression,
            callback,
            changed,
            before,
            owner,
            on_track,
            on_trigger,
            on_stop,
        } = options;

        let watcher = Rc::new_cyclic(|this| Self {
            id: SubscriberId::new(),
            this: this.clone(),
            kind,
            expression: expression.unwrap_or_default(),
            getter: Box::new(getter),
            callback: RefCell::new(callback),
            changed,
            before,
            owner,
            on_track,
            on_trigger,
            on_stop: RefCell::new(on_stop),
            value: RefCell::new(Value::Undefined),
            deps: RefCell::new(SmallVec::new()),
            new_deps: RefCell::new(SmallVec::new()),
            dep_ids: RefCell::new(HashSet::new()),
            new_dep_ids: RefCell::new(HashSet::new()),
            dirty: Cell::new(kind.is_lazy()),
            active: Cell::new(true),
            scope: RefCell::new(None),
        });

        *watcher.scope.borrow_mut() = scope::record_effect(&watcher);
        tracing::trace!(watcher = %watcher.id, ?kind, expression = %watcher.expression, "created watcher");

        if !kind.is_lazy() {
            let value = watcher.get();
            *watcher.value.borrow_mut() = value;
        }
        watcher
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn kind(&self) -> WatcherKind {
        self.kind
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The last value produced by the getter.
    pub fn value(&self) -> Value {
        self.value.borrow().clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn owner(&self) -> Option<Rc<dyn Owner>> {
        self.owner.as_ref().and_then(Weak::upgrade)
    }

    /// Key the scheduler sorts by: pre-phase before post-phase, then
    /// creation order.
    pub fn sort_key(&self) -> (bool, SubscriberId) {
        (self.kind.is_post(), self.id)
    }

    pub fn dep_count(&self) -> usize {
        self.deps.borrow().len()
    }

    pub fn has_dep(&self, dep: &Dep) -> bool {
        self.dep_ids.borrow().contains(&dep.id())
    }

    /// Evaluate the getter and re-collect dependencies.
    pub fn get(&self) -> Value {
        let Some(this) = self.this.upgrade() else {
            return Value::Undefined;
        };
        let guard = TargetGuard::enter(Some(this as Rc<dyn Subscriber>));

        let value = match panic::catch_unwind(AssertUnwindSafe(|| (self.getter)())) {
            Ok(value) => {
                if self.kind.is_deep() {
                    traverse(&value);
                }
                value
            }
            Err(payload) if self.kind.is_user() => {
                handle_error(ReactiveError::Callback {
                    info: format!("getter for watcher \"{}\"", self.expression),
                    message: panic_message(payload.as_ref()),
                });
                Value::Undefined
            }
            Err(payload) => {
                drop(guard);
                self.cleanup_deps();
                panic::resume_unwind(payload);
            }
        };

        drop(guard);
        self.cleanup_deps();
        if !self.active.get() {
            // Torn down by its own getter: drop what was just collected.
            self.unsubscribe_all();
        }
        value
    }

    /// Swap the dep buffers, unsubscribing from deps that were not read in
    /// the evaluation that just finished.
    pub fn cleanup_deps(&self) {
        let old = self.deps.take();
        {
            let new_ids = self.new_dep_ids.borrow();
            for weak in &old {
                if !new_ids.contains(&weak.id()) {
                    if let Some(dep) = weak.upgrade() {
                        dep.remove_sub(self.id);
                    }
                }
            }
        }

        std::mem::swap(&mut *self.dep_ids.borrow_mut(), &mut *self.new_dep_ids.borrow_mut());
        self.new_dep_ids.borrow_mut().clear();
        *self.deps.borrow_mut() = self.new_deps.take();
    }

    /// Re-run the getter and invoke the callback if the value changed.
    pub fn run(&self) {
        if !self.active.get() {
            return;
        }
        let value = self.get();
        let old = self.value();
        let changed = match &self.changed {
            Some(predicate) => predicate(&value, &old),
            None => value != old || value.is_object() || self.kind.is_deep(),
        };
        if changed {
            *self.value.borrow_mut() = value.clone();
            self.invoke_callback(&value, &old, "callback for watcher");
        }
    }

    /// Call the callback with the current value and `old`, outside of a run.
    /// Used for `immediate` watchers.
    pub fn call_immediately(&self, old: &Value) {
        let value = self.value();
        self.invoke_callback(&value, old, "callback for immediate watcher");
    }

    fn invoke_callback(&self, value: &Value, old: &Value, context: &str) {
        let Some(mut callback) = self.callback.borrow_mut().take() else {
            return;
        };
        if self.kind.is_user() {
            invoke_with_error_handling(
                || format!("{context} \"{}\"", self.expression),
                || callback(value, old),
            );
        } else {
            callback(value, old);
        }
        let mut slot = self.callback.borrow_mut();
        if slot.is_none() {
            *slot = Some(callback);
        }
    }

    /// Recompute a lazy watcher's value and clear its dirty flag.
    pub fn evaluate(&self) {
        let value = self.get();
        *self.value.borrow_mut() = value;
        self.dirty.set(false);
    }

    /// Make the current tracking target depend on everything this watcher
    /// depends on.
    pub fn depend(&self) {
        let deps = self.deps.borrow().clone();
        for weak in deps {
            if let Some(dep) = weak.upgrade() {
                dep.depend(None);
            }
        }
    }

    /// Run the scheduler's `before` hook, if any.
    pub fn run_before(&self) {
        if let Some(before) = &self.before {
            before();
        }
    }

    /// Remove self from every dep's subscriber list. Idempotent.
    pub fn teardown(&self) {
        if !self.active.replace(false) {
            return;
        }
        let scope = self.scope.borrow_mut().take();
        if let Some(scope) = scope.and_then(|s| s.upgrade()) {
            scope.forget_effect(self.id);
        }
        self.unsubscribe_all();
        if let Some(on_stop) = self.on_stop.borrow_mut().take() {
            on_stop();
        }
        tracing::debug!(watcher = %self.id, expression = %self.expression, "teardown");
    }

    fn unsubscribe_all(&self) {
        let deps = self.deps.borrow().clone();
        for weak in deps {
            if let Some(dep) = weak.upgrade() {
                dep.remove_sub(self.id);
            }
        }
    }
}

impl Subscriber for Watcher {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        if !self.new_dep_ids.borrow_mut().insert(id) {
            return;
        }
        self.new_deps.borrow_mut().push(dep.downgrade());
        if !self.dep_ids.borrow().contains(&id) {
            if let Some(this) = self.this.upgrade() {
                dep.add_sub(this);
            }
        }
    }

    fn update(&self) {
        if self.kind.is_lazy() {
            self.dirty.set(true);
        } else if self.kind.is_sync() {
            self.run();
        } else if let Some(this) = self.this.upgrade() {
            scheduler::queue_watcher(this);
        }
    }

    fn on_track(&self, event: &DebuggerEvent) {
        if let Some(hook) = &self.on_track {
            hook(event);
        }
    }

    fn on_trigger(&self, event: &DebuggerEvent) {
        if let Some(hook) = &self.on_trigger {
            hook(event);
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("expression", &self.expression)
            .field("active", &self.active.get())
            .field("dirty", &self.dirty.get())
            .field("deps", &self.deps.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ref_::{ref_, Ref};
    use crate::error::{clear_error_handler, set_error_handler};

    fn sync_watch() -> WatcherKind {
        WatcherKind::Watch {
            deep: false,
            flush: Flush::Sync,
        }
    }

    fn read(r: &Ref) -> impl Fn() -> Value + 'static {
        let r = r.clone();
        move || r.get()
    }

    #[test]
    fn eager_watchers_evaluate_on_creation() {
        let count = ref_(2);
        let w = Watcher::new(read(&count), sync_watch(), WatcherOptions::default());
        assert_eq!(w.value(), Value::from(2));
        assert_eq!(w.dep_count(), 1);
    }

    #[test]
    fn lazy_watchers_wait_for_evaluate() {
        let count = ref_(2);
        let w = Watcher::new(read(&count), WatcherKind::Computed, WatcherOptions::default());
        assert!(w.is_dirty());
        assert!(w.value().is_undefined());
        assert_eq!(w.dep_count(), 0);

        w.evaluate();
        assert!(!w.is_dirty());
        assert_eq!(w.value(), Value::from(2));

        count.set(3);
        assert!(w.is_dirty());
        assert_eq!(w.value(), Value::from(2));
    }

    #[test]
    fn sync_watchers_call_back_with_new_and_old() {
        let count = ref_(1);
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        let _w = Watcher::new(
            read(&count),
            sync_watch(),
            WatcherOptions {
                callback: Some(Box::new(move |new, old| {
                    sink.borrow_mut().push((new.clone(), old.clone()))
                })),
                ..Default::default()
            },
        );

        count.set(5);
        count.set(5);

        assert_eq!(calls.borrow().as_slice(), &[(Value::from(5), Value::from(1))]);
    }

    #[test]
    fn stale_deps_are_dropped() {
        let toggle = ref_(true);
        let a = ref_("a");
        let b = ref_("b");
        let (t, ra, rb) = (toggle.clone(), a.clone(), b.clone());
        let w = Watcher::new(
            move || if t.get() == Value::from(true) { ra.get() } else { rb.get() },
            sync_watch(),
            WatcherOptions::default(),
        );
        assert_eq!(w.dep_count(), 2);

        toggle.set(false);
        assert_eq!(w.value(), Value::from("b"));
        assert_eq!(w.dep_count(), 2);
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);
    }

    #[test]
    fn repeated_reads_subscribe_once() {
        let count = ref_(1);
        let c = count.clone();
        let w = Watcher::new(
            move || {
                c.get();
                c.get()
            },
            sync_watch(),
            WatcherOptions::default(),
        );
        assert_eq!(w.dep_count(), 1);
        assert_eq!(count.subscriber_count(), 1);
        w.run();
        assert_eq!(count.subscriber_count(), 1);
    }

    #[test]
    fn teardown_is_idempotent() {
        let count = ref_(1);
        let stops = Rc::new(Cell::new(0));
        let s = stops.clone();
        let w = Watcher::new(
            read(&count),
            sync_watch(),
            WatcherOptions {
                on_stop: Some(Box::new(move || s.set(s.get() + 1))),
                ..Default::default()
            },
        );

        w.teardown();
        w.teardown();

        assert!(!w.is_active());
        assert_eq!(stops.get(), 1);
        assert_eq!(count.subscriber_count(), 0);
        count.set(2);
        assert_eq!(w.value(), Value::from(1));
    }

    #[test]
    fn user_getter_panics_are_reported() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        set_error_handler(move |e| sink.borrow_mut().push(e.to_string()));

        let w = Watcher::new(
            || panic!("bad getter"),
            sync_watch(),
            WatcherOptions {
                expression: Some("state.broken".into()),
                ..Default::default()
            },
        );

        assert!(w.value().is_undefined());
        assert_eq!(
            errors.borrow().as_slice(),
            &["Error in getter for watcher \"state.broken\": \"bad getter\"".to_string()]
        );
        clear_error_handler();
    }

    #[test]
    fn render_getter_panics_propagate() {
        let result = panic::catch_unwind(|| {
            Watcher::new(|| panic!("render failed"), WatcherKind::Render, WatcherOptions::default())
        });
        assert!(result.is_err());
        assert_eq!(crate::reactive::context::depth(), 0);
    }

    #[test]
    fn depend_forwards_deps_to_current_target() {
        let count = ref_(1);
        let inner = Watcher::new(read(&count), WatcherKind::Computed, WatcherOptions::default());
        inner.evaluate();

        let inner2 = inner.clone();
        let outer = Watcher::new(
            move || {
                inner2.depend();
                Value::Undefined
            },
            sync_watch(),
            WatcherOptions::default(),
        );
        assert_eq!(outer.dep_count(), 1);
        assert_eq!(count.subscriber_count(), 2);
    }
}
