//! Effect Scopes
//!
//! An [`EffectScope`] collects the watchers created while it runs, together
//! with dispose callbacks and nested scopes, so they can all be stopped at
//! once. Scopes nest: a scope created while another is running becomes its
//! child unless it is `detached`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{warn, ReactiveError};

use super::subscriber::SubscriberId;
use super::watcher::Watcher;

thread_local! {
    static ACTIVE_SCOPES: RefCell<Vec<EffectScope>> = const { RefCell::new(Vec::new()) };
}

struct ScopeInner {
    active: Cell<bool>,
    detached: bool,
    effects: RefCell<Vec<Rc<Watcher>>>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    scopes: RefCell<Vec<EffectScope>>,
    parent: RefCell<Option<Weak<ScopeInner>>>,
}

/// A group of effects stopped together.
#[derive(Clone)]
pub struct EffectScope(Rc<ScopeInner>);

/// Non-owning handle a watcher keeps to the scope that recorded it.
#[derive(Clone)]
pub(crate) struct WeakScope(Weak<ScopeInner>);

impl WeakScope {
    pub(crate) fn upgrade(&self) -> Option<EffectScope> {
        self.0.upgrade().map(EffectScope)
    }
}

impl EffectScope {
    /// Create a scope. Unless `detached`, it is owned by the currently
    /// running scope and stops with it.
    pub fn new(detached: bool) -> Self {
        let parent = get_current_scope();
        let scope = Self(Rc::new(ScopeInner {
            active: Cell::new(true),
            detached,
            effects: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
            scopes: RefCell::new(Vec::new()),
            parent: RefCell::new(parent.as_ref().map(|p| Rc::downgrade(&p.0))),
        }));
        if let (false, Some(parent)) = (detached, parent) {
            parent.0.scopes.borrow_mut().push(scope.clone());
        }
        scope
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    pub fn is_detached(&self) -> bool {
        self.0.detached
    }

    /// Number of live watchers recorded by this scope.
    pub fn effect_count(&self) -> usize {
        self.0.effects.borrow().len()
    }

    /// Run `f` with this scope as the current scope. Returns `None` (and
    /// warns) if the scope has been stopped.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.is_active() {
            warn(ReactiveError::InactiveScope);
            return None;
        }
        let _guard = ScopeGuard::enter(self.clone());
        Some(f())
    }

    /// Tear down every recorded watcher, run dispose callbacks and stop child
    /// scopes. Idempotent.
    pub fn stop(&self) {
        self.stop_inner(false);
    }

    fn stop_inner(&self, from_parent: bool) {
        if !self.0.active.replace(false) {
            return;
        }

        let effects = self.0.effects.take();
        let effect_count = effects.len();
        for effect in effects {
            effect.teardown();
        }
        for cleanup in self.0.cleanups.take() {
            cleanup();
        }
        for child in self.0.scopes.take() {
            child.stop_inner(true);
        }

        let parent = self.0.parent.borrow_mut().take();
        if !self.0.detached && !from_parent {
            if let Some(parent) = parent.and_then(|p| p.upgrade()) {
                parent.scopes.borrow_mut().retain(|s| !Rc::ptr_eq(&s.0, &self.0));
            }
        }
        tracing::debug!(effects = effect_count, "effect scope stopped");
    }

    pub(crate) fn forget_effect(&self, id: SubscriberId) {
        self.0.effects.borrow_mut().retain(|w| w.id() != id);
    }

    fn downgrade(&self) -> WeakScope {
        WeakScope(Rc::downgrade(&self.0))
    }
}

impl PartialEq for EffectScope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope")
            .field("active", &self.is_active())
            .field("detached", &self.0.detached)
            .field("effects", &self.effect_count())
            .field("scopes", &self.0.scopes.borrow().len())
            .finish()
    }
}

struct ScopeGuard;

impl ScopeGuard {
    fn enter(scope: EffectScope) -> Self {
        ACTIVE_SCOPES.with(|stack| stack.borrow_mut().push(scope));
        ScopeGuard
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        ACTIVE_SCOPES.with(|stack| stack.borrow_mut().pop());
    }
}

/// Create a new scope. See [`EffectScope::new`].
pub fn effect_scope(detached: bool) -> EffectScope {
    EffectScope::new(detached)
}

/// The scope whose `run` is currently executing, if any.
pub fn get_current_scope() -> Option<EffectScope> {
    ACTIVE_SCOPES.with(|stack| stack.borrow().last().cloned())
}

/// Register `f` to run when the current scope stops.
pub fn on_scope_dispose(f: impl FnOnce() + 'static) {
    match get_current_scope() {
        Some(scope) => scope.0.cleanups.borrow_mut().push(Box::new(f)),
        None => warn(ReactiveError::NoActiveScope),
    }
}

/// Record a new watcher in the current scope, returning the handle the
/// watcher keeps for teardown.
pub(crate) fn record_effect(watcher: &Rc<Watcher>) -> Option<WeakScope> {
    let scope = get_current_scope().filter(EffectScope::is_active)?;
    scope.0.effects.borrow_mut().push(watcher.clone());
    Some(scope.downgrade())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ref_::ref_;
    use crate::reactive::watcher::{Flush, WatcherKind, WatcherOptions};
    use crate::observer::value::Value;

    fn effect(source: &crate::api::ref_::Ref, runs: &Rc<Cell<usize>>) -> Rc<Watcher> {
        let (source, runs) = (source.clone(), runs.clone());
        Watcher::new(
            move || {
                runs.set(runs.get() + 1);
                source.get()
            },
            WatcherKind::Effect { flush: Flush::Sync },
            WatcherOptions::default(),
        )
    }

    #[test]
    fn stop_tears_down_collected_effects() {
        let count = ref_(0);
        let runs = Rc::new(Cell::new(0));
        let scope = effect_scope(false);
        scope.run(|| {
            effect(&count, &runs);
            effect(&count, &runs);
        });
        assert_eq!(scope.effect_count(), 2);

        count.set(1);
        assert_eq!(runs.get(), 4);

        scope.stop();
        count.set(2);
        assert_eq!(runs.get(), 4);
        assert!(!scope.is_active());
    }

    #[test]
    fn dispose_callbacks_run_once() {
        let disposed = Rc::new(Cell::new(0));
        let scope = effect_scope(false);
        let d = disposed.clone();
        scope.run(|| on_scope_dispose(move || d.set(d.get() + 1)));
        scope.stop();
        scope.stop();
        assert_eq!(disposed.get(), 1);
    }

    #[test]
    fn child_scopes_stop_with_parent_unless_detached() {
        let parent = effect_scope(false);
        let (child, detached) = parent
            .run(|| (effect_scope(false), effect_scope(true)))
            .unwrap();
        parent.stop();
        assert!(!child.is_active());
        assert!(detached.is_active());
    }

    #[test]
    fn current_scope_is_restored() {
        let outer = effect_scope(false);
        assert!(get_current_scope().is_none());
        outer.run(|| {
            assert_eq!(get_current_scope().as_ref(), Some(&outer));
            let inner = effect_scope(false);
            inner.run(|| assert_eq!(get_current_scope().as_ref(), Some(&inner)));
            assert_eq!(get_current_scope().as_ref(), Some(&outer));
        });
        assert!(get_current_scope().is_none());
    }

    #[test]
    fn stopped_scopes_refuse_to_run() {
        let scope = effect_scope(false);
        scope.stop();
        assert_eq!(scope.run(|| 1), None);
    }

    #[test]
    fn teardown_removes_effect_from_scope() {
        let count = ref_(Value::Null);
        let runs = Rc::new(Cell::new(0));
        let scope = effect_scope(false);
        let w = scope.run(|| effect(&count, &runs)).unwrap();
        w.teardown();
        assert_eq!(scope.effect_count(), 0);
    }
}
