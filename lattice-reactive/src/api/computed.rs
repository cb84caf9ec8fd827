//! Computed Values
//!
//! A [`Computed`] caches the result of a getter in a lazy watcher.
//!
//! # How Computed Values Work
//!
//! 1. Creating one does not run the getter; the watcher starts dirty.
//!
//! 2. On read, a dirty watcher re-evaluates and caches the result. A clean
//!    one returns the cache.
//!
//! 3. When a dependency changes, the watcher is only marked dirty. Nothing
//!    is recomputed until the next read, so computed values that are never
//!    read cost nothing.
//!
//! 4. Every read forwards the watcher's deps to the reader's own tracking
//!    target, so whoever reads a computed value re-runs when the computed's
//!    inputs change.
//!
//! During server rendering deps never notify, so the getter is simply
//! called on every read.

use std::fmt;
use std::rc::Rc;

use crate::config;
use crate::error::{warn, ReactiveError};
use crate::observer::value::Value;
use crate::reactive::context;
use crate::reactive::watcher::{Watcher, WatcherKind, WatcherOptions};

type Getter = Rc<dyn Fn() -> Value>;
type Setter = Box<dyn Fn(Value)>;

struct ComputedInner {
    watcher: Rc<Watcher>,
    getter: Getter,
    setter: Option<Setter>,
    server_rendering: bool,
}

/// A cached derived value.
#[derive(Clone)]
pub struct Computed(Rc<ComputedInner>);

impl Computed {
    fn new(getter: Getter, setter: Option<Setter>) -> Self {
        let g = getter.clone();
        let watcher = Watcher::new(
            move || g(),
            WatcherKind::Computed,
            WatcherOptions {
                expression: Some("computed".to_string()),
                ..Default::default()
            },
        );
        Self(Rc::new(ComputedInner {
            watcher,
            getter,
            setter,
            server_rendering: config::config().server_rendering,
        }))
    }

    /// Read the value, re-evaluating it first if stale.
    pub fn get(&self) -> Value {
        if self.0.server_rendering {
            return (self.0.getter)();
        }
        let watcher = &self.0.watcher;
        if watcher.is_dirty() {
            watcher.evaluate();
        }
        if context::is_tracking() {
            watcher.depend();
        }
        watcher.value()
    }

    /// Call the setter, or warn if there is none.
    pub fn set(&self, value: Value) {
        match &self.0.setter {
            Some(setter) => setter(value),
            None => warn(ReactiveError::ReadonlyComputed),
        }
    }

    pub fn is_readonly(&self) -> bool {
        self.0.setter.is_none()
    }

    pub fn is_dirty(&self) -> bool {
        self.0.watcher.is_dirty()
    }

    /// The lazy watcher behind this value.
    pub fn effect(&self) -> &Rc<Watcher> {
        &self.0.watcher
    }

    /// Stop tracking. The cached value is kept.
    pub fn stop(&self) {
        self.0.watcher.teardown();
    }

    pub fn ptr_eq(&self, other: &Computed) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("dirty", &self.is_dirty())
            .field("value", &self.0.watcher.value())
            .finish()
    }
}

/// Create a readonly computed value.
pub fn computed(getter: impl Fn() -> Value + 'static) -> Computed {
    Computed::new(Rc::new(getter), None)
}

/// Create a writable computed value.
pub fn computed_with_setter(
    getter: impl Fn() -> Value + 'static,
    setter: impl Fn(Value) + 'static,
) -> Computed {
    Computed::new(Rc::new(getter), Some(Box::new(setter)))
}
