//! Refs
//!
//! A [`Ref`] is a single reactive slot read and written through
//! [`get`](Ref::get)/[`set`](Ref::set). Three kinds share the same handle:
//!
//! - value refs created by [`ref_`]/[`shallow_ref`], backed by a holder
//!   object with one reactive `value` property;
//! - property refs created by [`to_ref`], reading and writing one property
//!   of another object;
//! - computed refs, wrapping a [`Computed`].

use std::fmt;
use std::rc::Rc;

use crate::config;
use crate::error::{warn, ReactiveError};
use crate::observer::define_reactive;
use crate::observer::object::Object;
use crate::observer::value::{Value, View};
use crate::reactive::context;
use crate::reactive::dep::{trigger_info, Dep, TriggerOp};

use super::computed::Computed;
use super::reactive::is_reactive;

const VALUE_KEY: &str = "value";

#[derive(Clone)]
enum RefKind {
    Value {
        holder: Object,
        dep: Dep,
        shallow: bool,
    },
    Property {
        object: Object,
        key: Rc<str>,
    },
    Computed(Computed),
}

/// Handle to a reactive slot.
#[derive(Clone)]
pub struct Ref {
    kind: RefKind,
    view: View,
}

impl Ref {
    fn new_value(value: Value, shallow: bool) -> Self {
        let holder = Object::new();
        let mock = config::config().server_rendering;
        let dep = define_reactive(&holder, VALUE_KEY, Some(value), None, shallow, mock).unwrap_or_default();
        Self {
            kind: RefKind::Value { holder, dep, shallow },
            view: View::Mutable,
        }
    }

    /// Read the value, tracking it.
    pub fn get(&self) -> Value {
        let value = match &self.kind {
            RefKind::Value { holder, .. } => holder.get(VALUE_KEY),
            RefKind::Property { object, key } => object.get(key),
            RefKind::Computed(computed) => computed.get(),
        };
        match self.view {
            View::Readonly => value.with_view(View::Readonly),
            _ => value,
        }
    }

    pub fn get_untracked(&self) -> Value {
        context::untracked(|| self.get())
    }

    /// Write the value. Unchanged values (per SameValue) notify nothing.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        if self.view.is_readonly() {
            warn(ReactiveError::ReadonlyTarget(VALUE_KEY.to_string()));
            return;
        }
        match &self.kind {
            RefKind::Value { holder, .. } => holder.assign(VALUE_KEY, value),
            RefKind::Property { object, key } => object.assign(key, value),
            RefKind::Computed(computed) => computed.set(value),
        }
    }

    /// Replace the value with `f(current)`, reading the current value
    /// without tracking.
    pub fn update(&self, f: impl FnOnce(&Value) -> Value) {
        let next = f(&self.get_untracked());
        self.set(next);
    }

    pub fn is_shallow(&self) -> bool {
        matches!(self.kind, RefKind::Value { shallow: true, .. }) || self.view == View::ShallowReadonly
    }

    pub fn is_readonly(&self) -> bool {
        match &self.kind {
            RefKind::Computed(computed) => self.view.is_readonly() || computed.is_readonly(),
            _ => self.view.is_readonly(),
        }
    }

    pub fn with_view(&self, view: View) -> Self {
        Self {
            kind: self.kind.clone(),
            view,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// The dep a write to this ref notifies, if it has one.
    pub fn dep(&self) -> Option<Dep> {
        match &self.kind {
            RefKind::Value { dep, .. } => Some(dep.clone()),
            RefKind::Property { object, key } => object.property_dep(key),
            RefKind::Computed(_) => None,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.dep().map_or(0, |dep| dep.subscriber_count())
    }
}

impl From<Computed> for Ref {
    fn from(computed: Computed) -> Self {
        Self {
            kind: RefKind::Computed(computed),
            view: View::Mutable,
        }
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        let same = match (&self.kind, &other.kind) {
            (RefKind::Value { dep: a, .. }, RefKind::Value { dep: b, .. }) => a.ptr_eq(b),
            (
                RefKind::Property { object: a, key: ka },
                RefKind::Property { object: b, key: kb },
            ) => a.ptr_eq(b) && ka == kb,
            (RefKind::Computed(a), RefKind::Computed(b)) => a.ptr_eq(b),
            _ => false,
        };
        same && self.view == other.view
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RefKind::Value { holder, .. } => {
                f.debug_tuple("Ref").field(&context::untracked(|| holder.get(VALUE_KEY))).finish()
            }
            RefKind::Property { key, .. } => f.debug_tuple("PropertyRef").field(key).finish(),
            RefKind::Computed(computed) => fmt::Debug::fmt(computed, f),
        }
    }
}

/// Create a ref holding `value`. Containers are observed deeply. A ref is
/// returned as-is.
pub fn ref_(value: impl Into<Value>) -> Ref {
    match value.into() {
        Value::Ref(existing) => existing,
        value => Ref::new_value(value, false),
    }
}

/// Create a ref whose value is stored as-is, without observing it.
pub fn shallow_ref(value: impl Into<Value>) -> Ref {
    match value.into() {
        Value::Ref(existing) => existing,
        value => Ref::new_value(value, true),
    }
}

pub fn is_ref(value: &Value) -> bool {
    value.is_ref()
}

/// The value behind a ref, or `value` itself.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(r) => r.get(),
        other => other.clone(),
    }
}

/// Notify a ref's subscribers without changing its value, e.g. after
/// mutating the contents of a shallow ref.
pub fn trigger_ref(r: &Ref) {
    if let Some(dep) = r.dep() {
        dep.notify(trigger_info(TriggerOp::Set, Some(VALUE_KEY)));
    }
}

/// A ref reading and writing `object[key]`. If the property already holds a
/// ref, that ref is returned.
pub fn to_ref(object: &Object, key: &str) -> Ref {
    if let Value::Ref(existing) = object.get_raw(key) {
        return existing;
    }
    Ref {
        kind: RefKind::Property {
            object: object.clone(),
            key: key.into(),
        },
        view: View::Mutable,
    }
}

/// A plain object mapping every key of `object` to a [`to_ref`] ref.
pub fn to_refs(object: &Object) -> Object {
    if !is_reactive(&Value::from(object.clone())) {
        warn(ReactiveError::NotReactive(
            "to_refs() expects a reactive object but received a plain one.".to_string(),
        ));
    }
    let keys = context::untracked(|| object.keys());
    keys.into_iter()
        .map(|key| {
            let r = to_ref(object, &key);
            (key, r)
        })
        .collect()
}
