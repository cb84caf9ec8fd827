//! Observation
//!
//! [`observe`] attaches an [`Observer`] to an object or array and converts
//! its contents into reactive slots:
//!
//! - every enumerable, configurable property of an object gets its own
//!   [`Dep`] via [`define_reactive`], and nested values are observed in turn;
//! - every item of an array is observed, and the array's mutators notify the
//!   observer's dep.
//!
//! The observer's own dep stands for the container's *structure*: it is
//! notified when keys are added with [`set`] or removed with [`del`], and by
//! every array mutation.

pub mod array;
pub mod object;
pub mod value;

use std::cell::Cell;
use std::rc::Rc;

use crate::config;
use crate::error::{warn, ReactiveError};
use crate::reactive::context;
use crate::reactive::dep::{trigger_info, Dep, TriggerOp};

use object::{CustomSetter, Object, Reactivity, Slot};
use value::{Key, Value};

/// Per-container reactivity state.
#[derive(Debug)]
pub struct Observer {
    dep: Dep,
    shallow: bool,
    mock: bool,
    /// Number of component instances using this object as root data.
    vm_count: Cell<usize>,
}

impl Observer {
    fn new(shallow: bool, mock: bool) -> Self {
        Self {
            dep: if mock { Dep::mock() } else { Dep::new() },
            shallow,
            mock,
            vm_count: Cell::new(0),
        }
    }

    /// The container's structural dep.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    pub fn is_shallow(&self) -> bool {
        self.shallow
    }

    pub fn is_mock(&self) -> bool {
        self.mock
    }

    pub fn vm_count(&self) -> usize {
        self.vm_count.get()
    }

    /// Mark the observed object as a component's root data.
    pub fn add_root_ref(&self) {
        self.vm_count.set(self.vm_count.get() + 1);
    }

    pub fn remove_root_ref(&self) {
        self.vm_count.set(self.vm_count.get().saturating_sub(1));
    }

    /// Observe each of `items`.
    pub fn observe_array(&self, items: &[Value]) {
        for item in items {
            observe(item, false, self.mock);
        }
    }
}

/// The observer already attached to `value`, without creating one.
pub(crate) fn existing_observer(value: &Value) -> Option<Rc<Observer>> {
    match value {
        Value::Object(o) => o.observer(),
        Value::Array(a) => a.observer(),
        _ => None,
    }
}

/// Attach an observer to `value` if it is an observable container, returning
/// the (new or existing) observer.
///
/// Returns `None` for scalars, refs, readonly views, frozen or raw-marked
/// containers, while observation is toggled off, and during server rendering
/// unless `mock` is set.
pub fn observe(value: &Value, shallow: bool, mock: bool) -> Option<Rc<Observer>> {
    if let Some(ob) = existing_observer(value) {
        return Some(ob);
    }

    let cfg = config::config();
    if !config::should_observe() || (cfg.server_rendering && !mock) {
        return None;
    }

    match value {
        Value::Object(object) => {
            if object.is_readonly() || object.is_frozen() || object.is_marked_raw() {
                return None;
            }
            let ob = Rc::new(Observer::new(shallow, mock));
            object.set_observer(ob.clone());
            for key in object.enumerable_keys() {
                define_reactive(object, &key, None, None, shallow, mock);
            }
            tracing::trace!(shallow, mock, "observed object");
            Some(ob)
        }
        Value::Array(array) => {
            if array.is_readonly() || array.is_frozen() || array.is_marked_raw() {
                return None;
            }
            let ob = Rc::new(Observer::new(shallow, mock));
            array.set_observer(ob.clone());
            if !shallow {
                ob.observe_array(&array.items_untracked());
            }
            Some(ob)
        }
        _ => None,
    }
}

/// Convert one property of `object` into a reactive slot.
///
/// `value` replaces the current data when given; accessor properties keep
/// their getter and setter. Non-configurable properties are left untouched
/// and `None` is returned.
pub fn define_reactive(
    object: &Object,
    key: &str,
    value: Option<Value>,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
    mock: bool,
) -> Option<Dep> {
    let existing = object.slot_for_define(key);
    if let Some((_, false)) = existing {
        return None;
    }

    let slot = match (existing, value) {
        (Some((accessor @ Slot::Accessor { .. }, _)), _) => accessor,
        (_, Some(value)) => Slot::Data(value),
        (Some((data, _)), None) => data,
        (None, None) => Slot::Data(Value::Undefined),
    };

    // A getter-only accessor is computed state: nothing to observe up front.
    let current = match &slot {
        Slot::Data(v) => v.clone(),
        Slot::Accessor { set: Some(_), .. } => context::untracked(|| slot.read()),
        Slot::Accessor { set: None, .. } => Value::Undefined,
    };
    let child_ob = if shallow {
        existing_observer(&current)
    } else {
        observe(&current, false, mock)
    };

    let dep = if mock { Dep::mock() } else { Dep::new() };
    object.install_reactive(
        key,
        slot,
        Reactivity {
            dep: dep.clone(),
            child_ob,
            shallow,
            mock,
            custom_setter,
        },
    );
    Some(dep)
}

/// Set a property on a container, adding it reactively (and notifying the
/// container's dep) if it did not exist. Returns the stored value.
pub fn set(target: &Value, key: impl Into<Key>, value: impl Into<Value>) -> Value {
    let key = key.into();
    let value = value.into();

    match target {
        Value::Array(array) => {
            if array.is_readonly() {
                warn(ReactiveError::ReadonlyTarget(key.to_string()));
                return value;
            }
            match key.as_index() {
                Some(index) => array.set_index(index, value.clone()),
                None => warn(ReactiveError::InvalidArrayKey(key.to_string())),
            }
            value
        }
        Value::Object(object) => {
            let name = key.to_name();
            if object.is_readonly() {
                warn(ReactiveError::ReadonlyTarget(name.to_string()));
                return value;
            }
            if object.has_own_property(&name) {
                object.assign(&name, value.clone());
                return value;
            }
            let ob = object.observer();
            if ob.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
                warn(ReactiveError::RootDataMutation);
                return value;
            }
            let Some(ob) = ob else {
                object.assign(&name, value.clone());
                return value;
            };
            define_reactive(object, &name, Some(value.clone()), None, ob.is_shallow(), ob.is_mock());
            ob.dep().notify(trigger_info(TriggerOp::Add, Some(&name)));
            value
        }
        other => {
            warn(ReactiveError::NotAContainer(other.type_name().to_string()));
            value
        }
    }
}

/// Delete a property from a container, notifying the container's dep if it
/// existed and the container is observed.
pub fn del(target: &Value, key: impl Into<Key>) {
    let key = key.into();
    match target {
        Value::Array(array) => {
            if array.is_readonly() {
                warn(ReactiveError::ReadonlyDelete(key.to_string()));
                return;
            }
            match key.as_index() {
                Some(index) => array.remove_index(index),
                None => warn(ReactiveError::InvalidArrayKey(key.to_string())),
            }
        }
        Value::Object(object) => {
            let name = key.to_name();
            if object.is_readonly() {
                warn(ReactiveError::ReadonlyDelete(name.to_string()));
                return;
            }
            let ob = object.observer();
            if ob.as_ref().is_some_and(|ob| ob.vm_count() > 0) {
                warn(ReactiveError::RootDataMutation);
                return;
            }
            if !object.has_own_property(&name) || !object.remove_property(&name) {
                return;
            }
            if let Some(ob) = ob {
                ob.dep().notify(trigger_info(TriggerOp::Delete, Some(&name)));
            }
        }
        other => warn(ReactiveError::NotAContainer(other.type_name().to_string())),
    }
}
