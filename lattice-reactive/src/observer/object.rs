//! Observable objects.
//!
//! An [`Object`] is an ordered map of own properties. Before observation its
//! properties are plain data; [`observe`](super::observe) converts each one
//! into a reactive slot with its own [`Dep`], after which reads through
//! [`Object::get`] track and writes through [`Object::assign`] trigger.
//!
//! Assigning a key the object does not have yet adds a *plain* property,
//! which nothing tracks. Use [`set`](super::set) to add reactive keys.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::config;
use crate::error::{warn, ReactiveError};
use crate::reactive::context;
use crate::reactive::dep::{track_info, trigger_info, Dep, TrackOp, TriggerOp};

use super::array::depend_array;
use super::value::{has_changed, Value, View};
use super::{existing_observer, observe, Observer};

pub type AccessorGet = Rc<dyn Fn() -> Value>;
pub type AccessorSet = Rc<dyn Fn(Value)>;

/// Hook run before a reactive property accepts a write (dev mode only).
pub type CustomSetter = Rc<dyn Fn(&Value)>;

/// Property attributes that survive observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Non-configurable properties cannot be made reactive or deleted.
    pub configurable: bool,
    /// Non-enumerable properties are skipped by `keys()` and by observation.
    pub enumerable: bool,
}

impl Default for PropertyDescriptor {
    fn default() -> Self {
        Self {
            configurable: true,
            enumerable: true,
        }
    }
}

#[derive(Clone)]
pub(crate) enum Slot {
    Data(Value),
    Accessor {
        get: Option<AccessorGet>,
        set: Option<AccessorSet>,
    },
}

impl Slot {
    pub(crate) fn read(&self) -> Value {
        match self {
            Slot::Data(value) => value.clone(),
            Slot::Accessor { get: Some(get), .. } => get(),
            Slot::Accessor { get: None, .. } => Value::Undefined,
        }
    }
}

/// Bookkeeping installed on a property by `define_reactive`.
#[derive(Clone)]
pub(crate) struct Reactivity {
    pub(crate) dep: Dep,
    pub(crate) child_ob: Option<Rc<Observer>>,
    pub(crate) shallow: bool,
    pub(crate) mock: bool,
    pub(crate) custom_setter: Option<CustomSetter>,
}

struct Property {
    slot: Slot,
    descriptor: PropertyDescriptor,
    reactivity: Option<Reactivity>,
}

impl Property {
    fn data(value: Value) -> Self {
        Self {
            slot: Slot::Data(value),
            descriptor: PropertyDescriptor::default(),
            reactivity: None,
        }
    }
}

struct ObjectInner {
    props: RefCell<IndexMap<Rc<str>, Property>>,
    observer: RefCell<Option<Rc<Observer>>>,
    skip: Cell<bool>,
    frozen: Cell<bool>,
}

/// Shared handle to an object.
#[derive(Clone)]
pub struct Object {
    inner: Rc<ObjectInner>,
    view: View,
}

impl Object {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                props: RefCell::new(IndexMap::new()),
                observer: RefCell::new(None),
                skip: Cell::new(false),
                frozen: Cell::new(false),
            }),
            view: View::Mutable,
        }
    }

    pub fn with_view(&self, view: View) -> Self {
        Self {
            inner: self.inner.clone(),
            view,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn is_readonly(&self) -> bool {
        self.view.is_readonly()
    }

    /// Deep readonly view of this object.
    pub fn readonly(&self) -> Self {
        self.with_view(View::Readonly)
    }

    /// The underlying mutable handle.
    pub fn to_raw(&self) -> Self {
        self.with_view(View::Mutable)
    }

    /// Same underlying object, regardless of view.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    /// Read a property, tracking it if reactive.
    pub fn get(&self, key: &str) -> Value {
        let found = {
            let props = self.inner.props.borrow();
            props
                .get(key)
                .map(|p| (p.slot.clone(), p.reactivity.clone()))
        };
        let Some((slot, reactivity)) = found else {
            // A later `set()` of this key notifies the object's own dep.
            self.track_structure(TrackOp::Has, Some(key));
            return Value::Undefined;
        };

        let value = slot.read();
        let value = match reactivity {
            None => value,
            Some(r) => {
                if context::is_tracking() {
                    r.dep.depend(track_info(TrackOp::Get, Some(key)));
                    if let Some(child_ob) = &r.child_ob {
                        child_ob.dep().depend(None);
                        if let Value::Array(items) = &value {
                            depend_array(items);
                        }
                    }
                }
                match value {
                    Value::Ref(inner) if !r.shallow => inner.get(),
                    other => other,
                }
            }
        };
        self.wrap(value)
    }

    /// The stored value of `key`: no tracking, no ref unwrapping, no view.
    pub(crate) fn get_raw(&self, key: &str) -> Value {
        let slot = self.inner.props.borrow().get(key).map(|p| p.slot.clone());
        context::untracked(|| slot.map(|s| s.read()).unwrap_or_default())
    }

    pub fn get_untracked(&self, key: &str) -> Value {
        context::untracked(|| self.get(key))
    }

    /// Assignment: existing keys go through their setter, new keys become
    /// plain properties.
    pub fn assign(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if self.view.is_readonly() {
            warn(ReactiveError::ReadonlyTarget(key.to_string()));
            return;
        }

        let found = {
            let props = self.inner.props.borrow();
            props
                .get(key)
                .map(|p| (p.slot.clone(), p.reactivity.clone()))
        };
        match found {
            None => {
                if !self.inner.frozen.get() {
                    self.inner
                        .props
                        .borrow_mut()
                        .insert(key.into(), Property::data(value));
                }
            }
            Some((slot, Some(reactivity))) => self.reactive_set(key, slot, reactivity, value),
            Some((Slot::Data(_), None)) => {
                if !self.inner.frozen.get() {
                    self.write_data(key, value);
                }
            }
            Some((Slot::Accessor { set: Some(set), .. }, None)) => set(value),
            Some((Slot::Accessor { set: None, .. }, None)) => {}
        }
    }

    fn reactive_set(&self, key: &str, slot: Slot, r: Reactivity, new: Value) {
        let old = slot.read();
        if !has_changed(&old, &new) {
            return;
        }
        if config::config().dev_mode {
            if let Some(hook) = &r.custom_setter {
                hook(&new);
            }
        }

        match slot {
            Slot::Accessor { set: Some(set), .. } => set(new.clone()),
            // Getter without setter: the property is readonly.
            Slot::Accessor { set: None, .. } => return,
            Slot::Data(_) => {
                if !r.shallow {
                    if let Value::Ref(old_ref) = &old {
                        if !new.is_ref() {
                            old_ref.set(new);
                            return;
                        }
                    }
                }
                self.write_data(key, new.clone());
            }
        }

        let child_ob = if r.shallow {
            existing_observer(&new)
        } else {
            observe(&new, false, r.mock)
        };
        if let Some(reactivity) = self
            .inner
            .props
            .borrow_mut()
            .get_mut(key)
            .and_then(|p| p.reactivity.as_mut())
        {
            reactivity.child_ob = child_ob;
        }
        r.dep.notify(trigger_info(TriggerOp::Set, Some(key)));
    }

    fn write_data(&self, key: &str, value: Value) {
        let previous = {
            let mut props = self.inner.props.borrow_mut();
            match props.get_mut(key).map(|p| &mut p.slot) {
                Some(Slot::Data(slot)) => Some(std::mem::replace(slot, value)),
                _ => None,
            }
        };
        drop(previous);
    }

    /// Whether the key exists. Tracks the object's structure.
    pub fn contains_key(&self, key: &str) -> bool {
        self.track_structure(TrackOp::Has, Some(key));
        self.has_own_property(key)
    }

    /// Untracked own-property check.
    pub fn has_own_property(&self, key: &str) -> bool {
        self.inner.props.borrow().contains_key(key)
    }

    /// Enumerable keys, in insertion order. Tracks the object's structure.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.track_structure(TrackOp::Iterate, None);
        self.enumerable_keys()
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enumerable `(key, value)` pairs, tracking every read.
    pub fn entries(&self) -> Vec<(Rc<str>, Value)> {
        self.keys()
            .into_iter()
            .map(|k| {
                let v = self.get(&k);
                (k, v)
            })
            .collect()
    }

    /// Plain delete. Nothing is notified; use [`del`](super::del) for that.
    pub fn delete(&self, key: &str) -> bool {
        if self.view.is_readonly() {
            warn(ReactiveError::ReadonlyDelete(key.to_string()));
            return false;
        }
        self.remove_property(key)
    }

    pub(crate) fn remove_property(&self, key: &str) -> bool {
        let removed = {
            let mut props = self.inner.props.borrow_mut();
            match props.get(key) {
                None => return true,
                Some(p) if !p.descriptor.configurable || self.inner.frozen.get() => return false,
                Some(_) => props.shift_remove(key),
            }
        };
        drop(removed);
        true
    }

    /// Define (or redefine) a plain data property.
    pub fn define_property(&self, key: &str, value: impl Into<Value>, descriptor: PropertyDescriptor) -> bool {
        self.define_slot(key, Slot::Data(value.into()), descriptor)
    }

    /// Define (or redefine) a property backed by a getter and/or setter.
    pub fn define_accessor(
        &self,
        key: &str,
        get: Option<AccessorGet>,
        set: Option<AccessorSet>,
        descriptor: PropertyDescriptor,
    ) -> bool {
        self.define_slot(key, Slot::Accessor { get, set }, descriptor)
    }

    fn define_slot(&self, key: &str, slot: Slot, descriptor: PropertyDescriptor) -> bool {
        let mut props = self.inner.props.borrow_mut();
        match props.get_mut(key) {
            Some(p) if !p.descriptor.configurable => false,
            Some(p) => {
                *p = Property {
                    slot,
                    descriptor,
                    reactivity: None,
                };
                true
            }
            None if self.inner.frozen.get() => false,
            None => {
                props.insert(
                    key.into(),
                    Property {
                        slot,
                        descriptor,
                        reactivity: None,
                    },
                );
                true
            }
        }
    }

    /// Prevent new properties and data writes. Frozen objects are never
    /// observed.
    pub fn freeze(&self) {
        self.inner.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

    /// Flag the object so `observe()` skips it.
    pub fn mark_raw(&self) {
        if !self.inner.frozen.get() {
            self.inner.skip.set(true);
        }
    }

    pub fn is_marked_raw(&self) -> bool {
        self.inner.skip.get()
    }

    pub fn observer(&self) -> Option<Rc<Observer>> {
        self.inner.observer.borrow().clone()
    }

    pub(crate) fn set_observer(&self, ob: Rc<Observer>) {
        *self.inner.observer.borrow_mut() = Some(ob);
    }

    pub(crate) fn enumerable_keys(&self) -> Vec<Rc<str>> {
        self.inner
            .props
            .borrow()
            .iter()
            .filter(|(_, p)| p.descriptor.enumerable)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Current slot of `key` and whether it may be redefined.
    pub(crate) fn slot_for_define(&self, key: &str) -> Option<(Slot, bool)> {
        self.inner
            .props
            .borrow()
            .get(key)
            .map(|p| (p.slot.clone(), p.descriptor.configurable))
    }

    pub(crate) fn install_reactive(&self, key: &str, slot: Slot, reactivity: Reactivity) {
        let mut props = self.inner.props.borrow_mut();
        let enumerable = props.get(key).map_or(true, |p| p.descriptor.enumerable);
        let property = Property {
            slot,
            descriptor: PropertyDescriptor {
                configurable: true,
                enumerable,
            },
            reactivity: Some(reactivity),
        };
        props.insert(key.into(), property);
    }

    pub(crate) fn property_dep(&self, key: &str) -> Option<Dep> {
        self.inner
            .props
            .borrow()
            .get(key)
            .and_then(|p| p.reactivity.as_ref().map(|r| r.dep.clone()))
    }

    fn track_structure(&self, op: TrackOp, key: Option<&str>) {
        if !context::is_tracking() {
            return;
        }
        if let Some(ob) = self.observer() {
            ob.dep().depend(track_info(op, key));
        }
    }

    fn wrap(&self, value: Value) -> Value {
        match self.view {
            View::Readonly => value.with_view(View::Readonly),
            _ => value,
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner) && self.view == other.view
    }
}

impl<K, V> FromIterator<(K, V)> for Object
where
    K: Into<Rc<str>>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Object::new();
        {
            let mut props = object.inner.props.borrow_mut();
            for (k, v) in iter {
                props.insert(k.into(), Property::data(v.into()));
            }
        }
        object
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let props = self.inner.props.borrow();
        let mut map = f.debug_map();
        for (key, prop) in props.iter() {
            match &prop.slot {
                Slot::Data(value) => map.entry(key, value),
                Slot::Accessor { .. } => map.entry(key, &format_args!("<accessor>")),
            };
        }
        map.finish()
    }
}
