//! Observable arrays.
//!
//! Index writes on an array are not tracked individually. Instead every
//! mutating method (`push`, `pop`, `shift`, `unshift`, `splice`, `sort`,
//! `reverse`) runs the native operation and then, if the array is observed,
//! observes any inserted items and notifies the array's own dep. Reads
//! subscribe to that same dep.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::error::{warn, ReactiveError};
use crate::reactive::context;
use crate::reactive::dep::{track_info, trigger_info, TrackOp, TriggerOp};

use super::value::{Value, View};
use super::Observer;

struct ArrayInner {
    items: RefCell<Vec<Value>>,
    observer: RefCell<Option<Rc<Observer>>>,
    skip: Cell<bool>,
    frozen: Cell<bool>,
}

/// Shared handle to an array.
#[derive(Clone)]
pub struct Array {
    inner: Rc<ArrayInner>,
    view: View,
}

impl Array {
    pub fn new() -> Self {
        Self::from(Vec::new())
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

    pub fn readonly(&self) -> Self {
        self.with_view(View::Readonly)
    }

    pub fn to_raw(&self) -> Self {
        self.with_view(View::Mutable)
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn get(&self, index: usize) -> Value {
        self.track();
        let value = self.inner.items.borrow().get(index).cloned();
        self.wrap(value.unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.track();
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the items, tracked.
    pub fn to_vec(&self) -> Vec<Value> {
        self.track();
        let items = self.inner.items.borrow().clone();
        items.into_iter().map(|v| self.wrap(v)).collect()
    }

    /// Position of the first strictly-equal item.
    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        self.track();
        self.inner.items.borrow().iter().position(|v| v == needle)
    }

    pub fn contains(&self, needle: &Value) -> bool {
        self.index_of(needle).is_some()
    }

    pub(crate) fn items_untracked(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Append an item, returning the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.mutate("push", |items| {
            items.push(value.clone());
            (items.len(), vec![value])
        })
        .unwrap_or_else(|| self.raw_len())
    }

    pub fn pop(&self) -> Value {
        self.mutate("pop", |items| (items.pop().unwrap_or_default(), Vec::new()))
            .unwrap_or_default()
    }

    pub fn shift(&self) -> Value {
        self.mutate("shift", |items| {
            let first = if items.is_empty() {
                Value::Undefined
            } else {
                items.remove(0)
            };
            (first, Vec::new())
        })
        .unwrap_or_default()
    }

    /// Prepend items, returning the new length.
    pub fn unshift(&self, values: Vec<Value>) -> usize {
        self.mutate("unshift", |items| {
            items.splice(0..0, values.iter().cloned());
            (items.len(), values)
        })
        .unwrap_or_else(|| self.raw_len())
    }

    /// Remove `delete_count` items at `start` and insert `values` there.
    /// Out-of-range arguments are clamped. Returns the removed items.
    pub fn splice(&self, start: usize, delete_count: usize, values: Vec<Value>) -> Vec<Value> {
        self.mutate("splice", |items| {
            let start = start.min(items.len());
            let end = start + delete_count.min(items.len() - start);
            let removed: Vec<Value> = items.splice(start..end, values.iter().cloned()).collect();
            (removed, values)
        })
        .unwrap_or_default()
    }

    pub fn insert(&self, index: usize, value: impl Into<Value>) {
        self.splice(index, 0, vec![value.into()]);
    }

    pub fn remove(&self, index: usize) -> Value {
        self.splice(index, 1, Vec::new())
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    /// Sort with the default ordering: null, booleans, numbers, strings,
    /// containers, then undefined.
    pub fn sort(&self) {
        self.sort_by(default_order);
    }

    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        // Sort a copy so the comparator may read this array.
        let mut sorted = self.items_untracked();
        sorted.sort_by(&mut compare);
        self.mutate("sort", move |items| {
            *items = sorted;
            ((), Vec::new())
        });
    }

    pub fn reverse(&self) {
        self.mutate("reverse", |items| {
            items.reverse();
            ((), Vec::new())
        });
    }

    /// Index write used by `set()`: extends the array with `undefined` up to
    /// `index`, then replaces (or appends) the item there.
    pub(crate) fn set_index(&self, index: usize, value: Value) {
        self.mutate("splice", |items| {
            if items.len() < index {
                items.resize(index, Value::Undefined);
            }
            if index < items.len() {
                items[index] = value.clone();
            } else {
                items.push(value.clone());
            }
            ((), vec![value])
        });
    }

    pub(crate) fn remove_index(&self, index: usize) {
        self.splice(index, 1, Vec::new());
    }

    pub fn freeze(&self) {
        self.inner.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.get()
    }

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

    fn raw_len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    /// Run a mutating operation and notify observers.
    ///
    /// `op` returns its result together with the items it inserted.
    fn mutate<R>(&self, method: &str, op: impl FnOnce(&mut Vec<Value>) -> (R, Vec<Value>)) -> Option<R> {
        if self.view.is_readonly() {
            warn(ReactiveError::ReadonlyTarget(method.to_string()));
            return None;
        }
        if self.inner.frozen.get() {
            return None;
        }

        let (result, inserted) = {
            let mut items = self.inner.items.borrow_mut();
            op(&mut items)
        };

        if let Some(ob) = self.observer() {
            if !inserted.is_empty() {
                ob.observe_array(&inserted);
            }
            ob.dep().notify(trigger_info(TriggerOp::ArrayMutation, Some(method)));
        }
        Some(result)
    }

    fn track(&self) {
        if !context::is_tracking() {
            return;
        }
        if let Some(ob) = self.observer() {
            ob.dep().depend(track_info(TrackOp::Iterate, None));
        }
    }

    fn wrap(&self, value: Value) -> Value {
        match self.view {
            View::Readonly => value.with_view(View::Readonly),
            _ => value,
        }
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Object(_) | Value::Array(_) | Value::Ref(_) => 4,
        Value::Undefined => 5,
    }
}

fn default_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x.total_cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Subscribe the current target to every nested observed item, since array
/// items cannot be tracked individually.
pub(crate) fn depend_array(array: &Array) {
    for item in array.items_untracked() {
        let ob = match &item {
            Value::Object(o) => o.observer(),
            Value::Array(a) => a.observer(),
            _ => None,
        };
        if let Some(ob) = ob {
            ob.dep().depend(None);
        }
        if let Value::Array(nested) = &item {
            depend_array(nested);
        }
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner) && self.view == other.view
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                items: RefCell::new(items),
                observer: RefCell::new(None),
                skip: Cell::new(false),
                frozen: Cell::new(false),
            }),
            view: View::Mutable,
        }
    }
}

impl<V: Into<Value>> FromIterator<V> for Array {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self::from(iter.into_iter().map(Into::into).collect::<Vec<_>>())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.items.borrow().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::object::Object;

    fn numbers(array: &Array) -> Vec<f64> {
        array.to_vec().iter().filter_map(Value::as_f64).collect()
    }

    #[test]
    fn push_pop_shift_unshift() {
        let array: Array = [1, 2].into_iter().collect();
        assert_eq!(array.push(3), 3);
        assert_eq!(array.unshift(vec![Value::from(0)]), 4);
        assert_eq!(numbers(&array), [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(array.pop(), Value::from(3));
        assert_eq!(array.shift(), Value::from(0));
        assert_eq!(numbers(&array), [1.0, 2.0]);
    }

    #[test]
    fn empty_pop_and_shift_yield_undefined() {
        let array = Array::new();
        assert!(array.pop().is_undefined());
        assert!(array.shift().is_undefined());
    }

    #[test]
    fn splice_clamps_arguments() {
        let array: Array = [1, 2, 3].into_iter().collect();
        let removed = array.splice(1, 10, vec![Value::from(9)]);
        assert_eq!(removed, vec![Value::from(2), Value::from(3)]);
        assert_eq!(numbers(&array), [1.0, 9.0]);

        let removed = array.splice(99, 1, vec![Value::from(4)]);
        assert!(removed.is_empty());
        assert_eq!(numbers(&array), [1.0, 9.0, 4.0]);
    }

    #[test]
    fn set_index_pads_with_undefined() {
        let array: Array = [1].into_iter().collect();
        array.set_index(3, Value::from(4));
        assert_eq!(array.len(), 4);
        assert!(array.get(1).is_undefined());
        assert!(array.get(2).is_undefined());
        assert_eq!(array.get(3), Value::from(4));
    }

    #[test]
    fn default_sort_orders_by_kind() {
        let array = Array::from(vec![
            Value::Undefined,
            Value::from("b"),
            Value::from(10),
            Value::Null,
            Value::from(2),
            Value::from("a"),
        ]);
        array.sort();
        assert_eq!(
            array.to_vec(),
            vec![
                Value::Null,
                Value::from(2),
                Value::from(10),
                Value::from("a"),
                Value::from("b"),
                Value::Undefined,
            ]
        );
    }

    #[test]
    fn sort_comparator_may_read_the_array() {
        let array: Array = [3, 1, 2].into_iter().collect();
        let reader = array.clone();
        array.sort_by(|a, b| {
            let _ = reader.len();
            a.as_f64().unwrap_or(0.0).total_cmp(&b.as_f64().unwrap_or(0.0))
        });
        assert_eq!(numbers(&array), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn readonly_arrays_reject_mutation() {
        let array: Array = [1].into_iter().collect();
        let ro = array.readonly();
        assert_eq!(ro.push(2), 1);
        ro.reverse();
        assert_eq!(array.len(), 1);
    }

    #[test]
    fn readonly_view_wraps_nested_containers() {
        let inner = Object::new();
        let array = Array::from(vec![Value::from(inner)]);
        let nested = array.readonly().get(0);
        assert!(matches!(nested, Value::Object(ref o) if o.is_readonly()));
    }
}
