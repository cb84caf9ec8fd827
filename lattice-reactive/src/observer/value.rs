//! Dynamic values.
//!
//! Reactive state is modelled as a tree of [`Value`]s. Scalars are stored
//! inline; objects, arrays and refs are shared handles whose identity is
//! what equality compares, so two handles to the same object are equal and
//! two structurally identical objects are not.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use serde_json::Number;

use crate::api::computed::Computed;
use crate::api::ref_::Ref;
use crate::error::{ReactiveError, Result};
use crate::reactive::context;

use super::array::Array;
use super::object::Object;

/// How a container handle may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Mutable,
    /// Writes are rejected and nested containers are returned readonly too.
    Readonly,
    /// Writes are rejected; nested containers are returned as-is.
    ShallowReadonly,
}

impl View {
    pub fn is_readonly(self) -> bool {
        !matches!(self, View::Mutable)
    }
}

/// A reactive-capable value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(Object),
    Array(Array),
    Ref(Ref),
}

impl Value {
    pub fn object() -> Self {
        Value::Object(Object::new())
    }

    pub fn array() -> Self {
        Value::Array(Array::new())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Containers and refs: values whose contents can change without the
    /// handle changing.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_) | Value::Ref(_))
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, Value::Ref(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_reactive_ref(&self) -> Option<&Ref> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Ref(_) => "ref",
        }
    }

    /// The same value seen through `view`. Scalars are unaffected.
    pub fn with_view(&self, view: View) -> Value {
        match self {
            Value::Object(o) => Value::Object(o.with_view(view)),
            Value::Array(a) => Value::Array(a.with_view(view)),
            Value::Ref(r) => Value::Ref(r.with_view(view)),
            other => other.clone(),
        }
    }

    /// Build a plain (not yet observed) value tree from JSON.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.into()),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Snapshot the tree as JSON without tracking. Refs are unwrapped,
    /// `undefined` object members are omitted.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        context::untracked(|| to_json_inner(self, &mut HashSet::new()))
    }
}

fn to_json_inner(value: &Value, stack: &mut HashSet<usize>) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number_to_json(*n),
        Value::String(s) => serde_json::Value::String(s.to_string()),
        Value::Ref(r) => to_json_inner(&r.get(), stack)?,
        Value::Array(a) => {
            if !stack.insert(a.addr()) {
                return Err(ReactiveError::CyclicValue);
            }
            let items = a
                .to_vec()
                .iter()
                .map(|v| to_json_inner(v, stack))
                .collect::<Result<Vec<_>>>()?;
            stack.remove(&a.addr());
            serde_json::Value::Array(items)
        }
        Value::Object(o) => {
            if !stack.insert(o.addr()) {
                return Err(ReactiveError::CyclicValue);
            }
            let mut map = serde_json::Map::new();
            for key in o.keys() {
                let v = o.get(&key);
                if !v.is_undefined() {
                    map.insert(key.to_string(), to_json_inner(&v, stack)?);
                }
            }
            stack.remove(&o.addr());
            serde_json::Value::Object(map)
        }
    })
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 && !(n == 0.0 && n.is_sign_negative()) {
        serde_json::Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Strict equality: IEEE comparison for numbers (NaN is unequal to itself),
/// identity for containers and refs.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            _ => false,
        }
    }
}

/// SameValue comparison used by setters: `NaN` is unchanged when replaced
/// by `NaN`, while `+0` and `-0` count as different.
pub fn has_changed(old: &Value, new: &Value) -> bool {
    match (old, new) {
        (Value::Number(a), Value::Number(b)) => {
            if a.is_nan() && b.is_nan() {
                false
            } else if a == b {
                a.is_sign_negative() != b.is_sign_negative()
            } else {
                true
            }
        }
        _ => old != new,
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(o) => fmt::Debug::fmt(o, f),
            Value::Array(a) => fmt::Debug::fmt(a, f),
            Value::Ref(r) => fmt::Debug::fmt(r, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}

impl_from_int!(i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Value::Ref(r)
    }
}

impl From<Computed> for Value {
    fn from(c: Computed) -> Self {
        Value::Ref(c.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(Array::from(items))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Largest valid array index: array lengths are capped at `u32::MAX`.
pub const MAX_ARRAY_INDEX: usize = u32::MAX as usize - 1;

/// A property name or array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Index(usize),
    Name(Rc<str>),
}

impl Key {
    /// The array index this key denotes, accepting canonical numeric names.
    /// Indices above [`MAX_ARRAY_INDEX`] are not array indices.
    pub fn as_index(&self) -> Option<usize> {
        let index = match self {
            Key::Index(i) => Some(*i),
            Key::Name(name) => name
                .parse::<usize>()
                .ok()
                .filter(|i| i.to_string() == **name),
        };
        index.filter(|&i| i <= MAX_ARRAY_INDEX)
    }

    pub fn to_name(&self) -> Rc<str> {
        match self {
            Key::Index(i) => i.to_string().into(),
            Key::Name(name) => name.clone(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "{i}"),
            Key::Name(name) => f.write_str(name),
        }
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Name(s.into())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Name(s.into())
    }
}

impl From<Rc<str>> for Key {
    fn from(s: Rc<str>) -> Self {
        Key::Name(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nan_is_unchanged_by_nan() {
        let nan = Value::Number(f64::NAN);
        assert!(!has_changed(&nan, &Value::Number(f64::NAN)));
        // ...while strict equality still says they differ.
        assert_ne!(nan, Value::Number(f64::NAN));
    }

    #[test]
    fn signed_zeros_are_changes() {
        assert!(has_changed(&Value::Number(0.0), &Value::Number(-0.0)));
        assert_eq!(Value::Number(0.0), Value::Number(-0.0));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = Object::new();
        let b = Object::new();
        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn json_snapshot_round_trips_shape() {
        let source = json!({ "a": 1, "b": [true, null, "x"], "c": { "d": 2.5 } });
        let value = Value::from_json(source.clone());
        assert_eq!(value.to_json().unwrap(), source);
    }

    #[test]
    fn json_snapshot_rejects_cycles() {
        let obj = Object::new();
        obj.assign("me", obj.clone());
        assert_eq!(Value::from(obj).to_json(), Err(ReactiveError::CyclicValue));
    }

    #[test]
    fn key_indices() {
        assert_eq!(Key::from(3).as_index(), Some(3));
        assert_eq!(Key::from("4").as_index(), Some(4));
        assert_eq!(Key::from("04").as_index(), None);
        assert_eq!(Key::from("length").as_index(), None);
        assert_eq!(Key::from(MAX_ARRAY_INDEX).as_index(), Some(MAX_ARRAY_INDEX));
        assert_eq!(Key::from(1usize << 40).as_index(), None);
        assert_eq!(Key::from("4294967295").as_index(), None);
    }
}
