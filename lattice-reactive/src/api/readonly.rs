//! Readonly views.
//!
//! A readonly value is the same container seen through a handle that
//! rejects writes. Reads are delegated, so a readonly view of reactive
//! state still tracks. It never makes anything reactive by itself.

use crate::error::{warn, ReactiveError};
use crate::observer::value::{Value, View};

/// Deep readonly view: nested containers read through it are readonly too.
pub fn readonly(target: impl Into<Value>) -> Value {
    make_readonly(target.into(), View::Readonly)
}

/// Readonly at the top level only.
pub fn shallow_readonly(target: impl Into<Value>) -> Value {
    make_readonly(target.into(), View::ShallowReadonly)
}

fn make_readonly(target: Value, view: View) -> Value {
    if !target.is_object() {
        warn(ReactiveError::NotReactive(format!(
            "value cannot be made readonly: {}",
            target.type_name()
        )));
        return target;
    }
    if is_readonly(&target) {
        return target;
    }
    target.with_view(view)
}

pub fn is_readonly(value: &Value) -> bool {
    match value {
        Value::Object(o) => o.is_readonly(),
        Value::Array(a) => a.is_readonly(),
        Value::Ref(r) => r.is_readonly(),
        _ => false,
    }
}
