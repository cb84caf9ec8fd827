//! Reactive containers and introspection.
//!
//! [`reactive`] observes an object or array in place and returns the same
//! handle. There is no separate proxy: once observed, the container's
//! reads track and its writes notify.

use crate::config;
use crate::error::{warn, ReactiveError};
use crate::observer::value::{Value, View};
use crate::observer::{existing_observer, observe};

use super::readonly::is_readonly;

/// Observe `target` deeply and return it.
pub fn reactive(target: impl Into<Value>) -> Value {
    make_reactive(target.into(), false)
}

/// Observe only the top level of `target` and return it.
pub fn shallow_reactive(target: impl Into<Value>) -> Value {
    make_reactive(target.into(), true)
}

fn make_reactive(target: Value, shallow: bool) -> Value {
    if is_readonly(&target) {
        return target;
    }
    if let Some(existing) = existing_observer(&target) {
        if existing.is_shallow() != shallow {
            warn(ReactiveError::NotReactive(format!(
                "target is already a {}shallow reactive object, and cannot be converted to {}shallow",
                if existing.is_shallow() { "" } else { "non-" },
                if shallow { "" } else { "non-" },
            )));
        }
        return target;
    }

    let mock = config::config().server_rendering;
    if observe(&target, shallow, mock).is_none() {
        // Raw-marked containers are skipped silently.
        let reason = match &target {
            Value::Object(o) if o.is_frozen() => Some("frozen object"),
            Value::Array(a) if a.is_frozen() => Some("frozen array"),
            Value::Object(_) | Value::Array(_) => None,
            other => Some(other.type_name()),
        };
        if let Some(reason) = reason {
            warn(ReactiveError::NotReactive(reason.to_string()));
        }
    }
    target
}

/// Whether `value` (or the container behind a readonly view) is observed.
pub fn is_reactive(value: &Value) -> bool {
    existing_observer(&to_raw(value)).is_some()
}

/// Shallow reactive containers, shallow refs and shallow readonly views.
pub fn is_shallow(value: &Value) -> bool {
    match value {
        Value::Object(o) => {
            o.view() == View::ShallowReadonly || o.observer().is_some_and(|ob| ob.is_shallow())
        }
        Value::Array(a) => {
            a.view() == View::ShallowReadonly || a.observer().is_some_and(|ob| ob.is_shallow())
        }
        Value::Ref(r) => r.is_shallow(),
        _ => false,
    }
}

pub fn is_proxy(value: &Value) -> bool {
    is_reactive(value) || is_readonly(value)
}

/// Strip any readonly view.
pub fn to_raw(value: &Value) -> Value {
    value.with_view(View::Mutable)
}

/// Flag a container so it is never observed. Returns it.
pub fn mark_raw(value: impl Into<Value>) -> Value {
    let value = value.into();
    match &value {
        Value::Object(o) => o.mark_raw(),
        Value::Array(a) => a.mark_raw(),
        _ => {}
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::readonly::{readonly, shallow_readonly};
    use crate::api::ref_::{ref_, shallow_ref};
    use crate::observer::object::Object;
    use serde_json::json;

    #[test]
    fn reactive_observes_in_place() {
        let obj = Object::new();
        let state = reactive(obj.clone());
        assert_eq!(state, Value::from(obj.clone()));
        assert!(obj.observer().is_some());
        assert!(is_reactive(&state));
        assert!(is_proxy(&state));
    }

    #[test]
    fn reactive_is_idempotent() {
        let state = reactive(Value::from_json(json!({ "a": 1 })));
        let again = reactive(state.clone());
        assert_eq!(state, again);
    }

    #[test]
    fn shallow_flags() {
        let shallow = shallow_reactive(Value::from_json(json!({ "a": {} })));
        assert!(is_shallow(&shallow));
        assert!(!is_shallow(&reactive(Value::object())));
        assert!(is_shallow(&Value::from(shallow_ref(1))));
        assert!(!is_shallow(&Value::from(ref_(1))));
        assert!(is_shallow(&shallow_readonly(Value::object())));
    }

    #[test]
    fn raw_values_are_skipped() {
        let raw = mark_raw(Value::object());
        let state = reactive(raw.clone());
        assert!(!is_reactive(&state));
    }

    #[test]
    fn readonly_is_not_reactive_unless_target_is() {
        let plain = readonly(Value::object());
        assert!(!is_reactive(&plain));
        assert!(is_proxy(&plain));

        let state = reactive(Value::object());
        assert!(is_reactive(&readonly(state.clone())));
        assert_eq!(to_raw(&readonly(state.clone())), state);
    }

    #[test]
    fn reactive_arrays_track_mutations() {
        use crate::reactive::watcher::{Flush, Watcher, WatcherKind, WatcherOptions};
        use std::cell::Cell;
        use std::rc::Rc;

        let list = reactive(Value::from_json(json!([1, 2])));
        let runs = Rc::new(Cell::new(0));
        let (l, n) = (list.clone(), runs.clone());
        Watcher::new(
            move || {
                n.set(n.get() + 1);
                Value::from(l.as_array().map_or(0, |a| a.len()))
            },
            WatcherKind::Effect { flush: Flush::Sync },
            WatcherOptions::default(),
        );

        if let Some(a) = list.as_array() {
            a.push(3);
            a.reverse();
        }
        assert_eq!(runs.get(), 3);
    }
}
