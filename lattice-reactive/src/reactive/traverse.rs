//! Deep traversal for `deep` watchers.
//!
//! Reading every nested property while a watcher is the active target
//! subscribes it to the whole tree, so a mutation anywhere below the watched
//! value re-runs it.

use std::collections::HashSet;

use crate::observer::value::Value;

/// Recursively read every property and item reachable from `value`.
pub fn traverse(value: &Value) {
    walk(value, &mut HashSet::new());
}

fn walk(value: &Value, seen: &mut HashSet<usize>) {
    match value {
        Value::Ref(r) => walk(&r.get(), seen),
        Value::Object(object) => {
            if object.is_frozen() || object.is_marked_raw() || !seen.insert(object.addr()) {
                return;
            }
            for key in object.keys() {
                walk(&object.get(&key), seen);
            }
        }
        Value::Array(array) => {
            if array.is_frozen() || array.is_marked_raw() || !seen.insert(array.addr()) {
                return;
            }
            for item in array.to_vec() {
                walk(&item, seen);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::reactive::reactive;
    use crate::observer::object::Object;
    use crate::reactive::watcher::{Flush, Watcher, WatcherKind, WatcherOptions};
    use serde_json::json;

    #[test]
    fn traversal_subscribes_to_nested_properties() {
        let state = reactive(Value::from_json(json!({ "a": { "b": { "c": 1 } }, "list": [{ "d": 2 }] })));
        let s = state.clone();
        let w = Watcher::new(
            move || {
                let v = Value::from(s.clone());
                traverse(&v);
                Value::Undefined
            },
            WatcherKind::Watch {
                deep: false,
                flush: Flush::Sync,
            },
            WatcherOptions::default(),
        );
        // state ob, a, a ob, b, b ob, c, list, list ob, item ob, d
        assert_eq!(w.dep_count(), 10);
    }

    #[test]
    fn traversal_survives_cycles() {
        let obj = Object::new();
        obj.assign("me", obj.clone());
        traverse(&Value::from(obj));
    }
}
