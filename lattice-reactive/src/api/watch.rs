//! Watch API
//!
//! [`watch`] runs a callback when a source changes; [`watch_effect`] re-runs
//! a side effect whenever anything it read changes. Both are thin layers
//! over a user [`Watcher`].
//!
//! # Sources
//!
//! - a ref or computed: its value; shallow refs always trigger;
//! - a reactive object or array: the container itself, watched deeply;
//! - a getter closure: whatever it returns;
//! - a dot-delimited path below a root value, e.g. `"user.address.city"`;
//! - a list of the above: an array of their values, triggering when any
//!   element changes.

use std::rc::Rc;

use crate::error::{warn, ReactiveError};
use crate::observer::array::Array;
use crate::observer::value::{has_changed, Value};
use crate::reactive::traverse::traverse;
use crate::reactive::watcher::{DebuggerHook, Flush, Watcher, WatcherKind, WatcherOptions};

use super::computed::Computed;
use super::reactive::{is_reactive, is_shallow};
use super::ref_::Ref;

type Getter = Rc<dyn Fn() -> Value>;

/// What a [`watch`] observes.
#[derive(Clone)]
pub enum WatchSource {
    Ref(Ref),
    /// A reactive object or array. Implies `deep`.
    Reactive(Value),
    Getter(Getter),
    Path { root: Value, path: String },
    Multi(Vec<WatchSource>),
}

impl WatchSource {
    pub fn getter(f: impl Fn() -> Value + 'static) -> Self {
        WatchSource::Getter(Rc::new(f))
    }

    pub fn path(root: impl Into<Value>, path: impl Into<String>) -> Self {
        WatchSource::Path {
            root: root.into(),
            path: path.into(),
        }
    }

    fn label(&self) -> String {
        match self {
            WatchSource::Ref(_) => "ref".to_string(),
            WatchSource::Reactive(_) => "reactive".to_string(),
            WatchSource::Getter(_) => "getter".to_string(),
            WatchSource::Path { path, .. } => path.clone(),
            WatchSource::Multi(sources) => {
                let labels: Vec<String> = sources.iter().map(WatchSource::label).collect();
                format!("[{}]", labels.join(", "))
            }
        }
    }

    /// Build the getter for this source: `(getter, implies_deep, force_trigger)`.
    fn into_getter(self) -> (Getter, bool, bool) {
        match self {
            WatchSource::Ref(r) => {
                let force = r.is_shallow();
                (Rc::new(move || r.get()), false, force)
            }
            WatchSource::Reactive(target) => {
                let force = is_shallow(&target);
                (Rc::new(move || depend_container(&target)), true, force)
            }
            WatchSource::Getter(getter) => (getter, false, false),
            WatchSource::Path { root, path } => (parse_path(root, &path), false, false),
            WatchSource::Multi(sources) => {
                let force = sources.iter().any(|s| match s {
                    WatchSource::Reactive(v) => is_reactive(v) || is_shallow(v),
                    WatchSource::Ref(r) => r.is_shallow(),
                    _ => false,
                });
                let getters: Vec<Getter> = sources
                    .into_iter()
                    .map(|source| match source {
                        WatchSource::Reactive(target) => {
                            let getter: Getter = Rc::new(move || {
                                let value = depend_container(&target);
                                traverse(&value);
                                value
                            });
                            getter
                        }
                        other => other.into_getter().0,
                    })
                    .collect();
                let getter: Getter = Rc::new(move || {
                    Value::Array(getters.iter().map(|g| g()).collect::<Array>())
                });
                (getter, false, force)
            }
        }
    }
}

fn depend_container(target: &Value) -> Value {
    let ob = match target {
        Value::Object(o) => o.observer(),
        Value::Array(a) => a.observer(),
        _ => None,
    };
    if let Some(ob) = ob {
        ob.dep().depend(None);
    }
    target.clone()
}

impl From<Ref> for WatchSource {
    fn from(r: Ref) -> Self {
        WatchSource::Ref(r)
    }
}

impl From<Computed> for WatchSource {
    fn from(c: Computed) -> Self {
        WatchSource::Ref(c.into())
    }
}

impl From<Vec<WatchSource>> for WatchSource {
    fn from(sources: Vec<WatchSource>) -> Self {
        WatchSource::Multi(sources)
    }
}

/// Options for [`watch`].
#[derive(Default)]
pub struct WatchOptions {
    /// Call back once right away with the current value.
    pub immediate: bool,
    /// Traverse the returned value so nested changes trigger.
    pub deep: bool,
    pub flush: Flush,
    pub on_track: Option<DebuggerHook>,
    pub on_trigger: Option<DebuggerHook>,
    /// Label used in diagnostics; defaults to a description of the source.
    pub expression: Option<String>,
}

/// Options for [`watch_effect`].
#[derive(Default)]
pub struct EffectOptions {
    pub flush: Flush,
    pub on_track: Option<DebuggerHook>,
    pub on_trigger: Option<DebuggerHook>,
    pub expression: Option<String>,
}

/// Handle to a running watcher. Dropping the handle does not stop it.
#[derive(Clone, Debug)]
pub struct WatchHandle {
    watcher: Rc<Watcher>,
}

impl WatchHandle {
    /// Stop watching. Idempotent.
    pub fn stop(&self) {
        self.watcher.teardown();
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_active()
    }

    pub fn watcher(&self) -> &Rc<Watcher> {
        &self.watcher
    }
}

/// Call `callback(new, old)` whenever `source` changes.
pub fn watch<S, F>(source: S, callback: F, options: WatchOptions) -> WatchHandle
where
    S: Into<WatchSource>,
    F: FnMut(&Value, &Value) + 'static,
{
    let source = source.into();
    let expression = options.expression.unwrap_or_else(|| source.label());
    let multi = matches!(source, WatchSource::Multi(_));
    let (getter, implied_deep, force_trigger) = source.into_getter();
    let deep = options.deep || implied_deep;

    let changed = move |new: &Value, old: &Value| {
        let changed = if multi {
            elements_changed(new, old)
        } else {
            has_changed(old, new)
        };
        deep || force_trigger || changed
    };

    let watcher = Watcher::new(
        move || getter(),
        WatcherKind::Watch {
            deep,
            flush: options.flush,
        },
        WatcherOptions {
            expression: Some(expression),
            callback: Some(Box::new(callback)),
            changed: Some(Box::new(changed)),
            on_track: options.on_track,
            on_trigger: options.on_trigger,
            ..Default::default()
        },
    );

    if options.immediate {
        let initial = if multi { Value::array() } else { Value::Undefined };
        watcher.call_immediately(&initial);
    }
    WatchHandle { watcher }
}

fn elements_changed(new: &Value, old: &Value) -> bool {
    let (Value::Array(new), Value::Array(old)) = (new, old) else {
        return true;
    };
    let old = old.items_untracked();
    new.items_untracked()
        .iter()
        .enumerate()
        .any(|(i, v)| has_changed(v, old.get(i).unwrap_or(&Value::Undefined)))
}

/// Run `effect` now and again whenever anything it read changes.
pub fn watch_effect(effect: impl Fn() + 'static, options: EffectOptions) -> WatchHandle {
    let watcher = Watcher::new(
        move || {
            effect();
            Value::Undefined
        },
        WatcherKind::Effect { flush: options.flush },
        WatcherOptions {
            expression: Some(options.expression.unwrap_or_else(|| "effect".to_string())),
            on_track: options.on_track,
            on_trigger: options.on_trigger,
            ..Default::default()
        },
    );
    WatchHandle { watcher }
}

/// [`watch_effect`] flushed after render watchers.
pub fn watch_post_effect(effect: impl Fn() + 'static) -> WatchHandle {
    watch_effect(
        effect,
        EffectOptions {
            flush: Flush::Post,
            ..Default::default()
        },
    )
}

/// [`watch_effect`] re-run synchronously on every change.
pub fn watch_sync_effect(effect: impl Fn() + 'static) -> WatchHandle {
    watch_effect(
        effect,
        EffectOptions {
            flush: Flush::Sync,
            ..Default::default()
        },
    )
}

fn is_valid_path(path: &str) -> bool {
    path.chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '$' | '_'))
}

/// Compile a dot-delimited path into a getter reading it below `root`.
/// Invalid paths warn and yield a getter that watches nothing.
pub fn parse_path(root: Value, path: &str) -> Rc<dyn Fn() -> Value> {
    if !is_valid_path(path) {
        warn(ReactiveError::InvalidPath(path.to_string()));
        return Rc::new(|| Value::Undefined);
    }
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    Rc::new(move || {
        let mut current = root.clone();
        for segment in &segments {
            current = match &current {
                Value::Object(o) => o.get(segment),
                Value::Array(a) if segment == "length" => Value::from(a.len()),
                Value::Array(a) => match segment.parse::<usize>() {
                    Ok(index) => a.get(index),
                    Err(_) => Value::Undefined,
                },
                Value::Ref(r) => match r.get() {
                    Value::Object(o) => o.get(segment),
                    _ => Value::Undefined,
                },
                _ => return Value::Undefined,
            };
        }
        current
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::computed::computed;
    use crate::api::reactive::reactive;
    use crate::api::ref_::{ref_, shallow_ref, trigger_ref};
    use crate::scheduler::flush_pending_ticks;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    type Calls = Rc<RefCell<Vec<(Value, Value)>>>;

    fn recorder() -> (Calls, impl FnMut(&Value, &Value) + 'static) {
        let calls: Calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        (calls, move |new: &Value, old: &Value| {
            sink.borrow_mut().push((new.clone(), old.clone()))
        })
    }

    fn sync() -> WatchOptions {
        WatchOptions {
            flush: Flush::Sync,
            ..Default::default()
        }
    }

    #[test]
    fn watch_ref_reports_new_and_old() {
        let count = ref_(0);
        let (calls, cb) = recorder();
        watch(count.clone(), cb, WatchOptions::default());

        count.set(1);
        count.set(2);
        assert!(calls.borrow().is_empty());
        flush_pending_ticks();
        assert_eq!(*calls.borrow(), vec![(Value::from(2), Value::from(0))]);
    }

    #[test]
    fn immediate_calls_back_with_undefined_old_value() {
        let count = ref_(3);
        let (calls, cb) = recorder();
        watch(
            count,
            cb,
            WatchOptions {
                immediate: true,
                ..Default::default()
            },
        );
        assert_eq!(*calls.borrow(), vec![(Value::from(3), Value::Undefined)]);
    }

    #[test]
    fn watching_reactive_objects_is_deep() {
        let state = reactive(Value::from_json(json!({ "nested": { "a": 1 } })));
        let (calls, cb) = recorder();
        watch(WatchSource::Reactive(state.clone()), cb, sync());

        let nested = state.as_object().map(|o| o.get("nested")).unwrap_or_default();
        if let Value::Object(nested) = nested {
            nested.assign("a", 2);
        }
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(calls.borrow()[0].0, state);
    }

    #[test]
    fn getter_sources_compare_with_same_value() {
        let count = ref_(1);
        let c = count.clone();
        let (calls, cb) = recorder();
        watch(
            WatchSource::getter(move || Value::from(c.get().as_f64().unwrap_or(0.0) % 2.0)),
            cb,
            sync(),
        );
        count.set(3);
        assert!(calls.borrow().is_empty());
        count.set(4);
        assert_eq!(*calls.borrow(), vec![(Value::from(0), Value::from(1))]);
    }

    #[test]
    fn multiple_sources_trigger_on_any_element() {
        let a = ref_(1);
        let b = ref_(2);
        let (calls, cb) = recorder();
        watch(
            vec![WatchSource::from(a.clone()), WatchSource::from(b.clone())],
            cb,
            sync(),
        );
        b.set(3);

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        let (new, old) = &calls[0];
        let new = new.as_array().map(|a| a.to_vec()).unwrap_or_default();
        let old = old.as_array().map(|a| a.to_vec()).unwrap_or_default();
        assert_eq!(new, vec![Value::from(1), Value::from(3)]);
        assert_eq!(old, vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn shallow_refs_force_trigger() {
        let r = shallow_ref(Value::from_json(json!({ "a": 1 })));
        let (calls, cb) = recorder();
        watch(r.clone(), cb, sync());
        trigger_ref(&r);
        assert_eq!(calls.borrow().len(), 1);
    }

    #[test]
    fn computed_sources() {
        let count = ref_(1);
        let c = count.clone();
        let doubled = computed(move || Value::from(c.get().as_f64().unwrap_or(0.0) * 2.0));
        let (calls, cb) = recorder();
        watch(doubled, cb, WatchOptions::default());
        count.set(5);
        flush_pending_ticks();
        assert_eq!(*calls.borrow(), vec![(Value::from(10), Value::from(2))]);
    }

    #[test]
    fn path_sources() {
        let state = reactive(Value::from_json(json!({ "user": { "name": "ada" } })));
        let (calls, cb) = recorder();
        watch(WatchSource::path(state.clone(), "user.name"), cb, sync());

        let user = state.as_object().map(|o| o.get("user")).unwrap_or_default();
        if let Value::Object(user) = user {
            user.assign("name", "grace");
        }
        assert_eq!(*calls.borrow(), vec![(Value::from("grace"), Value::from("ada"))]);
    }

    #[test]
    fn invalid_paths_warn_and_watch_nothing() {
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let sink = warnings.clone();
        crate::error::set_warn_handler(move |e| sink.borrow_mut().push(e.clone()));
        crate::config::configure(|c| c.dev_mode = true);

        let handle = watch(WatchSource::path(Value::object(), "a[0]"), |_, _| {}, sync());

        assert_eq!(handle.watcher().dep_count(), 0);
        assert_eq!(
            warnings.borrow().as_slice(),
            &[ReactiveError::InvalidPath("a[0]".into())]
        );
        crate::error::clear_warn_handler();
    }

    #[test]
    fn deep_option_traverses_getter_results() {
        let state = reactive(Value::from_json(json!({ "nested": { "a": 1 } })));
        let nested = state.as_object().map(|o| o.get("nested")).unwrap_or_default();

        let getter = |s: &Value| {
            let s = s.clone();
            WatchSource::getter(move || s.as_object().map(|o| o.get("nested")).unwrap_or_default())
        };
        let (shallow_calls, cb) = recorder();
        watch(getter(&state), cb, sync());
        let (deep_calls, cb) = recorder();
        watch(
            getter(&state),
            cb,
            WatchOptions {
                deep: true,
                flush: Flush::Sync,
                ..Default::default()
            },
        );

        if let Value::Object(nested) = &nested {
            nested.assign("a", 2);
        }
        assert!(shallow_calls.borrow().is_empty());
        assert_eq!(*deep_calls.borrow(), vec![(nested.clone(), nested)]);
    }

    #[test]
    fn debugger_hooks_receive_track_and_trigger_events() {
        use crate::observer::set;
        use crate::reactive::dep::{DebuggerEventKind, TrackOp, TriggerOp};

        crate::config::configure(|c| c.dev_mode = true);
        type Events = Rc<RefCell<Vec<(DebuggerEventKind, Option<String>)>>>;
        let tracked: Events = Rc::new(RefCell::new(Vec::new()));
        let triggered: Events = Rc::new(RefCell::new(Vec::new()));
        let (t, g) = (tracked.clone(), triggered.clone());

        let state = reactive(Value::from_json(json!({ "a": 1, "list": [1] })));
        let s = state.clone();
        let handle = watch(
            WatchSource::getter(move || {
                if let Some(o) = s.as_object() {
                    o.keys();
                    o.get("a");
                    if let Value::Array(list) = o.get("list") {
                        list.len();
                    }
                }
                Value::Undefined
            }),
            |_, _| {},
            WatchOptions {
                flush: Flush::Sync,
                on_track: Some(Box::new(move |e| t.borrow_mut().push((e.kind, e.key.clone())))),
                on_trigger: Some(Box::new(move |e| g.borrow_mut().push((e.kind, e.key.clone())))),
                ..Default::default()
            },
        );

        assert!(tracked
            .borrow()
            .contains(&(DebuggerEventKind::Track(TrackOp::Get), Some("a".into()))));
        assert!(tracked
            .borrow()
            .contains(&(DebuggerEventKind::Track(TrackOp::Iterate), None)));

        let obj = state.as_object().cloned().unwrap_or_default();
        obj.assign("a", 2);
        set(&state, "b", 3);
        if let Value::Array(list) = obj.get_untracked("list") {
            list.push(2);
        }

        assert_eq!(
            *triggered.borrow(),
            vec![
                (DebuggerEventKind::Trigger(TriggerOp::Set), Some("a".into())),
                (DebuggerEventKind::Trigger(TriggerOp::Add), Some("b".into())),
                (DebuggerEventKind::Trigger(TriggerOp::ArrayMutation), Some("push".into())),
            ]
        );
        handle.stop();
        crate::config::set_config(crate::config::Config::default());
    }

    #[test]
    fn stop_ends_the_watch() {
        let count = ref_(0);
        let (calls, cb) = recorder();
        let handle = watch(count.clone(), cb, sync());
        handle.stop();
        count.set(1);
        assert!(calls.borrow().is_empty());
        assert!(!handle.is_active());
    }

    #[test]
    fn callback_panics_are_reported() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        crate::error::set_error_handler(move |e| sink.borrow_mut().push(e.to_string()));

        let count = ref_(0);
        watch(
            count.clone(),
            |_, _| panic!("callback failed"),
            WatchOptions {
                expression: Some("count".into()),
                flush: Flush::Sync,
                ..Default::default()
            },
        );
        count.set(1);

        assert_eq!(
            errors.borrow().as_slice(),
            &["Error in callback for watcher \"count\": \"callback failed\"".to_string()]
        );
        crate::error::clear_error_handler();
    }

    #[test]
    fn effects_rerun_on_change() {
        let count = ref_(0);
        let runs = Rc::new(Cell::new(0));
        let (c, n) = (count.clone(), runs.clone());
        watch_effect(
            move || {
                c.get();
                n.set(n.get() + 1);
            },
            EffectOptions::default(),
        );
        assert_eq!(runs.get(), 1);

        count.set(1);
        count.set(2);
        flush_pending_ticks();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn effects_do_not_requeue_themselves() {
        let count = ref_(0);
        let runs = Rc::new(Cell::new(0));
        let (c, n) = (count.clone(), runs.clone());
        watch_effect(
            move || {
                n.set(n.get() + 1);
                let next = c.get().as_f64().unwrap_or(0.0) + 1.0;
                if next < 3.0 {
                    c.set(next);
                }
            },
            EffectOptions::default(),
        );
        flush_pending_ticks();
        assert_eq!(runs.get(), 1);
        assert_eq!(count.get(), Value::from(1));
    }

    #[test]
    fn sync_and_post_effects() {
        let count = ref_(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let (c, l) = (count.clone(), log.clone());
        watch_post_effect(move || {
            c.get();
            l.borrow_mut().push("post");
        });
        let (c, l) = (count.clone(), log.clone());
        watch_sync_effect(move || {
            c.get();
            l.borrow_mut().push("sync");
        });
        log.borrow_mut().clear();

        count.set(1);
        assert_eq!(*log.borrow(), vec!["sync"]);
        flush_pending_ticks();
        assert_eq!(*log.borrow(), vec!["sync", "post"]);
    }
}
