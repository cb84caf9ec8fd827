//! Lattice Reactive
//!
//! This crate provides the dependency-tracking reactivity engine behind the
//! Lattice UI framework. It implements:
//!
//! - Observable objects and arrays whose reads track and whose writes notify
//! - Watchers in three modes: lazy (computed), sync and scheduled
//! - A batching scheduler that flushes watchers parents-first once per tick
//! - Refs, computed values, readonly views, `watch` and `watch_effect`
//!
//! # Architecture
//!
//! - `observer`: the value model and the per-property deps on it
//! - `reactive`: deps, the tracking context, watchers and effect scopes
//! - `scheduler`: the watcher queue and `next_tick`
//! - `api`: the composition layer built on the three above
//! - `config` / `error`: per-thread tunables and the error/warn channels
//!
//! The engine is single-threaded. Each thread owns an independent graph,
//! configuration and queue.
//!
//! # Example
//!
//! ```rust
//! use lattice_reactive::{flush_pending_ticks, reactive, watch, Value, WatchSource};
//! use serde_json::json;
//!
//! let state = reactive(Value::from_json(json!({ "count": 1 })));
//! let s = state.clone();
//! watch(
//!     WatchSource::getter(move || s.as_object().map(|o| o.get("count")).unwrap_or_default()),
//!     |new, old| println!("count: {old:?} -> {new:?}"),
//!     Default::default(),
//! );
//!
//! if let Some(obj) = state.as_object() {
//!     obj.assign("count", 2);
//!     obj.assign("count", 3);
//! }
//! // One callback: count: Number(1.0) -> Number(3.0)
//! flush_pending_ticks();
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod observer;
pub mod reactive;
pub mod scheduler;

pub use api::{
    computed, computed_with_setter, is_proxy, is_reactive, is_readonly, is_ref, is_shallow, mark_raw,
    readonly, ref_, shallow_reactive, shallow_readonly, shallow_ref, to_raw, to_ref, to_refs,
    trigger_ref, unref, watch, watch_effect, watch_post_effect, watch_sync_effect, Computed,
    EffectOptions, Ref, WatchHandle, WatchOptions, WatchSource,
};
pub use api::reactive::reactive;
pub use config::{configure, Config};
pub use error::{ReactiveError, Result};
pub use observer::array::Array;
pub use observer::object::{Object, PropertyDescriptor};
pub use observer::value::{has_changed, Key, Value, View};
pub use observer::{define_reactive, del, observe, set, Observer};
pub use reactive::{effect_scope, Dep, EffectScope, Flush, Owner, Watcher, WatcherKind, WatcherOptions};
pub use scheduler::{flush_pending_ticks, next_tick};
