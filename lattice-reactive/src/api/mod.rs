//! Composition API
//!
//! The user-facing layer over observers and watchers: refs, computed
//! values, reactive and readonly containers, and watchers driven by
//! callbacks or side effects.

pub mod computed;
pub mod reactive;
pub mod readonly;
pub mod ref_;
pub mod watch;

pub use computed::{computed, computed_with_setter, Computed};
pub use reactive::{is_proxy, is_reactive, is_shallow, mark_raw, reactive, shallow_reactive, to_raw};
pub use readonly::{is_readonly, readonly, shallow_readonly};
pub use ref_::{is_ref, ref_, shallow_ref, to_ref, to_refs, trigger_ref, unref, Ref};
pub use watch::{
    parse_path, watch, watch_effect, watch_post_effect, watch_sync_effect, EffectOptions, WatchHandle,
    WatchOptions, WatchSource,
};
