//! Dependency Tracking
//!
//! This module implements the core of the engine: deps, the tracking
//! context, and watchers.
//!
//! # Concepts
//!
//! ## Deps
//!
//! A [`Dep`] stands for one observable slot. Reading the slot while a
//! tracking target is active subscribes that target; writing the slot
//! notifies every subscriber.
//!
//! ## Watchers
//!
//! A [`Watcher`] runs a getter with itself as the tracking target, so every
//! dep the getter touches becomes one of its dependencies. What happens on
//! notification depends on its [`WatcherKind`]: computed watchers are marked
//! dirty, sync watchers re-run immediately, and everything else is queued on
//! the scheduler.
//!
//! ## Scopes
//!
//! An [`EffectScope`] collects the watchers created inside it so they can be
//! stopped together.

pub mod context;
pub mod dep;
pub mod scope;
pub mod subscriber;
pub mod traverse;
pub mod watcher;

pub use context::{is_tracking, untracked, TargetGuard};
pub use dep::{DebuggerEvent, DebuggerEventKind, Dep, DepId, TrackOp, TriggerOp};
pub use scope::{effect_scope, get_current_scope, on_scope_dispose, EffectScope};
pub use subscriber::{Subscriber, SubscriberId};
pub use traverse::traverse;
pub use watcher::{Flush, Owner, Watcher, WatcherKind, WatcherOptions};
