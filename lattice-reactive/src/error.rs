//! Error Reporting
//!
//! Every user-facing failure in the reactive engine funnels through one of
//! two channels:
//!
//! - [`handle_error`] for failures raised by user code (a panicking getter,
//!   watch callback, computed getter or `next_tick` callback). The panic is
//!   caught at the call site, tagged with a context string and routed here.
//! - [`warn`] for development-time diagnostics (illegal mutation, invalid
//!   watch path, runaway update loops). Warnings never interrupt execution.
//!
//! Both channels default to `tracing` events and can be overridden by the
//! host application.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use thiserror::Error;

use crate::config;

/// Errors and diagnostics produced by the reactive engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactiveError {
    /// A user callback panicked.
    #[error("Error in {info}: \"{message}\"")]
    Callback { info: String, message: String },

    /// A watch path could not be parsed.
    #[error(
        "Failed watching path: \"{0}\" Watcher only accepts simple dot-delimited paths. \
         For full control, use a getter instead."
    )]
    InvalidPath(String),

    /// A watcher kept re-triggering itself within a single flush.
    #[error("You may have an infinite update loop in watcher with expression \"{expression}\" (ran more than {limit} times in one flush)")]
    InfiniteUpdateLoop { expression: String, limit: usize },

    /// A computed value without a setter was written.
    #[error("Write operation failed: computed value is readonly")]
    ReadonlyComputed,

    /// A readonly view was written through.
    #[error("Set operation on key \"{0}\" failed: target is readonly.")]
    ReadonlyTarget(String),

    /// A readonly view was deleted through.
    #[error("Delete operation on key \"{0}\" failed: target is readonly.")]
    ReadonlyDelete(String),

    /// A key was added to or removed from a component's root data object.
    #[error("Avoid adding or deleting reactive properties on a component's root data object at runtime - declare it upfront instead.")]
    RootDataMutation,

    /// `set`/`del` was called on a primitive.
    #[error("Cannot set or delete reactive property on undefined, null, or primitive value: {0}")]
    NotAContainer(String),

    /// `set`/`del` was called on an array with a non-index key.
    #[error("Invalid array key \"{0}\": arrays only accept numeric indices")]
    InvalidArrayKey(String),

    /// A property setter hook flagged the write.
    #[error("{0}")]
    IllegalMutation(String),

    /// `reactive()` was called on something it cannot make reactive.
    #[error("Value cannot be made reactive: {0}")]
    NotReactive(String),

    /// `EffectScope::run` was called after the scope was stopped.
    #[error("cannot run an inactive effect scope.")]
    InactiveScope,

    /// `on_scope_dispose` was called with no scope running.
    #[error("on_scope_dispose() is called when there is no active effect scope to be associated with.")]
    NoActiveScope,

    /// A snapshot hit a cycle.
    #[error("Cannot convert a cyclic structure to JSON")]
    CyclicValue,

    /// The configuration document could not be parsed.
    #[error("Invalid reactivity config: {0}")]
    Config(String),
}

pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

type Handler = Rc<dyn Fn(&ReactiveError)>;

thread_local! {
    static ERROR_HANDLER: RefCell<Option<Handler>> = RefCell::new(None);
    static WARN_HANDLER: RefCell<Option<Handler>> = RefCell::new(None);
}

/// Install the sink for errors raised by user callbacks.
pub fn set_error_handler<F>(handler: F)
where
    F: Fn(&ReactiveError) + 'static,
{
    ERROR_HANDLER.with(|slot| *slot.borrow_mut() = Some(Rc::new(handler)));
}

/// Restore the default (`tracing::error!`) error sink.
pub fn clear_error_handler() {
    ERROR_HANDLER.with(|slot| *slot.borrow_mut() = None);
}

/// Install the sink for development warnings.
pub fn set_warn_handler<F>(handler: F)
where
    F: Fn(&ReactiveError) + 'static,
{
    WARN_HANDLER.with(|slot| *slot.borrow_mut() = Some(Rc::new(handler)));
}

/// Restore the default (`tracing::warn!`) warning sink.
pub fn clear_warn_handler() {
    WARN_HANDLER.with(|slot| *slot.borrow_mut() = None);
}

/// Report an error raised by user code.
pub fn handle_error(err: ReactiveError) {
    // Clone the handler out so it may reinstall itself.
    let handler = ERROR_HANDLER.with(|slot| slot.borrow().clone());
    match handler {
        Some(handler) => handler(&err),
        None => tracing::error!(error = %err, "unhandled error in reactive callback"),
    }
}

/// Emit a development warning. No-op outside dev mode or when silenced.
pub fn warn(err: ReactiveError) {
    let cfg = config::config();
    if !cfg.dev_mode || cfg.silent {
        return;
    }
    let handler = WARN_HANDLER.with(|slot| slot.borrow().clone());
    match handler {
        Some(handler) => handler(&err),
        None => tracing::warn!("[lattice warn]: {err}"),
    }
}

/// Run `f`, turning a panic into a reported [`ReactiveError::Callback`].
///
/// Returns `None` when `f` panicked.
pub fn invoke_with_error_handling<R>(info: impl FnOnce() -> String, f: impl FnOnce() -> R) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            handle_error(ReactiveError::Callback {
                info: info(),
                message: panic_message(payload.as_ref()),
            });
            None
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
