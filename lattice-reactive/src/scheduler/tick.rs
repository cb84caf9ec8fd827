//! Deferred callbacks.
//!
//! [`next_tick`] queues a callback for the end of the current tick. The
//! engine has no event loop of its own: the host installs a driver with
//! [`set_tick_driver`], which is invoked once whenever the queue goes from
//! empty to non-empty, and later calls [`flush_pending_ticks`] from its
//! microtask (or equivalent) hook. Tests simply call `flush_pending_ticks()`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::invoke_with_error_handling;

type TickCallback = Box<dyn FnOnce()>;

thread_local! {
    static CALLBACKS: RefCell<Vec<TickCallback>> = const { RefCell::new(Vec::new()) };
    static PENDING: Cell<bool> = const { Cell::new(false) };
    static DRIVER: RefCell<Option<Rc<dyn Fn()>>> = const { RefCell::new(None) };
}

/// Queue `callback` to run when pending ticks are flushed.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    CALLBACKS.with(|cbs| cbs.borrow_mut().push(Box::new(callback)));
    if !PENDING.with(|p| p.replace(true)) {
        let driver = DRIVER.with(|d| d.borrow().clone());
        if let Some(driver) = driver {
            driver();
        }
    }
}

/// Whether callbacks are waiting for a flush.
pub fn has_pending_ticks() -> bool {
    CALLBACKS.with(|cbs| !cbs.borrow().is_empty())
}

/// Run queued callbacks until the queue is empty, including callbacks queued
/// by the callbacks themselves. Returns how many ran.
///
/// A panicking callback is reported with context `"nextTick"` and does not
/// prevent the rest from running.
pub fn flush_pending_ticks() -> usize {
    let mut ran = 0;
    loop {
        let batch = CALLBACKS.with(|cbs| cbs.take());
        PENDING.with(|p| p.set(false));
        if batch.is_empty() {
            return ran;
        }
        for callback in batch {
            invoke_with_error_handling(|| "nextTick".to_string(), callback);
            ran += 1;
        }
    }
}

/// Install the hook that asks the host to call [`flush_pending_ticks`] soon.
pub fn set_tick_driver(driver: impl Fn() + 'static) {
    DRIVER.with(|d| *d.borrow_mut() = Some(Rc::new(driver)));
}

pub fn clear_tick_driver() {
    DRIVER.with(|d| *d.borrow_mut() = None);
}
