//! Watcher Queue
//!
//! Watchers notified during a tick are collected here and run together in a
//! single flush at the end of the tick.
//!
//! # Algorithm
//!
//! 1. [`queue_watcher`] adds a watcher unless it is already pending. Outside
//!    a flush it is appended; during a flush it is inserted at its sorted
//!    position after the watcher currently running, so it still runs in
//!    this flush. The first enqueue of a cycle schedules the flush with
//!    [`next_tick`].
//!
//! 2. [`flush_scheduler_queue`] sorts the queue by `(post, id)` and runs the
//!    watchers in order, re-reading the length each step so late arrivals
//!    are included. A watcher is cleared from the pending set right before
//!    it runs, so it may be queued again. A watcher queued again more than
//!    `max_update_count` times in one flush is reported as an infinite loop
//!    and skipped for the rest of the flush.
//!
//!    A watcher that panics does not stop the flush: the remaining watchers
//!    still run, and the first panic is re-raised once the flush completes.
//!
//! 3. After the loop, owners queued with [`queue_activated_component`]
//!    receive `activated`, then owners of render watchers that ran receive
//!    `updated`, children first.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::config;
use crate::error::{warn, ReactiveError};
use crate::reactive::context;
use crate::reactive::subscriber::SubscriberId;
use crate::reactive::watcher::{Owner, Watcher, WatcherKind};

use super::tick::next_tick;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Rc<Watcher>>,
    activated: Vec<Rc<dyn Owner>>,
    /// Watchers queued and not yet run.
    has: HashSet<SubscriberId>,
    /// Re-queue counts for loop detection.
    circular: HashMap<SubscriberId, usize>,
    /// Watchers skipped for the rest of this flush.
    halted: HashSet<SubscriberId>,
    /// A flush has been scheduled.
    waiting: bool,
    flushing: bool,
    index: usize,
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

/// Schedule `watcher` to run in the next flush.
pub fn queue_watcher(watcher: Rc<Watcher>) {
    let id = watcher.id();
    if watcher.kind().no_recurse() && context::current_target_id() == Some(id) {
        return;
    }

    let queued = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if !state.has.insert(id) {
            return false;
        }
        if !state.flushing {
            state.queue.push(watcher.clone());
        } else {
            let key = watcher.sort_key();
            let mut pos = state.queue.len();
            while pos > state.index + 1 && state.queue[pos - 1].sort_key() > key {
                pos -= 1;
            }
            state.queue.insert(pos, watcher.clone());
        }
        true
    });
    if queued {
        tracing::trace!(watcher = %id, "queued watcher");
        schedule_flush();
    }
}

/// Queue `owner` to receive `activated` after the next flush.
pub fn queue_activated_component(owner: Rc<dyn Owner>) {
    STATE.with(|state| state.borrow_mut().activated.push(owner));
    schedule_flush();
}

/// Whether a flush is currently running.
pub fn is_flushing() -> bool {
    STATE.with(|state| state.borrow().flushing)
}

/// Number of watchers waiting for (or in) the current flush.
pub fn pending_watchers() -> usize {
    STATE.with(|state| {
        let state = state.borrow();
        state.queue.len().saturating_sub(state.index)
    })
}

fn schedule_flush() {
    let first = STATE.with(|state| {
        let mut state = state.borrow_mut();
        !std::mem::replace(&mut state.waiting, true)
    });
    if !first {
        return;
    }
    if config::config().async_mode {
        next_tick(flush_scheduler_queue);
    } else {
        flush_scheduler_queue();
    }
}

/// Resets the scheduler even if a render watcher panics mid-flush.
struct ResetGuard;

impl Drop for ResetGuard {
    fn drop(&mut self) {
        STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.queue.clear();
            state.activated.clear();
            state.has.clear();
            state.circular.clear();
            state.halted.clear();
            state.waiting = false;
            state.flushing = false;
            state.index = 0;
        });
    }
}

/// Run every queued watcher, then the post-flush hooks.
pub fn flush_scheduler_queue() {
    let size = STATE.with(|state| {
        let mut state = state.borrow_mut();
        state.flushing = true;
        state.index = 0;
        state.queue.sort_by_key(|w| w.sort_key());
        state.queue.len()
    });
    tracing::debug!(watchers = size, "flush start");
    let guard = ResetGuard;
    let cfg = config::config();
    let mut failure: Option<Box<dyn Any + Send>> = None;

    loop {
        let next = STATE.with(|state| {
            let state = state.borrow();
            state.queue.get(state.index).cloned()
        });
        let Some(watcher) = next else {
            break;
        };
        let id = watcher.id();

        let halted = STATE.with(|state| state.borrow().halted.contains(&id));
        if !halted {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                watcher.run_before();
                STATE.with(|state| state.borrow_mut().has.remove(&id));
                watcher.run();
            }));
            if let Err(payload) = outcome {
                tracing::error!(watcher = %id, expression = %watcher.expression(), "watcher panicked during flush");
                failure.get_or_insert(payload);
            }

            if cfg.dev_mode {
                check_circular(&watcher, cfg.max_update_count);
            }
        }
        STATE.with(|state| state.borrow_mut().index += 1);
    }

    let (activated, ran) = STATE.with(|state| {
        let mut state = state.borrow_mut();
        (std::mem::take(&mut state.activated), state.queue.clone())
    });
    drop(guard);
    tracing::debug!(watchers = ran.len(), "flush end");

    for owner in activated {
        owner.activated();
    }
    call_updated_hooks(&ran);

    // The rest of the queue has run; surface the first failure to the caller.
    if let Some(payload) = failure {
        panic::resume_unwind(payload);
    }
}

fn check_circular(watcher: &Watcher, limit: usize) {
    let id = watcher.id();
    let tripped = STATE.with(|state| {
        let mut state = state.borrow_mut();
        if !state.has.contains(&id) {
            return false;
        }
        let count = state.circular.entry(id).or_insert(0);
        *count += 1;
        if *count > limit {
            state.halted.insert(id);
            true
        } else {
            false
        }
    });
    if tripped {
        let expression = match watcher.kind() {
            WatcherKind::Render => "render function".to_string(),
            _ => watcher.expression().to_string(),
        };
        warn(ReactiveError::InfiniteUpdateLoop { expression, limit });
    }
}

fn call_updated_hooks(ran: &[Rc<Watcher>]) {
    for watcher in ran.iter().rev() {
        if watcher.kind() != WatcherKind::Render {
            continue;
        }
        if let Some(owner) = watcher.owner() {
            if owner.is_mounted() && !owner.is_destroyed() {
                owner.updated();
            }
        }
    }
}
