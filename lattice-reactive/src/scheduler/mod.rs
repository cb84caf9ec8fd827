//! Update Scheduler
//!
//! Batches watcher runs: notifications during one tick only enqueue, and a
//! single flush at the end of the tick runs each queued watcher once, parents
//! before children. See [`queue`] for the algorithm and [`tick`] for how the
//! flush is deferred.

pub mod queue;
pub mod tick;

pub use queue::{
    flush_scheduler_queue, is_flushing, pending_watchers, queue_activated_component, queue_watcher,
};
pub use tick::{clear_tick_driver, flush_pending_ticks, has_pending_ticks, next_tick, set_tick_driver};
