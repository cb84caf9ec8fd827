//! Tracking Context
//!
//! The tracking context records which subscriber is currently evaluating.
//! Reads of reactive state consult it: if a target is active, the dep being
//! read registers that target as a subscriber.
//!
//! # Implementation
//!
//! A thread-local stack holds the active targets. Entering an evaluation
//! pushes the subscriber; leaving pops it. Nested evaluation (a computed read
//! inside a render, a watcher created inside another watcher's getter) simply
//! stacks. A `None` entry pauses tracking for the duration of its frame.
//!
//! Push and pop must pair up even when a getter panics, so the primary API is
//! the [`TargetGuard`], which pops on drop.

use std::cell::RefCell;
use std::rc::Rc;

use super::subscriber::{Subscriber, SubscriberId};

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Rc<dyn Subscriber>>>> = const { RefCell::new(Vec::new()) };
}

/// Push a tracking target. Prefer [`TargetGuard::enter`].
pub fn push_target(target: Option<Rc<dyn Subscriber>>) {
    TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
}

/// Pop the innermost tracking target, returning it.
pub fn pop_target() -> Option<Rc<dyn Subscriber>> {
    TARGET_STACK.with(|stack| stack.borrow_mut().pop().flatten())
}

/// The subscriber reads are currently attributed to, if any.
pub fn current_target() -> Option<Rc<dyn Subscriber>> {
    TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
}

pub fn current_target_id() -> Option<SubscriberId> {
    TARGET_STACK.with(|stack| stack.borrow().last().and_then(|t| t.as_ref().map(|t| t.id())))
}

/// Check if reads are currently being tracked.
pub fn is_tracking() -> bool {
    TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
}

/// Depth of the target stack, for diagnostics and tests.
pub fn depth() -> usize {
    TARGET_STACK.with(|stack| stack.borrow().len())
}

/// Run `f` without attributing its reads to the current target.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _guard = TargetGuard::enter(None);
    f()
}

/// Guard that pops the target when dropped.
///
/// This keeps the stack balanced even if the evaluation panics.
pub struct TargetGuard {
    id: Option<SubscriberId>,
}

impl TargetGuard {
    /// Make `target` the active tracking target until the guard drops.
    pub fn enter(target: Option<Rc<dyn Subscriber>>) -> Self {
        let id = target.as_ref().map(|t| t.id());
        push_target(target);
        Self { id }
    }
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        let popped = TARGET_STACK.with(|stack| stack.borrow_mut().pop());

        // Verify we're popping the right frame.
        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.as_ref().map(|t| t.id()),
                self.id,
                "TargetGuard mismatch: expected {:?}",
                self.id
            );
        }
    }
}
