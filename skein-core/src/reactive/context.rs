//! Current-Target Stack
//!
//! At most one watcher is "current" per execution context: the one whose
//! reads are being recorded at this instant. Nested evaluations (a lazy
//! watcher evaluated from inside a render watcher's getter) need the
//! previous target restored afterwards, so targets form a thread-local
//! stack. Reentrancy is explicit: every [`push_target`] must be paired with
//! a [`pop_target`]; nothing is saved implicitly.
//!
//! Pushing `None` installs a frame that suppresses dependency tracking,
//! which collaborators use for framework-internal reads that must not
//! subscribe anything.

use std::cell::RefCell;

use super::watcher::Watcher;

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

/// Push a watcher (or a tracking-suppression frame) as the current target.
pub fn push_target(target: Option<Watcher>) {
    TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
}

/// Pop the current target, restoring the previous one (possibly none).
pub fn pop_target() {
    TARGET_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
}

/// The watcher whose reads are being recorded right now, if any.
pub fn current_target() -> Option<Watcher> {
    TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
}

/// Cheap check used by read paths to skip tracking work entirely.
pub(crate) fn tracking_active() -> bool {
    TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
}
