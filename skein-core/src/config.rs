//! Runtime Configuration
//!
//! Process-wide switches that change how the reactive core behaves. These
//! are read on the hot paths of notification and scheduling, so they are
//! plain atomics rather than locked structures.
//!
//! # Switches
//!
//! - `async`: when enabled (the default), watcher wake-ups are batched and
//!   drained on the next micro-task. When disabled, notification snapshots
//!   are sorted by watcher id and the scheduler flushes synchronously, which
//!   makes the order of callback invocations a pure function of watcher ids.
//!   Test suites and debugging sessions turn this off.
//!
//! - `ssr`: marks the process as a server-rendering context. Observation is
//!   suppressed entirely; server renders are one-shot and never re-run.

use std::sync::atomic::{AtomicBool, Ordering};

static ASYNC: AtomicBool = AtomicBool::new(true);
static SSR: AtomicBool = AtomicBool::new(false);

/// Whether watcher wake-ups go through the batched micro-task scheduler.
pub fn async_enabled() -> bool {
    ASYNC.load(Ordering::Relaxed)
}

/// Enable or disable asynchronous (batched) update delivery.
pub fn set_async(enabled: bool) {
    ASYNC.store(enabled, Ordering::Relaxed);
}

/// Whether this process is a server-rendering context.
pub fn ssr() -> bool {
    SSR.load(Ordering::Relaxed)
}

/// Mark or unmark this process as a server-rendering context.
pub fn set_ssr(enabled: bool) {
    SSR.store(enabled, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn async_defaults_on() {
        assert!(async_enabled());
    }

    #[test]
    fn ssr_defaults_off() {
        assert!(!ssr());
    }
}
