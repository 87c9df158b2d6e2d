//! Batched Update Scheduler
//!
//! Watcher wake-ups are batched into a process-wide queue and drained in a
//! micro-task, so that N mutations in one turn produce one re-evaluation
//! per affected watcher instead of N.
//!
//! # Ordering
//!
//! The queue drains in ascending watcher id order:
//!
//! 1. Parents are created before children, so parents update first.
//! 2. User watchers are created before the render watcher on the same
//!    scope, so they run first.
//! 3. A watcher torn down during a parent's update is skipped by its own
//!    `run` when its queue entry comes up.
//!
//! Watchers enqueued *during* the drain are inserted at their id-sorted
//! position among the not-yet-processed entries and run in the same flush.
//!
//! # Runaway updates
//!
//! A watcher whose callback re-triggers its own dependencies re-enters the
//! queue every iteration. Each re-entry during one flush is counted; past
//! [`MAX_UPDATE_COUNT`] the scheduler emits one "infinite update loop"
//! diagnostic and drops that watcher for the remainder of the flush. Other
//! queued watchers still run.
//!
//! # Post-flush hooks
//!
//! External collaborators (keep-alive activation, updated lifecycle hooks)
//! register callbacks on two lists while the flush runs; both lists are
//! drained — activated first — after the queue empties and the scheduler
//! state resets.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::config;
use crate::diagnostics::{handle_error, warn};

use super::next_tick::next_tick;
use super::watcher::Watcher;

/// Re-entries of a single watcher tolerated within one flush before it is
/// diagnosed as an infinite update loop and dropped.
pub const MAX_UPDATE_COUNT: u32 = 100;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Watcher>,
    has: HashSet<u64>,
    circular: HashMap<u64, u32>,
    halted: HashSet<u64>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
    static ACTIVATED_HOOKS: RefCell<Vec<Box<dyn FnOnce()>>> = const { RefCell::new(Vec::new()) };
    static UPDATED_HOOKS: RefCell<Vec<Box<dyn FnOnce()>>> = const { RefCell::new(Vec::new()) };
}

/// Enqueue a watcher for the next flush.
///
/// Duplicate ids are dropped while the queue is idle. During a flush the
/// watcher is inserted at its id-sorted position among the entries not yet
/// drained, so it runs in this flush.
pub fn queue_watcher(watcher: Watcher) {
    let id = watcher.id();
    let schedule_flush = SCHEDULER.with(|cell| {
        let mut state = cell.borrow_mut();
        if state.has.contains(&id) || state.halted.contains(&id) {
            return false;
        }
        state.has.insert(id);
        if !state.flushing {
            state.queue.push(watcher);
        } else {
            let mut at = state.queue.len();
            while at > state.index + 1 && state.queue[at - 1].id() > id {
                at -= 1;
            }
            state.queue.insert(at, watcher);
        }
        if !state.waiting {
            state.waiting = true;
            true
        } else {
            false
        }
    });

    if schedule_flush {
        if config::async_enabled() {
            next_tick(flush_scheduler_queue);
        } else {
            flush_scheduler_queue();
        }
    }
}

/// Drain the queue: sort by id, run each watcher (including ones appended
/// mid-drain), then reset state and fire the post-flush hook lists.
pub fn flush_scheduler_queue() {
    SCHEDULER.with(|cell| {
        let mut state = cell.borrow_mut();
        state.flushing = true;
        state.queue.sort_by_key(Watcher::id);
    });

    loop {
        // Fetch the next entry without holding the borrow across `run`,
        // which may re-enter `queue_watcher`.
        let next = SCHEDULER.with(|cell| {
            let state = cell.borrow();
            state.queue.get(state.index).cloned()
        });
        let Some(watcher) = next else { break };
        let id = watcher.id();

        let halted = SCHEDULER.with(|cell| cell.borrow().halted.contains(&id));
        if !halted {
            if let Some(before) = watcher.before_hook() {
                before();
            }
            SCHEDULER.with(|cell| {
                cell.borrow_mut().has.remove(&id);
            });
            if let Err(err) = watcher.run() {
                handle_error(&err, "watcher evaluation during scheduler flush");
            }
            // A watcher back in `has` re-queued itself from its own run.
            let looped = SCHEDULER.with(|cell| {
                let mut state = cell.borrow_mut();
                if state.has.contains(&id) {
                    let count = state.circular.entry(id).or_insert(0);
                    *count += 1;
                    if *count > MAX_UPDATE_COUNT {
                        state.halted.insert(id);
                        return true;
                    }
                }
                false
            });
            if looped {
                warn(&format!(
                    "possible infinite update loop in watcher \"{}\"",
                    watcher.expression()
                ));
            }
        }

        SCHEDULER.with(|cell| {
            cell.borrow_mut().index += 1;
        });
    }

    SCHEDULER.with(|cell| {
        *cell.borrow_mut() = SchedulerState::default();
    });
    call_post_flush_hooks();
}

/// Register a callback on the "activated" post-flush list.
pub fn queue_activated_hook(hook: impl FnOnce() + 'static) {
    ACTIVATED_HOOKS.with(|hooks| hooks.borrow_mut().push(Box::new(hook)));
}

/// Register a callback on the "updated" post-flush list.
pub fn queue_updated_hook(hook: impl FnOnce() + 'static) {
    UPDATED_HOOKS.with(|hooks| hooks.borrow_mut().push(Box::new(hook)));
}

fn call_post_flush_hooks() {
    let activated: Vec<_> = ACTIVATED_HOOKS.with(|hooks| hooks.borrow_mut().drain(..).collect());
    let updated: Vec<_> = UPDATED_HOOKS.with(|hooks| hooks.borrow_mut().drain(..).collect());
    for hook in activated {
        hook();
    }
    for hook in updated {
        hook();
    }
}

#[cfg(test)]
mod tests {
    use super::super::next_tick;
    use super::super::scope::Scope;
    use super::super::value::{MapRef, Value};
    use super::super::watcher::{noop_callback, Watcher, WatcherOptions};
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn scope_with(entries: Vec<(&str, Value)>) -> Scope {
        Scope::new(Value::Map(MapRef::from_entries(entries)))
    }

    #[test]
    fn duplicate_enqueues_are_dropped_while_idle() {
        let scope = scope_with(vec![("a", Value::from(1))]);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let watcher = Watcher::new(
            &scope,
            "a".into(),
            Arc::new(move |_s: &Scope, _n: &Value, _o: &Value| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            WatcherOptions::default(),
            false,
        );

        scope.root().set("a", Value::from(2));
        scope.root().set("a", Value::from(3));
        scope.root().set("a", Value::from(4));
        next_tick::drain();

        // Three notifications, one run.
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(watcher.value().as_f64(), Some(4.0));
    }

    #[test]
    fn flush_runs_every_queued_watcher_once_in_id_order() {
        let scope = scope_with(vec![("a", Value::from(1))]);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for index in 0..3 {
            let order_clone = order.clone();
            Watcher::new(
                &scope,
                "a".into(),
                Arc::new(move |_s: &Scope, _n: &Value, _o: &Value| {
                    order_clone.lock().unwrap().push(index);
                    Ok(())
                }),
                WatcherOptions::default(),
                false,
            );
        }

        scope.root().set("a", Value::from(2));
        let queued = SCHEDULER.with(|cell| cell.borrow().queue.len());
        assert_eq!(queued, 3);

        next_tick::drain();
        // Creation order is id order here.
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        let drained = SCHEDULER.with(|cell| cell.borrow().queue.len());
        assert_eq!(drained, 0);
    }

    #[test]
    fn post_flush_hooks_run_activated_first() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let scope = scope_with(vec![("a", Value::from(1))]);
        let log_hooks = log.clone();
        let _watcher = Watcher::new(
            &scope,
            "a".into(),
            Arc::new(move |_s: &Scope, _n: &Value, _o: &Value| {
                let log_a = log_hooks.clone();
                queue_updated_hook(move || log_a.lock().unwrap().push("updated"));
                let log_b = log_hooks.clone();
                queue_activated_hook(move || log_b.lock().unwrap().push("activated"));
                Ok(())
            }),
            WatcherOptions::default(),
            false,
        );

        scope.root().set("a", Value::from(2));
        next_tick::drain();

        assert_eq!(*log.lock().unwrap(), vec!["activated", "updated"]);
    }

    #[test]
    fn watcher_queued_during_flush_runs_in_same_flush() {
        let scope = scope_with(vec![("a", Value::from(1)), ("b", Value::from(10))]);
        let b_runs = Arc::new(AtomicUsize::new(0));

        // Second watcher (higher id) watches "b".
        let b_runs_clone = b_runs.clone();
        let _b_watcher = Watcher::new(
            &scope,
            "b".into(),
            Arc::new(move |_s: &Scope, _n: &Value, _o: &Value| {
                b_runs_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            WatcherOptions::default(),
            false,
        );

        // The later-created watcher mutates "b" from its callback, which
        // enqueues the b-watcher mid-flush.
        let scope_clone = scope.clone();
        let _a_watcher = Watcher::new(
            &scope,
            "a".into(),
            Arc::new(move |_s: &Scope, _n: &Value, _o: &Value| {
                scope_clone.root().set("b", Value::from(11));
                Ok(())
            }),
            WatcherOptions::default(),
            false,
        );

        scope.root().set("a", Value::from(2));
        next_tick::drain();

        assert_eq!(b_runs.load(Ordering::SeqCst), 1);
    }
}
