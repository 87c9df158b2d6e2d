//! Next-Tick Primitive
//!
//! The hop from "a watcher is enqueued" to "the scheduler drains" crosses a
//! micro-task boundary. This module is that boundary, abstracted out: a
//! thread-local callback queue filled by [`next_tick`] and emptied by
//! [`drain`]. The embedding event loop calls `drain` once per turn; test
//! suites call it wherever a turn boundary belongs.
//!
//! `drain` keeps going until the queue is quiescent, so callbacks scheduled
//! by other callbacks run inside the same checkpoint — the way host
//! platforms exhaust their micro-task queue before yielding.

use std::cell::RefCell;

thread_local! {
    static CALLBACKS: RefCell<Vec<Box<dyn FnOnce()>>> = const { RefCell::new(Vec::new()) };
}

/// Schedule `callback` to run at the next micro-task checkpoint.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    CALLBACKS.with(|queue| queue.borrow_mut().push(Box::new(callback)));
}

/// Whether any callbacks are waiting.
pub fn pending() -> bool {
    CALLBACKS.with(|queue| !queue.borrow().is_empty())
}

/// Run pending callbacks until the queue is quiescent. Returns the number
/// of callbacks run.
pub fn drain() -> usize {
    let mut ran = 0;
    loop {
        let batch: Vec<Box<dyn FnOnce()>> =
            CALLBACKS.with(|queue| queue.borrow_mut().drain(..).collect());
        if batch.is_empty() {
            return ran;
        }
        for callback in batch {
            callback();
            ran += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn callbacks_run_on_drain_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));

        let log_a = log.clone();
        next_tick(move || log_a.borrow_mut().push(1));
        let log_b = log.clone();
        next_tick(move || log_b.borrow_mut().push(2));

        assert!(pending());
        assert_eq!(drain(), 2);
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert!(!pending());
    }

    #[test]
    fn nested_callbacks_run_in_the_same_drain() {
        let count = Rc::new(Cell::new(0));
        let count_outer = count.clone();
        next_tick(move || {
            count_outer.set(count_outer.get() + 1);
            let count_inner = count_outer.clone();
            next_tick(move || count_inner.set(count_inner.get() + 1));
        });

        assert_eq!(drain(), 2);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn drain_on_empty_queue_is_harmless() {
        assert_eq!(drain(), 0);
    }
}
