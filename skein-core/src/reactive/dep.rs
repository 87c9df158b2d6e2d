//! Dependency Nodes
//!
//! A [`Dep`] is the atom of the observer graph: a set of subscribed watchers
//! plus a process-unique, monotonically increasing identity. One dep exists
//! per observed container (the *shape* dep, fired when properties are added
//! or removed) and one per reactive map key (fired when that key's value
//! changes).
//!
//! The dep does not decide whether an edge is new; it hands itself to the
//! current target's `add_dep`, and the watcher's id bookkeeping prevents
//! double subscription across re-evaluations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::config;

use super::context::current_target;
use super::watcher::Watcher;

/// Counter for generating unique dep IDs.
static DEP_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_dep_id() -> u64 {
    DEP_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A dependency node: an observable atom subscribed to by watchers.
///
/// Cloning a `Dep` aliases the same node; the id travels with the shared
/// subscriber list.
pub struct Dep {
    id: u64,
    subs: Arc<RwLock<Vec<Watcher>>>,
}

impl Dep {
    pub fn new() -> Dep {
        Dep {
            id: next_dep_id(),
            subs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// The dep's process-unique id. Ids are handed out in creation order.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Append a subscriber. Callers go through `Watcher::add_dep`, which
    /// guarantees each watcher appears at most once.
    pub(crate) fn add_sub(&self, watcher: Watcher) {
        self.subs.write().expect("subs lock poisoned").push(watcher);
    }

    /// Remove a subscriber by watcher id. O(n); subscriber lists are short.
    pub(crate) fn remove_sub(&self, watcher_id: u64) {
        self.subs
            .write()
            .expect("subs lock poisoned")
            .retain(|w| w.id() != watcher_id);
    }

    /// Record this dep against the current target, if one exists. The
    /// *watcher* decides whether the edge is new.
    pub fn depend(&self) {
        if let Some(target) = current_target() {
            target.add_dep(self);
        }
    }

    /// Notify every subscriber that this dep changed.
    ///
    /// Iterates a snapshot of the subscriber list, so subscribers removed by
    /// a callback mid-notification are still notified this round. In
    /// deterministic mode (`config::set_async(false)`) the snapshot is
    /// sorted by watcher id so notifications occur in creation order; `sync`
    /// watchers run during this call, so their order relative to queued
    /// asynchronous watchers is notification call order, not id order.
    pub fn notify(&self) {
        let mut snapshot: Vec<Watcher> = self.subs.read().expect("subs lock poisoned").clone();
        if !config::async_enabled() {
            snapshot.sort_by_key(|w| w.id());
        }
        for watcher in snapshot {
            watcher.update();
        }
    }

    /// Number of current subscribers.
    pub fn sub_count(&self) -> usize {
        self.subs.read().expect("subs lock poisoned").len()
    }

    /// Ids of current subscribers, in insertion order. For instrumentation
    /// and tests.
    pub fn sub_ids(&self) -> Vec<u64> {
        self.subs
            .read()
            .expect("subs lock poisoned")
            .iter()
            .map(|w| w.id())
            .collect()
    }
}

impl Clone for Dep {
    fn clone(&self) -> Dep {
        Dep {
            id: self.id,
            subs: Arc::clone(&self.subs),
        }
    }
}

impl Default for Dep {
    fn default() -> Dep {
        Dep::new()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.id)
            .field("sub_count", &self.sub_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dep_ids_are_unique_and_monotonic() {
        let a = Dep::new();
        let b = Dep::new();
        let c = Dep::new();
        assert!(a.id() < b.id());
        assert!(b.id() < c.id());
    }

    #[test]
    fn clone_shares_the_subscriber_list() {
        let a = Dep::new();
        let b = a.clone();
        assert_eq!(a.id(), b.id());
        assert_eq!(a.sub_count(), b.sub_count());
    }

    #[test]
    fn depend_without_target_is_a_no_op() {
        let dep = Dep::new();
        dep.depend();
        assert_eq!(dep.sub_count(), 0);
    }

    #[test]
    fn notify_on_empty_dep_is_harmless() {
        let dep = Dep::new();
        dep.notify();
        assert_eq!(dep.sub_count(), 0);
    }
}
