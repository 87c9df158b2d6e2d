//! Scopes
//!
//! A [`Scope`] is the host context watchers evaluate against: the minimal
//! component-instance stand-in the core needs. It owns the root data
//! container (observed as root data, which forbids adding or deleting its
//! top-level keys through the public mutators), the list of watchers
//! created on it, and the cached render watcher.
//!
//! Destroying a scope tears down every watcher. During destruction the
//! per-watcher unlink from the list is skipped; the whole list is dropped
//! at once.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::observer::observe;
use super::value::{MapRef, Value};
use super::watcher::{CallbackFn, WatchSource, Watcher, WatcherOptions};

/// Counter for generating unique scope IDs.
static SCOPE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_scope_id() -> u64 {
    SCOPE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A host context for watchers. Cloning shares the same scope.
pub struct Scope {
    id: u64,
    data: Value,
    watchers: Arc<RwLock<Vec<Watcher>>>,
    render_watcher: Arc<RwLock<Option<Watcher>>>,
    destroyed: Arc<AtomicBool>,
}

impl Scope {
    /// Create a scope over `data`, observing it as root data.
    pub fn new(data: Value) -> Scope {
        observe(&data, true);
        Scope {
            id: next_scope_id(),
            data,
            watchers: Arc::new(RwLock::new(Vec::new())),
            render_watcher: Arc::new(RwLock::new(None)),
            destroyed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The root data value.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// The root data as a map handle. Root data is a map in every supported
    /// configuration; anything else yields a detached empty map.
    pub fn root(&self) -> MapRef {
        match &self.data {
            Value::Map(map) => map.clone(),
            _ => MapRef::new(),
        }
    }

    /// Create and register a watcher on this scope. The returned watcher is
    /// the cancellation handle; call [`Watcher::teardown`] to stop it.
    pub fn watch(
        &self,
        source: impl Into<WatchSource>,
        cb: Arc<CallbackFn>,
        options: WatcherOptions,
    ) -> Watcher {
        Watcher::new(self, source.into(), cb, options, false)
    }

    /// The cached render watcher, if one has been created.
    pub fn render_watcher(&self) -> Option<Watcher> {
        self.render_watcher
            .read()
            .expect("render watcher lock poisoned")
            .clone()
    }

    pub(crate) fn cache_render_watcher(&self, watcher: Watcher) {
        *self
            .render_watcher
            .write()
            .expect("render watcher lock poisoned") = Some(watcher);
    }

    pub(crate) fn register_watcher(&self, watcher: Watcher) {
        self.watchers
            .write()
            .expect("watchers lock poisoned")
            .push(watcher);
    }

    pub(crate) fn unregister_watcher(&self, watcher_id: u64) {
        self.watchers
            .write()
            .expect("watchers lock poisoned")
            .retain(|w| w.id() != watcher_id);
    }

    /// Number of live watchers registered on this scope.
    pub fn watcher_count(&self) -> usize {
        self.watchers.read().expect("watchers lock poisoned").len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Tear down every watcher on this scope. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let watchers: Vec<Watcher> = self
            .watchers
            .write()
            .expect("watchers lock poisoned")
            .drain(..)
            .collect();
        for watcher in watchers {
            watcher.teardown();
        }
        *self
            .render_watcher
            .write()
            .expect("render watcher lock poisoned") = None;
    }
}

impl Clone for Scope {
    fn clone(&self) -> Scope {
        Scope {
            id: self.id,
            data: self.data.clone(),
            watchers: Arc::clone(&self.watchers),
            render_watcher: Arc::clone(&self.render_watcher),
            destroyed: Arc::clone(&self.destroyed),
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("watcher_count", &self.watcher_count())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::watcher::noop_callback;
    use super::*;

    #[test]
    fn new_scope_observes_root_data() {
        let scope = Scope::new(Value::Map(MapRef::from_entries(vec![(
            "a",
            Value::from(1),
        )])));
        let ob = scope.data().observer().unwrap();
        assert_eq!(ob.vm_count(), 1);
    }

    #[test]
    fn watch_registers_and_teardown_unregisters() {
        let scope = Scope::new(Value::Map(MapRef::from_entries(vec![(
            "a",
            Value::from(1),
        )])));
        let watcher = scope.watch("a", noop_callback(), WatcherOptions::default());
        assert_eq!(scope.watcher_count(), 1);

        watcher.teardown();
        assert_eq!(scope.watcher_count(), 0);
    }

    #[test]
    fn render_watcher_is_cached() {
        let scope = Scope::new(Value::map());
        assert!(scope.render_watcher().is_none());

        let watcher = Watcher::new(
            &scope,
            WatchSource::getter(|_s: &Scope| Ok(Value::Null)),
            noop_callback(),
            WatcherOptions::default(),
            true,
        );
        assert_eq!(scope.render_watcher().unwrap().id(), watcher.id());
    }

    #[test]
    fn destroy_tears_down_all_watchers() {
        let scope = Scope::new(Value::Map(MapRef::from_entries(vec![(
            "a",
            Value::from(1),
        )])));
        let w1 = scope.watch("a", noop_callback(), WatcherOptions::default());
        let w2 = scope.watch("a", noop_callback(), WatcherOptions::default());
        let dep = scope.root().key_dep("a").unwrap();
        assert_eq!(dep.sub_count(), 2);

        scope.destroy();
        assert!(scope.is_destroyed());
        assert!(!w1.is_active());
        assert!(!w2.is_active());
        assert_eq!(dep.sub_count(), 0);
        assert_eq!(scope.watcher_count(), 0);

        // Idempotent.
        scope.destroy();
    }
}
