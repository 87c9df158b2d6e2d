//! Container Observation
//!
//! An [`Observer`] is attached to each reactive container. It owns the
//! container's *shape dep* (fired when properties are added or removed, or
//! when a sequence is mutated through the intercepted operations) and
//! arranges per-key deps through [`define_reactive`].
//!
//! # How observation works
//!
//! 1. [`observe`] wraps a container at most once: the observer is stored in
//!    the container's back-reference slot, so a second call short-circuits
//!    and returns the existing observer.
//!
//! 2. For a keyed map, every existing entry is converted into a reactive
//!    entry (per-key dep) and its value is observed recursively. For an
//!    ordered sequence, every element is observed; the sequence itself is
//!    covered by the intercepted mutators.
//!
//! 3. Reads through [`MapRef::get`] record the per-key dep against the
//!    current target, plus the child container's shape dep (so later
//!    additions to the child notify this reader), plus — for sequences —
//!    every element's shape dep, because element indexing cannot be
//!    intercepted.
//!
//! 4. Writes through [`MapRef::set`] run the NaN-guarded same-value check,
//!    observe the incoming value, and fire the per-key dep.
//!
//! # Gating
//!
//! Observation is suppressed while the process-wide switch is off
//! ([`toggle_observing`]), in server-rendering contexts, and for frozen,
//! instance-backing, and virtual-node containers.

use std::cell::Cell;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::context::tracking_active;
use super::dep::Dep;
use super::value::{same_value, ArrayRef, MapEntry, MapRef, Value};
use crate::config;
use crate::diagnostics::warn;

thread_local! {
    static SHOULD_OBSERVE: Cell<bool> = const { Cell::new(true) };
}

/// Flip the process-wide observation switch, returning the previous state so
/// the caller can restore it. Framework phases that must not create
/// observers (e.g. prop setup) toggle this off around their work.
pub fn toggle_observing(value: bool) -> bool {
    SHOULD_OBSERVE.with(|flag| flag.replace(value))
}

fn should_observe() -> bool {
    SHOULD_OBSERVE.with(|flag| flag.get())
}

/// The observer attached to a reactive container.
///
/// Cloning shares the same shape dep and root count.
pub struct Observer {
    dep: Dep,
    vm_count: Arc<AtomicUsize>,
}

impl Observer {
    fn new() -> Observer {
        Observer {
            dep: Dep::new(),
            vm_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The shape dep: fired on property addition/removal and on intercepted
    /// sequence mutation.
    pub fn dep(&self) -> &Dep {
        &self.dep
    }

    /// How many roots this container backs. Non-zero forbids adding or
    /// deleting reactive properties through the public mutators.
    pub fn vm_count(&self) -> usize {
        self.vm_count.load(Ordering::Relaxed)
    }

    pub(crate) fn inc_vm_count(&self) {
        self.vm_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Observe every element of a sequence. Used at attach time and by the
    /// intercepted insertion methods.
    pub(crate) fn observe_array(items: &[Value]) {
        for item in items {
            observe(item, false);
        }
    }
}

impl Clone for Observer {
    fn clone(&self) -> Observer {
        Observer {
            dep: self.dep.clone(),
            vm_count: Arc::clone(&self.vm_count),
        }
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("dep_id", &self.dep.id())
            .field("vm_count", &self.vm_count())
            .finish()
    }
}

/// Attempt to wrap a value in an observer. Idempotent: an already observed
/// container yields its existing observer. Returns `None` for primitives
/// and for containers the gating rules exclude.
pub fn observe(value: &Value, as_root_data: bool) -> Option<Observer> {
    let observer = match value {
        Value::Map(map) => {
            if let Some(existing) = map.observer() {
                Some(existing)
            } else if observable(map.is_frozen(), map.is_instance(), map.is_vnode()) {
                Some(attach_to_map(map))
            } else {
                None
            }
        }
        Value::Array(array) => {
            if let Some(existing) = array.observer() {
                Some(existing)
            } else if observable(array.is_frozen(), false, array.is_vnode()) {
                Some(attach_to_array(array))
            } else {
                None
            }
        }
        _ => None,
    };

    if as_root_data {
        if let Some(ob) = &observer {
            ob.inc_vm_count();
        }
    }
    observer
}

fn observable(frozen: bool, instance: bool, vnode: bool) -> bool {
    should_observe() && !config::ssr() && !frozen && !instance && !vnode
}

fn attach_to_map(map: &MapRef) -> Observer {
    let observer = Observer::new();
    map.set_observer(observer.clone());
    // Convert existing entries, then observe children outside the lock so a
    // self-referential map short-circuits on its own back-reference.
    let keys = map.keys_untracked();
    for key in keys {
        define_reactive(map, &key, None, None, false);
    }
    observer
}

fn attach_to_array(array: &ArrayRef) -> Observer {
    let observer = Observer::new();
    array.set_observer(observer.clone());
    Observer::observe_array(&array.snapshot());
    observer
}

/// Install a reactive entry for `key` on `map`.
///
/// A fresh per-key dep replaces any previous one. `value` overrides the
/// entry's current value when given (a missing entry starts from `Null`).
/// `custom_setter` runs before every write through the entry; `shallow`
/// disables recursive observation of assigned values (the per-key dep still
/// fires). Returns the installed dep.
pub fn define_reactive(
    map: &MapRef,
    key: &str,
    value: Option<Value>,
    custom_setter: Option<Arc<dyn Fn() + Send + Sync>>,
    shallow: bool,
) -> Dep {
    let dep = Dep::new();
    let child = {
        let mut inner = map.write();
        let entry = inner
            .entries
            .entry(key.to_string())
            .or_insert_with(|| MapEntry::plain(Value::Null));
        if let Some(value) = value {
            entry.value = value;
        }
        entry.dep = Some(dep.clone());
        entry.shallow = shallow;
        entry.custom_setter = custom_setter;
        entry.value.clone()
    };
    if !shallow {
        observe(&child, false);
    }
    dep
}

impl MapRef {
    /// Reactive read. Records the per-key dep against the current target,
    /// the child's shape dep, and — when the value is a sequence — every
    /// element's shape dep. Plain entries and missing keys track nothing.
    pub fn get(&self, key: &str) -> Value {
        let entry = {
            let inner = self.read();
            inner
                .entries
                .get(key)
                .map(|e| (e.value.clone(), e.dep.clone(), e.shallow))
        };
        let Some((value, dep, shallow)) = entry else {
            return Value::Null;
        };
        if tracking_active() {
            if let Some(dep) = dep {
                dep.depend();
                if !shallow {
                    if let Some(child_ob) = value.observer() {
                        child_ob.dep().depend();
                    }
                    if let Value::Array(array) = &value {
                        let mut seen = HashSet::new();
                        if let Some(ob) = array.observer() {
                            seen.insert(ob.dep().id());
                        }
                        depend_array(array, &mut seen);
                    }
                }
            }
        }
        value
    }

    /// Reactive write through an existing entry.
    ///
    /// For a reactive entry: the NaN-guarded same-value check short-circuits,
    /// the custom setter runs, the value is stored, the incoming value is
    /// observed (unless the entry is shallow), and the per-key dep fires.
    /// Plain entries and new keys are written plainly; property *creation*
    /// only becomes reactive through the public `set` mutator.
    pub fn set(&self, key: &str, value: Value) {
        enum Write {
            Frozen,
            Reactive {
                old: Value,
                dep: Dep,
                shallow: bool,
                custom_setter: Option<Arc<dyn Fn() + Send + Sync>>,
            },
            Plain,
        }

        let planned = {
            let inner = self.read();
            if inner.flags.frozen {
                Write::Frozen
            } else {
                match inner.entries.get(key) {
                    Some(entry) => match &entry.dep {
                        Some(dep) => Write::Reactive {
                            old: entry.value.clone(),
                            dep: dep.clone(),
                            shallow: entry.shallow,
                            custom_setter: entry.custom_setter.clone(),
                        },
                        None => Write::Plain,
                    },
                    None => Write::Plain,
                }
            }
        };

        match planned {
            Write::Frozen => {
                warn(&format!("cannot set key \"{key}\" on a frozen container"));
            }
            Write::Reactive {
                old,
                dep,
                shallow,
                custom_setter,
            } => {
                if same_value(&old, &value) {
                    return;
                }
                if let Some(custom_setter) = custom_setter {
                    custom_setter();
                }
                {
                    let mut inner = self.write();
                    if let Some(entry) = inner.entries.get_mut(key) {
                        entry.value = value.clone();
                    }
                }
                if !shallow {
                    observe(&value, false);
                }
                dep.notify();
            }
            Write::Plain => {
                self.insert_plain(key, value);
            }
        }
    }

    /// Enumerate own keys. Records the shape dep when a target is active,
    /// so renders that enumerate participate in property addition/removal.
    pub fn keys(&self) -> Vec<String> {
        if tracking_active() {
            if let Some(ob) = self.observer() {
                ob.dep().depend();
            }
        }
        self.keys_untracked()
    }

    /// Number of entries. Tracked like [`MapRef::keys`].
    pub fn len(&self) -> usize {
        if tracking_active() {
            if let Some(ob) = self.observer() {
                ob.dep().depend();
            }
        }
        self.len_untracked()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Descend a sequence, recording every element's shape dep. This is the only
/// way sequence reads capture dependencies, since element indexing cannot be
/// intercepted. The seen-set guards self-referential sequences.
fn depend_array(array: &ArrayRef, seen: &mut HashSet<u64>) {
    let items = array.snapshot();
    for item in items {
        let mut descend = true;
        if let Some(ob) = item.observer() {
            if seen.insert(ob.dep().id()) {
                ob.dep().depend();
            } else {
                descend = false;
            }
        }
        if descend {
            if let Value::Array(nested) = &item {
                depend_array(nested, seen);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observed_map(entries: Vec<(&str, Value)>) -> MapRef {
        let map = MapRef::from_entries(entries);
        observe(&Value::Map(map.clone()), false);
        map
    }

    #[test]
    fn observe_is_idempotent() {
        let value = Value::map();
        let first = observe(&value, false).unwrap();
        let second = observe(&value, false).unwrap();
        assert_eq!(first.dep().id(), second.dep().id());
    }

    #[test]
    fn observe_rejects_primitives() {
        assert!(observe(&Value::from(1), false).is_none());
        assert!(observe(&Value::from("x"), false).is_none());
        assert!(observe(&Value::Null, false).is_none());
    }

    #[test]
    fn observe_rejects_frozen_and_marked_containers() {
        let frozen = MapRef::new();
        frozen.freeze();
        assert!(observe(&Value::Map(frozen), false).is_none());

        let vnode = MapRef::new();
        vnode.mark_vnode();
        assert!(observe(&Value::Map(vnode), false).is_none());

        let instance = MapRef::new();
        instance.mark_instance();
        assert!(observe(&Value::Map(instance), false).is_none());
    }

    #[test]
    fn toggle_observing_suppresses_wrapping() {
        let prev = toggle_observing(false);
        let value = Value::map();
        assert!(observe(&value, false).is_none());
        toggle_observing(prev);
        assert!(observe(&value, false).is_some());
    }

    #[test]
    fn observation_recurses_into_children() {
        let child = Value::map();
        let map = observed_map(vec![("child", child.clone())]);
        assert!(child.observer().is_some());
        assert!(map.key_dep("child").is_some());
    }

    #[test]
    fn observation_recurses_into_array_elements() {
        let element = Value::map();
        let list = Value::array(vec![element.clone()]);
        observe(&list, false);
        assert!(element.observer().is_some());
    }

    #[test]
    fn self_referential_map_observes_once() {
        let map = MapRef::new();
        map.insert_plain("me", Value::Map(map.clone()));
        let ob = observe(&Value::Map(map.clone()), false).unwrap();
        assert_eq!(map.observer().unwrap().dep().id(), ob.dep().id());
    }

    #[test]
    fn root_data_counts_roots() {
        let value = Value::map();
        let ob = observe(&value, true).unwrap();
        assert_eq!(ob.vm_count(), 1);
        observe(&value, true);
        assert_eq!(ob.vm_count(), 2);
    }

    #[test]
    fn reactive_set_skips_same_value() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let map = observed_map(vec![("a", Value::from(1))]);
        let fired = Arc::new(AtomicUsize::new(0));

        // Re-define the key with a custom setter as a write probe.
        let fired_clone = fired.clone();
        define_reactive(
            &map,
            "a",
            None,
            Some(Arc::new(move || {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            })),
            false,
        );

        map.set("a", Value::from(1));
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        map.set("a", Value::from(2));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nan_rewrite_does_not_write() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let map = observed_map(vec![("n", Value::Number(f64::NAN))]);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        define_reactive(
            &map,
            "n",
            None,
            Some(Arc::new(move || {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            })),
            false,
        );

        map.set("n", Value::Number(f64::NAN));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shallow_entry_does_not_observe_assigned_value() {
        let map = MapRef::new();
        observe(&Value::Map(map.clone()), false);
        define_reactive(&map, "s", Some(Value::from(0)), None, true);

        let child = Value::map();
        map.set("s", child.clone());
        assert!(child.observer().is_none());
    }

    #[test]
    fn plain_entries_stay_plain_on_write() {
        let map = MapRef::new();
        // No observer: inserts are plain.
        map.set("p", Value::from(1));
        assert!(map.key_dep("p").is_none());
        assert_eq!(map.get_untracked("p").as_f64(), Some(1.0));
    }
}
