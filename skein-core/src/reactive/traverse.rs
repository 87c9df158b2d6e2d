//! Deep Dependency Collection
//!
//! A `deep` watcher must subscribe to every property reachable from its
//! evaluated value, so that in-place mutation anywhere below the result
//! wakes it. Traversal reads every map entry through the tracked getter
//! (recording per-key and child shape deps against the current target) and
//! descends into every sequence element.
//!
//! Cyclic graphs are handled explicitly: a set of observer dep ids stops
//! the walk the second time a container is reached. Frozen containers are
//! skipped — their contents can never change.

use std::collections::HashSet;

use super::value::Value;

/// Recursively touch every reachable property and element of `value` once,
/// recording dependencies against the current target.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    traverse_inner(value, &mut seen);
}

fn traverse_inner(value: &Value, seen: &mut HashSet<u64>) {
    match value {
        Value::Map(map) => {
            if map.is_frozen() {
                return;
            }
            if let Some(ob) = map.observer() {
                if !seen.insert(ob.dep().id()) {
                    return;
                }
            }
            for key in map.keys_untracked() {
                let child = map.get(&key);
                traverse_inner(&child, seen);
            }
        }
        Value::Array(array) => {
            if array.is_frozen() {
                return;
            }
            if let Some(ob) = array.observer() {
                if !seen.insert(ob.dep().id()) {
                    return;
                }
            }
            for item in array.snapshot() {
                traverse_inner(&item, seen);
            }
        }
        _ => {}
    }
}
