//! Public Mutators
//!
//! Accessor-based reactivity cannot intercept the *creation* or *removal*
//! of properties — only mutation of existing ones. [`set`] and [`del`] are
//! the supported forms: they install or remove the property and fire the
//! owning observer's shape dep so readers of the container re-evaluate.
//!
//! Indexed sequence writes route through the intercepted `splice`, which
//! notifies automatically.
//!
//! All misuse is reported through the diagnostics sink and degrades to a
//! no-op or a plain write; nothing here panics or throws.

use super::observer::define_reactive;
use super::value::Value;
use crate::diagnostics::warn;

/// A key for the public mutators: a sequence index or a map key.
#[derive(Debug, Clone)]
pub enum SetKey {
    /// An element index of an ordered sequence.
    Index(usize),
    /// An own key of a keyed map.
    Key(String),
}

impl From<usize> for SetKey {
    fn from(index: usize) -> SetKey {
        SetKey::Index(index)
    }
}

impl From<&str> for SetKey {
    fn from(key: &str) -> SetKey {
        SetKey::Key(key.to_string())
    }
}

impl From<String> for SetKey {
    fn from(key: String) -> SetKey {
        SetKey::Key(key)
    }
}

/// Set a property on an observed container so that reactivity is preserved,
/// returning the assigned value.
///
/// - Sequence + valid index: pad to length if needed, then splice-replace,
///   which notifies through the interceptor.
/// - Existing own key: plain write through the entry (the reactive setter
///   fires if the entry is reactive).
/// - Unobserved target: plain, non-reactive insert.
/// - Framework instances and root data containers are refused.
/// - Otherwise: install a reactive entry and fire the shape dep.
pub fn set(target: &Value, key: impl Into<SetKey>, value: Value) -> Value {
    let key = key.into();
    match (target, key) {
        (Value::Array(array), SetKey::Index(index)) => {
            let len = array.len();
            if index >= len {
                // Length extension is silent, like the substrate's; the
                // splice below carries the notification.
                array.with_mut(|items| items.resize(index, Value::Null));
            }
            array.splice(index, 1, vec![value.clone()]);
            value
        }
        (Value::Array(_), SetKey::Key(key)) => {
            warn(&format!(
                "cannot set string key \"{key}\" on an ordered sequence; use an index"
            ));
            value
        }
        (Value::Map(map), key) => {
            let key = match key {
                SetKey::Key(k) => k,
                SetKey::Index(i) => i.to_string(),
            };
            if map.contains_key(&key) {
                map.set(&key, value.clone());
                return value;
            }
            if map.is_instance() {
                warn(&format!(
                    "cannot add reactive key \"{key}\" to a framework instance"
                ));
                return value;
            }
            let observer = match map.observer() {
                Some(ob) => ob,
                None => {
                    map.insert_plain(&key, value.clone());
                    return value;
                }
            };
            if observer.vm_count() > 0 {
                warn(&format!(
                    "cannot add reactive key \"{key}\" to a root data container; \
                     declare it up front instead"
                ));
                return value;
            }
            define_reactive(map, &key, Some(value.clone()), None, false);
            observer.dep().notify();
            value
        }
        (_, key) => {
            warn(&format!(
                "cannot set reactive property {key:?} on a primitive or null value"
            ));
            value
        }
    }
}

/// Delete a property from an observed container so that reactivity is
/// preserved.
///
/// Sequence + valid index splice-removes. Deleting a key that is not an own
/// property is a no-op. Framework instances and root data containers are
/// refused.
pub fn del(target: &Value, key: impl Into<SetKey>) {
    let key = key.into();
    match (target, key) {
        (Value::Array(array), SetKey::Index(index)) => {
            if index < array.len() {
                array.splice(index, 1, Vec::new());
            }
        }
        (Value::Array(_), SetKey::Key(key)) => {
            warn(&format!(
                "cannot delete string key \"{key}\" from an ordered sequence; use an index"
            ));
        }
        (Value::Map(map), key) => {
            let key = match key {
                SetKey::Key(k) => k,
                SetKey::Index(i) => i.to_string(),
            };
            if map.is_instance() {
                warn(&format!(
                    "cannot delete key \"{key}\" from a framework instance"
                ));
                return;
            }
            let observer = map.observer();
            if let Some(ob) = &observer {
                if ob.vm_count() > 0 {
                    warn(&format!(
                        "cannot delete key \"{key}\" from a root data container"
                    ));
                    return;
                }
            }
            if !map.contains_key(&key) {
                return;
            }
            map.remove_entry(&key);
            if let Some(ob) = observer {
                ob.dep().notify();
            }
        }
        (_, key) => {
            warn(&format!(
                "cannot delete reactive property {key:?} of a primitive or null value"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::observer::observe;
    use super::super::value::MapRef;
    use super::*;

    #[test]
    fn set_on_primitive_warns_and_returns_value() {
        let returned = set(&Value::from(1), "x", Value::from(2));
        assert_eq!(returned.as_f64(), Some(2.0));
        del(&Value::Null, "x");
    }

    #[test]
    fn set_existing_key_writes_through_entry() {
        let map = MapRef::from_entries(vec![("a", Value::from(1))]);
        let target = Value::Map(map.clone());
        observe(&target, false);

        set(&target, "a", Value::from(2));
        assert_eq!(map.get_untracked("a").as_f64(), Some(2.0));
        // Still the original reactive entry, not a redefinition.
        assert!(map.key_dep("a").is_some());
    }

    #[test]
    fn set_new_key_on_observed_map_is_reactive() {
        let target = Value::map();
        observe(&target, false);
        set(&target, "x", Value::from(1));

        let map = target.as_map().unwrap();
        assert!(map.key_dep("x").is_some());
        assert_eq!(map.get_untracked("x").as_f64(), Some(1.0));
    }

    #[test]
    fn set_new_key_on_unobserved_map_is_plain() {
        let target = Value::map();
        set(&target, "x", Value::from(1));

        let map = target.as_map().unwrap();
        assert!(map.key_dep("x").is_none());
        assert_eq!(map.get_untracked("x").as_f64(), Some(1.0));
    }

    #[test]
    fn set_refuses_root_data_containers() {
        let target = Value::map();
        observe(&target, true);
        set(&target, "x", Value::from(1));
        assert!(!target.as_map().unwrap().contains_key("x"));
    }

    #[test]
    fn set_refuses_framework_instances() {
        let map = MapRef::new();
        map.mark_instance();
        let target = Value::Map(map.clone());
        set(&target, "x", Value::from(1));
        assert!(!map.contains_key("x"));
    }

    #[test]
    fn set_index_replaces_element() {
        let target = Value::array(vec![Value::from(1), Value::from(2)]);
        observe(&target, false);
        set(&target, 0usize, Value::from(99));

        let arr = target.as_array().unwrap();
        assert_eq!(arr.get(0).as_f64(), Some(99.0));
        assert_eq!(arr.len(), 2);
    }

    #[test]
    fn set_index_beyond_length_extends() {
        let target = Value::array(vec![Value::from(1)]);
        observe(&target, false);
        set(&target, 3usize, Value::from(4));

        let arr = target.as_array().unwrap();
        assert_eq!(arr.len(), 4);
        assert!(arr.get(1).is_null());
        assert_eq!(arr.get(3).as_f64(), Some(4.0));
    }

    #[test]
    fn del_removes_and_missing_key_is_noop() {
        let target = Value::map();
        observe(&target, false);
        set(&target, "x", Value::from(1));

        del(&target, "x");
        assert!(!target.as_map().unwrap().contains_key("x"));

        // Deleting again must not notify or fail.
        del(&target, "x");
    }

    #[test]
    fn del_index_splices_out_element() {
        let target = Value::array(vec![Value::from(1), Value::from(2), Value::from(3)]);
        observe(&target, false);
        del(&target, 1usize);

        let arr = target.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr.get(1).as_f64(), Some(3.0));
    }

    #[test]
    fn del_refuses_root_data_containers() {
        let target = Value::map();
        observe(&target, true);
        set(&target, "x", Value::from(1));
        // Root guard rejects the set; insert plainly to have something to delete.
        target.as_map().unwrap().insert_plain("y", Value::from(2));
        del(&target, "y");
        assert!(target.as_map().unwrap().contains_key("y"));
    }
}
