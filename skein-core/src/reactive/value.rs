//! Dynamic Value Tree
//!
//! The reactive core observes plain data: keyed maps and ordered sequences
//! holding arbitrary values. This module is that substrate. A [`Value`] is a
//! dynamically typed tree; maps and arrays are shared handles, so cloning a
//! `Value` aliases the same container rather than copying it.
//!
//! # Identity
//!
//! Primitives compare by value (with the NaN guard: two NaNs are considered
//! the same value, so re-assigning NaN over NaN never notifies). Containers
//! compare by identity of the shared allocation, the way reference types do
//! in the host framework's data model.
//!
//! # Observation hooks
//!
//! Each container inner carries an `Option<Observer>` slot, the well-known
//! back-reference that makes `observe` idempotent. It is a plain struct
//! field, so it is invisible to enumeration by construction. The inner also
//! carries marker flags:
//!
//! - `frozen`: the container is non-extensible; it is never observed and
//!   mutation through it is refused.
//! - `instance`: the container backs a framework instance; never observed,
//!   and the public mutators refuse to add or remove its properties.
//! - `vnode`: the container is a virtual-node representation; never
//!   observed.
//!
//! The reactive read/write paths for maps live in the observer module; this
//! module provides the raw storage, untracked access, identity, and JSON
//! conversion.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::dep::Dep;
use super::observer::Observer;

/// A dynamically typed value: the unit of observed data.
#[derive(Clone)]
pub enum Value {
    /// Absence of a value. Missing map keys and broken path links read as
    /// `Null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number. All numbers are `f64`, matching the host data model.
    Number(f64),
    /// An immutable string.
    Str(Arc<str>),
    /// A shared keyed map.
    Map(MapRef),
    /// A shared ordered sequence.
    Array(ArrayRef),
}

impl Value {
    /// Build an empty map value.
    pub fn map() -> Value {
        Value::Map(MapRef::new())
    }

    /// Build an array value from the given elements.
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(ArrayRef::new(items))
    }

    /// Build a string value.
    pub fn str(s: impl Into<Arc<str>>) -> Value {
        Value::Str(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is a map or an array.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Map(_) | Value::Array(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The observer attached to this value, if it is an observed container.
    pub fn observer(&self) -> Option<Observer> {
        match self {
            Value::Map(m) => m.observer(),
            Value::Array(a) => a.observer(),
            _ => None,
        }
    }

    /// Identity comparison: `true` when both values are the same container
    /// allocation. Always `false` for primitives.
    pub fn ref_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Map(a), Value::Map(b)) => a.ref_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ref_eq(b),
            _ => false,
        }
    }

    /// Convert a `serde_json` tree into a value tree. Objects and arrays
    /// become fresh unobserved containers with plain entries.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(items) => {
                Value::array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => {
                let map = MapRef::new();
                for (key, field) in fields {
                    map.insert_plain(&key, Value::from_json(field));
                }
                Value::Map(map)
            }
        }
    }

    /// Snapshot this value as a `serde_json` tree. Cyclic graphs must not be
    /// serialized.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// The change-detection predicate of the write paths: primitives by value
/// with the NaN guard, containers by identity.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::Str(x), Value::Str(y)) => x == y,
        _ => a.ref_eq(b),
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::str(s)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Map(m) => write!(f, "Map(len={})", m.len_untracked()),
            Value::Array(a) => write!(f, "Array(len={})", a.len()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                // Whole numbers within exact f64 range serialize as
                // integers so JSON round-trips compare equal.
                if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_992.0 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Value::Str(s) => serializer.serialize_str(s),
            Value::Map(m) => {
                let entries = m.entries_untracked();
                let mut state = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    state.serialize_entry(&key, &value)?;
                }
                state.end()
            }
            Value::Array(a) => {
                let items = a.snapshot();
                let mut state = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    state.serialize_element(&item)?;
                }
                state.end()
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Container internals
// ----------------------------------------------------------------------------

/// Marker flags shared by both container kinds.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ContainerFlags {
    pub(crate) frozen: bool,
    pub(crate) instance: bool,
    pub(crate) vnode: bool,
}

/// One slot of a keyed map.
///
/// A *plain* entry (no dep) behaves like an ordinary data property: reads do
/// not track and writes do not notify. A *reactive* entry carries the
/// per-key dep installed by `define_reactive`, plus its `shallow` flag and
/// optional custom setter hook.
#[derive(Clone)]
pub(crate) struct MapEntry {
    pub(crate) value: Value,
    pub(crate) dep: Option<Dep>,
    pub(crate) shallow: bool,
    pub(crate) custom_setter: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl MapEntry {
    pub(crate) fn plain(value: Value) -> MapEntry {
        MapEntry {
            value,
            dep: None,
            shallow: false,
            custom_setter: None,
        }
    }
}

pub(crate) struct MapInner {
    pub(crate) entries: BTreeMap<String, MapEntry>,
    pub(crate) observer: Option<Observer>,
    pub(crate) flags: ContainerFlags,
}

pub(crate) struct ArrayInner {
    pub(crate) items: Vec<Value>,
    pub(crate) observer: Option<Observer>,
    pub(crate) flags: ContainerFlags,
}

// ----------------------------------------------------------------------------
// MapRef
// ----------------------------------------------------------------------------

/// A shared handle to a keyed map. Cloning aliases the same map.
pub struct MapRef {
    inner: Arc<RwLock<MapInner>>,
}

impl MapRef {
    /// Create a new empty, unobserved map.
    pub fn new() -> MapRef {
        MapRef {
            inner: Arc::new(RwLock::new(MapInner {
                entries: BTreeMap::new(),
                observer: None,
                flags: ContainerFlags::default(),
            })),
        }
    }

    /// Build a map with the given plain entries.
    pub fn from_entries(entries: Vec<(&str, Value)>) -> MapRef {
        let map = MapRef::new();
        for (key, value) in entries {
            map.insert_plain(key, value);
        }
        map
    }

    pub(crate) fn read(&self) -> std::sync::RwLockReadGuard<'_, MapInner> {
        self.inner.read().expect("map lock poisoned")
    }

    pub(crate) fn write(&self) -> std::sync::RwLockWriteGuard<'_, MapInner> {
        self.inner.write().expect("map lock poisoned")
    }

    /// Identity comparison with another handle.
    pub fn ref_eq(&self, other: &MapRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The observer attached to this map, if any.
    pub fn observer(&self) -> Option<Observer> {
        self.read().observer.clone()
    }

    pub(crate) fn set_observer(&self, observer: Observer) {
        self.write().observer = Some(observer);
    }

    /// Read a key without recording any dependency.
    pub fn get_untracked(&self, key: &str) -> Value {
        self.read()
            .entries
            .get(key)
            .map(|e| e.value.clone())
            .unwrap_or(Value::Null)
    }

    /// Whether `key` is an own property of this map. Untracked.
    pub fn contains_key(&self, key: &str) -> bool {
        self.read().entries.contains_key(key)
    }

    /// Number of entries. Untracked; the tracked form is [`MapRef::len`].
    pub fn len_untracked(&self) -> usize {
        self.read().entries.len()
    }

    /// Insert or overwrite a *plain* entry. No dependency tracking, no
    /// notification; refused on frozen maps.
    pub fn insert_plain(&self, key: &str, value: Value) {
        let mut inner = self.write();
        if inner.flags.frozen {
            return;
        }
        inner.entries.insert(key.to_string(), MapEntry::plain(value));
    }

    /// Remove a key outright. Untracked and unnotified; the reactive form is
    /// the public `del` mutator.
    pub(crate) fn remove_entry(&self, key: &str) -> Option<Value> {
        let mut inner = self.write();
        if inner.flags.frozen {
            return None;
        }
        inner.entries.remove(key).map(|e| e.value)
    }

    pub(crate) fn keys_untracked(&self) -> Vec<String> {
        self.read().entries.keys().cloned().collect()
    }

    pub(crate) fn entries_untracked(&self) -> Vec<(String, Value)> {
        self.read()
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// The per-key dep of a reactive entry, if the entry exists and has been
    /// made reactive. Exposed for instrumentation and tests.
    pub fn key_dep(&self, key: &str) -> Option<Dep> {
        self.read().entries.get(key).and_then(|e| e.dep.clone())
    }

    /// Mark this map non-extensible. Frozen maps are never observed and all
    /// mutation through this handle is refused.
    pub fn freeze(&self) {
        self.write().flags.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.read().flags.frozen
    }

    /// Mark this map as backing a framework instance. Never observed; the
    /// public mutators refuse it.
    pub fn mark_instance(&self) {
        self.write().flags.instance = true;
    }

    pub fn is_instance(&self) -> bool {
        self.read().flags.instance
    }

    /// Mark this map as a virtual-node representation. Never observed.
    pub fn mark_vnode(&self) {
        self.write().flags.vnode = true;
    }

    pub fn is_vnode(&self) -> bool {
        self.read().flags.vnode
    }
}

impl Clone for MapRef {
    fn clone(&self) -> MapRef {
        MapRef {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for MapRef {
    fn default() -> MapRef {
        MapRef::new()
    }
}

impl fmt::Debug for MapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read();
        f.debug_struct("MapRef")
            .field("len", &inner.entries.len())
            .field("observed", &inner.observer.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// ArrayRef
// ----------------------------------------------------------------------------

/// A shared handle to an ordered sequence. Cloning aliases the same
/// sequence. The in-place mutating methods live in the interception module;
/// this impl is raw storage and untracked reads.
pub struct ArrayRef {
    inner: Arc<RwLock<ArrayInner>>,
}

impl ArrayRef {
    pub fn new(items: Vec<Value>) -> ArrayRef {
        ArrayRef {
            inner: Arc::new(RwLock::new(ArrayInner {
                items,
                observer: None,
                flags: ContainerFlags::default(),
            })),
        }
    }

    pub(crate) fn read(&self) -> std::sync::RwLockReadGuard<'_, ArrayInner> {
        self.inner.read().expect("array lock poisoned")
    }

    pub(crate) fn write(&self) -> std::sync::RwLockWriteGuard<'_, ArrayInner> {
        self.inner.write().expect("array lock poisoned")
    }

    pub fn ref_eq(&self, other: &ArrayRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn observer(&self) -> Option<Observer> {
        self.read().observer.clone()
    }

    pub(crate) fn set_observer(&self, observer: Observer) {
        self.write().observer = Some(observer);
    }

    /// Element at `index`, or `Null` out of bounds. Untracked: element
    /// indexing cannot be intercepted, which is exactly the contract hole
    /// the public `set`/`del` mutators exist to cover.
    pub fn get(&self, index: usize) -> Value {
        self.read().items.get(index).cloned().unwrap_or(Value::Null)
    }

    /// Current length. Untracked, mirroring the uninterceptable length read
    /// of the substrate; trackers observe sequences through the property
    /// that yields them.
    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().items.is_empty()
    }

    /// Clone out the current elements.
    pub fn snapshot(&self) -> Vec<Value> {
        self.read().items.clone()
    }

    pub fn freeze(&self) {
        self.write().flags.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.read().flags.frozen
    }

    pub fn mark_vnode(&self) {
        self.write().flags.vnode = true;
    }

    pub fn is_vnode(&self) -> bool {
        self.read().flags.vnode
    }
}

impl Clone for ArrayRef {
    fn clone(&self) -> ArrayRef {
        ArrayRef {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.read();
        f.debug_struct("ArrayRef")
            .field("len", &inner.items.len())
            .field("observed", &inner.observer.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_aliases_the_same_map() {
        let a = MapRef::new();
        let b = a.clone();
        a.insert_plain("x", Value::from(1));
        assert_eq!(b.get_untracked("x").as_f64(), Some(1.0));
        assert!(a.ref_eq(&b));
    }

    #[test]
    fn distinct_maps_are_not_identical() {
        let a = MapRef::new();
        let b = MapRef::new();
        assert!(!a.ref_eq(&b));
    }

    #[test]
    fn same_value_primitives() {
        assert!(same_value(&Value::from(1), &Value::from(1)));
        assert!(!same_value(&Value::from(1), &Value::from(2)));
        assert!(same_value(&Value::from("a"), &Value::from("a")));
        assert!(same_value(&Value::Null, &Value::Null));
        assert!(!same_value(&Value::from(0), &Value::Bool(false)));
    }

    #[test]
    fn same_value_nan_guard() {
        let nan = Value::Number(f64::NAN);
        assert!(same_value(&nan, &Value::Number(f64::NAN)));
        assert!(!same_value(&nan, &Value::Number(0.0)));
    }

    #[test]
    fn same_value_containers_by_identity() {
        let a = Value::map();
        let b = a.clone();
        let c = Value::map();
        assert!(same_value(&a, &b));
        assert!(!same_value(&a, &c));
    }

    #[test]
    fn missing_key_reads_null() {
        let map = MapRef::new();
        assert!(map.get_untracked("nope").is_null());
    }

    #[test]
    fn frozen_map_refuses_insert() {
        let map = MapRef::new();
        map.freeze();
        map.insert_plain("x", Value::from(1));
        assert!(!map.contains_key("x"));
    }

    #[test]
    fn array_out_of_bounds_reads_null() {
        let arr = ArrayRef::new(vec![Value::from(1)]);
        assert!(arr.get(5).is_null());
    }

    #[test]
    fn json_round_trip() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"a":1,"b":[true,"x",null],"c":{"d":2.5}}"#).unwrap();
        let value = Value::from_json(json.clone());

        let map = value.as_map().unwrap();
        assert_eq!(map.get_untracked("a").as_f64(), Some(1.0));
        let b = map.get_untracked("b");
        let arr = b.as_array().unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get(0).as_bool(), Some(true));
        assert!(arr.get(2).is_null());

        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn from_entries_builder() {
        let map = MapRef::from_entries(vec![("a", Value::from(1)), ("b", Value::from("two"))]);
        assert_eq!(map.len_untracked(), 2);
        assert_eq!(map.get_untracked("b").as_str(), Some("two"));
    }
}
