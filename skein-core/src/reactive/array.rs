//! Ordered-Sequence Interception
//!
//! The standard in-place mutating operations of [`ArrayRef`] are the
//! intercepted mutator table: each one delegates to the underlying `Vec`
//! operation (preserving its return value and semantics exactly), observes
//! newly inserted elements when the sequence is observed, and fires the
//! owner observer's shape dep. Notification happens on every invocation,
//! including ones that turn out to be no-ops, because the *operation* is
//! what is intercepted, not the outcome.
//!
//! Mutation through direct element assignment or length truncation is not
//! observed — [`ArrayRef::with_mut`] exists as the explicit unobserved
//! escape hatch — and the public `set`/`del` mutators are the supported
//! reactive forms for indexed writes.

use std::cmp::Ordering;

use super::observer::Observer;
use super::value::{ArrayRef, Value};
use crate::diagnostics::warn;

impl ArrayRef {
    /// Append an element to the end.
    pub fn push(&self, value: Value) {
        if self.refuse_frozen("push") {
            return;
        }
        self.write().items.push(value.clone());
        self.after_mutation(&[value]);
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        if self.refuse_frozen("pop") {
            return None;
        }
        let removed = self.write().items.pop();
        self.after_mutation(&[]);
        removed
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        if self.refuse_frozen("shift") {
            return None;
        }
        let removed = {
            let mut inner = self.write();
            if inner.items.is_empty() {
                None
            } else {
                Some(inner.items.remove(0))
            }
        };
        self.after_mutation(&[]);
        removed
    }

    /// Prepend an element to the front.
    pub fn unshift(&self, value: Value) {
        if self.refuse_frozen("unshift") {
            return;
        }
        self.write().items.insert(0, value.clone());
        self.after_mutation(&[value]);
    }

    /// Remove `delete_count` elements starting at `start`, inserting `items`
    /// in their place. Out-of-range arguments are clamped. Returns the
    /// removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        if self.refuse_frozen("splice") {
            return Vec::new();
        }
        let removed = {
            let mut inner = self.write();
            let len = inner.items.len();
            let start = start.min(len);
            let end = start + delete_count.min(len - start);
            inner.items.splice(start..end, items.clone()).collect()
        };
        self.after_mutation(&items);
        removed
    }

    /// Sort in place with the given comparator.
    pub fn sort_by<F>(&self, compare: F)
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        if self.refuse_frozen("sort_by") {
            return;
        }
        let mut compare = compare;
        self.write().items.sort_by(|a, b| compare(a, b));
        self.after_mutation(&[]);
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        if self.refuse_frozen("reverse") {
            return;
        }
        self.write().items.reverse();
        self.after_mutation(&[]);
    }

    /// Mutate the raw element storage without observation or notification.
    /// Changes made here are invisible to trackers until the next
    /// intercepted mutation or `set`/`del` call.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        f(&mut self.write().items)
    }

    fn after_mutation(&self, inserted: &[Value]) {
        if let Some(ob) = self.observer() {
            if !inserted.is_empty() {
                Observer::observe_array(inserted);
            }
            ob.dep().notify();
        }
    }

    fn refuse_frozen(&self, op: &str) -> bool {
        if self.is_frozen() {
            warn(&format!("cannot {op} on a frozen sequence"));
            true
        } else {
            false
        }
    }
}
