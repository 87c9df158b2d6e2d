//! Skein Core
//!
//! This crate provides the reactivity core of the Skein UI framework. It
//! implements:
//!
//! - Observation of plain data graphs (keyed maps and ordered sequences)
//! - Fine-grained dependency tracking between reads and derived computations
//! - A batched, id-ordered, cycle-tolerant update scheduler
//! - Eager, synchronous, and lazy (memoized) evaluation modes
//!
//! The crate is designed to be used both as a native Rust library and as a
//! Python extension module via PyO3.
//!
//! # Architecture
//!
//! - `reactive`: observed values, deps, watchers, scheduler, public mutators
//! - `config`: process-wide switches (async delivery, server rendering)
//! - `diagnostics`: injectable warn/error sinks
//!
//! Collaborators (template compiler, virtual-DOM patcher, lifecycle
//! machinery) consume the core through two surfaces only: they create
//! watchers whose getters read observed data, and they call the public
//! `set`/`del` mutators.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use skein_core::reactive::{next_tick, Scope, Value, WatcherOptions};
//!
//! let scope = Scope::new(Value::from_json(serde_json::json!({"count": 0})));
//!
//! // Watch a path; the callback runs after the next micro-task drain.
//! scope.watch(
//!     "count",
//!     Arc::new(|_scope, new, old| {
//!         println!("count: {:?} -> {:?}", old, new);
//!         Ok(())
//!     }),
//!     WatcherOptions::default(),
//! );
//!
//! scope.root().set("count", Value::from(1));
//! next_tick::drain();
//! // Prints: count: Number(0.0) -> Number(1.0)
//! ```

pub mod config;
pub mod diagnostics;
pub mod reactive;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use reactive::{next_tick, Scope, Value};

/// Python-exposed reactive store.
///
/// A thin binding over [`Scope`]: values cross the boundary as JSON
/// strings, which keeps the reference-counting story trivial on both sides.
#[pyclass(name = "Store")]
pub struct PyStore {
    scope: Scope,
}

#[pymethods]
impl PyStore {
    /// Create a store from a JSON object literal.
    #[new]
    fn new(json: &str) -> PyResult<Self> {
        let parsed: serde_json::Value =
            serde_json::from_str(json).map_err(|e| PyValueError::new_err(e.to_string()))?;
        let data = Value::from_json(parsed);
        if data.as_map().is_none() {
            return Err(PyValueError::new_err("store data must be a JSON object"));
        }
        Ok(Self {
            scope: Scope::new(data),
        })
    }

    /// Read a dot-delimited path, returning its value as a JSON string.
    fn get(&self, path: &str) -> String {
        let mut current = self.scope.data().clone();
        for segment in path.split('.') {
            current = match &current {
                Value::Map(map) => map.get_untracked(segment),
                _ => Value::Null,
            };
        }
        serde_json::to_string(&current).unwrap_or_else(|_| "null".to_string())
    }

    /// Write a top-level key from a JSON string.
    fn set(&self, key: &str, json: &str) -> PyResult<()> {
        let parsed: serde_json::Value =
            serde_json::from_str(json).map_err(|e| PyValueError::new_err(e.to_string()))?;
        self.scope.root().set(key, Value::from_json(parsed));
        Ok(())
    }

    /// Drain the micro-task queue, delivering batched watcher updates.
    fn flush(&self) -> usize {
        next_tick::drain()
    }

    /// Number of live watchers on the store's scope.
    fn watcher_count(&self) -> usize {
        self.scope.watcher_count()
    }

    fn __repr__(&self) -> String {
        format!(
            "Store(id={}, watchers={})",
            self.scope.id(),
            self.scope.watcher_count()
        )
    }
}

/// Python module definition.
///
/// This function is called by Python when importing the module.
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyStore>()?;

    // Add version info
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
