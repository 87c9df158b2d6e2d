//! Reactive Core
//!
//! This module implements the observation subsystem: the machinery that
//! watches mutable data graphs, records fine-grained dependencies between
//! reads and derived computations, and re-runs those computations when the
//! underlying data changes.
//!
//! # Concepts
//!
//! ## Observed values
//!
//! Plain data — keyed maps and ordered sequences of arbitrary values — is
//! wrapped by [`observe`]. Reads through an observed map record the reader;
//! writes notify it. The in-place mutating operations of sequences are
//! intercepted so structural changes notify too.
//!
//! ## Deps
//!
//! A [`Dep`] is a set of subscribed watchers. One exists per observed
//! container (the *shape* dep) and one per reactive key. Reads call
//! `depend`, writes call `notify`.
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates an expression, records every dep it touched, and
//! reacts to changes: eagerly through the batched [`scheduler`], eagerly and
//! synchronously (`sync`), or lazily (`lazy`, backing memoized derived
//! values).
//!
//! # Implementation Notes
//!
//! Dependency detection is automatic: a thread-local stack holds the
//! watcher currently evaluating, and every tracked read records against it.
//! This "transparent reactivity" approach is shared by the fine-grained
//! reactive UI runtimes this core descends from.

mod array;
mod context;
mod dep;
mod mutate;
pub mod next_tick;
mod observer;
mod scheduler;
mod scope;
mod traverse;
mod value;
mod watcher;

pub use context::{current_target, pop_target, push_target};
pub use dep::Dep;
pub use mutate::{del, set, SetKey};
pub use observer::{define_reactive, observe, toggle_observing, Observer};
pub use scheduler::{
    flush_scheduler_queue, queue_activated_hook, queue_updated_hook, queue_watcher,
    MAX_UPDATE_COUNT,
};
pub use scope::Scope;
pub use traverse::traverse;
pub use value::{same_value, ArrayRef, MapRef, Value};
pub use watcher::{
    noop_callback, CallbackFn, GetterFn, WatchSource, Watcher, WatcherOptions,
};
