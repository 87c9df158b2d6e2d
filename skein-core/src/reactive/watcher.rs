//! Watchers
//!
//! A [`Watcher`] evaluates an expression over a scope's observed data,
//! records which deps it touched during its most recent evaluation, and
//! reacts to their change notifications by re-evaluating and firing a
//! callback when the computed value changes.
//!
//! # Evaluation modes
//!
//! - **Eager asynchronous** (the default): change notifications enqueue the
//!   watcher into the scheduler, which drains in a micro-task.
//! - **Eager synchronous** (`sync`): the watcher re-runs during the
//!   notification itself.
//! - **Lazy** (`lazy`): notifications only mark the watcher dirty; the
//!   cached value is recomputed when next requested via [`Watcher::evaluate`].
//!   Lazy watchers back memoized derived values, and
//!   [`Watcher::depend`] forwards their dep set to the current target so a
//!   derived value's consumer transitively subscribes to its inputs.
//!
//! # Dependency bookkeeping
//!
//! Two dep sets are kept: `deps` (the previous evaluation) and `new_deps`
//! (the one in progress). `add_dep` uses the id sets for O(1) membership so
//! a dep is recorded once per evaluation and subscribed at most once across
//! re-evaluations; `cleanup_deps` unsubscribes from deps the latest
//! evaluation no longer touched, which is what makes conditional reads shed
//! dead branches. The swap happens even when the getter fails.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::diagnostics::{handle_error, warn, EvalError};

use super::context::{pop_target, push_target};
use super::dep::Dep;
use super::scheduler::queue_watcher;
use super::scope::Scope;
use super::traverse::traverse;
use super::value::{same_value, Value};

/// Counter for generating unique watcher IDs. Scheduler ordering relies on
/// ids being handed out in creation order.
static WATCHER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_watcher_id() -> u64 {
    WATCHER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Getter closure evaluated under dependency tracking.
pub type GetterFn = dyn Fn(&Scope) -> Result<Value, EvalError> + Send + Sync;

/// Change callback, invoked with `(scope, new_value, old_value)`.
pub type CallbackFn = dyn Fn(&Scope, &Value, &Value) -> Result<(), EvalError> + Send + Sync;

/// A callback that does nothing; render watchers use one, since their work
/// happens in the getter.
pub fn noop_callback() -> Arc<CallbackFn> {
    Arc::new(|_, _, _| Ok(()))
}

/// What a watcher evaluates: a getter closure, or a dot-delimited path into
/// the scope's root data.
pub enum WatchSource {
    /// A dot-delimited path such as `"a.b.c"`. Compiled into a getter that
    /// yields `Null` on any broken link.
    Path(String),
    /// An arbitrary getter over the scope.
    Getter(Arc<GetterFn>),
}

impl WatchSource {
    /// Wrap a closure as a watch source.
    pub fn getter<F>(f: F) -> WatchSource
    where
        F: Fn(&Scope) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        WatchSource::Getter(Arc::new(f))
    }
}

impl From<&str> for WatchSource {
    fn from(path: &str) -> WatchSource {
        WatchSource::Path(path.to_string())
    }
}

impl From<String> for WatchSource {
    fn from(path: String) -> WatchSource {
        WatchSource::Path(path)
    }
}

/// Construction options for a watcher.
#[derive(Clone, Default)]
pub struct WatcherOptions {
    /// Traverse the evaluated value, subscribing to everything reachable.
    pub deep: bool,
    /// The getter and callback are user-supplied: their failures are routed
    /// through the error handler instead of propagating.
    pub user: bool,
    /// Defer evaluation until the cached value is requested.
    pub lazy: bool,
    /// Re-run during notification instead of going through the scheduler.
    pub sync: bool,
    /// Invoked just before the callback fires during a scheduler flush.
    pub before: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// Compile a dot-delimited path into segments. Returns `None` when the
/// expression contains anything but alphanumerics, `_`, `$` and `.`.
fn parse_path(path: &str) -> Option<Vec<String>> {
    if path.is_empty()
        || !path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
    {
        return None;
    }
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return None;
    }
    Some(segments)
}

fn path_getter(segments: Vec<String>) -> Arc<GetterFn> {
    Arc::new(move |scope: &Scope| {
        let mut current = scope.data().clone();
        for segment in &segments {
            current = match &current {
                Value::Map(map) => map.get(segment),
                _ => return Ok(Value::Null),
            };
        }
        Ok(current)
    })
}

#[derive(Default)]
struct DepSet {
    list: Vec<Dep>,
    ids: HashSet<u64>,
}

impl DepSet {
    fn clear(&mut self) {
        self.list.clear();
        self.ids.clear();
    }
}

/// An evaluator that records its reads and reacts to writes.
///
/// Cloning shares all state; clones are handles to the same watcher.
pub struct Watcher {
    id: u64,
    scope: Scope,
    getter: Arc<GetterFn>,
    cb: Arc<CallbackFn>,
    expression: Arc<str>,
    deep: bool,
    user: bool,
    lazy: bool,
    sync: bool,
    is_render: bool,
    before: Option<Arc<dyn Fn() + Send + Sync>>,
    active: Arc<AtomicBool>,
    dirty: Arc<AtomicBool>,
    value: Arc<RwLock<Value>>,
    deps: Arc<RwLock<DepSet>>,
    new_deps: Arc<RwLock<DepSet>>,
}

impl Watcher {
    /// Create a watcher on `scope`.
    ///
    /// Non-lazy watchers evaluate immediately to establish their initial
    /// value and dependency set; evaluation failures are reported through
    /// the error handler and the initial value becomes `Null`. A render
    /// watcher (`is_render`) is additionally cached on its scope.
    pub fn new(
        scope: &Scope,
        source: WatchSource,
        cb: Arc<CallbackFn>,
        options: WatcherOptions,
        is_render: bool,
    ) -> Watcher {
        let (getter, expression): (Arc<GetterFn>, Arc<str>) = match source {
            WatchSource::Getter(f) => (f, Arc::from("<function>")),
            WatchSource::Path(path) => match parse_path(&path) {
                Some(segments) => (path_getter(segments), Arc::from(path.as_str())),
                None => {
                    warn(&format!(
                        "failed to watch path \"{path}\": only dot-delimited paths are supported; \
                         use a getter closure for anything else"
                    ));
                    (Arc::new(|_: &Scope| Ok(Value::Null)), Arc::from(path.as_str()))
                }
            },
        };

        let watcher = Watcher {
            id: next_watcher_id(),
            scope: scope.clone(),
            getter,
            cb,
            expression,
            deep: options.deep,
            user: options.user,
            lazy: options.lazy,
            sync: options.sync,
            is_render,
            before: options.before,
            active: Arc::new(AtomicBool::new(true)),
            dirty: Arc::new(AtomicBool::new(options.lazy)),
            value: Arc::new(RwLock::new(Value::Null)),
            deps: Arc::new(RwLock::new(DepSet::default())),
            new_deps: Arc::new(RwLock::new(DepSet::default())),
        };

        scope.register_watcher(watcher.clone());
        if is_render {
            scope.cache_render_watcher(watcher.clone());
        }

        if !watcher.lazy {
            match watcher.get() {
                Ok(value) => {
                    *watcher.value.write().expect("value lock poisoned") = value;
                }
                Err(err) => {
                    handle_error(
                        &err,
                        &format!("initial evaluation of watcher \"{}\"", watcher.expression),
                    );
                }
            }
        }
        watcher
    }

    /// The watcher's process-unique id, handed out in creation order.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The watched expression, for diagnostics.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether the cached value is stale with respect to the dependencies.
    /// Meaningful for lazy watchers only.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn is_render(&self) -> bool {
        self.is_render
    }

    pub(crate) fn before_hook(&self) -> Option<Arc<dyn Fn() + Send + Sync>> {
        self.before.clone()
    }

    /// The most recent evaluation result.
    pub fn value(&self) -> Value {
        self.value.read().expect("value lock poisoned").clone()
    }

    /// Evaluate the getter under dependency tracking.
    ///
    /// Pushes this watcher as the current target, runs the getter, deep
    /// traverses when requested, then pops the target and swaps the dep
    /// sets. The pop and swap happen on the error path too.
    pub fn get(&self) -> Result<Value, EvalError> {
        push_target(Some(self.clone()));
        let outcome = match (self.getter)(&self.scope) {
            Ok(value) => {
                if self.deep {
                    traverse(&value);
                }
                Ok(value)
            }
            Err(err) => {
                if self.user {
                    handle_error(
                        &err,
                        &format!("getter for watcher \"{}\"", self.expression),
                    );
                    Ok(Value::Null)
                } else {
                    Err(err)
                }
            }
        };
        pop_target();
        self.cleanup_deps();
        outcome
    }

    /// Record a dep touched by the current evaluation. Subscribes to it only
    /// if the previous evaluation did not already hold it.
    pub(crate) fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        let mut new_deps = self.new_deps.write().expect("new_deps lock poisoned");
        if !new_deps.ids.contains(&id) {
            new_deps.ids.insert(id);
            new_deps.list.push(dep.clone());
            let already_subscribed = self
                .deps
                .read()
                .expect("deps lock poisoned")
                .ids
                .contains(&id);
            if !already_subscribed {
                dep.add_sub(self.clone());
            }
        }
    }

    /// Unsubscribe from deps the latest evaluation no longer touched, then
    /// promote `new_deps` to `deps`.
    fn cleanup_deps(&self) {
        let mut deps = self.deps.write().expect("deps lock poisoned");
        let mut new_deps = self.new_deps.write().expect("new_deps lock poisoned");
        for dep in &deps.list {
            if !new_deps.ids.contains(&dep.id()) {
                dep.remove_sub(self.id);
            }
        }
        std::mem::swap(&mut *deps, &mut *new_deps);
        new_deps.clear();
    }

    /// React to a change notification from one of this watcher's deps.
    pub fn update(&self) {
        if self.lazy {
            self.dirty.store(true, Ordering::SeqCst);
        } else if self.sync {
            if let Err(err) = self.run() {
                handle_error(
                    &err,
                    &format!("synchronous run of watcher \"{}\"", self.expression),
                );
            }
        } else {
            queue_watcher(self.clone());
        }
    }

    /// Re-evaluate and fire the callback if the value changed, is a
    /// container (which may have been mutated in place), or the watcher is
    /// deep. Skipped entirely once torn down.
    pub fn run(&self) -> Result<(), EvalError> {
        if !self.is_active() {
            return Ok(());
        }
        let value = self.get()?;
        let old = self.value();
        if !same_value(&value, &old) || value.is_container() || self.deep {
            *self.value.write().expect("value lock poisoned") = value.clone();
            if self.user {
                if let Err(err) = (self.cb)(&self.scope, &value, &old) {
                    handle_error(
                        &err,
                        &format!("callback for watcher \"{}\"", self.expression),
                    );
                }
            } else {
                (self.cb)(&self.scope, &value, &old)?;
            }
        }
        Ok(())
    }

    /// Recompute a lazy watcher's cached value and clear its dirty flag.
    pub fn evaluate(&self) -> Result<(), EvalError> {
        let value = self.get()?;
        *self.value.write().expect("value lock poisoned") = value;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Re-record every dep this watcher holds against the *current* target.
    /// This is how a memoized value's consumer transitively subscribes to
    /// the memoized value's inputs.
    pub fn depend(&self) {
        let deps: Vec<Dep> = self.deps.read().expect("deps lock poisoned").list.clone();
        for dep in deps {
            dep.depend();
        }
    }

    /// Cancel this watcher: unlink it from its scope, unsubscribe it from
    /// every dep, and mark it inactive. A torn-down watcher still sitting in
    /// the scheduler queue is skipped by `run`.
    pub fn teardown(&self) {
        if !self.is_active() {
            return;
        }
        if !self.scope.is_destroyed() {
            self.scope.unregister_watcher(self.id);
        }
        let mut deps = self.deps.write().expect("deps lock poisoned");
        for dep in &deps.list {
            dep.remove_sub(self.id);
        }
        deps.clear();
        self.new_deps.write().expect("new_deps lock poisoned").clear();
        self.active.store(false, Ordering::SeqCst);
    }

    /// The deps held after the most recent evaluation. For instrumentation
    /// and tests.
    pub fn deps(&self) -> Vec<Dep> {
        self.deps.read().expect("deps lock poisoned").list.clone()
    }

    /// Ids of the deps held after the most recent evaluation.
    pub fn dep_ids(&self) -> Vec<u64> {
        self.deps().iter().map(Dep::id).collect()
    }
}

impl Clone for Watcher {
    fn clone(&self) -> Watcher {
        Watcher {
            id: self.id,
            scope: self.scope.clone(),
            getter: Arc::clone(&self.getter),
            cb: Arc::clone(&self.cb),
            expression: Arc::clone(&self.expression),
            deep: self.deep,
            user: self.user,
            lazy: self.lazy,
            sync: self.sync,
            is_render: self.is_render,
            before: self.before.clone(),
            active: Arc::clone(&self.active),
            dirty: Arc::clone(&self.dirty),
            value: Arc::clone(&self.value),
            deps: Arc::clone(&self.deps),
            new_deps: Arc::clone(&self.new_deps),
        }
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("expression", &self.expression)
            .field("active", &self.is_active())
            .field("dirty", &self.is_dirty())
            .field("dep_count", &self.deps().len())
            .finish()
    }
}
