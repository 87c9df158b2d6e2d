//! Diagnostics and Error Routing
//!
//! The reactive core never panics on misuse and never throws for programmer
//! errors. Invalid operations (setting a reactive property on a primitive,
//! mutating a root data container, watching a malformed path) are reported
//! through an injectable `warn` sink and then become no-ops or fall through
//! to plain assignment.
//!
//! Failures raised by user-supplied closures (watch getters and callbacks)
//! are a separate channel: they are routed through [`handle_error`], which
//! collaborators can redirect to their own reporting. The default sinks for
//! both channels are `tracing` events, so an embedding application gets
//! structured output without wiring anything.
//!
//! # Injection
//!
//! Handlers are installed once per process with [`set_warn_handler`] and
//! [`set_error_handler`]. Installing `None`-like behavior is done by
//! clearing back to the tracing defaults with the matching `clear_` call.

use std::sync::{OnceLock, RwLock};

use thiserror::Error;

/// Failure raised while evaluating a watcher's getter or callback.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    /// The watch expression getter failed.
    #[error("expression evaluation failed: {0}")]
    Getter(String),

    /// The change callback failed.
    #[error("watch callback failed: {0}")]
    Callback(String),

    /// The watch expression string could not be compiled into a getter.
    #[error("unsupported watch expression: {0}")]
    BadExpression(String),
}

type WarnHandler = Box<dyn Fn(&str) + Send + Sync>;
type ErrorHandler = Box<dyn Fn(&EvalError, &str) + Send + Sync>;

static WARN_HANDLER: OnceLock<RwLock<Option<WarnHandler>>> = OnceLock::new();
static ERROR_HANDLER: OnceLock<RwLock<Option<ErrorHandler>>> = OnceLock::new();

fn warn_cell() -> &'static RwLock<Option<WarnHandler>> {
    WARN_HANDLER.get_or_init(|| RwLock::new(None))
}

fn error_cell() -> &'static RwLock<Option<ErrorHandler>> {
    ERROR_HANDLER.get_or_init(|| RwLock::new(None))
}

/// Install a custom sink for programmer-error diagnostics.
pub fn set_warn_handler<F>(handler: F)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    *warn_cell().write().expect("warn handler lock poisoned") = Some(Box::new(handler));
}

/// Restore the default `tracing` warn sink.
pub fn clear_warn_handler() {
    *warn_cell().write().expect("warn handler lock poisoned") = None;
}

/// Report a programmer error. The operation that raised it proceeds as a
/// no-op or plain assignment; nothing is thrown.
pub fn warn(message: &str) {
    let guard = warn_cell().read().expect("warn handler lock poisoned");
    match &*guard {
        Some(handler) => handler(message),
        None => tracing::warn!(target: "skein_core", "{message}"),
    }
}

/// Install a custom sink for user-closure failures.
pub fn set_error_handler<F>(handler: F)
where
    F: Fn(&EvalError, &str) + Send + Sync + 'static,
{
    *error_cell().write().expect("error handler lock poisoned") = Some(Box::new(handler));
}

/// Restore the default `tracing` error sink.
pub fn clear_error_handler() {
    *error_cell().write().expect("error handler lock poisoned") = None;
}

/// Route a failure from a user-supplied closure to the installed handler.
///
/// `context` names the call site, e.g. `getter for watcher "a.b"`.
pub fn handle_error(err: &EvalError, context: &str) {
    let guard = error_cell().read().expect("error handler lock poisoned");
    match &*guard {
        Some(handler) => handler(err, context),
        None => tracing::error!(target: "skein_core", "error in {context}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn warn_routes_to_installed_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        // Count only this test's message: other tests may warn concurrently.
        set_warn_handler(move |msg| {
            if msg == "something questionable" {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        warn("something questionable");
        assert_eq!(count.load(Ordering::SeqCst), 1);

        clear_warn_handler();
    }

    #[test]
    fn handle_error_routes_to_installed_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        set_error_handler(move |_err, ctx| {
            if ctx == "diagnostics self test" {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        handle_error(&EvalError::Getter("boom".into()), "diagnostics self test");
        assert_eq!(count.load(Ordering::SeqCst), 1);

        clear_error_handler();
    }

    #[test]
    fn errors_render_their_context() {
        let err = EvalError::BadExpression("a-b".into());
        assert_eq!(err.to_string(), "unsupported watch expression: a-b");
    }
}
