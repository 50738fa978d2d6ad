use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::error::TaskError;

/// Receives run failures and panics.
///
/// Implementations must not block; they are called on the run's tokio task.
pub trait ErrorHandler: Send + Sync + 'static {
    /// A run returned an error that counts as a failure.
    fn on_error(&self, task: &str, err: &TaskError);

    /// A run panicked.
    fn on_panic(&self, task: &str, info: &str);
}

/// Default handler: logs through `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorHandler;

impl ErrorHandler for TracingErrorHandler {
    fn on_error(&self, task: &str, err: &TaskError) {
        tracing::error!(task, label = err.as_label(), error = %err, "task run failed");
    }

    fn on_panic(&self, task: &str, info: &str) {
        tracing::error!(task, panic = info, "task run panicked");
    }
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs `f`, routing a panic to the fallback sink instead of unwinding.
pub(crate) fn guarded(what: &'static str, task: &str, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        let info = panic_message(payload.as_ref());
        tracing::error!(task, callback = what, panic = %info, "callback panicked");
    }
}
