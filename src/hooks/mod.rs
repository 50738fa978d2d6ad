//! # Run hooks and error reporting.
//!
//! Two synchronous extension points surround every run:
//! - [`RunHook`]: `before_run` / `after_run` callbacks, one manager-wide and one per task;
//! - [`ErrorHandler`]: receives failed and panicked runs (default: [`TracingErrorHandler`]).
//!
//! Both run outside every engine lock and are each guarded by `catch_unwind`:
//! a panicking hook or handler is logged through the fallback sink and never
//! reaches the run or the scheduler loop.

mod handler;
mod hook;

pub use handler::{ErrorHandler, TracingErrorHandler};
pub use hook::{RunHook, RunInfo};

pub(crate) use handler::{guarded, panic_message};
