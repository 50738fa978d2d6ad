//! # Task abstraction.
//!
//! This module defines the [`Task`] trait (async, cancelable) and the shared
//! handle type [`TaskRef`], an `Arc<dyn Task>` suitable for sharing across the engine.
//!
//! A task receives a [`CancellationToken`] and should check it to stop
//! cooperatively when the manager shuts down. The engine never forcibly aborts a run.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Shared handle to a task.
pub type TaskRef = Arc<dyn Task>;

/// # Asynchronous, cancelable unit of work.
///
/// A `Task` is invoked once per admitted run. Several runs of the same task may be
/// in flight at once when the task is registered with `max_concurrent > 1`, so
/// `run` takes `&self` and any shared state must be synchronized by the implementor.
///
/// Returning [`TaskError::Canceled`] signals a routine cancellation; it is counted
/// separately from failures unless the task reports cancellations.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use async_trait::async_trait;
/// use taskgate::{Task, TaskError};
///
/// struct Compact;
///
/// #[async_trait]
/// impl Task for Compact {
///     async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError> {
///         if ctx.is_cancelled() {
///             return Err(TaskError::Canceled);
///         }
///         // do work...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Executes one run until completion or cancellation.
    async fn run(&self, ctx: CancellationToken) -> Result<(), TaskError>;
}
