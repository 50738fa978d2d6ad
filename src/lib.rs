//! # taskgate
//!
//! **Taskgate** is a background task scheduling and concurrent-execution engine
//! for long-running tokio services.
//!
//! Tasks are registered with a [`Manager`] and run on demand, by remote trigger,
//! or on a repeating schedule. Each task has a concurrency cap and an overlap
//! policy deciding what happens to requests that arrive while it is at capacity.
//! The manager owns a single lifecycle and a race-free shutdown that drains
//! scheduler loops, in-flight runs and waiting callers.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   TaskSpec   │   │   TaskSpec   │   │   TaskSpec   │
//!     │  (trigger)   │   │   (every)    │   │   (every)    │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Manager                                                          │
//! │  - Gate (phase + run token behind RwLock)                         │
//! │  - Registry (runtimes by name + all)                              │
//! │  - TaskTracker (every run and scheduler loop)                     │
//! │  - Bus → SubscriberSet                                            │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ TaskRuntime  │   │ TaskRuntime  │   │ TaskRuntime  │
//!     │  admit/finish│   │  + scheduler │   │  + scheduler │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      │ run_once         │ run_once         │ run_once
//!      ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │              (capacity: ManagerConfig::bus_capacity)              │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                        SubscriberSet (per-sub queues)
//!                       ┌─────────┼─────────┐
//!                       ▼         ▼         ▼
//!                    worker1   worker2   workerN
//! ```
//!
//! ### Run request
//! ```text
//! handle.trigger() / trigger_and_wait() / scheduler tick
//!   ├─► phase != Running            ─► NotRunning / Closed
//!   ├─► running < max_concurrent    ─► spawn run_once        ─► Started
//!   ├─► at capacity, Skip           ─► RunSkipped            ─► Skipped
//!   └─► at capacity, Merge          ─► pending = true        ─► Merged
//!
//! run_once:
//!   before_run ─► work (timeout?, catch_unwind) ─► after_run ─► ErrorHandler
//!   └─► finish: counters, completion signal, waiters, launch merged run if pending
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                         |
//! |-------------------|----------------------------------------------------------------|--------------------------------------------|
//! | **Tasks**         | Define work as functions or trait objects.                     | [`Task`], [`TaskFn`], [`TaskRef`]          |
//! | **Definitions**   | Schedule, concurrency cap, overlap, timeout, hook.             | [`TaskSpec`], [`Schedule`], [`Every`]      |
//! | **Policies**      | Overlap and tick disciplines.                                  | [`OverlapPolicy`], [`TickPolicy`]          |
//! | **Control**       | Trigger, wait, inspect.                                        | [`TaskHandle`], [`RunWait`], [`TaskSnapshot`] |
//! | **Lifecycle**     | Start, graceful bounded shutdown.                              | [`Manager`], [`Phase`]                     |
//! | **Hooks**         | Callbacks around runs and error reporting.                     | [`RunHook`], [`ErrorHandler`]              |
//! | **Subscriber API**| Engine events for logging, metrics, custom subscribers.        | [`Subscribe`], [`Event`]                   |
//! | **Errors**        | Typed errors for registration, triggering and lifecycle.       | [`TriggerError`], [`RuntimeError`]         |
//! | **Configuration** | Centralize engine settings.                                    | [`ManagerConfig`]                          |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber rendering events through `tracing`.
//! - `serde`: derives `Serialize` for [`TaskSnapshot`] and the enums it contains.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use taskgate::{Manager, ManagerConfig, OverlapPolicy, TaskError, TaskFn, TaskRef, TaskSpec};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mgr = Manager::new(ManagerConfig::default());
//!
//!     let flush: TaskRef = TaskFn::arc(|ctx: CancellationToken| async move {
//!         if ctx.is_cancelled() {
//!             return Err(TaskError::Canceled);
//!         }
//!         Ok(())
//!     });
//!     mgr.add(
//!         TaskSpec::every(flush, Duration::from_secs(60))
//!             .with_name("flush")
//!             .with_overlap(OverlapPolicy::Merge),
//!     )?;
//!
//!     mgr.start(CancellationToken::new())?;
//!     mgr.trigger_and_wait("flush", Duration::from_secs(5)).await?;
//!     mgr.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod hooks;
mod policies;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use core::{
    Admission, Manager, ManagerBuilder, ManagerConfig, Phase, RunWait, TaskHandle, TaskSnapshot,
    TaskState,
};
pub use error::{RegisterError, RuntimeError, TaskError, TriggerError};
pub use events::{Bus, Event, EventKind};
pub use hooks::{ErrorHandler, RunHook, RunInfo, TracingErrorHandler};
pub use policies::{OverlapPolicy, TickPolicy};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{Every, RunOutcome, Schedule, Task, TaskFn, TaskRef, TaskSpec, TaskSpecBuilder};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
