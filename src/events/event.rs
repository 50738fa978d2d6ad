//! # Engine events.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Manager lifecycle**: start, shutdown request, shutdown result
//! - **Registration**: a task was added
//! - **Run lifecycle**: started, succeeded, failed, panicked, canceled, skipped, merged
//! - **Scheduling / subscribers**: next tick armed, subscriber overflow and panic
//!
//! The [`Event`] struct carries metadata such as timestamps, task name,
//! reasons and durations.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use taskgate::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RunFailed)
//!     .with_task("reindex")
//!     .with_reason("boom")
//!     .with_run(3)
//!     .with_elapsed(Duration::from_millis(40));
//!
//! assert_eq!(ev.kind, EventKind::RunFailed);
//! assert_eq!(ev.task.as_deref(), Some("reindex"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of engine events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `task` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `task` (subscriber name), `reason` ("full" / "closed").
    SubscriberOverflow,

    // === Manager lifecycle ===
    /// The manager entered `Running`.
    ManagerStarted,

    /// Shutdown began (manager entered `Stopping`).
    ShutdownRequested,

    /// All runs and scheduler loops finished within the shutdown bound.
    AllStoppedWithin,

    /// The shutdown bound was reached with work still in flight.
    ///
    /// Sets: `reason` (stuck task names).
    GraceExceeded,

    // === Registration ===
    /// A task was registered.
    ///
    /// Sets: `task`, `reason` (schedule label).
    TaskAdded,

    // === Run lifecycle ===
    /// A run was admitted and is about to invoke the work function.
    ///
    /// Sets: `task`, `run`.
    RunStarted,

    /// A run returned `Ok(())`.
    ///
    /// Sets: `task`, `run`, `elapsed_ms`.
    RunSucceeded,

    /// A run returned an error counted as failure.
    ///
    /// Sets: `task`, `run`, `elapsed_ms`, `reason`.
    RunFailed,

    /// A run panicked.
    ///
    /// Sets: `task`, `run`, `elapsed_ms`, `reason` (panic info).
    RunPanicked,

    /// A run ended with a filtered cancellation.
    ///
    /// Sets: `task`, `run`, `elapsed_ms`.
    RunCanceled,

    /// A request was rejected by the `Skip` overlap policy.
    ///
    /// Sets: `task`.
    RunSkipped,

    /// A request was folded into the pending run (`Merge` overlap policy).
    ///
    /// Sets: `task`.
    RunMerged,

    // === Scheduling ===
    /// A scheduler loop armed its timer for the next tick.
    ///
    /// Sets: `task`, `delay_ms` (time until the tick).
    TickScheduled,
}

/// Engine event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the task (or subscriber), if applicable.
    pub task: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Run number within the task (starting from 1).
    pub run: Option<u64>,
    /// Run duration in milliseconds (compact).
    pub elapsed_ms: Option<u32>,
    /// Delay until the next tick in milliseconds (compact).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            reason: None,
            run: None,
            elapsed_ms: None,
            delay_ms: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a task name.
    #[inline]
    pub fn with_task(mut self, task: impl Into<Arc<str>>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Attaches a run number.
    #[inline]
    pub fn with_run(mut self, n: u64) -> Self {
        self.run = Some(n);
        self
    }

    /// Attaches a run duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a tick delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_task(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_task(subscriber)
            .with_reason(info)
    }

    /// True for run-lifecycle terminal events.
    #[inline]
    pub fn is_run_finished(&self) -> bool {
        matches!(
            self.kind,
            EventKind::RunSucceeded
                | EventKind::RunFailed
                | EventKind::RunPanicked
                | EventKind::RunCanceled
        )
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}
