//! # LogWriter: events rendered through `tracing`
//!
//! A subscriber that logs incoming [`Event`]s with the `tracing` macros.
//! Install any `tracing` subscriber (e.g. `tracing_subscriber::fmt`) to see the output.
//!
//! ## Example output
//! ```text
//! INFO  run started task="reindex" run=1
//! WARN  run failed task="reindex" run=1 elapsed_ms=12 reason="execution failed: boom"
//! DEBUG run skipped task="reindex"
//! INFO  shutdown requested
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, trace, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let task = e.task.as_deref().unwrap_or("");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::ManagerStarted => info!("manager started"),
            EventKind::ShutdownRequested => info!("shutdown requested"),
            EventKind::AllStoppedWithin => info!("all tasks stopped within grace"),
            EventKind::GraceExceeded => error!(stuck = reason, "shutdown grace exceeded"),
            EventKind::TaskAdded => info!(task, schedule = reason, "task added"),
            EventKind::RunStarted => info!(task, run = e.run, "run started"),
            EventKind::RunSucceeded => {
                info!(task, run = e.run, elapsed_ms = e.elapsed_ms, "run succeeded")
            }
            EventKind::RunFailed => {
                warn!(task, run = e.run, elapsed_ms = e.elapsed_ms, reason, "run failed")
            }
            EventKind::RunPanicked => {
                error!(task, run = e.run, elapsed_ms = e.elapsed_ms, reason, "run panicked")
            }
            EventKind::RunCanceled => info!(task, run = e.run, "run canceled"),
            EventKind::RunSkipped => debug!(task, "run skipped"),
            EventKind::RunMerged => debug!(task, "run merged"),
            EventKind::TickScheduled => trace!(task, delay_ms = e.delay_ms, "tick scheduled"),
            EventKind::SubscriberOverflow => {
                warn!(subscriber = task, reason, "subscriber overflow")
            }
            EventKind::SubscriberPanicked => {
                error!(subscriber = task, reason, "subscriber panicked")
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
