//! # Classified result of one run.
//!
//! The runner turns whatever the work function produced into a [`RunOutcome`]:
//!
//! ```text
//! Ok(())                       ─► Succeeded
//! Err(Canceled), not reported  ─► Canceled
//! Err(Canceled), reported      ─► Failed
//! Err(Fail/Timeout)            ─► Failed
//! panic                        ─► Panicked
//! ```

use crate::error::{TaskError, TriggerError};

/// Outcome of a single run, as seen by hooks, counters and waiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The work function returned `Ok(())`.
    Succeeded,
    /// The work function returned an error that counts as a failure.
    Failed(TaskError),
    /// The work function panicked; the payload is rendered as text.
    Panicked(String),
    /// The work function reported cancellation and cancellations are not reported.
    Canceled(TaskError),
}

impl RunOutcome {
    /// Classifies a work-function result.
    pub(crate) fn classify(res: Result<(), TaskError>, report_cancellations: bool) -> Self {
        match res {
            Ok(()) => RunOutcome::Succeeded,
            Err(e) if e.is_cancellation() && !report_cancellations => RunOutcome::Canceled(e),
            Err(e) => RunOutcome::Failed(e),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed(_) => "failed",
            RunOutcome::Panicked(_) => "panicked",
            RunOutcome::Canceled(_) => "canceled",
        }
    }

    /// True for `Failed` and `Panicked`.
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed(_) | RunOutcome::Panicked(_))
    }

    /// Converts the outcome into what a waiter receives.
    ///
    /// A cancellation observed while the manager is closing is reported as
    /// [`TriggerError::Closed`].
    pub(crate) fn to_wait_result(&self, closing: bool) -> Result<(), TriggerError> {
        match self {
            RunOutcome::Succeeded => Ok(()),
            RunOutcome::Failed(e) if closing && e.is_cancellation() => Err(TriggerError::Closed),
            RunOutcome::Failed(e) => Err(TriggerError::Task(e.clone())),
            RunOutcome::Panicked(info) => Err(TriggerError::Panicked { info: info.clone() }),
            RunOutcome::Canceled(_) if closing => Err(TriggerError::Closed),
            RunOutcome::Canceled(e) => Err(TriggerError::Task(e.clone())),
        }
    }
}
