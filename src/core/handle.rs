//! # Caller-facing handle to a registered task.
//!
//! [`TaskHandle`] is returned by [`Manager::add`](crate::Manager::add) and
//! [`Manager::lookup`](crate::Manager::lookup). It is cheap to clone and can be
//! moved into other tasks.
//!
//! ## Request variants
//! ```text
//! try_trigger()                 → bool                       fire-and-forget
//! trigger()                     → Result<Admission, _>       admission only
//! trigger_and_wait()            → RunWait                    admission now, outcome later
//! trigger_and_wait_timeout(d)   → Result<(), _>              WaitTimeout after d
//! trigger_and_wait_until(tok)   → Result<(), _>              WaitCanceled on tok
//! ```
//! Giving up on a wait never cancels the run.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{
    runtime::TaskRuntime,
    status::TaskSnapshot,
    waiter::{RunWait, WaiterSlot},
};
use crate::{error::TriggerError, tasks::Schedule};

/// How an accepted run request was admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// A new run was started.
    Started,
    /// The request was folded into the task's pending run (`Merge` policy).
    Merged,
}

/// Handle to one registered task.
#[derive(Clone)]
pub struct TaskHandle {
    rt: Arc<TaskRuntime>,
}

impl TaskHandle {
    pub(crate) fn new(rt: Arc<TaskRuntime>) -> Self {
        Self { rt }
    }

    /// Task name (empty for unnamed tasks).
    pub fn name(&self) -> &str {
        &self.rt.spec.name
    }

    /// Task tags.
    pub fn tags(&self) -> &[String] {
        &self.rt.spec.tags
    }

    /// Task schedule.
    pub fn schedule(&self) -> Schedule {
        self.rt.spec.schedule
    }

    /// Requests a run; returns whether the request was accepted (started or merged).
    pub fn try_trigger(&self) -> bool {
        self.trigger().is_ok()
    }

    /// Requests a run without waiting for it.
    ///
    /// # Errors
    /// - [`TriggerError::NotRunning`] before the manager started
    /// - [`TriggerError::Closed`] once shutdown began
    /// - [`TriggerError::Skipped`] at capacity under the `Skip` policy
    pub fn trigger(&self) -> Result<Admission, TriggerError> {
        self.rt.admit(None)
    }

    /// Requests a run and returns a future resolving to its outcome.
    ///
    /// Admission happens when this method is called, not when the future is first
    /// polled. Rejections resolve immediately. Under `Merge`, the future resolves
    /// with the outcome of the merged run.
    pub fn trigger_and_wait(&self) -> RunWait {
        let id = self.rt.next_waiter_id();
        let (slot, rx) = WaiterSlot::new(id);
        match self.rt.admit(Some(slot)) {
            Ok(_) => RunWait::waiting(rx, Arc::downgrade(&self.rt), id),
            Err(e) => RunWait::ready(Err(e)),
        }
    }

    /// Like [`trigger_and_wait`](Self::trigger_and_wait), giving up after `timeout`.
    pub async fn trigger_and_wait_timeout(&self, timeout: Duration) -> Result<(), TriggerError> {
        let wait = self.trigger_and_wait();
        match tokio::time::timeout(timeout, wait).await {
            Ok(res) => res,
            Err(_elapsed) => Err(TriggerError::WaitTimeout { timeout }),
        }
    }

    /// Like [`trigger_and_wait`](Self::trigger_and_wait), giving up when `cancel` fires.
    pub async fn trigger_and_wait_until(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(), TriggerError> {
        let wait = self.trigger_and_wait();
        tokio::select! {
            biased;
            res = wait => res,
            _ = cancel.cancelled() => Err(TriggerError::WaitCanceled),
        }
    }

    /// Point-in-time copy of the task's state and counters.
    pub fn snapshot(&self) -> TaskSnapshot {
        self.rt.snapshot()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name())
            .field("schedule", &self.rt.spec.schedule)
            .finish()
    }
}
