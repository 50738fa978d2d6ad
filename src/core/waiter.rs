//! # Waiters: single-slot result mailboxes for `trigger_and_wait`.
//!
//! ```text
//! trigger_and_wait()
//!   ├─ oneshot (tx, rx)
//!   ├─ admit(Some(WaiterSlot{ id, tx }))
//!   │     ├─ Started → slot travels with the new run
//!   │     └─ Merged  → slot parked in pending_waiters until the merged run launches
//!   └─ RunWait{ rx, detach }
//!         ├─ resolves with the run's outcome
//!         └─ on drop: best-effort removal from pending_waiters
//! ```
//!
//! ## Rules
//! - Delivery is `oneshot::Sender::send`: never blocks, an abandoned slot is dropped.
//! - The runtime never owns the caller; a waiter leaving never cancels a run.

use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::runtime::TaskRuntime;
use crate::error::TriggerError;

pub(crate) type WaitResult = Result<(), TriggerError>;

/// Runtime-side end of a waiter.
pub(crate) struct WaiterSlot {
    pub id: u64,
    tx: oneshot::Sender<WaitResult>,
}

impl WaiterSlot {
    pub fn new(id: u64) -> (Self, oneshot::Receiver<WaitResult>) {
        let (tx, rx) = oneshot::channel();
        (Self { id, tx }, rx)
    }

    /// Non-blocking delivery; a caller that already left is ignored.
    pub fn offer(self, res: WaitResult) {
        let _ = self.tx.send(res);
    }
}

/// Removes the waiter from the runtime's pending list when the caller leaves early.
struct Detach {
    runtime: Weak<TaskRuntime>,
    id: u64,
    armed: bool,
}

impl Drop for Detach {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(rt) = self.runtime.upgrade() {
            rt.detach_waiter(self.id);
        }
    }
}

enum Inner {
    Ready(Option<WaitResult>),
    Waiting {
        rx: oneshot::Receiver<WaitResult>,
        detach: Detach,
    },
}

/// Future returned by [`TaskHandle::trigger_and_wait`](crate::TaskHandle::trigger_and_wait).
///
/// Admission already happened when this value was created. Awaiting it yields the
/// outcome of the run it was admitted into (or merged into). Dropping it detaches
/// the caller without affecting the run.
#[must_use = "dropping a RunWait detaches from the run"]
pub struct RunWait {
    inner: Inner,
}

impl RunWait {
    pub(crate) fn ready(res: WaitResult) -> Self {
        Self {
            inner: Inner::Ready(Some(res)),
        }
    }

    pub(crate) fn waiting(
        rx: oneshot::Receiver<WaitResult>,
        runtime: Weak<TaskRuntime>,
        id: u64,
    ) -> Self {
        Self {
            inner: Inner::Waiting {
                rx,
                detach: Detach {
                    runtime,
                    id,
                    armed: true,
                },
            },
        }
    }
}

impl Future for RunWait {
    type Output = WaitResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            Inner::Ready(res) => Poll::Ready(res.take().unwrap_or(Err(TriggerError::Closed))),
            Inner::Waiting { rx, detach } => match Pin::new(rx).poll(cx) {
                Poll::Ready(res) => {
                    detach.armed = false;
                    // A slot dropped without delivery means the run never completed.
                    Poll::Ready(res.unwrap_or(Err(TriggerError::Closed)))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
