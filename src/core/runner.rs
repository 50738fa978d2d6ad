//! # Execute one admitted run.
//!
//! Drives a single run of a task from hooks to completion bookkeeping.
//!
//! ## Flow
//! ```text
//! run_once(rt, token, run, merged, waiters)
//!   ├─► before_run (manager hook, then task hook)     each under catch_unwind
//!   ├─► publish RunStarted
//!   ├─► task.run(child) [timeout?] under catch_unwind
//!   │       ├─ timeout elapsed → child.cancel(), Err(Timeout)
//!   │       └─ panic           → Panicked(info)
//!   ├─► classify → RunOutcome
//!   ├─► after_run (manager hook, then task hook)      each under catch_unwind
//!   ├─► ErrorHandler::on_error / on_panic             under catch_unwind
//!   ├─► publish RunSucceeded / RunFailed / RunPanicked / RunCanceled
//!   └─► rt.finish(outcome, waiters)
//! ```
//!
//! ## Rules
//! - Exactly one terminal event per run.
//! - A panic anywhere in user code is contained here; `finish` always runs.
//! - Filtered cancellations never reach the error handler.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::SystemTime;

use futures::FutureExt;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::{runtime::TaskRuntime, waiter::WaiterSlot};
use crate::{
    error::TaskError,
    events::{Event, EventKind},
    hooks::{RunInfo, guarded, panic_message},
    tasks::RunOutcome,
};

/// Runs one admitted run of `rt` and reports its outcome to `waiters`.
pub(crate) async fn run_once(
    rt: Arc<TaskRuntime>,
    token: CancellationToken,
    run: u64,
    merged: bool,
    waiters: Vec<WaiterSlot>,
) {
    let spec = &rt.spec;
    let shared = rt.shared();
    let info = RunInfo {
        task: Arc::clone(&spec.name),
        tags: Arc::clone(&spec.tags),
        run,
        merged,
        started_at: SystemTime::now(),
    };

    if let Some(hook) = &shared.hook {
        guarded("before_run", &spec.name, || hook.before_run(&info));
    }
    if let Some(hook) = &spec.hook {
        guarded("before_run", &spec.name, || hook.before_run(&info));
    }

    shared
        .bus
        .publish(rt.event(EventKind::RunStarted).with_run(run));

    let started = Instant::now();
    let work = AssertUnwindSafe(spec.task.run(token.clone())).catch_unwind();
    let res = match spec.timeout {
        Some(dur) => match time::timeout(dur, work).await {
            Ok(r) => r,
            Err(_elapsed) => {
                token.cancel();
                Ok(Err(TaskError::Timeout { timeout: dur }))
            }
        },
        None => work.await,
    };
    let elapsed = started.elapsed();

    let outcome = match res {
        Ok(r) => RunOutcome::classify(r, spec.report_cancellations),
        Err(payload) => RunOutcome::Panicked(panic_message(payload.as_ref())),
    };

    if let Some(hook) = &shared.hook {
        guarded("after_run", &spec.name, || hook.after_run(&info, &outcome));
    }
    if let Some(hook) = &spec.hook {
        guarded("after_run", &spec.name, || hook.after_run(&info, &outcome));
    }

    match &outcome {
        RunOutcome::Failed(e) => {
            guarded("on_error", &spec.name, || shared.handler.on_error(&spec.name, e));
        }
        RunOutcome::Panicked(p) => {
            guarded("on_panic", &spec.name, || shared.handler.on_panic(&spec.name, p));
        }
        RunOutcome::Succeeded | RunOutcome::Canceled(_) => {}
    }

    shared.bus.publish(terminal_event(&rt, &outcome, run).with_elapsed(elapsed));
    rt.finish(&outcome, waiters);
}

fn terminal_event(rt: &TaskRuntime, outcome: &RunOutcome, run: u64) -> Event {
    let ev = match outcome {
        RunOutcome::Succeeded => rt.event(EventKind::RunSucceeded),
        RunOutcome::Failed(e) => rt.event(EventKind::RunFailed).with_reason(e.to_string()),
        RunOutcome::Panicked(p) => rt.event(EventKind::RunPanicked).with_reason(p.as_str()),
        RunOutcome::Canceled(_) => rt.event(EventKind::RunCanceled),
    };
    ev.with_run(run)
}
