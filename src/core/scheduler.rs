//! # Scheduler loop for periodic tasks.
//!
//! One loop per [`Schedule::Every`](crate::Schedule::Every) task, spawned on the
//! manager's tracker when the task becomes active.
//!
//! ## Tick disciplines
//! ```text
//! FixedDelay:   tick ─► admit ─► wait for completion ─► finish + interval ─► tick ...
//!               (rejected for any reason other than Skip ─► now + interval)
//!
//! FixedRate:    base, base + i, base + 2i, ...
//!               next = smallest base + k·i strictly after now; missed ticks are dropped
//! ```
//!
//! ## Rules
//! - `next_run` is published before every sleep and cleared when the loop ends.
//! - Cancellation of the run token ends the loop at the next await point and
//!   marks the task `Stopping`.
//! - The loop never holds an engine lock across an await.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::runtime::TaskRuntime;
use crate::{
    error::TriggerError,
    events::EventKind,
    policies::TickPolicy,
    tasks::Every,
};

/// Drives the periodic schedule of `rt` until `token` is cancelled.
pub(crate) async fn run_schedule(rt: Arc<TaskRuntime>, token: CancellationToken, every: Every) {
    let base = Instant::now();
    let mut next = if every.start_immediately {
        base
    } else {
        base + every.interval
    };

    loop {
        if !sleep_until_tick(&rt, &token, next).await {
            break;
        }

        next = match every.tick {
            TickPolicy::FixedDelay => {
                // Listen before admitting so a fast run cannot finish unseen.
                let mut done = rt.completions();
                match rt.admit(None) {
                    Ok(_) | Err(TriggerError::Skipped) => {
                        let finished = tokio::select! {
                            biased;
                            _ = token.cancelled() => break,
                            at = done.next() => at,
                        };
                        finished.unwrap_or_else(Instant::now) + every.interval
                    }
                    Err(_) => Instant::now() + every.interval,
                }
            }
            TickPolicy::FixedRate => {
                let _ = rt.admit(None);
                next_aligned(base, every.interval, Instant::now())
            }
        };
    }

    rt.set_next_run(None);
    rt.mark_stopping();
}

/// Publishes `at` as the next run and sleeps until then. Returns `false` on cancellation.
async fn sleep_until_tick(rt: &TaskRuntime, token: &CancellationToken, at: Instant) -> bool {
    let delay = at.saturating_duration_since(Instant::now());
    rt.set_next_run(SystemTime::now().checked_add(delay));
    rt.shared()
        .bus
        .publish(rt.event(EventKind::TickScheduled).with_delay(delay));

    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = time::sleep_until(at) => true,
    }
}

/// Smallest `base + k·step` (k ≥ 1 once `now` reached `base`) that lies strictly after `now`.
pub(crate) fn next_aligned(base: Instant, step: Duration, now: Instant) -> Instant {
    if now < base {
        return base;
    }
    let step_ns = step.as_nanos().max(1);
    let elapsed_ns = now.duration_since(base).as_nanos();
    let k = elapsed_ns / step_ns + 1;
    let offset = k.saturating_mul(step_ns);
    let offset = Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX));
    base.checked_add(offset).unwrap_or(now + step)
}
