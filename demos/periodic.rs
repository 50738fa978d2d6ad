//! # Example: periodic
//!
//! Two periodic tasks and one on-demand task under a single [`Manager`], with
//! events rendered through `tracing` by the built-in [`LogWriter`].
//!
//! Demonstrates how to:
//! - Register `Every` tasks with fixed-delay and fixed-rate ticks.
//! - Trigger a task by name while the schedules keep running.
//! - Shut down with a bounded grace period.
//!
//! ## Flow
//! ```text
//! Manager::builder(cfg).with_subscribers([LogWriter]).build()
//!     ├─► add("heartbeat", every 200ms, FixedRate)
//!     ├─► add("compact",   every 300ms, FixedDelay, 250ms runs)
//!     ├─► add("report",    trigger only)
//!     ├─► start(token)      → scheduler loops spawned
//!     ├─► trigger_and_wait("report")
//!     └─► shutdown()        → ShutdownRequested, AllStoppedWithin
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example periodic --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use taskgate::{
    LogWriter, Manager, ManagerConfig, Subscribe, TaskError, TaskFn, TaskRef, TaskSpec, TickPolicy,
};
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let cfg = ManagerConfig {
        grace: Duration::from_secs(2),
        ..ManagerConfig::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let mgr = Manager::builder(cfg).with_subscribers(subs).build();

    let heartbeat: TaskRef = TaskFn::arc(|_ctx: CancellationToken| async {
        println!("[heartbeat] beat");
        Ok::<(), TaskError>(())
    });
    mgr.add(
        TaskSpec::every(heartbeat, Duration::from_millis(200))
            .with_name("heartbeat")
            .with_tick(TickPolicy::FixedRate)
            .start_immediately(true),
    )?;

    let compact: TaskRef = TaskFn::arc(|ctx: CancellationToken| async move {
        tokio::select! {
            _ = ctx.cancelled() => Err(TaskError::Canceled),
            _ = tokio::time::sleep(Duration::from_millis(250)) => Ok(()),
        }
    });
    mgr.add(
        TaskSpec::every(compact, Duration::from_millis(300))
            .with_name("compact")
            .with_tags(["storage"]),
    )?;

    let report: TaskRef = TaskFn::arc(|_ctx: CancellationToken| async {
        println!("[report] generated");
        Ok::<(), TaskError>(())
    });
    mgr.add(TaskSpec::trigger(report).with_name("report"))?;

    mgr.start(CancellationToken::new())?;

    tokio::time::sleep(Duration::from_millis(700)).await;
    mgr.trigger_and_wait("report", Duration::from_secs(1)).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;

    for snap in mgr.snapshot() {
        println!(
            "{:<10} state={:<8} runs={} ok={} next_run={:?}",
            snap.name,
            snap.state.as_label(),
            snap.run_count,
            snap.success_count,
            snap.next_run
        );
    }

    mgr.shutdown().await?;
    Ok(())
}
