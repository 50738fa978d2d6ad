//! # Example: merge
//!
//! Shows the two overlap policies side by side on tasks with a single slot.
//!
//! - `Skip`: requests arriving while the run is in flight are rejected.
//! - `Merge`: they collapse into one follow-up run, and every waiting caller
//!   receives that run's outcome.
//!
//! ## Run
//! ```bash
//! cargo run --example merge
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use taskgate::{Manager, ManagerConfig, OverlapPolicy, TaskError, TaskFn, TaskRef, TaskSpec};
use tokio_util::sync::CancellationToken;

fn slow(label: &'static str, runs: Arc<AtomicUsize>) -> TaskRef {
    TaskFn::arc(move |_ctx: CancellationToken| {
        let n = runs.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            println!("[{label}] run #{n} started");
            tokio::time::sleep(Duration::from_millis(200)).await;
            println!("[{label}] run #{n} done");
            Ok::<(), TaskError>(())
        }
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mgr = Manager::new(ManagerConfig::default());

    let skip_runs = Arc::new(AtomicUsize::new(0));
    let merge_runs = Arc::new(AtomicUsize::new(0));
    let skip = mgr.add(TaskSpec::trigger(slow("skip", skip_runs.clone())).with_name("skip"))?;
    let merge = mgr.add(
        TaskSpec::trigger(slow("merge", merge_runs.clone()))
            .with_name("merge")
            .with_overlap(OverlapPolicy::Merge),
    )?;
    mgr.start(CancellationToken::new())?;

    // Skip: the first request starts a run, the rest are rejected.
    for i in 0..3 {
        println!("skip request {i}: {:?}", skip.trigger());
    }

    // Merge: one run in flight, three callers folded into a single follow-up run.
    let first = merge.trigger_and_wait();
    let waiters: Vec<_> = (0..3).map(|_| merge.trigger_and_wait()).collect();
    println!("merge first: {:?}", first.await);
    for (i, w) in waiters.into_iter().enumerate() {
        println!("merge waiter {i}: {:?}", w.await);
    }

    mgr.shutdown().await?;
    println!(
        "runs: skip={} merge={}",
        skip_runs.load(Ordering::SeqCst),
        merge_runs.load(Ordering::SeqCst)
    );
    Ok(())
}
