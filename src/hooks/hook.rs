use std::sync::Arc;
use std::time::SystemTime;

use crate::tasks::RunOutcome;

/// Identity of one run, handed to hooks.
#[derive(Debug, Clone)]
pub struct RunInfo {
    /// Task name (empty for unnamed tasks).
    pub task: Arc<str>,
    /// Task tags.
    pub tags: Arc<[String]>,
    /// 1-based run number within the task (its `run_count` at admission).
    pub run: u64,
    /// Whether this run was launched to honour merged requests.
    pub merged: bool,
    /// Wall-clock start time.
    pub started_at: SystemTime,
}

/// Callbacks invoked synchronously around each run.
///
/// Keep them short: they execute on the run's own tokio task, so a slow hook
/// delays the run and its completion bookkeeping.
///
/// # Example
/// ```
/// use taskgate::{RunHook, RunInfo, RunOutcome};
///
/// struct Audit;
///
/// impl RunHook for Audit {
///     fn after_run(&self, info: &RunInfo, outcome: &RunOutcome) {
///         println!("{} #{} -> {}", info.task, info.run, outcome.as_label());
///     }
/// }
/// ```
pub trait RunHook: Send + Sync + 'static {
    /// Called before the work function is invoked.
    fn before_run(&self, _info: &RunInfo) {}

    /// Called after the work function returned (or panicked).
    fn after_run(&self, _info: &RunInfo, _outcome: &RunOutcome) {}
}
