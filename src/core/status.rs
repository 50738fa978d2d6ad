//! # Task state and point-in-time snapshots.
//!
//! [`TaskSnapshot`] is taken under the task runtime's lock, so counters,
//! timestamps and state are mutually consistent. It is a plain value: reading
//! it has no side effects on the engine.

use std::time::SystemTime;

use crate::policies::OverlapPolicy;

/// Externally visible state of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TaskState {
    /// Registered, manager not started.
    NotStarted,
    /// Manager running, no run in flight.
    Idle,
    /// At least one run in flight.
    Running,
    /// Manager shutting down.
    Stopping,
    /// Manager stopped.
    Stopped,
}

impl TaskState {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskState::NotStarted => "not_started",
            TaskState::Idle => "idle",
            TaskState::Running => "running",
            TaskState::Stopping => "stopping",
            TaskState::Stopped => "stopped",
        }
    }
}

/// Consistent view of one task.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TaskSnapshot {
    /// Task name (empty for unnamed tasks).
    pub name: String,
    /// Task tags.
    pub tags: Vec<String>,
    /// `"trigger"` or `"every"`.
    pub schedule: &'static str,
    /// Current state.
    pub state: TaskState,
    /// Concurrency cap.
    pub max_concurrent: usize,
    /// Overlap policy.
    pub overlap: OverlapPolicy,
    /// Runs in flight.
    pub running: usize,
    /// A merged run is owed.
    pub pending: bool,
    /// Callers waiting on the pending merged run.
    pub pending_waiters: usize,
    /// Runs admitted so far.
    pub run_count: u64,
    /// Runs that returned `Ok(())`.
    pub success_count: u64,
    /// Runs that failed or panicked.
    pub fail_count: u64,
    /// Runs that panicked (also counted in `fail_count`).
    pub panic_count: u64,
    /// Runs that ended with a cancellation.
    pub canceled_count: u64,
    /// Start of the latest run.
    pub last_started: Option<SystemTime>,
    /// End of the latest run.
    pub last_finished: Option<SystemTime>,
    /// End of the latest successful run.
    pub last_success: Option<SystemTime>,
    /// Message of the latest failure or panic.
    pub last_error: Option<String>,
    /// Next scheduled tick (periodic tasks only).
    pub next_run: Option<SystemTime>,
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;
    use crate::{Phase, TickPolicy};

    #[test]
    fn test_snapshot_serializes_with_stable_labels() {
        let snap = TaskSnapshot {
            name: "reindex".into(),
            tags: vec!["search".into()],
            schedule: "every",
            state: TaskState::Idle,
            max_concurrent: 1,
            overlap: OverlapPolicy::Merge,
            running: 0,
            pending: false,
            pending_waiters: 0,
            run_count: 3,
            success_count: 2,
            fail_count: 1,
            panic_count: 0,
            canceled_count: 0,
            last_started: None,
            last_finished: None,
            last_success: None,
            last_error: Some("execution failed: disk full".into()),
            next_run: None,
        };

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["name"], "reindex");
        assert_eq!(json["state"], "idle");
        assert_eq!(json["overlap"], "merge");
        assert_eq!(json["run_count"], 3);
        assert!(json["next_run"].is_null());
        assert_eq!(json["state"], TaskState::Idle.as_label());

        assert_eq!(serde_json::to_value(Phase::NotStarted).unwrap(), "not_started");
        assert_eq!(serde_json::to_value(TaskState::Stopping).unwrap(), "stopping");
        assert_eq!(serde_json::to_value(TickPolicy::FixedRate).unwrap(), "fixed_rate");
    }
}
