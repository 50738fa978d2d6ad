//! # Per-task overlap policy
//!
//! A task may have at most `max_concurrent` runs in flight. When a new request
//! arrives while the task is at capacity, the overlap policy decides what to do.
//!
//! ## Variants
//! - `Skip`: **reject** the request; the caller sees [`TriggerError::Skipped`](crate::TriggerError::Skipped).
//! - `Merge`: **remember** that one more run is owed; every request arriving while at
//!   capacity collapses into that single pending run.
//!
//! ## Invariants
//! - In-flight runs never exceed `max_concurrent`.
//! - With `Merge`, at most one run is pending at any time; it is launched as soon as
//!   a slot frees up and the manager is still running.

/// Policy controlling how run requests are handled when a task is at capacity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OverlapPolicy {
    /// Drop the request if the task is at capacity (default).
    ///
    /// Use when:
    /// - A missed run is harmless because the next one covers it
    /// - Example: periodic cache refresh
    #[default]
    Skip,

    /// Coalesce requests made at capacity into one follow-up run.
    ///
    /// Use when:
    /// - Every trigger must be *followed* by a run, but not one run each
    /// - Example: "re-index after the last write"
    Merge,
}

impl OverlapPolicy {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            OverlapPolicy::Skip => "skip",
            OverlapPolicy::Merge => "merge",
        }
    }
}
