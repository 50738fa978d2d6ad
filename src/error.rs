//! Error types used by the taskgate engine and by tasks.
//!
//! This module defines four error enums:
//!
//! - [`TaskError`]: returned by a task's work function.
//! - [`TriggerError`]: why a run request was rejected, or how a waited-for run ended.
//! - [`RegisterError`]: why [`Manager::add`](crate::Manager::add) refused a spec.
//! - [`RuntimeError`]: lifecycle failures of the [`Manager`](crate::Manager) itself.
//!
//! Every enum provides `as_label` (stable snake_case, for logs/metrics).

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the manager lifecycle.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Shutdown bound was reached while runs or scheduler loops were still alive.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The bound that was exceeded (`Duration::ZERO` when bounded by a token).
        grace: Duration,
        /// Names of tasks that still had in-flight runs (unnamed tasks show as `<unnamed>`).
        stuck: Vec<String>,
    },

    /// The manager has already begun shutting down and cannot be started.
    #[error("manager is closed")]
    Closed,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskgate::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Closed => "runtime_closed",
        }
    }
}

/// # Errors produced by a task's work function.
///
/// [`TaskError::Canceled`] is the cancellation class: by default it is counted
/// neither as a success nor as a failure.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The run exceeded its configured per-run timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// The run failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The run observed cancellation of its token and gave up.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    ///
    /// ```
    /// use taskgate::TaskError;
    ///
    /// let err = TaskError::fail("disk full");
    /// assert_eq!(err.to_string(), "execution failed: disk full");
    /// ```
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// True for errors that only say the run was cancelled.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }
}

/// # Errors returned when requesting or awaiting a run.
///
/// The first four variants are admission-time rejections; the rest describe how
/// an awaited run ended (or how the wait itself ended).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// The manager has not been started yet.
    #[error("manager is not running")]
    NotRunning,

    /// The manager (or the task) is shutting down or stopped.
    #[error("manager is closed")]
    Closed,

    /// The task is at capacity and its overlap policy is `Skip`.
    #[error("run skipped: task at capacity")]
    Skipped,

    /// No task is registered under the given name.
    #[error("task {name:?} not found")]
    NotFound {
        /// The name that was looked up.
        name: String,
    },

    /// The work function panicked.
    #[error("run panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// The work function returned an error.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// The caller stopped waiting after `timeout`; the run itself is unaffected.
    #[error("gave up waiting after {timeout:?}")]
    WaitTimeout {
        /// How long the caller waited.
        timeout: Duration,
    },

    /// The caller's token was cancelled; the run itself is unaffected.
    #[error("wait cancelled by caller")]
    WaitCanceled,
}

impl TriggerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskgate::TriggerError;
    ///
    /// assert_eq!(TriggerError::Skipped.as_label(), "trigger_skipped");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TriggerError::NotRunning => "trigger_not_running",
            TriggerError::Closed => "trigger_closed",
            TriggerError::Skipped => "trigger_skipped",
            TriggerError::NotFound { .. } => "trigger_not_found",
            TriggerError::Panicked { .. } => "run_panicked",
            TriggerError::Task(e) => e.as_label(),
            TriggerError::WaitTimeout { .. } => "wait_timeout",
            TriggerError::WaitCanceled => "wait_canceled",
        }
    }

    /// True when the request never produced (or joined) a run.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            TriggerError::NotRunning
                | TriggerError::Closed
                | TriggerError::Skipped
                | TriggerError::NotFound { .. }
        )
    }
}

/// # Errors produced at registration time.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    /// `max_concurrent` must be at least 1.
    #[error("max_concurrent must be greater than zero")]
    InvalidMaxConcurrent,

    /// Periodic tasks need a non-zero interval.
    #[error("interval must be greater than zero")]
    InvalidInterval,

    /// Another task already owns this name.
    #[error("task {name:?} already registered")]
    DuplicateName {
        /// The conflicting name.
        name: String,
    },

    /// The manager is shutting down or stopped.
    #[error("manager is closed")]
    Closed,
}

impl RegisterError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegisterError::InvalidMaxConcurrent => "register_invalid_max_concurrent",
            RegisterError::InvalidInterval => "register_invalid_interval",
            RegisterError::DuplicateName { .. } => "register_duplicate_name",
            RegisterError::Closed => "register_closed",
        }
    }
}
