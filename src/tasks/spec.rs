//! # Task definition.
//!
//! Defines [`TaskSpec`], the immutable description of *what to run and how*:
//! the work function, its [`Schedule`], and the registration options
//! (name, tags, concurrency cap, overlap policy, hook, timeout).
//!
//! A spec is created with [`TaskSpec::trigger`] (on demand) or [`TaskSpec::every`]
//! (periodic), refined with the `with_*` methods, and handed to
//! [`Manager::add`](crate::Manager::add), which validates it against the
//! [`ManagerConfig`](crate::ManagerConfig) and freezes it.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use taskgate::{OverlapPolicy, TaskError, TaskFn, TaskSpec, TickPolicy};
//!
//! let work = TaskFn::arc(|_ctx: CancellationToken| async { Ok::<(), TaskError>(()) });
//!
//! let spec = TaskSpec::every(work, Duration::from_secs(30))
//!     .with_name("refresh-cache")
//!     .with_tick(TickPolicy::FixedRate)
//!     .with_overlap(OverlapPolicy::Skip)
//!     .start_immediately(true);
//!
//! assert_eq!(spec.name(), "refresh-cache");
//! assert!(spec.schedule().is_periodic());
//! ```

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    core::ManagerConfig,
    error::RegisterError,
    hooks::RunHook,
    policies::{OverlapPolicy, TickPolicy},
    tasks::task::TaskRef,
};

/// Periodic schedule parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Every {
    /// Distance between ticks (must be non-zero).
    pub interval: Duration,
    /// How the next tick is computed.
    pub tick: TickPolicy,
    /// Run at the base time instead of one interval later.
    pub start_immediately: bool,
}

/// How a task gets its runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    /// Only runs when triggered.
    Trigger,
    /// Runs on a timer in addition to triggers.
    Every(Every),
}

impl Schedule {
    /// True for [`Schedule::Every`].
    pub fn is_periodic(&self) -> bool {
        matches!(self, Schedule::Every(_))
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Schedule::Trigger => "trigger",
            Schedule::Every(_) => "every",
        }
    }
}

/// Specification of a task to register.
#[derive(Clone)]
pub struct TaskSpec {
    task: TaskRef,
    schedule: Schedule,
    name: Cow<'static, str>,
    tags: Vec<String>,
    max_concurrent: usize,
    overlap: OverlapPolicy,
    timeout: Option<Duration>,
    report_cancellations: Option<bool>,
    hook: Option<Arc<dyn RunHook>>,
}

impl TaskSpec {
    fn new(task: TaskRef, schedule: Schedule) -> Self {
        Self {
            task,
            schedule,
            name: Cow::Borrowed(""),
            tags: Vec::new(),
            max_concurrent: 1,
            overlap: OverlapPolicy::default(),
            timeout: None,
            report_cancellations: None,
            hook: None,
        }
    }

    /// An on-demand task: it runs only when triggered.
    pub fn trigger(task: TaskRef) -> Self {
        Self::new(task, Schedule::Trigger)
    }

    /// A periodic task with the default [`TickPolicy::FixedDelay`] discipline.
    pub fn every(task: TaskRef, interval: Duration) -> Self {
        Self::new(
            task,
            Schedule::Every(Every {
                interval,
                tick: TickPolicy::default(),
                start_immediately: false,
            }),
        )
    }

    /// Sets the lookup name. Tasks with an empty name cannot be found by name.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces the tag set.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the number of runs allowed in flight at once (must be at least 1).
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Sets the policy applied when the task is at capacity.
    pub fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    /// Sets the tick discipline. Has no effect on trigger-only tasks.
    pub fn with_tick(mut self, tick: TickPolicy) -> Self {
        if let Schedule::Every(every) = &mut self.schedule {
            every.tick = tick;
        }
        self
    }

    /// Sets the interval. Has no effect on trigger-only tasks.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if let Schedule::Every(every) = &mut self.schedule {
            every.interval = interval;
        }
        self
    }

    /// Makes the first periodic run happen at the base time. No effect on trigger-only tasks.
    pub fn start_immediately(mut self, yes: bool) -> Self {
        if let Schedule::Every(every) = &mut self.schedule {
            every.start_immediately = yes;
        }
        self
    }

    /// Sets a per-run timeout (`None` inherits [`ManagerConfig::timeout`]).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Counts cancellations as failures and forwards them to the error handler.
    pub fn report_cancellations(mut self, yes: bool) -> Self {
        self.report_cancellations = Some(yes);
        self
    }

    /// Attaches a task-specific hook, invoked after the manager-wide hook.
    pub fn with_hook(mut self, hook: Arc<dyn RunHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Returns the task name (empty for unnamed tasks).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the schedule.
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Returns the tags.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the configured concurrency cap.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Returns the overlap policy.
    pub fn overlap(&self) -> OverlapPolicy {
        self.overlap
    }

    /// Validates the spec and fills defaults from `cfg`.
    pub(crate) fn resolve(self, cfg: &ManagerConfig) -> Result<ResolvedSpec, RegisterError> {
        if self.max_concurrent == 0 {
            return Err(RegisterError::InvalidMaxConcurrent);
        }
        match self.schedule {
            Schedule::Every(every) if every.interval.is_zero() => {
                return Err(RegisterError::InvalidInterval);
            }
            Schedule::Every(_) | Schedule::Trigger => {}
        }
        let timeout = self
            .timeout
            .filter(|d| !d.is_zero())
            .or_else(|| cfg.default_timeout());

        Ok(ResolvedSpec {
            task: self.task,
            schedule: self.schedule,
            name: Arc::from(self.name.as_ref()),
            tags: self.tags.into(),
            max_concurrent: self.max_concurrent,
            overlap: self.overlap,
            timeout,
            report_cancellations: self
                .report_cancellations
                .unwrap_or(cfg.report_cancellations),
            hook: self.hook,
        })
    }
}

/// A validated, frozen spec owned by a task runtime.
pub(crate) struct ResolvedSpec {
    pub task: TaskRef,
    pub schedule: Schedule,
    pub name: Arc<str>,
    pub tags: Arc<[String]>,
    pub max_concurrent: usize,
    pub overlap: OverlapPolicy,
    pub timeout: Option<Duration>,
    pub report_cancellations: bool,
    pub hook: Option<Arc<dyn RunHook>>,
}
