use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::{
    OverlapPolicy, RunHook, TaskError, TaskFn, TaskRef, TaskSpec, TickPolicy,
};

/// Builder for TaskSpec with fluent API
#[derive(Clone)]
pub struct TaskSpecBuilder {
    name: Cow<'static, str>,
    tags: Vec<String>,
    every: Option<Duration>,
    tick: TickPolicy,
    start_immediately: bool,
    max_concurrent: usize,
    overlap: OverlapPolicy,
    timeout: Option<Duration>,
    report_cancellations: Option<bool>,
    hook: Option<Arc<dyn RunHook>>,
}

impl TaskSpecBuilder {
    /// Creates a new builder with the given task name
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            every: None,
            tick: TickPolicy::default(),
            start_immediately: false,
            max_concurrent: 1,
            overlap: OverlapPolicy::default(),
            timeout: None,
            report_cancellations: None,
            hook: None,
        }
    }

    /// Makes the task periodic.
    pub fn every(mut self, interval: Duration) -> Self {
        self.every = Some(interval);
        self
    }

    pub fn tick(mut self, tick: TickPolicy) -> Self {
        self.tick = tick;
        self
    }

    pub fn start_immediately(mut self) -> Self {
        self.start_immediately = true;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn report_cancellations(mut self, yes: bool) -> Self {
        self.report_cancellations = Some(yes);
        self
    }

    pub fn hook(mut self, hook: Arc<dyn RunHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Build TaskSpec from a closure
    pub fn build<F, Fut>(self, f: F) -> TaskSpec
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.build_from_task(TaskFn::arc(f))
    }

    /// Build TaskSpec from an existing TaskRef
    pub fn build_from_task(self, task: TaskRef) -> TaskSpec {
        let mut spec = match self.every {
            Some(interval) => TaskSpec::every(task, interval)
                .with_tick(self.tick)
                .start_immediately(self.start_immediately),
            None => TaskSpec::trigger(task),
        }
        .with_name(self.name)
        .with_tags(self.tags)
        .with_max_concurrent(self.max_concurrent)
        .with_overlap(self.overlap)
        .with_timeout(self.timeout);

        if let Some(yes) = self.report_cancellations {
            spec = spec.report_cancellations(yes);
        }
        if let Some(hook) = self.hook {
            spec = spec.with_hook(hook);
        }
        spec
    }
}

impl TaskSpec {
    /// Creates a builder for constructing TaskSpec with fluent API
    pub fn builder(name: impl Into<Cow<'static, str>>) -> TaskSpecBuilder {
        TaskSpecBuilder::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Schedule;

    #[test]
    fn test_builder_produces_periodic_spec() {
        let spec = TaskSpec::builder("sweep")
            .every(Duration::from_secs(1))
            .tick(TickPolicy::FixedRate)
            .max_concurrent(2)
            .overlap(OverlapPolicy::Merge)
            .tag("maintenance")
            .build(|_ctx| async { Ok::<(), TaskError>(()) });

        assert_eq!(spec.name(), "sweep");
        assert_eq!(spec.max_concurrent(), 2);
        assert_eq!(spec.overlap(), OverlapPolicy::Merge);
        assert_eq!(spec.tags(), ["maintenance".to_string()]);
        assert!(matches!(spec.schedule(), Schedule::Every(e) if e.tick == TickPolicy::FixedRate));
    }

    #[test]
    fn test_builder_defaults_to_trigger() {
        let spec = TaskSpec::builder("once").build(|_ctx| async { Ok::<(), TaskError>(()) });
        assert_eq!(*spec.schedule(), Schedule::Trigger);
    }
}
