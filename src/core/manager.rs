//! # Manager: task registry, admission gate and lifecycle.
//!
//! The [`Manager`] owns the event bus, the [`SubscriberSet`], the tracker every run
//! and scheduler loop is spawned on, and the registry of task runtimes.
//!
//! ## Lifecycle
//! ```text
//!            start(token)                shutdown() / shutdown_with(tok)
//! NotStarted ───────────► Running ───────────────────────────► Stopping ──► Stopped
//!     │                     │                                     │
//!     │                     ├─ run token = token.child_token()    ├─ run token cancelled
//!     │                     ├─ runtimes NotStarted → Idle         ├─ tracker closed + waited
//!     │                     ├─ scheduler loops spawned            ├─ pending waiters → Closed
//!     │                     ├─ subscriber pump spawned            ├─ AllStoppedWithin / GraceExceeded
//!     │                     └─ cancel watcher on the tracker      └─ subscriber lanes drained
//!     │                              │
//!     │                              └─ token cancelled ─► Stopping (ShutdownRequested)
//!     └──────────────── shutdown() ──────────────────────────────────────────► Stopped
//! ```
//!
//! ## Event flow
//! ```text
//! runs / schedulers / manager ── publish(Event) ──► Bus ──► pump ──► SubscriberSet lanes
//! ```
//! The bus receiver exists from `build`, so events published before `start` are
//! delivered too. A successful shutdown waits, within the same bound, until every
//! lane has handled `AllStoppedWithin`.
//!
//! ## Rules
//! - Phase changes happen under the gate's write guard; admission holds the read guard
//!   through the spawn, so no run can be admitted after `Stopping` is observed.
//! - Lock order is gate → registry → task runtime; no engine lock is held across an await.
//! - Tasks can be added before or after `start`; unnamed tasks are never indexed by name.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use taskgate::{Manager, ManagerConfig, TaskError, TaskFn, TaskSpec};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mgr = Manager::new(ManagerConfig::default());
//!
//!     let work = TaskFn::arc(|_ctx: CancellationToken| async { Ok::<(), TaskError>(()) });
//!     let handle = mgr.add(TaskSpec::trigger(work).with_name("reindex"))?;
//!
//!     mgr.start(CancellationToken::new())?;
//!     handle.trigger_and_wait().await?;
//!
//!     mgr.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::{
    builder::ManagerBuilder,
    config::ManagerConfig,
    gate::{Gate, GateState, Phase},
    handle::{Admission, TaskHandle},
    runtime::{Shared, TaskRuntime},
    status::{TaskSnapshot, TaskState},
};
use crate::{
    error::{RegisterError, RuntimeError, TriggerError},
    events::{Bus, Event, EventKind},
    hooks::{ErrorHandler, RunHook},
    subscribers::SubscriberSet,
    tasks::TaskSpec,
};

static GLOBAL: OnceLock<Arc<Manager>> = OnceLock::new();

#[derive(Default)]
struct Registry {
    by_name: HashMap<Arc<str>, Arc<TaskRuntime>>,
    all: Vec<Arc<TaskRuntime>>,
}

/// Path from the bus to the subscriber lanes.
enum Dispatch {
    /// No subscribers, or already flushed.
    Idle,
    /// Built, not started: the receiver buffers events for the set.
    Buffered {
        rx: broadcast::Receiver<Event>,
        set: SubscriberSet,
    },
    /// Pump task forwarding until `AllStoppedWithin`, then closing the lanes.
    Pumping(JoinHandle<()>),
}

/// Registry of tasks with a shared lifecycle.
pub struct Manager {
    shared: Arc<Shared>,
    registry: Arc<RwLock<Registry>>,
    dispatch: Mutex<Dispatch>,
}

impl Manager {
    /// Creates a manager without subscribers or hooks.
    pub fn new(cfg: ManagerConfig) -> Arc<Self> {
        ManagerBuilder::new(cfg).build()
    }

    /// Returns a builder for a manager with subscribers, a hook or a custom error handler.
    pub fn builder(cfg: ManagerConfig) -> ManagerBuilder {
        ManagerBuilder::new(cfg)
    }

    /// Lazily built process-wide manager with the default configuration.
    ///
    /// Independently constructed managers work the same way; prefer passing one around.
    pub fn global() -> &'static Arc<Manager> {
        GLOBAL.get_or_init(|| Manager::new(ManagerConfig::default()))
    }

    pub(crate) fn new_internal(
        cfg: ManagerConfig,
        subs: SubscriberSet,
        bus: Bus,
        hook: Option<Arc<dyn RunHook>>,
        handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        let dispatch = if subs.is_empty() {
            Dispatch::Idle
        } else {
            Dispatch::Buffered {
                rx: bus.subscribe(),
                set: subs,
            }
        };
        Self {
            shared: Arc::new(Shared {
                cfg,
                gate: Gate::new(),
                bus,
                tracker: TaskTracker::new(),
                hook,
                handler,
            }),
            registry: Arc::new(RwLock::new(Registry::default())),
            dispatch: Mutex::new(dispatch),
        }
    }

    /// Moves the manager to `Running` and starts every periodic task.
    ///
    /// Runs are cancelled through a child of `token`. Cancelling `token` itself
    /// begins shutdown without waiting: the phase moves to `Stopping`, admission
    /// closes and runs are cancelled; a later [`shutdown`](Self::shutdown) waits for
    /// them and finishes the transition to `Stopped`.
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    /// [`RuntimeError::Closed`] once shutdown has begun. Calling `start` again while
    /// running is a no-op.
    pub fn start(&self, token: CancellationToken) -> Result<(), RuntimeError> {
        let mut gate = self.shared.gate.write();
        match gate.phase {
            Phase::Running => return Ok(()),
            Phase::Stopping | Phase::Stopped => return Err(RuntimeError::Closed),
            Phase::NotStarted => {}
        }
        gate.phase = Phase::Running;
        gate.run_token = token.child_token();

        let runtimes = self.runtimes();
        for rt in &runtimes {
            rt.activate();
        }

        let gate = RwLockWriteGuard::downgrade(gate);
        self.start_pump();
        self.watch_run_token(gate.run_token.clone());
        for rt in &runtimes {
            rt.ensure_scheduler(&gate);
        }
        drop(gate);

        self.shared.bus.publish(Event::new(EventKind::ManagerStarted));
        Ok(())
    }

    fn start_pump(&self) {
        let mut dispatch = self.dispatch.lock();
        *dispatch = match std::mem::replace(&mut *dispatch, Dispatch::Idle) {
            Dispatch::Buffered { rx, set } => Dispatch::Pumping(tokio::spawn(set.pump(rx))),
            other => other,
        };
    }

    /// Moves the gate to `Stopping` once `token` is cancelled from outside.
    fn watch_run_token(&self, token: CancellationToken) {
        let shared = Arc::clone(&self.shared);
        let registry = Arc::clone(&self.registry);
        self.shared.tracker.spawn(async move {
            token.cancelled().await;
            close_on_cancel(&shared, &registry);
        });
    }

    fn take_dispatch(&self) -> Dispatch {
        std::mem::replace(&mut *self.dispatch.lock(), Dispatch::Idle)
    }

    /// Hands everything published so far to the subscribers and waits for their
    /// lanes to drain, giving up when `bound` completes.
    async fn flush_subscribers<B: Future<Output = ()>>(&self, bound: Pin<&mut B>) {
        match self.take_dispatch() {
            Dispatch::Idle => {}
            Dispatch::Buffered { mut rx, set } => {
                set.emit_buffered(&mut rx);
                tokio::select! {
                    biased;
                    _ = set.close() => {}
                    _ = bound => {}
                }
            }
            Dispatch::Pumping(pump) => {
                tokio::select! {
                    biased;
                    _ = pump => {}
                    _ = bound => {}
                }
            }
        }
    }

    /// Stops admission, cancels runs and waits up to [`ManagerConfig::grace`] for them.
    ///
    /// # Errors
    /// [`RuntimeError::GraceExceeded`] with the names of tasks still running when the
    /// grace period ran out. Pending waiters receive `Closed` in either case, and a
    /// later call waits for the stragglers again.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let grace = self.shared.cfg.grace;
        self.shutdown_until(tokio::time::sleep(grace), grace).await
    }

    /// Like [`shutdown`](Self::shutdown), bounded by `cancel` instead of the grace period.
    pub async fn shutdown_with(&self, cancel: &CancellationToken) -> Result<(), RuntimeError> {
        self.shutdown_until(cancel.cancelled(), Duration::ZERO).await
    }

    async fn shutdown_until(
        &self,
        bound: impl Future<Output = ()>,
        grace: Duration,
    ) -> Result<(), RuntimeError> {
        tokio::pin!(bound);

        let phase = {
            let mut gate = self.shared.gate.write();
            let phase = gate.phase;
            match phase {
                Phase::NotStarted => gate.phase = Phase::Stopped,
                Phase::Running => begin_stopping(&mut gate, &self.registry),
                Phase::Stopping | Phase::Stopped => {}
            }
            phase
        };

        match phase {
            Phase::Stopped => return Ok(()),
            Phase::NotStarted => {
                self.shared.tracker.close();
                for rt in &self.runtimes() {
                    rt.finalize();
                }
                self.flush_subscribers(bound.as_mut()).await;
                return Ok(());
            }
            Phase::Running => self
                .shared
                .bus
                .publish(Event::new(EventKind::ShutdownRequested)),
            Phase::Stopping => {}
        }

        let tracker = &self.shared.tracker;
        tracker.close();
        let drained = tokio::select! {
            biased;
            _ = tracker.wait() => true,
            _ = &mut bound => false,
        };

        let runtimes = self.runtimes();
        if drained {
            self.shared.gate.write().phase = Phase::Stopped;
            for rt in &runtimes {
                rt.finalize();
            }
            self.shared
                .bus
                .publish(Event::new(EventKind::AllStoppedWithin));
            self.flush_subscribers(bound.as_mut()).await;
            return Ok(());
        }

        let stuck: Vec<String> = runtimes
            .iter()
            .filter(|rt| rt.running() > 0)
            .map(|rt| match rt.spec.name.as_ref() {
                "" => "<unnamed>".to_string(),
                name => name.to_string(),
            })
            .collect();
        for rt in &runtimes {
            rt.drain_pending();
        }
        self.shared.bus.publish(
            Event::new(EventKind::GraceExceeded).with_reason(stuck.join(", ")),
        );
        Err(RuntimeError::GraceExceeded { grace, stuck })
    }

    fn runtimes(&self) -> Vec<Arc<TaskRuntime>> {
        self.registry.read().all.clone()
    }

    /// Registers a task. Periodic tasks added while running start their schedule now.
    ///
    /// # Errors
    /// - [`RegisterError::InvalidMaxConcurrent`] / [`RegisterError::InvalidInterval`]
    /// - [`RegisterError::DuplicateName`] when a task with the same non-empty name exists
    /// - [`RegisterError::Closed`] once shutdown has begun
    pub fn add(&self, spec: TaskSpec) -> Result<TaskHandle, RegisterError> {
        let resolved = spec.resolve(&self.shared.cfg)?;

        let gate = self.shared.gate.read();
        let initial = match gate.phase {
            Phase::NotStarted => TaskState::NotStarted,
            Phase::Running if !gate.is_open() => return Err(RegisterError::Closed),
            Phase::Running => TaskState::Idle,
            Phase::Stopping | Phase::Stopped => return Err(RegisterError::Closed),
        };
        let rt = TaskRuntime::new(resolved, Arc::clone(&self.shared), initial);
        {
            let mut reg = self.registry.write();
            if !rt.spec.name.is_empty() {
                if reg.by_name.contains_key(&rt.spec.name) {
                    return Err(RegisterError::DuplicateName {
                        name: rt.spec.name.to_string(),
                    });
                }
                reg.by_name.insert(Arc::clone(&rt.spec.name), Arc::clone(&rt));
            }
            reg.all.push(Arc::clone(&rt));
        }
        if gate.phase == Phase::Running {
            rt.ensure_scheduler(&gate);
        }
        drop(gate);

        self.shared.bus.publish(
            rt.event(EventKind::TaskAdded)
                .with_reason(rt.spec.schedule.as_label()),
        );
        Ok(TaskHandle::new(rt))
    }

    /// Finds a named task. Empty names never match.
    pub fn lookup(&self, name: &str) -> Option<TaskHandle> {
        if name.is_empty() {
            return None;
        }
        self.registry
            .read()
            .by_name
            .get(name)
            .map(|rt| TaskHandle::new(Arc::clone(rt)))
    }

    /// Handles to every registered task, named or not, in registration order.
    pub fn tasks(&self) -> Vec<TaskHandle> {
        self.registry
            .read()
            .all
            .iter()
            .map(|rt| TaskHandle::new(Arc::clone(rt)))
            .collect()
    }

    /// Snapshots of every registered task, in registration order.
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        self.runtimes().iter().map(|rt| rt.snapshot()).collect()
    }

    /// Snapshot of a named task.
    pub fn status(&self, name: &str) -> Option<TaskSnapshot> {
        self.lookup(name).map(|h| h.snapshot())
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.shared.gate.phase()
    }

    /// Requests a run of a named task.
    ///
    /// # Errors
    /// [`TriggerError::NotFound`] for unknown names, otherwise as [`TaskHandle::trigger`].
    pub fn trigger(&self, name: &str) -> Result<Admission, TriggerError> {
        self.find(name)?.trigger()
    }

    /// Requests a run of a named task and waits up to `timeout` for its outcome.
    pub async fn trigger_and_wait(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<(), TriggerError> {
        let handle = self.find(name)?;
        handle.trigger_and_wait_timeout(timeout).await
    }

    fn find(&self, name: &str) -> Result<TaskHandle, TriggerError> {
        self.lookup(name).ok_or_else(|| TriggerError::NotFound {
            name: name.to_string(),
        })
    }
}

/// Running → Stopping; the caller holds the gate's write guard.
fn begin_stopping(gate: &mut GateState, registry: &RwLock<Registry>) {
    gate.phase = Phase::Stopping;
    gate.run_token.cancel();
    for rt in &registry.read().all {
        rt.mark_stopping();
    }
}

fn close_on_cancel(shared: &Shared, registry: &RwLock<Registry>) {
    let mut gate = shared.gate.write();
    if gate.phase != Phase::Running {
        return;
    }
    begin_stopping(&mut gate, registry);
    drop(gate);
    shared.bus.publish(
        Event::new(EventKind::ShutdownRequested).with_reason("run token cancelled"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Semaphore;
    use tokio::time::Instant;

    use crate::{
        OverlapPolicy, RunInfo, RunOutcome, Subscribe, TaskError, TaskFn, TaskRef, TickPolicy,
    };

    fn manager() -> Arc<Manager> {
        Manager::new(ManagerConfig::default())
    }

    fn noop() -> TaskRef {
        TaskFn::arc(|_ctx: CancellationToken| async { Ok::<(), TaskError>(()) })
    }

    /// A task whose runs block until a permit is released.
    fn gated(release: Arc<Semaphore>, runs: Arc<AtomicUsize>) -> TaskRef {
        TaskFn::arc(move |_ctx: CancellationToken| {
            let release = Arc::clone(&release);
            let runs = Arc::clone(&runs);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                let permit = release
                    .acquire()
                    .await
                    .map_err(|e| TaskError::fail(e.to_string()))?;
                permit.forget();
                Ok::<(), TaskError>(())
            }
        })
    }

    /// A task that runs until its token is cancelled.
    fn until_cancelled() -> TaskRef {
        TaskFn::arc(|ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Err::<(), TaskError>(TaskError::Canceled)
        })
    }

    fn explode(msg: &'static str) -> Result<(), TaskError> {
        panic!("{msg}")
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let mgr = manager();
        let h = mgr.add(TaskSpec::trigger(noop()).with_name("t")).unwrap();
        assert_eq!(mgr.phase(), Phase::NotStarted);
        assert_eq!(h.trigger(), Err(TriggerError::NotRunning));
        assert_eq!(h.snapshot().state, TaskState::NotStarted);

        mgr.start(CancellationToken::new()).unwrap();
        mgr.start(CancellationToken::new()).unwrap();
        assert_eq!(mgr.phase(), Phase::Running);
        assert_eq!(h.snapshot().state, TaskState::Idle);

        mgr.shutdown().await.unwrap();
        assert_eq!(mgr.phase(), Phase::Stopped);
        assert_eq!(h.snapshot().state, TaskState::Stopped);
        assert_eq!(h.trigger(), Err(TriggerError::Closed));
        assert_eq!(mgr.start(CancellationToken::new()), Err(RuntimeError::Closed));
        assert_eq!(mgr.shutdown().await, Ok(()));
    }

    #[tokio::test]
    async fn test_shutdown_before_start_stops_directly() {
        let mgr = manager();
        let h = mgr.add(TaskSpec::trigger(noop())).unwrap();
        mgr.shutdown().await.unwrap();
        assert_eq!(mgr.phase(), Phase::Stopped);
        assert_eq!(h.snapshot().state, TaskState::Stopped);
        assert_eq!(
            mgr.add(TaskSpec::trigger(noop())).err(),
            Some(RegisterError::Closed)
        );
    }

    #[tokio::test]
    async fn test_registration_validation() {
        let mgr = manager();
        assert_eq!(
            mgr.add(TaskSpec::trigger(noop()).with_max_concurrent(0)).err(),
            Some(RegisterError::InvalidMaxConcurrent)
        );
        assert_eq!(
            mgr.add(TaskSpec::every(noop(), Duration::ZERO)).err(),
            Some(RegisterError::InvalidInterval)
        );
        mgr.add(TaskSpec::trigger(noop()).with_name("dup")).unwrap();
        assert_eq!(
            mgr.add(TaskSpec::trigger(noop()).with_name("dup")).err(),
            Some(RegisterError::DuplicateName { name: "dup".into() })
        );
        // Unnamed tasks never collide.
        mgr.add(TaskSpec::trigger(noop())).unwrap();
        mgr.add(TaskSpec::trigger(noop())).unwrap();
        assert_eq!(mgr.tasks().len(), 3);
    }

    #[tokio::test]
    async fn test_unnamed_tasks_unreachable() {
        let mgr = manager();
        let h = mgr.add(TaskSpec::trigger(noop())).unwrap();
        assert_eq!(h.name(), "");
        assert!(mgr.lookup("").is_none());
        assert!(mgr.status("").is_none());
        assert_eq!(
            mgr.trigger("missing"),
            Err(TriggerError::NotFound {
                name: "missing".into()
            })
        );
        assert_eq!(mgr.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_trigger_and_wait_by_name() {
        let mgr = manager();
        mgr.add(TaskSpec::trigger(noop()).with_name("ok")).unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        mgr.trigger_and_wait("ok", Duration::from_secs(1))
            .await
            .unwrap();
        let snap = mgr.status("ok").unwrap();
        assert_eq!(snap.run_count, 1);
        assert_eq!(snap.success_count, 1);
        assert!(snap.last_success.is_some());
        mgr.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_skip_rejects_at_capacity() {
        let mgr = manager();
        let release = Arc::new(Semaphore::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let h = mgr
            .add(TaskSpec::trigger(gated(Arc::clone(&release), Arc::clone(&runs))).with_name("skip"))
            .unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        let first = h.trigger_and_wait();
        assert_eq!(h.snapshot().running, 1);
        assert_eq!(h.trigger(), Err(TriggerError::Skipped));
        assert_eq!(h.trigger_and_wait().await, Err(TriggerError::Skipped));
        assert!(!h.try_trigger());
        assert_eq!(h.snapshot().running, 1);

        release.add_permits(1);
        assert_eq!(first.await, Ok(()));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(h.snapshot().run_count, 1);
        mgr.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_merge_runs_once_and_shares_outcome() {
        let mgr = manager();
        let release = Arc::new(Semaphore::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let h = mgr
            .add(
                TaskSpec::trigger(gated(Arc::clone(&release), Arc::clone(&runs)))
                    .with_name("merge")
                    .with_overlap(OverlapPolicy::Merge),
            )
            .unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        let first = h.trigger_and_wait();
        let a = h.trigger_and_wait();
        let b = h.trigger_and_wait();
        let snap = h.snapshot();
        assert!(snap.pending);
        assert_eq!(snap.pending_waiters, 2);
        assert_eq!(h.trigger(), Ok(Admission::Merged));

        release.add_permits(1);
        assert_eq!(first.await, Ok(()));

        release.add_permits(1);
        assert_eq!(a.await, Ok(()));
        assert_eq!(b.await, Ok(()));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        let snap = h.snapshot();
        assert_eq!(snap.run_count, 2);
        assert!(!snap.pending);
        mgr.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_waiter_detaches() {
        let mgr = manager();
        let release = Arc::new(Semaphore::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let h = mgr
            .add(
                TaskSpec::trigger(gated(Arc::clone(&release), Arc::clone(&runs)))
                    .with_overlap(OverlapPolicy::Merge),
            )
            .unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        let first = h.trigger_and_wait();
        let merged = h.trigger_and_wait();
        assert_eq!(h.snapshot().pending_waiters, 1);
        drop(merged);
        assert_eq!(h.snapshot().pending_waiters, 0);
        // The merged run still happens.
        assert!(h.snapshot().pending);

        release.add_permits(2);
        assert_eq!(first.await, Ok(()));
        mgr.shutdown().await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_running_never_exceeds_max_concurrent() {
        let mgr = manager();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let work: TaskRef = {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            TaskFn::arc(move |_ctx: CancellationToken| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), TaskError>(())
                }
            })
        };
        let h = mgr
            .add(TaskSpec::trigger(work).with_max_concurrent(3).with_name("cap"))
            .unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        let mut callers = Vec::new();
        for _ in 0..8 {
            let h = h.clone();
            callers.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let _ = h.trigger();
                    assert!(h.snapshot().running <= 3);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for c in callers {
            c.await.unwrap();
        }
        mgr.shutdown().await.unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(h.snapshot().run_count >= 1);
    }

    #[tokio::test]
    async fn test_shutdown_drains_waiters() {
        let mgr = manager();
        let h = mgr
            .add(
                TaskSpec::trigger(until_cancelled())
                    .with_name("long")
                    .with_overlap(OverlapPolicy::Merge),
            )
            .unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        let running = h.trigger_and_wait();
        let parked = h.trigger_and_wait();
        mgr.shutdown().await.unwrap();

        assert_eq!(running.await, Err(TriggerError::Closed));
        assert_eq!(parked.await, Err(TriggerError::Closed));
        let snap = h.snapshot();
        assert_eq!(snap.canceled_count, 1);
        assert_eq!(snap.fail_count, 0);
        assert_eq!(snap.run_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_grace_exceeded_reports_stuck() {
        let mgr = Manager::new(ManagerConfig {
            grace: Duration::from_millis(50),
            ..ManagerConfig::default()
        });
        let stubborn: TaskRef = TaskFn::arc(|_ctx: CancellationToken| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<(), TaskError>(())
        });
        let h = mgr
            .add(
                TaskSpec::trigger(stubborn)
                    .with_name("stubborn")
                    .with_overlap(OverlapPolicy::Merge),
            )
            .unwrap();
        mgr.start(CancellationToken::new()).unwrap();
        let _running = h.trigger();
        let parked = h.trigger_and_wait();

        let err = mgr.shutdown().await.unwrap_err();
        assert_eq!(
            err,
            RuntimeError::GraceExceeded {
                grace: Duration::from_millis(50),
                stuck: vec!["stubborn".into()],
            }
        );
        assert_eq!(mgr.phase(), Phase::Stopping);
        assert_eq!(parked.await, Err(TriggerError::Closed));
    }

    #[tokio::test]
    async fn test_shutdown_with_token_bound() {
        let mgr = manager();
        let h = mgr.add(TaskSpec::trigger(until_cancelled())).unwrap();
        mgr.start(CancellationToken::new()).unwrap();
        let wait = h.trigger_and_wait();

        let bound = CancellationToken::new();
        mgr.shutdown_with(&bound).await.unwrap();
        assert_eq!(wait.await, Err(TriggerError::Closed));
    }

    #[tokio::test]
    async fn test_panic_isolation() {
        let mgr = manager();
        let calls = Arc::new(AtomicUsize::new(0));
        let work: TaskRef = {
            let calls = Arc::clone(&calls);
            TaskFn::arc(move |_ctx: CancellationToken| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        panic!("first run explodes");
                    }
                    Ok::<(), TaskError>(())
                }
            })
        };
        let h = mgr.add(TaskSpec::trigger(work).with_name("boom")).unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        assert_eq!(
            h.trigger_and_wait().await,
            Err(TriggerError::Panicked {
                info: "first run explodes".into()
            })
        );
        assert_eq!(h.trigger_and_wait().await, Ok(()));

        let snap = h.snapshot();
        assert_eq!(snap.fail_count, 1);
        assert_eq!(snap.panic_count, 1);
        assert_eq!(snap.success_count, 1);
        assert_eq!(snap.running, 0);
        mgr.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_recorded_and_delivered() {
        let mgr = manager();
        let work: TaskRef =
            TaskFn::arc(|_ctx: CancellationToken| async { Err::<(), TaskError>(TaskError::fail("disk full")) });
        let h = mgr.add(TaskSpec::trigger(work)).unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        assert_eq!(
            h.trigger_and_wait().await,
            Err(TriggerError::Task(TaskError::fail("disk full")))
        );
        let snap = h.snapshot();
        assert_eq!(snap.fail_count, 1);
        assert_eq!(
            snap.last_error.as_deref(),
            Some("execution failed: disk full")
        );
        mgr.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_timeout_counts_as_failure() {
        let mgr = manager();
        let h = mgr
            .add(TaskSpec::trigger(until_cancelled()).with_timeout(Some(Duration::from_millis(20))))
            .unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        assert_eq!(
            h.trigger_and_wait().await,
            Err(TriggerError::Task(TaskError::Timeout {
                timeout: Duration::from_millis(20)
            }))
        );
        assert_eq!(h.snapshot().fail_count, 1);
        mgr.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_filtered_unless_reported() {
        let mgr = manager();
        let cancelled: TaskRef =
            TaskFn::arc(|_ctx: CancellationToken| async { Err::<(), TaskError>(TaskError::Canceled) });
        let quiet = mgr.add(TaskSpec::trigger(Arc::clone(&cancelled))).unwrap();
        let loud = mgr
            .add(TaskSpec::trigger(cancelled).report_cancellations(true))
            .unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        let expected = Err(TriggerError::Task(TaskError::Canceled));
        assert_eq!(quiet.trigger_and_wait().await, expected);
        assert_eq!(loud.trigger_and_wait().await, expected);

        let q = quiet.snapshot();
        assert_eq!((q.canceled_count, q.fail_count), (1, 0));
        let l = loud.snapshot();
        assert_eq!((l.canceled_count, l.fail_count), (1, 1));
        mgr.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_gives_up_without_cancelling_run() {
        let mgr = manager();
        let release = Arc::new(Semaphore::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let h = mgr
            .add(TaskSpec::trigger(gated(Arc::clone(&release), runs)))
            .unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        let stop = CancellationToken::new();
        stop.cancel();
        assert_eq!(
            h.trigger_and_wait_until(&stop).await,
            Err(TriggerError::WaitCanceled)
        );
        assert_eq!(h.snapshot().running, 1);

        release.add_permits(1);
        let deadline = Instant::now() + Duration::from_secs(5);
        while h.snapshot().running > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(h.snapshot().success_count, 1);

        let blocked = h
            .trigger_and_wait_timeout(Duration::from_millis(5))
            .await;
        assert_eq!(
            blocked,
            Err(TriggerError::WaitTimeout {
                timeout: Duration::from_millis(5)
            })
        );
        release.add_permits(1);
        mgr.shutdown().await.unwrap();
    }

    #[derive(Default)]
    struct Recorder {
        before: AtomicUsize,
        after: Mutex<Vec<&'static str>>,
    }

    impl RunHook for Recorder {
        fn before_run(&self, _info: &RunInfo) {
            self.before.fetch_add(1, Ordering::SeqCst);
        }
        fn after_run(&self, _info: &RunInfo, outcome: &RunOutcome) {
            self.after.lock().push(outcome.as_label());
        }
    }

    struct Exploding;

    impl RunHook for Exploding {
        fn before_run(&self, _info: &RunInfo) {
            panic!("hook exploded");
        }
    }

    #[derive(Default)]
    struct CountingHandler {
        errors: AtomicUsize,
        panics: AtomicUsize,
    }

    impl ErrorHandler for CountingHandler {
        fn on_error(&self, _task: &str, _err: &TaskError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        fn on_panic(&self, _task: &str, _info: &str) {
            self.panics.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_hooks_and_handler() {
        let global = Arc::new(Recorder::default());
        let handler = Arc::new(CountingHandler::default());
        let mgr = Manager::builder(ManagerConfig::default())
            .with_hook(global.clone())
            .with_error_handler(handler.clone())
            .build();

        let failing: TaskRef =
            TaskFn::arc(|_ctx: CancellationToken| async { Err::<(), TaskError>(TaskError::fail("nope")) });
        let panicking: TaskRef =
            TaskFn::arc(|_ctx: CancellationToken| async { explode("kaboom") });
        let f = mgr
            .add(TaskSpec::trigger(failing).with_hook(Arc::new(Exploding)))
            .unwrap();
        let p = mgr.add(TaskSpec::trigger(panicking)).unwrap();
        let ok = mgr.add(TaskSpec::trigger(noop())).unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        assert!(f.trigger_and_wait().await.is_err());
        assert!(p.trigger_and_wait().await.is_err());
        assert_eq!(ok.trigger_and_wait().await, Ok(()));

        assert_eq!(global.before.load(Ordering::SeqCst), 3);
        assert_eq!(
            *global.after.lock(),
            vec!["failed", "panicked", "succeeded"]
        );
        assert_eq!(handler.errors.load(Ordering::SeqCst), 1);
        assert_eq!(handler.panics.load(Ordering::SeqCst), 1);
        mgr.shutdown().await.unwrap();
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "collect"
        }
    }

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let collect = Arc::new(Collect::default());
        let mgr = Manager::builder(ManagerConfig::default())
            .with_subscribers(vec![collect.clone() as Arc<dyn Subscribe>])
            .build();
        let h = mgr.add(TaskSpec::trigger(noop()).with_name("ev")).unwrap();
        mgr.start(CancellationToken::new()).unwrap();
        h.trigger_and_wait().await.unwrap();
        mgr.shutdown().await.unwrap();

        // Lanes are drained by the time shutdown returns.
        let seen = collect.0.lock().clone();
        assert_eq!(seen.last(), Some(&EventKind::AllStoppedWithin));
        for kind in [
            EventKind::TaskAdded,
            EventKind::ManagerStarted,
            EventKind::RunStarted,
            EventKind::RunSucceeded,
            EventKind::ShutdownRequested,
            EventKind::AllStoppedWithin,
        ] {
            assert!(seen.contains(&kind), "missing {kind:?} in {seen:?}");
        }
    }

    #[tokio::test]
    async fn test_shutdown_before_start_delivers_buffered_events() {
        let collect = Arc::new(Collect::default());
        let mgr = Manager::builder(ManagerConfig::default())
            .with_subscribers(vec![collect.clone() as Arc<dyn Subscribe>])
            .build();
        mgr.add(TaskSpec::trigger(noop()).with_name("early")).unwrap();
        mgr.shutdown().await.unwrap();

        assert_eq!(*collect.0.lock(), vec![EventKind::TaskAdded]);
    }

    #[tokio::test]
    async fn test_cancelled_start_token_closes_manager() {
        let mgr = manager();
        let release = Arc::new(Semaphore::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let periodic = mgr
            .add(TaskSpec::every(noop(), Duration::from_secs(3600)).with_name("tick"))
            .unwrap();
        let manual = mgr.add(TaskSpec::trigger(noop()).with_name("manual")).unwrap();
        let slow = mgr
            .add(TaskSpec::trigger(gated(Arc::clone(&release), Arc::clone(&runs))).with_name("slow"))
            .unwrap();

        let parent = CancellationToken::new();
        mgr.start(parent.clone()).unwrap();
        assert_eq!(manual.trigger_and_wait().await, Ok(()));
        assert_eq!(slow.trigger(), Ok(Admission::Started));

        parent.cancel();
        // Admission closes with the token, before the phase catches up.
        assert_eq!(manual.trigger(), Err(TriggerError::Closed));
        settle().await;

        assert_eq!(mgr.phase(), Phase::Stopping);
        assert_eq!(periodic.trigger(), Err(TriggerError::Closed));
        assert_eq!(
            mgr.add(TaskSpec::trigger(noop())).err(),
            Some(RegisterError::Closed)
        );
        assert_eq!(mgr.start(CancellationToken::new()), Err(RuntimeError::Closed));
        for h in [&periodic, &manual, &slow] {
            assert_eq!(h.snapshot().state, TaskState::Stopping, "{}", h.name());
        }

        // A run finishing after the cancellation keeps the task stopping.
        release.add_permits(1);
        let deadline = Instant::now() + Duration::from_secs(5);
        while slow.snapshot().running > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(slow.snapshot().state, TaskState::Stopping);
        assert_eq!(manual.snapshot().run_count, 1);
        assert_eq!(periodic.snapshot().run_count, 0);

        mgr.shutdown().await.unwrap();
        assert_eq!(mgr.phase(), Phase::Stopped);
        assert_eq!(periodic.snapshot().state, TaskState::Stopped);
    }

    #[derive(Default)]
    struct Sequenced(Mutex<Vec<(u64, EventKind)>>);

    #[async_trait]
    impl Subscribe for Sequenced {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().push((ev.seq, ev.kind));
        }
        fn name(&self) -> &'static str {
            "sequenced"
        }
        fn queue_capacity(&self) -> usize {
            1 << 14
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_admission_once_stopping_is_observed() {
        let events = Arc::new(Sequenced::default());
        let mgr = Manager::builder(ManagerConfig {
            bus_capacity: 1 << 14,
            ..ManagerConfig::default()
        })
        .with_subscribers(vec![events.clone() as Arc<dyn Subscribe>])
        .build();
        let work: TaskRef = TaskFn::arc(|_ctx: CancellationToken| async {
            tokio::time::sleep(Duration::from_micros(300)).await;
            Ok::<(), TaskError>(())
        });
        let h = mgr
            .add(TaskSpec::trigger(work).with_max_concurrent(2).with_name("race"))
            .unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        let mut callers = Vec::new();
        for _ in 0..8 {
            let mgr = Arc::clone(&mgr);
            let h = h.clone();
            callers.push(tokio::spawn(async move {
                let mut started = 0u64;
                loop {
                    let closing = mgr.phase() != Phase::Running;
                    match h.trigger() {
                        Ok(Admission::Started) => {
                            assert!(!closing, "run admitted after Stopping");
                            started += 1;
                        }
                        Ok(Admission::Merged) | Err(TriggerError::Skipped) => {
                            assert!(!closing, "request queued after Stopping");
                        }
                        Err(TriggerError::Closed) => return started,
                        other => panic!("unexpected admission result {other:?}"),
                    }
                    tokio::time::sleep(Duration::from_micros(100)).await;
                }
            }));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        mgr.shutdown().await.unwrap();

        let mut started = 0;
        for c in callers {
            started += c.await.unwrap();
        }
        assert!(started >= 1);
        assert_eq!(h.snapshot().run_count, started);
        assert_eq!(h.trigger(), Err(TriggerError::Closed));

        let events = events.0.lock().clone();
        let stopping_seq = events
            .iter()
            .find(|(_, kind)| *kind == EventKind::ShutdownRequested)
            .map(|(seq, _)| *seq)
            .unwrap();
        // Skip and merge decisions are published under the gate's read guard.
        assert!(
            events.iter().all(|(seq, kind)| {
                !matches!(kind, EventKind::RunSkipped | EventKind::RunMerged) || *seq < stopping_seq
            }),
            "admission event after ShutdownRequested"
        );
        let run_started = events
            .iter()
            .filter(|(_, kind)| *kind == EventKind::RunStarted)
            .count() as u64;
        assert_eq!(run_started, started);
        assert_eq!(events.last().map(|(_, kind)| *kind), Some(EventKind::AllStoppedWithin));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_first_run_after_interval() {
        let mgr = manager();
        let runs = Arc::new(AtomicUsize::new(0));
        let work: TaskRef = {
            let runs = Arc::clone(&runs);
            TaskFn::arc(move |_ctx: CancellationToken| {
                runs.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), TaskError>(()) }
            })
        };
        let h = mgr
            .add(TaskSpec::every(work, Duration::from_millis(10)).with_name("every"))
            .unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        tokio::time::sleep(Duration::from_millis(9)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(h.snapshot().next_run.is_some());

        tokio::time::sleep(Duration::from_millis(6)).await;
        settle().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        mgr.shutdown().await.unwrap();
        let snap = h.snapshot();
        assert_eq!(snap.state, TaskState::Stopped);
        assert!(snap.next_run.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_anchors_on_completion() {
        let mgr = manager();
        let starts = Arc::new(Mutex::new(Vec::new()));
        let work: TaskRef = {
            let starts = Arc::clone(&starts);
            TaskFn::arc(move |_ctx: CancellationToken| {
                starts.lock().push(Instant::now());
                async {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                    Ok::<(), TaskError>(())
                }
            })
        };
        mgr.add(TaskSpec::every(work, Duration::from_millis(10)).start_immediately(true))
            .unwrap();
        mgr.start(CancellationToken::new()).unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        settle().await;
        mgr.shutdown().await.unwrap();

        let starts = starts.lock().clone();
        assert!(starts.len() >= 2);
        let gap = starts[1] - starts[0];
        // 25ms run + 10ms interval, measured from the first run's finish.
        assert!(gap >= Duration::from_millis(35), "gap {gap:?}");
        assert!(gap < Duration::from_millis(37), "gap {gap:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_rate_never_catches_up() {
        let mgr = manager();
        let starts = Arc::new(Mutex::new(Vec::new()));
        let work: TaskRef = {
            let starts = Arc::clone(&starts);
            TaskFn::arc(move |_ctx: CancellationToken| {
                let n = {
                    let mut s = starts.lock();
                    s.push(Instant::now());
                    s.len()
                };
                async move {
                    if n == 1 {
                        // Stall for 3.5 intervals.
                        tokio::time::sleep(Duration::from_millis(35)).await;
                    }
                    Ok::<(), TaskError>(())
                }
            })
        };
        mgr.add(
            TaskSpec::every(work, Duration::from_millis(10))
                .with_tick(TickPolicy::FixedRate)
                .start_immediately(true),
        )
        .unwrap();
        let base = Instant::now();
        mgr.start(CancellationToken::new()).unwrap();

        tokio::time::sleep(Duration::from_millis(45)).await;
        settle().await;
        mgr.shutdown().await.unwrap();

        let starts = starts.lock().clone();
        // Ticks at 10, 20 and 30ms were skipped while the first run was in flight;
        // the next run after the stall lands on the 40ms boundary, with no burst.
        assert_eq!(starts.len(), 2, "{starts:?}");
        assert_eq!(starts[0] - base, Duration::ZERO);
        assert_eq!(starts[1] - base, Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_added_after_start_runs_from_now() {
        let mgr = manager();
        mgr.start(CancellationToken::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let runs = Arc::new(AtomicUsize::new(0));
        let work: TaskRef = {
            let runs = Arc::clone(&runs);
            TaskFn::arc(move |_ctx: CancellationToken| {
                runs.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), TaskError>(()) }
            })
        };
        let h = mgr
            .add(TaskSpec::every(work, Duration::from_millis(10)).start_immediately(true))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(h.snapshot().success_count, 2);
        mgr.shutdown().await.unwrap();
    }
}
