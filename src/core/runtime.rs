//! # TaskRuntime: live state machine of one registered task.
//!
//! Wraps a frozen [`ResolvedSpec`] with the mutable state needed to admit,
//! account and complete runs.
//!
//! ## Admission
//! ```text
//! admit(waiter?)
//!   ├─► gate.read()  ── phase != Running ─────────────► NotRunning / Closed
//!   ├─► task lock    ── state Stopping/Stopped ───────► Closed
//!   │                ── state NotStarted ─────────────► NotRunning
//!   ├─► running < max_concurrent
//!   │       └─► begin_run, spawn on tracker ──────────► Started
//!   └─► at capacity
//!           ├─ Skip  ─────────────────────────────────► Skipped
//!           └─ Merge ─► pending = true, park waiter ──► Merged
//! ```
//!
//! ## Completion
//! ```text
//! finish(outcome, waiters)
//!   ├─► gate.read(), task lock
//!   │     ├─ running -= 1, counters, timestamps
//!   │     ├─ pending && gate open    → pending = false, begin_run (merged)
//!   │     ├─ pending && gate closed  → pending = false, drain waiters (Closed)
//!   │     └─ state recomputed from running + phase, Stopping/Stopped kept
//!   ├─► completion signal fired
//!   ├─► outcome offered to every waiter of this run
//!   └─► merged run spawned with all parked waiters
//! ```
//!
//! ## Rules
//! - `running <= max_concurrent` at all times.
//! - `pending` implies `OverlapPolicy::Merge` and capacity was full when it was set.
//! - User code (work, hooks, handlers) never runs while the task lock is held.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;

use super::{
    config::ManagerConfig,
    gate::{Gate, GateState, Phase},
    handle::Admission,
    runner,
    scheduler,
    signal::{CompletionSignal, Listener},
    status::{TaskSnapshot, TaskState},
    waiter::WaiterSlot,
};
use crate::{
    error::TriggerError,
    events::{Bus, Event, EventKind},
    hooks::{ErrorHandler, RunHook},
    policies::OverlapPolicy,
    tasks::{ResolvedSpec, RunOutcome, Schedule},
};

/// Engine-wide collaborators shared by the manager and every task runtime.
pub(crate) struct Shared {
    pub cfg: ManagerConfig,
    pub gate: Gate,
    pub bus: Bus,
    /// Wait-group over every run and scheduler loop.
    pub tracker: TaskTracker,
    pub hook: Option<Arc<dyn RunHook>>,
    pub handler: Arc<dyn ErrorHandler>,
}

/// Mutable per-task state, guarded by `TaskRuntime::state`.
struct RunState {
    state: TaskState,
    running: usize,
    pending: bool,
    pending_waiters: Vec<WaiterSlot>,
    run_count: u64,
    success_count: u64,
    fail_count: u64,
    panic_count: u64,
    canceled_count: u64,
    last_started: Option<SystemTime>,
    last_finished: Option<SystemTime>,
    last_success: Option<SystemTime>,
    last_error: Option<String>,
    next_run: Option<SystemTime>,
}

impl RunState {
    fn new(state: TaskState) -> Self {
        Self {
            state,
            running: 0,
            pending: false,
            pending_waiters: Vec::new(),
            run_count: 0,
            success_count: 0,
            fail_count: 0,
            panic_count: 0,
            canceled_count: 0,
            last_started: None,
            last_finished: None,
            last_success: None,
            last_error: None,
            next_run: None,
        }
    }

    /// Start bookkeeping; returns the 1-based run number.
    fn begin_run(&mut self) -> u64 {
        self.running += 1;
        self.run_count += 1;
        self.last_started = Some(SystemTime::now());
        self.state = TaskState::Running;
        self.run_count
    }

    fn record(&mut self, outcome: &RunOutcome) {
        let now = SystemTime::now();
        self.last_finished = Some(now);
        match outcome {
            RunOutcome::Succeeded => {
                self.success_count += 1;
                self.last_success = Some(now);
            }
            RunOutcome::Failed(e) => {
                if e.is_cancellation() {
                    self.canceled_count += 1;
                }
                self.fail_count += 1;
                self.last_error = Some(e.to_string());
            }
            RunOutcome::Panicked(info) => {
                self.fail_count += 1;
                self.panic_count += 1;
                self.last_error = Some(format!("panic: {info}"));
            }
            RunOutcome::Canceled(_) => self.canceled_count += 1,
        }
    }

    fn visible_state(&self, phase: Phase) -> TaskState {
        match phase {
            Phase::NotStarted => TaskState::NotStarted,
            Phase::Running if self.running > 0 => TaskState::Running,
            Phase::Running => TaskState::Idle,
            Phase::Stopping => TaskState::Stopping,
            Phase::Stopped => TaskState::Stopped,
        }
    }
}

/// Live runtime of one registered task.
pub(crate) struct TaskRuntime {
    pub spec: ResolvedSpec,
    shared: Arc<Shared>,
    state: Mutex<RunState>,
    signal: CompletionSignal,
    scheduler_started: AtomicBool,
    next_waiter_id: AtomicU64,
}

impl TaskRuntime {
    pub fn new(spec: ResolvedSpec, shared: Arc<Shared>, initial: TaskState) -> Arc<Self> {
        Arc::new(Self {
            spec,
            shared,
            state: Mutex::new(RunState::new(initial)),
            signal: CompletionSignal::new(),
            scheduler_started: AtomicBool::new(false),
            next_waiter_id: AtomicU64::new(0),
        })
    }

    pub fn shared(&self) -> &Shared {
        &self.shared
    }

    pub fn next_waiter_id(&self) -> u64 {
        self.next_waiter_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn event(&self, kind: EventKind) -> Event {
        Event::new(kind).with_task(Arc::clone(&self.spec.name))
    }

    /// Decides whether a run request starts a run, merges, or is rejected.
    pub fn admit(self: &Arc<Self>, waiter: Option<WaiterSlot>) -> Result<Admission, TriggerError> {
        let gate = self.shared.gate.read();
        gate.check_admission()?;

        let mut st = self.state.lock();
        match st.state {
            TaskState::Stopping | TaskState::Stopped => return Err(TriggerError::Closed),
            TaskState::NotStarted => return Err(TriggerError::NotRunning),
            TaskState::Idle | TaskState::Running => {}
        }

        if st.running < self.spec.max_concurrent {
            let run = st.begin_run();
            drop(st);
            self.launch(&gate, run, false, waiter.into_iter().collect());
            return Ok(Admission::Started);
        }

        match self.spec.overlap {
            OverlapPolicy::Skip => {
                drop(st);
                self.shared.bus.publish(self.event(EventKind::RunSkipped));
                Err(TriggerError::Skipped)
            }
            OverlapPolicy::Merge => {
                st.pending = true;
                if let Some(w) = waiter {
                    st.pending_waiters.push(w);
                }
                drop(st);
                self.shared.bus.publish(self.event(EventKind::RunMerged));
                Ok(Admission::Merged)
            }
        }
    }

    /// Spawns one run on the tracker. The caller holds the gate's read guard.
    fn launch(self: &Arc<Self>, gate: &GateState, run: u64, merged: bool, waiters: Vec<WaiterSlot>) {
        let token = gate.run_token.child_token();
        let rt = Arc::clone(self);
        self.shared
            .tracker
            .spawn(runner::run_once(rt, token, run, merged, waiters));
    }

    /// Completion bookkeeping for one run.
    pub fn finish(self: &Arc<Self>, outcome: &RunOutcome, waiters: Vec<WaiterSlot>) {
        let finished_at = Instant::now();
        let gate = self.shared.gate.read();
        let closing = !gate.is_open();

        let mut merged = None;
        let mut drained = Vec::new();
        {
            let mut st = self.state.lock();
            st.running = st.running.saturating_sub(1);
            st.record(outcome);

            if st.pending {
                st.pending = false;
                let parked = std::mem::take(&mut st.pending_waiters);
                if closing {
                    drained = parked;
                } else {
                    let run = st.begin_run();
                    merged = Some((run, parked));
                }
            }
            if !matches!(st.state, TaskState::Stopping | TaskState::Stopped) {
                st.state = st.visible_state(gate.phase);
            }
        }

        self.signal.fire(finished_at);

        let res = outcome.to_wait_result(closing);
        for w in waiters {
            w.offer(res.clone());
        }
        for w in drained {
            w.offer(Err(TriggerError::Closed));
        }
        if let Some((run, parked)) = merged {
            self.launch(&gate, run, true, parked);
        }
    }

    /// Best-effort removal of a waiter that stopped waiting.
    pub fn detach_waiter(&self, id: u64) {
        self.state.lock().pending_waiters.retain(|w| w.id != id);
    }

    /// Registers a listener for the next run completion.
    pub fn completions(&self) -> Listener {
        self.signal.listen()
    }

    /// NotStarted → Idle, called when the manager starts.
    pub fn activate(&self) {
        let mut st = self.state.lock();
        if st.state == TaskState::NotStarted {
            st.state = TaskState::Idle;
        }
    }

    /// Marks the task as stopping unless it already stopped.
    pub fn mark_stopping(&self) {
        let mut st = self.state.lock();
        if st.state != TaskState::Stopped {
            st.state = TaskState::Stopping;
        }
    }

    /// Delivers `Closed` to every parked waiter and clears `pending`.
    pub fn drain_pending(&self) {
        let parked = {
            let mut st = self.state.lock();
            st.pending = false;
            std::mem::take(&mut st.pending_waiters)
        };
        for w in parked {
            w.offer(Err(TriggerError::Closed));
        }
    }

    /// Final transition at the end of shutdown.
    pub fn finalize(&self) {
        {
            let mut st = self.state.lock();
            st.state = TaskState::Stopped;
            st.next_run = None;
        }
        self.drain_pending();
    }

    pub fn set_next_run(&self, at: Option<SystemTime>) {
        self.state.lock().next_run = at;
    }

    pub fn running(&self) -> usize {
        self.state.lock().running
    }

    /// Starts the scheduler loop once, for periodic tasks. The caller holds the gate's read guard.
    pub fn ensure_scheduler(self: &Arc<Self>, gate: &GateState) {
        let Schedule::Every(every) = self.spec.schedule else {
            return;
        };
        if self.scheduler_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let token = gate.run_token.clone();
        let rt = Arc::clone(self);
        self.shared
            .tracker
            .spawn(scheduler::run_schedule(rt, token, every));
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let st = self.state.lock();
        TaskSnapshot {
            name: self.spec.name.to_string(),
            tags: self.spec.tags.to_vec(),
            schedule: self.spec.schedule.as_label(),
            state: st.state,
            max_concurrent: self.spec.max_concurrent,
            overlap: self.spec.overlap,
            running: st.running,
            pending: st.pending,
            pending_waiters: st.pending_waiters.len(),
            run_count: st.run_count,
            success_count: st.success_count,
            fail_count: st.fail_count,
            panic_count: st.panic_count,
            canceled_count: st.canceled_count,
            last_started: st.last_started,
            last_finished: st.last_finished,
            last_success: st.last_success,
            last_error: st.last_error.clone(),
            next_run: st.next_run,
        }
    }
}
