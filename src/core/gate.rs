//! # Admission gate: the manager's lifecycle phase behind a read/write lock.
//!
//! ```text
//! admission (many, concurrent)        lifecycle change (rare)
//!   gate.read()                         gate.write()
//!     ├─ phase == Running ?               ├─ phase = Running / Stopping / Stopped
//!     ├─ task lock, decide                └─ run_token replaced / cancelled
//!     └─ spawn run on tracker
//! ```
//!
//! ## Rules
//! - Starting or merging a run requires the read guard for the whole decision,
//!   including the spawn onto the tracker.
//! - Changing the phase requires the write guard, so once `Stopping` is written no
//!   admission can still be in its check-then-spawn window.
//! - Lock order is always gate → registry → task runtime.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;

use crate::error::TriggerError;

/// Manager lifecycle phase. Transitions are one-way.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Phase {
    /// Constructed, `start` not called yet.
    NotStarted,
    /// Admitting runs.
    Running,
    /// Shutdown began; no new runs are admitted.
    Stopping,
    /// Shutdown finished.
    Stopped,
}

impl Phase {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Phase::NotStarted => "not_started",
            Phase::Running => "running",
            Phase::Stopping => "stopping",
            Phase::Stopped => "stopped",
        }
    }
}

/// State guarded by the gate.
pub(crate) struct GateState {
    pub phase: Phase,
    /// Parent of every run token; replaced at `start`, cancelled at shutdown.
    pub run_token: CancellationToken,
}

impl GateState {
    /// Maps the phase onto the admission error taxonomy.
    ///
    /// A cancelled run token closes admission even before the phase catches up.
    pub fn check_admission(&self) -> Result<(), TriggerError> {
        match self.phase {
            Phase::Running if self.run_token.is_cancelled() => Err(TriggerError::Closed),
            Phase::Running => Ok(()),
            Phase::NotStarted => Err(TriggerError::NotRunning),
            Phase::Stopping | Phase::Stopped => Err(TriggerError::Closed),
        }
    }

    /// True while runs may be admitted.
    pub fn is_open(&self) -> bool {
        self.check_admission().is_ok()
    }
}

pub(crate) struct Gate {
    state: RwLock<GateState>,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GateState {
                phase: Phase::NotStarted,
                run_token: CancellationToken::new(),
            }),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, GateState> {
        self.state.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, GateState> {
        self.state.write()
    }

    pub fn phase(&self) -> Phase {
        self.state.read().phase
    }
}
