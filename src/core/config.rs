//! # Manager configuration.
//!
//! Provides [`ManagerConfig`], centralized settings for the engine.
//!
//! Config is used in two ways:
//! 1. **Manager creation**: `Manager::new(config)` / `Manager::builder(config)`
//! 2. **TaskSpec defaults**: resolved by `Manager::add` for options the spec leaves unset
//!
//! ## Sentinel values
//! - `timeout = 0s` → no per-run timeout

use std::time::Duration;

/// Global configuration for a [`Manager`](crate::Manager).
///
/// ## Field semantics
/// - `grace`: Maximum wait in [`Manager::shutdown`](crate::Manager::shutdown) for runs and loops to exit
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `timeout`: Default per-run timeout (`0s` = no timeout)
/// - `report_cancellations`: Default for counting cancellations as failures
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Maximum time [`Manager::shutdown`](crate::Manager::shutdown) waits for in-flight work.
    ///
    /// When exceeded, shutdown returns `RuntimeError::GraceExceeded`.
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Default per-run timeout.
    ///
    /// - `Duration::ZERO` = no timeout
    /// - `> 0` = the run's token is cancelled and the run fails with `TaskError::Timeout`
    pub timeout: Duration,

    /// Default cancellation-reporting flag for tasks.
    ///
    /// When `false`, a run ending in `TaskError::Canceled` counts neither as success
    /// nor failure and is not forwarded to the error handler.
    pub report_cancellations: bool,
}

impl ManagerConfig {
    /// Returns the default per-run timeout as an `Option`.
    #[inline]
    pub fn default_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ManagerConfig {
    /// Default configuration:
    ///
    /// - `grace = 30s`
    /// - `bus_capacity = 1024`
    /// - `timeout = 0s` (no timeout)
    /// - `report_cancellations = false`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
            timeout: Duration::ZERO,
            report_cancellations: false,
        }
    }
}
