//! Scheduling and overlap policies.
//!
//! ## Contents
//! - [`OverlapPolicy`] what happens to a request while the task is at capacity (skip / merge)
//! - [`TickPolicy`]    how a periodic task computes its next tick (fixed delay / fixed rate)
//!
//! ## Quick wiring
//! ```text
//! TaskSpec { overlap: OverlapPolicy, schedule: Every { tick: TickPolicy, .. } }
//!      ├─► TaskRuntime::admit uses overlap when running == max_concurrent
//!      └─► scheduler loop uses tick to place the next run
//! ```
//!
//! ## Defaults
//! - `OverlapPolicy::Skip`.
//! - `TickPolicy::FixedDelay`.

mod overlap;
mod tick;

pub use overlap::OverlapPolicy;
pub use tick::TickPolicy;
