//! # Tick disciplines for periodic tasks.
//!
//! [`TickPolicy`] chooses how the scheduler loop computes the next tick:
//!
//! ```text
//! FixedDelay:  |run|----interval----|run......|----interval----|run|
//!              next tick = previous run's finish + interval
//!
//! FixedRate:   |run|      |run|      |   (stall)      |run|      |run|
//!              ^base      ^+1        ^+2   ^+3 dropped ^+4
//!              next tick = base + k·interval, smallest k strictly in the future
//! ```
//!
//! ## Rules
//! - FixedRate never "catches up": ticks missed while the loop was behind are dropped.
//! - FixedDelay anchors on completion, so a slow run pushes the schedule back.

/// How the next tick of a periodic task is computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TickPolicy {
    /// Next tick is `interval` after the previous run finished (default).
    #[default]
    FixedDelay,

    /// Next tick is the next `base + k·interval` boundary after now.
    FixedRate,
}

impl TickPolicy {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TickPolicy::FixedDelay => "fixed_delay",
            TickPolicy::FixedRate => "fixed_rate",
        }
    }
}
