//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait and the [`SubscriberSet`] fan-out
//! used by the [`Manager`](crate::Manager) to deliver [`Event`](crate::Event)s.
//!
//! ## Architecture
//! ```text
//! Run / Scheduler ── publish(Event) ──► Bus ──► manager pump ──► SubscriberSet
//!                                                                     │
//!                                                     ┌───────────────┼─────────┐
//!                                                     ▼               ▼         ▼
//!                                                 LogWriter        Metrics    Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
