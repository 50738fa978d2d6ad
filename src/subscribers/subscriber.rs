//! # The `Subscribe` extension point.
//!
//! Implement [`Subscribe`] to observe engine [`Event`]s: run outcomes for metrics,
//! shutdown results for alerting, skips and merges for capacity tuning.
//!
//! Subscribers are passed to [`ManagerBuilder::with_subscribers`](crate::ManagerBuilder::with_subscribers).
//! Each one gets its own lane in the manager's [`SubscriberSet`](crate::SubscriberSet),
//! and the lane is drained before `shutdown` returns, so the final
//! `AllStoppedWithin` has been handled by then.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use async_trait::async_trait;
//! use taskgate::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct FailureCounter(AtomicU64);
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::RunFailed | EventKind::RunPanicked) {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "failure-counter" }
//!     fn queue_capacity(&self) -> usize { 4096 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Observer of engine events.
///
/// `on_event` runs on the subscriber's own worker task, one event at a time, in
/// publish order. It should not block the executor; a panic is caught and
/// reported as `SubscriberPanicked`.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used in `SubscriberOverflow` / `SubscriberPanicked` events.
    ///
    /// Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Lane capacity (at least 1). When the lane is full, new events are dropped
    /// for this subscriber and `SubscriberOverflow` is published.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
