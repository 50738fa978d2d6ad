//! # Engine event bus.
//!
//! Runs, scheduler loops, the manager and subscriber lanes all publish into one
//! [`Bus`]. The manager holds a single receiver, created when it is built, and pumps
//! it into its [`SubscriberSet`](crate::SubscriberSet).
//!
//! ```text
//! run / scheduler / manager / lane ── publish ──► Bus (broadcast ring)
//!                                                  │
//!                                                  └──► manager receiver ──► pump ──► lanes
//! ```
//!
//! Publishing never blocks and never fails. With no receiver the event is dropped;
//! a receiver that falls more than `capacity` events behind skips the oldest ones.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable publishing end of the engine's broadcast channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus retaining up to `capacity` undelivered events (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes `ev` to every current receiver.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// New receiver; it sees only events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
