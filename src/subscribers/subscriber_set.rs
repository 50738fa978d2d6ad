//! # Subscriber fan-out with drainable lanes.
//!
//! A [`SubscriberSet`] gives every subscriber its own lane: a bounded queue and a
//! worker task that feeds the queue to [`Subscribe::on_event`] in order.
//!
//! ```text
//!                      ┌─► lane "log"     [queue] ─► worker ─► on_event
//! bus ─► pump ─► emit ─┼─► lane "metrics" [queue] ─► worker ─► on_event
//!                      └─► lane ...
//!
//! AllStoppedWithin ─► pump stops ─► close(): senders dropped, workers awaited
//! ```
//!
//! ## Rules
//! - `emit` never waits: a full lane drops the event for that lane only and
//!   publishes `SubscriberOverflow` (never for an overflow event itself).
//! - Order is kept per lane, not across lanes.
//! - A panic in `on_event` is caught, reported as `SubscriberPanicked`, and the
//!   lane keeps going with the next event.
//! - [`close`](SubscriberSet::close) returns once every lane has handled its backlog.
//!
//! The worker wraps `on_event` in `AssertUnwindSafe`; a subscriber that panics while
//! holding its own lock may leave that state poisoned or half-updated.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

use crate::events::{Bus, Event, EventKind};
use crate::hooks::panic_message;
use crate::subscribers::Subscribe;

/// One subscriber's queue and the worker draining it.
struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
    worker: JoinHandle<()>,
}

impl Lane {
    fn open(sub: Arc<dyn Subscribe>, bus: Bus) -> Self {
        let name = sub.name();
        let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
        let worker = tokio::spawn(work_lane(sub, rx, bus));
        Self { name, tx, worker }
    }
}

async fn work_lane(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let delivery = std::panic::AssertUnwindSafe(sub.on_event(ev.as_ref())).catch_unwind();
        if let Err(payload) = delivery.await {
            let info = panic_message(payload.as_ref());
            bus.publish(Event::subscriber_panicked(sub.name(), info));
        }
    }
}

/// Subscribers of one manager, each behind its own bounded lane.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    bus: Bus,
}

impl SubscriberSet {
    /// Opens one lane per subscriber.
    ///
    /// Must be called inside a tokio runtime when `subs` is non-empty.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let lanes = subs
            .into_iter()
            .map(|sub| Lane::open(sub, bus.clone()))
            .collect();
        Self { lanes, bus }
    }

    /// True when no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    /// Queues `event` on every lane without waiting.
    pub fn emit(&self, event: &Event) {
        let shared = Arc::new(event.clone());
        let reportable = event.kind != EventKind::SubscriberOverflow;

        for lane in &self.lanes {
            let reason = match lane.tx.try_send(Arc::clone(&shared)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if reportable {
                self.bus.publish(Event::subscriber_overflow(lane.name, reason));
            }
        }
    }

    /// Closes every lane and waits until each worker has handled its backlog.
    pub async fn close(self) {
        let workers: Vec<_> = self
            .lanes
            .into_iter()
            .map(|Lane { worker, .. }| worker)
            .collect();
        for worker in workers {
            let _ = worker.await;
        }
    }

    /// Forwards bus events until `AllStoppedWithin` (or a closed bus), then closes.
    pub(crate) async fn pump(self, mut rx: broadcast::Receiver<Event>) {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    self.emit(&ev);
                    if ev.kind == EventKind::AllStoppedWithin {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        self.close().await;
    }

    /// Forwards whatever is already buffered in `rx`, without waiting for more.
    pub(crate) fn emit_buffered(&self, rx: &mut broadcast::Receiver<Event>) {
        loop {
            match rx.try_recv() {
                Ok(ev) => self.emit(&ev),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

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

    struct Explode;

    #[async_trait]
    impl Subscribe for Explode {
        async fn on_event(&self, _ev: &Event) {
            panic!("subscriber exploded");
        }
        fn name(&self) -> &'static str {
            "explode"
        }
    }

    /// One-slot queue.
    struct Tiny;

    #[async_trait]
    impl Subscribe for Tiny {
        async fn on_event(&self, _ev: &Event) {}
        fn name(&self) -> &'static str {
            "tiny"
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn test_fan_out_and_panic_isolation() {
        let bus = Bus::new(16);
        let mut bus_rx = bus.subscribe();
        let collect = Arc::new(Collect::default());
        let subs: Vec<Arc<dyn Subscribe>> = vec![collect.clone(), Arc::new(Explode)];
        let set = SubscriberSet::new(subs, bus.clone());
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::RunStarted));
        set.emit(&Event::new(EventKind::RunSucceeded));
        set.close().await;

        assert_eq!(
            *collect.0.lock(),
            vec![EventKind::RunStarted, EventKind::RunSucceeded]
        );
        let first = bus_rx.recv().await.ok();
        assert_eq!(first.map(|e| e.kind), Some(EventKind::SubscriberPanicked));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_lane_reports_overflow() {
        let bus = Bus::new(16);
        let mut bus_rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Tiny) as Arc<dyn Subscribe>], bus.clone());

        // The worker has not been polled yet, so the second event finds the lane full.
        set.emit(&Event::new(EventKind::RunStarted));
        set.emit(&Event::new(EventKind::RunSucceeded));

        let ev = bus_rx.recv().await.ok();
        assert_eq!(ev.as_ref().map(|e| e.kind), Some(EventKind::SubscriberOverflow));
        assert_eq!(ev.and_then(|e| e.reason).as_deref(), Some("full"));
        set.close().await;
    }

    #[tokio::test]
    async fn test_pump_stops_after_all_stopped_and_drains() {
        let bus = Bus::new(16);
        let rx = bus.subscribe();
        let collect = Arc::new(Collect::default());
        let set = SubscriberSet::new(vec![collect.clone() as Arc<dyn Subscribe>], bus.clone());

        bus.publish(Event::new(EventKind::ShutdownRequested));
        bus.publish(Event::new(EventKind::AllStoppedWithin));
        bus.publish(Event::new(EventKind::TaskAdded));
        set.pump(rx).await;

        assert_eq!(
            *collect.0.lock(),
            vec![EventKind::ShutdownRequested, EventKind::AllStoppedWithin]
        );
    }

    #[tokio::test]
    async fn test_emit_buffered_does_not_wait() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let collect = Arc::new(Collect::default());
        let set = SubscriberSet::new(vec![collect.clone() as Arc<dyn Subscribe>], bus.clone());

        bus.publish(Event::new(EventKind::TaskAdded));
        set.emit_buffered(&mut rx);
        set.close().await;
        assert_eq!(*collect.0.lock(), vec![EventKind::TaskAdded]);
    }
}
