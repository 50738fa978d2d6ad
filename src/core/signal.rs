//! # Rotating completion signal.
//!
//! Every finished run fires the signal exactly once. Listeners created before a
//! firing observe it; listeners created after it wait for the next one.
//!
//! Built on [`tokio::sync::watch`]: the value is `(generation, finished_at)`, a new
//! receiver marks the current generation as seen, and `changed()` resolves on the
//! next bump. Taking a listener *before* requesting a run therefore cannot miss a
//! run that finishes very quickly.

use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug)]
struct Fired {
    generation: u64,
    at: Instant,
}

pub(crate) struct CompletionSignal {
    tx: watch::Sender<Fired>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Fired {
            generation: 0,
            at: Instant::now(),
        });
        Self { tx }
    }

    /// Wakes every current listener and rotates to the next generation.
    pub fn fire(&self, at: Instant) {
        self.tx.send_modify(|f| {
            f.generation = f.generation.wrapping_add(1);
            f.at = at;
        });
    }

    /// Registers a listener for the next firing.
    pub fn listen(&self) -> Listener {
        Listener {
            rx: self.tx.subscribe(),
        }
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.tx.borrow().generation
    }
}

pub(crate) struct Listener {
    rx: watch::Receiver<Fired>,
}

impl Listener {
    /// Waits for the next firing and returns the finish time it carried.
    ///
    /// Several firings between two calls collapse into one wakeup carrying the latest time.
    pub async fn next(&mut self) -> Option<Instant> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_listener_sees_firing_after_registration() {
        let signal = CompletionSignal::new();
        let mut early = signal.listen();

        let at = Instant::now() + Duration::from_millis(5);
        signal.fire(at);
        assert_eq!(early.next().await, Some(at));
        assert_eq!(signal.generation(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_listener_waits_for_next_firing() {
        let signal = CompletionSignal::new();
        signal.fire(Instant::now());

        let mut late = signal.listen();
        let pending = tokio::time::timeout(Duration::from_millis(10), late.next()).await;
        assert!(pending.is_err());

        let at = Instant::now();
        signal.fire(at);
        assert_eq!(late.next().await, Some(at));
    }

    #[tokio::test]
    async fn test_broadcast_to_all_listeners() {
        let signal = CompletionSignal::new();
        let mut a = signal.listen();
        let mut b = signal.listen();
        let at = Instant::now();
        signal.fire(at);
        assert_eq!(a.next().await, Some(at));
        assert_eq!(b.next().await, Some(at));
    }
}
