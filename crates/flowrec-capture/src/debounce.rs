//! Keyed, cancellable debounce timers.
//!
//! Each key owns at most one timer. Scheduling a key again aborts its
//! previous timer, so only the last event of a burst fires. Fires are
//! delivered on a channel and must be confirmed with [`Debouncer::accept`]:
//! a fire that was already queued when its key was rescheduled or cancelled
//! carries a stale generation and is rejected.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A timer that elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fire<K> {
    pub key: K,
    generation: u64,
}

struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct Debouncer<K> {
    tx: mpsc::UnboundedSender<Fire<K>>,
    timers: HashMap<K, Timer>,
    next_generation: u64,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    /// Creates a debouncer and the receiver its fires arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Fire<K>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let debouncer = Self {
            tx,
            timers: HashMap::new(),
            next_generation: 0,
        };
        (debouncer, rx)
    }

    /// (Re)starts the timer for `key`.
    pub fn schedule(&mut self, key: K, delay: Duration) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let tx = self.tx.clone();
        let fire = Fire {
            key: key.clone(),
            generation,
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the owner shut down.
            let _ = tx.send(fire);
        });

        if let Some(old) = self.timers.insert(key, Timer { generation, handle }) {
            old.handle.abort();
        }
    }

    /// Confirms a received fire. Returns false for stale fires.
    pub fn accept(&mut self, fire: &Fire<K>) -> bool {
        match self.timers.get(&fire.key) {
            Some(timer) if timer.generation == fire.generation => {
                self.timers.remove(&fire.key);
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self, key: &K) {
        if let Some(timer) = self.timers.remove(key) {
            timer.handle.abort();
        }
    }

    /// Aborts every timer. Fires already queued become stale.
    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.timers.contains_key(key)
    }

    /// Number of timers that have not fired yet.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for timer in self.timers.values() {
            timer.handle.abort();
        }
    }
}
