//! Unique-keyed producer-consumer queue.
//!
//! Collapses bursts of state updates for the same logical control: at most
//! one value per key is pending at any time, delivery follows the order keys
//! were first inserted, and an update to an already-queued key replaces the
//! stored value without moving the key. Consumers therefore always transmit
//! the latest state, never a stale intermediate.

use std::{collections::HashMap, hash::Hash, time::Duration};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// Order-preserving queue holding at most one value per key.
///
/// Internally a key channel (delivery order) plus a value map (latest state).
/// A key is in the channel exactly as long as its entry is in the map; only
/// `dequeue` removes entries, so a popped key always has a value.
#[derive(Debug)]
pub struct UniqueQueue<K, V> {
    values: Mutex<HashMap<K, V>>,
    keys_tx: Sender<K>,
    keys_rx: Receiver<K>,
}

impl<K: Eq + Hash + Clone, V> UniqueQueue<K, V> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (keys_tx, keys_rx) = unbounded();
        Self { values: Mutex::new(HashMap::new()), keys_tx, keys_rx }
    }

    /// Inserts or updates the value for `key`.
    ///
    /// A new key joins the back of the delivery order and wakes one blocked
    /// consumer; an existing key keeps its position and wakes nobody (it is
    /// already pending).
    pub fn enqueue(&self, key: K, value: V) {
        let mut values = self.values.lock();
        if values.insert(key.clone(), value).is_none() {
            // Unbounded channel: the send never blocks while the lock is held.
            self.keys_tx.send(key).expect("key channel outlives the queue");
        }
    }

    /// Removes and returns the value for the head key, without blocking.
    pub fn try_dequeue(&self) -> Option<V> {
        let key = self.keys_rx.try_recv().ok()?;
        Some(self.take(key))
    }

    /// Removes and returns the value for the head key, waiting up to
    /// `timeout` for an insertion.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<V> {
        let key = self.keys_rx.recv_timeout(timeout).ok()?;
        Some(self.take(key))
    }

    fn take(&self, key: K) -> V {
        self.values
            .lock()
            .remove(&key)
            .expect("a queued key always has a pending value")
    }

    /// Number of distinct keys pending.
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone, V> Default for UniqueQueue<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
