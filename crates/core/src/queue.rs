//! Bounded producer/consumer queue.
//!
//! `enqueue` never blocks the producer: a full queue drops the new item.
//! `dequeue` blocks until an item (or a stop request) arrives. Because the
//! condvar wait releases the mutex for the duration of the wait, "the lock
//! must be released on any cancellation point" holds for free —
//! there is no separate cleanup frame to wire up.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Result of a single [`BoundedQueue::enqueue`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// The queue was at capacity; the item was dropped.
    Dropped,
    /// The internal lock could not be acquired promptly in non-blocking mode.
    WouldBlock,
}

/// A fixed-capacity FIFO shared between one or more producers and a single
/// consumer task.
pub struct BoundedQueue<T> {
    name: String,
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    item_added: Condvar,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            item_added: Condvar::new(),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of items dropped for being enqueued against a full
    /// queue, exposed as a per-sink drop counter.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// `blocking = true` waits indefinitely for the internal lock;
    /// `blocking = false` gives up after a short timeout and reports
    /// [`EnqueueOutcome::WouldBlock`]. Either way, a full queue drops
    /// `item` rather than waiting for consumer progress — the producer is
    /// the audio control path and must never stall on it.
    pub fn enqueue(&self, item: T, blocking: bool) -> EnqueueOutcome {
        let mut guard = if blocking {
            self.items.lock()
        } else {
            match self.items.try_lock_for(Duration::from_millis(50)) {
                Some(guard) => guard,
                None => return EnqueueOutcome::WouldBlock,
            }
        };

        if guard.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return EnqueueOutcome::Dropped;
        }

        guard.push_back(item);
        drop(guard);
        self.item_added.notify_one();
        EnqueueOutcome::Enqueued
    }

    /// Block until an item is available and pop it, or return `None` once
    /// `stop` is observed set.
    pub fn dequeue(&self, stop: &AtomicBool) -> Option<T> {
        let mut guard = self.items.lock();
        loop {
            if let Some(item) = guard.pop_front() {
                return Some(item);
            }
            if stop.load(Ordering::Relaxed) {
                return None;
            }
            self.item_added.wait_for(&mut guard, Duration::from_millis(200));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn enqueue_dequeue_preserves_fifo_order() {
        let queue = BoundedQueue::new(4, "test");
        for i in 0..4 {
            assert_eq!(queue.enqueue(i, true), EnqueueOutcome::Enqueued);
        }
        let stop = AtomicBool::new(false);
        for i in 0..4 {
            assert_eq!(queue.dequeue(&stop), Some(i));
        }
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let queue = BoundedQueue::new(2, "test");
        assert_eq!(queue.enqueue(1, true), EnqueueOutcome::Enqueued);
        assert_eq!(queue.enqueue(2, true), EnqueueOutcome::Enqueued);
        assert_eq!(queue.enqueue(3, true), EnqueueOutcome::Dropped);
        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn dequeue_unblocks_on_stop() {
        let queue = Arc::new(BoundedQueue::<u32>::new(2, "test"));
        let stop = Arc::new(AtomicBool::new(false));

        let q = queue.clone();
        let s = stop.clone();
        let consumer = thread::spawn(move || q.dequeue(&s));

        thread::sleep(Duration::from_millis(50));
        stop.store(true, Ordering::Relaxed);
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn dequeue_wakes_on_enqueue() {
        let queue = Arc::new(BoundedQueue::new(2, "test"));
        let stop = Arc::new(AtomicBool::new(false));

        let q = queue.clone();
        let s = stop.clone();
        let consumer = thread::spawn(move || q.dequeue(&s));

        thread::sleep(Duration::from_millis(20));
        queue.enqueue(7, true);
        assert_eq!(consumer.join().unwrap(), Some(7));
    }
}
