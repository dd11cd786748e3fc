//! In-memory admission queue decoupling connection intake from execution.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Thread-safe FIFO buffer between the intake loop and the pool manager.
///
/// Producers never block; the single consumer blocks on [`pop`] until an
/// entry arrives or the queue is closed. Entries survive only as long as
/// the daemon process; a crash loses unclaimed entries by design.
///
/// [`pop`]: AdmissionQueue::pop
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<Vec<u8>>,
    closed: bool,
}

impl AdmissionQueue {
    /// Builds an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a payload in arrival order.
    ///
    /// Returns `false` when the queue has been closed; the entry is dropped
    /// in that case and the caller decides whether that is worth a log line.
    pub fn push(&self, payload: Vec<u8>) -> bool {
        let mut state = self.lock_state();
        if state.closed {
            return false;
        }
        state.entries.push_back(payload);
        drop(state);
        self.available.notify_one();
        true
    }

    /// Removes and returns the oldest entry, blocking while the queue is
    /// open but empty. Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<Vec<u8>> {
        let mut state = self.lock_state();
        loop {
            if let Some(payload) = state.entries.pop_front() {
                return Some(payload);
            }
            if state.closed {
                return None;
            }
            state = match self.available.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Discards every pending entry, returning how many were dropped.
    ///
    /// Used by the kill path: work that never started is abandoned.
    pub fn clear(&self) -> usize {
        let mut state = self.lock_state();
        let discarded = state.entries.len();
        state.entries.clear();
        discarded
    }

    /// Marks the queue closed and wakes any blocked consumer.
    ///
    /// Already-queued entries are still handed out; only a subsequent
    /// [`clear`] abandons them.
    ///
    /// [`clear`]: AdmissionQueue::clear
    pub fn close(&self) {
        let mut state = self.lock_state();
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }

    /// Number of entries waiting to be launched.
    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    /// Whether no entries are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn pop_preserves_arrival_order() {
        let queue = AdmissionQueue::new();
        assert!(queue.push(b"first".to_vec()));
        assert!(queue.push(b"second".to_vec()));
        assert!(queue.push(b"third".to_vec()));
        assert_eq!(queue.pop().unwrap(), b"first");
        assert_eq!(queue.pop().unwrap(), b"second");
        assert_eq!(queue.pop().unwrap(), b"third");
    }

    #[test]
    fn pop_blocks_until_push() {
        let queue = Arc::new(AdmissionQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(50));
        assert!(queue.push(b"late".to_vec()));
        assert_eq!(consumer.join().unwrap().unwrap(), b"late");
    }

    #[test]
    fn close_drains_remaining_entries_then_yields_none() {
        let queue = AdmissionQueue::new();
        assert!(queue.push(b"queued".to_vec()));
        queue.close();
        assert_eq!(queue.pop().unwrap(), b"queued");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let queue = Arc::new(AdmissionQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(50));
        queue.close();
        assert!(consumer.join().unwrap().is_none());
    }

    #[test]
    fn clear_abandons_pending_entries() {
        let queue = AdmissionQueue::new();
        assert!(queue.push(b"a".to_vec()));
        assert!(queue.push(b"b".to_vec()));
        assert_eq!(queue.clear(), 2);
        queue.close();
        assert!(queue.pop().is_none());
    }

    #[test]
    fn push_after_close_is_rejected() {
        let queue = AdmissionQueue::new();
        queue.close();
        assert!(!queue.push(b"stray".to_vec()));
        assert!(queue.is_empty());
    }
}
