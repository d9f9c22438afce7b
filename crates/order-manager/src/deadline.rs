//! Deadline wheel
//!
//! Single scheduled-task structure owning every lock deadline. One entry per
//! lock key; re-scheduling replaces it and completing early cancels it, so no
//! per-order timer is ever left behind.
//!
//! Entries carry the lock generation they belong to. A cancel or pop only
//! affects the generation it names, which keeps a stale deadline from
//! releasing a newer lock on the same key.

use std::cmp::Reverse;
use std::sync::Arc;

use parking_lot::Mutex;
use priority_queue::PriorityQueue;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::controller::LockKey;

#[derive(Default)]
pub struct DeadlineWheel {
    queue: Mutex<PriorityQueue<LockKey, Reverse<(Instant, u64)>>>,
    changed: Arc<Notify>,
}

impl DeadlineWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the deadline for `key`
    pub fn schedule(&self, key: LockKey, at: Instant, generation: u64) {
        self.queue.lock().push(key, Reverse((at, generation)));
        self.changed.notify_one();
    }

    /// Disarm `key` if it is still armed for `generation`
    pub fn cancel(&self, key: &LockKey, generation: u64) -> bool {
        let mut queue = self.queue.lock();
        let armed = matches!(queue.get(key), Some((_, Reverse((_, g)))) if *g == generation);
        if armed {
            queue.remove(key);
        }
        armed
    }

    /// Remove and return every entry due at or before `now`, earliest first
    pub fn pop_due(&self, now: Instant) -> Vec<(LockKey, u64)> {
        let mut queue = self.queue.lock();
        let mut due = Vec::new();
        while let Some(at) = queue.peek().map(|(_, Reverse((at, _)))| *at) {
            if at > now {
                break;
            }
            if let Some((key, Reverse((_, generation)))) = queue.pop() {
                due.push((key, generation));
            }
        }
        due
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.lock().peek().map(|(_, Reverse((at, _)))| *at)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Notified on every `schedule`; outlives a borrow of the wheel
    pub fn notifier(&self) -> Arc<Notify> {
        self.changed.clone()
    }
}
