use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::experience::QueueEntry;

/// Unbounded FIFO of pending experience adjustments.
///
/// Any number of producers may `enqueue` concurrently. Draining is guarded by
/// an atomic flag: `try_begin_drain` either hands out the only [`DrainGuard`]
/// or returns `None`, and the flag is cleared when the guard drops.
#[derive(Debug, Default)]
pub struct ExperienceQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    draining: AtomicBool,
}

impl ExperienceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, entry: impl Into<QueueEntry>) {
        self.lock_entries().push_back(entry.into());
    }

    pub fn dequeue_next(&self) -> Option<QueueEntry> {
        self.lock_entries().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    pub fn is_drain_in_progress(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub fn try_begin_drain(&self) -> Option<DrainGuard<'_>> {
        self.draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard { queue: self })
    }

    // push/pop never leave the deque half-updated, so a poisoned lock is still usable.
    fn lock_entries(&self) -> MutexGuard<'_, VecDeque<QueueEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive draining rights over an [`ExperienceQueue`].
#[derive(Debug)]
pub struct DrainGuard<'a> {
    queue: &'a ExperienceQueue,
}

impl DrainGuard<'_> {
    pub fn next_entry(&self) -> Option<QueueEntry> {
        self.queue.dequeue_next()
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.queue.draining.store(false, Ordering::Release);
    }
}
