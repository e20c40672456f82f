//! Bounded FIFO queue shared by pool callers and orchestration rounds.

use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue is empty")]
    Empty,
    #[error("queue is full")]
    Full,
}

/// Thread-safe FIFO queue with an optional capacity bound.
///
/// A single lock guards mutation; reads take the shared side. Waiters can
/// watch for arrivals through [`BoundedQueue::enqueued`] instead of polling.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    items: RwLock<VecDeque<T>>,
    max_capacity: Option<usize>,
    arrival: Notify,
}

impl<T> BoundedQueue<T> {
    /// A `max_capacity` of `None` (or zero) builds an unbounded queue.
    pub fn new(max_capacity: Option<usize>) -> Self {
        let max_capacity = max_capacity.filter(|&cap| cap > 0);
        Self {
            items: RwLock::new(VecDeque::with_capacity(max_capacity.unwrap_or_default())),
            max_capacity,
            arrival: Notify::new(),
        }
    }

    /// Append an item, failing with [`QueueError::Full`] at capacity.
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        {
            let mut items = self.write_items();
            if let Some(cap) = self.max_capacity
                && items.len() >= cap
            {
                return Err(QueueError::Full);
            }
            items.push_back(item);
        }
        self.arrival.notify_waiters();
        Ok(())
    }

    /// Remove and return the oldest item.
    pub fn dequeue(&self) -> Result<T, QueueError> {
        self.write_items().pop_front().ok_or(QueueError::Empty)
    }

    pub fn len(&self) -> usize {
        self.read_items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every queued item. Idempotent.
    pub fn clear(&self) {
        self.write_items().clear();
    }

    /// Resolves after the next enqueue. Register interest before re-checking
    /// the queue; arrivals between a missed dequeue and registration are not
    /// replayed.
    pub async fn enqueued(&self) {
        self.arrival.notified().await;
    }

    // Lock poisoning means a writer panicked mid-section; every mutation here
    // is a single VecDeque call, so the inner state is still coherent.
    fn write_items(&self) -> RwLockWriteGuard<'_, VecDeque<T>> {
        self.items
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_items(&self) -> RwLockReadGuard<'_, VecDeque<T>> {
        self.items
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone> BoundedQueue<T> {
    /// Return the oldest item without removing it.
    pub fn peek(&self) -> Result<T, QueueError> {
        self.read_items().front().cloned().ok_or(QueueError::Empty)
    }
}
