//! Bounded admission queue.
//!
//! Enqueue never waits: a full queue is an immediate rejection. Workers
//! wait on a [`Notify`] with a bounded timeout so they can observe shutdown
//! even when no work arrives.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::priority::{PrioritizedItem, PriorityQueue};
use super::queued_request::QueuedRequest;

/// Configuration for the admission queue.
#[derive(Debug, Clone)]
pub struct AdmissionQueueConfig {
    pub max_size: usize,
}

impl Default for AdmissionQueueConfig {
    fn default() -> Self {
        Self { max_size: 1000 }
    }
}

/// A dequeued request together with its original ordering key.
pub type QueueEntry = PrioritizedItem<QueuedRequest>;

/// Thread-safe bounded queue ordered by priority, then submission order.
pub struct AdmissionQueue {
    queue: Mutex<PriorityQueue<QueuedRequest>>,
    capacity: usize,
    /// Notifies a waiting worker when new items are enqueued.
    notify: Notify,
}

impl AdmissionQueue {
    pub fn new(config: AdmissionQueueConfig) -> Self {
        Self {
            queue: Mutex::new(PriorityQueue::new()),
            capacity: config.max_size.max(1),
            notify: Notify::new(),
        }
    }

    /// Enqueue without blocking. Returns the new queue length, or hands the
    /// request back when the queue is at capacity.
    pub fn try_push(&self, request: QueuedRequest) -> Result<usize, QueuedRequest> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            return Err(request);
        }
        let priority = request.priority;
        queue.push(request, priority);
        let len = queue.len();
        drop(queue);

        self.notify.notify_one();
        Ok(len)
    }

    /// Put a previously dequeued entry back in its original position.
    pub fn requeue(&self, entry: QueueEntry) -> Result<(), QueuedRequest> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            return Err(entry.item);
        }
        queue.push_with_sequence(entry.item, entry.priority, entry.sequence);
        drop(queue);

        self.notify.notify_one();
        Ok(())
    }

    /// Pop the most urgent, oldest entry if any.
    pub fn try_pop(&self) -> Option<QueueEntry> {
        let mut queue = self.queue.lock();
        let entry = queue.pop_entry()?;
        let more = !queue.is_empty();
        drop(queue);

        // Pass the wakeup along so another idle worker picks up the rest.
        if more {
            self.notify.notify_one();
        }
        Some(entry)
    }

    /// Wait up to `wait` for an entry.
    ///
    /// Dropping this future never loses an item: the pop itself happens
    /// without an intervening suspension point.
    pub async fn pop_timeout(&self, wait: Duration) -> Option<QueueEntry> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(entry) = self.try_pop() {
                return Some(entry);
            }
            tokio::select! {
                () = self.notify.notified() => continue,
                () = tokio::time::sleep_until(deadline) => return self.try_pop(),
            }
        }
    }

    /// Remove every request matching `pred`.
    pub fn remove_where<F>(&self, pred: F) -> Vec<QueuedRequest>
    where
        F: FnMut(&QueuedRequest) -> bool,
    {
        self.queue.lock().extract_if(pred)
    }

    /// Remove everything, most urgent first.
    pub fn drain(&self) -> Vec<QueuedRequest> {
        self.queue.lock().drain()
    }

    /// Wake every waiting worker (used during shutdown).
    pub fn wake_all(&self) {
        self.notify.notify_waiters();
    }

    /// Current queue length.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
