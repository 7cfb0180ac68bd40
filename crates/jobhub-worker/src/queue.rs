//! Work queue between the scheduler and the worker pool.

use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify};

use jobhub_core::types::JobId;
use jobhub_entity::record::Record;

/// One record dispatched for processing.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Owning job
    pub job_id: JobId,
    /// Job generation the record was dispatched under
    pub generation: u32,
    /// The record itself
    pub record: Record,
    /// Attempt number (1-based)
    pub attempt: u32,
}

/// FIFO of dispatched records. Workers block in [`WorkQueue::pop`] while it
/// is empty.
#[derive(Debug, Default)]
pub struct WorkQueue {
    /// Pending items
    items: Mutex<VecDeque<WorkItem>>,
    /// Signals waiting workers
    available: Notify,
}

impl WorkQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an item and wake one waiting worker
    pub async fn push(&self, item: WorkItem) {
        self.items.lock().await.push_back(item);
        self.available.notify_one();
    }

    /// Dequeue the next item, waiting until one is available
    pub async fn pop(&self) -> WorkItem {
        loop {
            if let Some(item) = self.items.lock().await.pop_front() {
                return item;
            }
            self.available.notified().await;
        }
    }

    /// Number of queued items
    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Whether the queue is empty
    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}
