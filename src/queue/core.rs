//! Concurrency-safe priority queue feeding ready tasks to workers

use std::collections::BinaryHeap;

use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::domain::{Priority, TaskId};
use crate::error::TaskError;

use super::entry::QueueEntry;

/// Internal state protected by mutex
struct QueueInner {
    /// Waiting entries, highest priority first, FIFO within a priority
    heap: BinaryHeap<QueueEntry>,

    /// Next insertion sequence number
    seq: u64,

    /// Tasks submitted but not yet terminal. Counted at the task-id level:
    /// a retry re-enqueue does not bump this, so join() cannot return
    /// between attempts.
    outstanding: usize,

    /// Set while the pool is stopping; dequeue hands out nothing
    draining: bool,
}

/// Shared priority queue.
///
/// `dequeue` returns each enqueued entry to exactly one caller (the pop
/// happens under the mutex), which is the structural guarantee that no task
/// is ever double-executed. With a capacity bound, `enqueue` blocks until
/// space frees while `try_enqueue` fails fast with `QueueFullError`;
/// submission uses the latter so `submit` stays non-blocking.
pub struct PriorityTaskQueue {
    capacity: Option<usize>,
    inner: Mutex<QueueInner>,
    /// Signaled when an entry lands or draining starts
    ready: Notify,
    /// Signaled when a bounded queue frees a slot
    space: Notify,
    /// Signaled when outstanding reaches zero
    idle: Notify,
}

impl PriorityTaskQueue {
    /// Create a queue; `None` capacity means unbounded
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            inner: Mutex::new(QueueInner {
                heap: BinaryHeap::new(),
                seq: 0,
                outstanding: 0,
                draining: false,
            }),
            ready: Notify::new(),
            space: Notify::new(),
            idle: Notify::new(),
        }
    }

    fn is_full(&self, inner: &QueueInner) -> bool {
        self.capacity.is_some_and(|cap| inner.heap.len() >= cap)
    }

    fn push(&self, inner: &mut QueueInner, id: TaskId, priority: Priority) {
        let seq = inner.seq;
        inner.seq += 1;
        inner.heap.push(QueueEntry { id, priority, seq });
    }

    /// Admit a new task, blocking while a bounded queue is full.
    ///
    /// The producer-facing blocking variant of `try_enqueue`; a caller
    /// blocked here suspends only itself. Counts the task as outstanding
    /// for `join` accounting.
    pub async fn enqueue(&self, id: TaskId, priority: Priority) {
        loop {
            let notified = self.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock().await;
                if !self.is_full(&inner) {
                    debug!(%id, %priority, seq = inner.seq, "PriorityTaskQueue::enqueue: inserting");
                    self.push(&mut inner, id, priority);
                    inner.outstanding += 1;
                    drop(inner);
                    self.ready.notify_waiters();
                    return;
                }
            }
            notified.await;
        }
    }

    /// Re-admit a task a worker already holds (retry backoff done,
    /// dependency deferral), bypassing the capacity bound.
    ///
    /// Re-admission is exempt from the bound: a worker must always be able
    /// to put its task back, otherwise a queue filled by submissions while
    /// the attempt ran could block retries forever and deadlock shutdown.
    pub async fn requeue(&self, id: TaskId, priority: Priority) {
        let mut inner = self.inner.lock().await;
        debug!(%id, %priority, seq = inner.seq, "PriorityTaskQueue::requeue: re-admitting");
        self.push(&mut inner, id, priority);
        drop(inner);
        self.ready.notify_waiters();
    }

    /// Insert an entry, failing fast when a bounded queue is full.
    ///
    /// On success also counts the task as outstanding; this is the
    /// submission path, called once per task id.
    pub async fn try_enqueue(&self, id: TaskId, priority: Priority) -> Result<(), TaskError> {
        let mut inner = self.inner.lock().await;
        if self.is_full(&inner) {
            debug!(%id, "PriorityTaskQueue::try_enqueue: queue full, rejecting");
            return Err(TaskError::QueueFull {
                capacity: self.capacity.unwrap_or(0),
            });
        }
        debug!(%id, %priority, seq = inner.seq, "PriorityTaskQueue::try_enqueue: inserting");
        self.push(&mut inner, id, priority);
        inner.outstanding += 1;
        drop(inner);
        self.ready.notify_waiters();
        Ok(())
    }

    /// Hand the highest-priority, earliest-enqueued entry to one caller.
    ///
    /// Blocks while the queue is empty. Returns `None` only when the queue
    /// is draining (pool stop); waiting entries are kept and served again
    /// after `resume`.
    pub async fn dequeue(&self) -> Option<QueueEntry> {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock().await;
                if inner.draining {
                    return None;
                }
                if let Some(entry) = inner.heap.pop() {
                    debug!(id = %entry.id, priority = %entry.priority, "PriorityTaskQueue::dequeue: handing out");
                    drop(inner);
                    self.space.notify_waiters();
                    return Some(entry);
                }
            }
            notified.await;
        }
    }

    /// Close out one task that reached a terminal state
    pub async fn task_done(&self) {
        let mut inner = self.inner.lock().await;
        debug_assert!(inner.outstanding > 0, "task_done without matching submit");
        inner.outstanding = inner.outstanding.saturating_sub(1);
        let drained = inner.outstanding == 0;
        drop(inner);
        if drained {
            self.idle.notify_waiters();
        }
    }

    /// Block until every submitted task has reached a terminal state
    pub async fn join(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.lock().await.outstanding == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Entries not yet dequeued (best-effort, for stats)
    pub async fn len(&self) -> usize {
        self.inner.lock().await.heap.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Tasks submitted but not yet terminal
    pub async fn outstanding(&self) -> usize {
        self.inner.lock().await.outstanding
    }

    /// Start draining: dequeue returns `None`, entries stay put
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        inner.draining = true;
        drop(inner);
        self.ready.notify_waiters();
    }

    /// Leave draining mode; waiting entries become servable again
    pub async fn resume(&self) {
        let mut inner = self.inner.lock().await;
        inner.draining = false;
        drop(inner);
        self.ready.notify_waiters();
    }

    /// Resolve when draining starts; used by workers to cut backoff
    /// sleeps short during shutdown
    pub async fn stopped(&self) {
        loop {
            let notified = self.ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.lock().await.draining {
                return;
            }
            notified.await;
        }
    }
}
