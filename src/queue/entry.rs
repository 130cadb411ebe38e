//! Queue entry ordering

use crate::domain::{Priority, TaskId};

/// One waiting slot in the priority queue.
///
/// The heap holds ids plus ordering metadata only; the live registry keeps
/// ownership of the full record so that no two structures ever hold the
/// same task.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: TaskId,
    pub priority: Priority,
    /// Monotonic insertion number, assigned by the queue
    pub seq: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority first, then earlier insertion
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
