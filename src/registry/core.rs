//! Live-task registry and terminal result store
//!
//! One mutex guards both maps, so the terminal transition (remove from
//! `live`, insert into `results`) is a single atomic move. No task is
//! ever present in both structures, and no copy outlives the move.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{TaskConfig, TaskFailure, TaskId, TaskOutcome, TaskRecord, TaskResult, TaskStatus};
use crate::error::ValidationError;
use crate::payload::TaskFn;

/// Everything a worker needs to run one attempt, snapshotted out of the
/// registry so the lock is not held across the payload invocation
pub struct Attempt {
    pub payload: Arc<dyn TaskFn>,
    pub args: Vec<Value>,
    pub config: TaskConfig,
    pub fn_name: Option<String>,
    /// Retries already consumed when this attempt started
    pub retry_count: u32,
}

/// Aggregate dependency readiness for one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyState {
    /// Every dependency reached Completed
    Satisfied,
    /// At least one dependency is still live; check again later
    Waiting,
    /// A dependency ended Failed or Cancelled; the task can never run
    Blocked(TaskId),
}

/// Live/terminal counts plus queue depth
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SystemStats {
    pub pending: usize,
    pub queued: usize,
    pub running: usize,
    pub retrying: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Entries sitting in the priority queue, filled in by the manager
    pub queue_depth: usize,
}

struct RegistryInner {
    live: HashMap<TaskId, TaskRecord>,
    results: HashMap<TaskId, TaskResult>,
}

/// Owner of every non-terminal record and permanent home of every result
#[derive(Default)]
pub struct TaskRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for RegistryInner {
    fn default() -> Self {
        Self {
            live: HashMap::new(),
            results: HashMap::new(),
        }
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a new record; ids are unique across live and terminal tasks
    pub async fn insert(&self, record: TaskRecord) -> Result<(), ValidationError> {
        let mut inner = self.inner.lock().await;
        if inner.live.contains_key(&record.id) || inner.results.contains_key(&record.id) {
            return Err(ValidationError::DuplicateId {
                id: record.id.to_string(),
            });
        }
        debug!(id = %record.id, "TaskRegistry::insert");
        inner.live.insert(record.id.clone(), record);
        Ok(())
    }

    /// Roll a just-inserted record back out (queue-full on submission)
    pub async fn remove(&self, id: &TaskId) {
        self.inner.lock().await.live.remove(id);
    }

    pub async fn contains(&self, id: &TaskId) -> bool {
        let inner = self.inner.lock().await;
        inner.live.contains_key(id) || inner.results.contains_key(id)
    }

    /// Set a live record's status; no-op once terminal
    pub async fn set_status(&self, id: &TaskId, status: TaskStatus) {
        let mut inner = self.inner.lock().await;
        if let Some(record) = inner.live.get_mut(id) {
            if !record.is_terminal() {
                record.status = status;
            }
        }
    }

    /// Claim a dequeued task for execution.
    ///
    /// Marks the record Running and stamps `started_at`; returns `None`
    /// for ids that are unknown or already terminal (cancelled while the
    /// queue entry was still in flight), which the worker skips.
    pub async fn begin_attempt(&self, id: &TaskId) -> Option<Attempt> {
        let mut inner = self.inner.lock().await;
        let record = inner.live.get_mut(id)?;
        if record.is_terminal() || record.status == TaskStatus::Running {
            return None;
        }
        record.begin_attempt();
        Some(Attempt {
            payload: record.payload.clone(),
            args: record.args.clone(),
            config: record.config.clone(),
            fn_name: record.fn_name.clone(),
            retry_count: record.retry_count,
        })
    }

    /// Put a claimed task back in line without charging retry budget
    /// (dependency not yet satisfied)
    pub async fn defer(&self, id: &TaskId) {
        let mut inner = self.inner.lock().await;
        if let Some(record) = inner.live.get_mut(id) {
            record.defer();
        }
    }

    /// Close a failed attempt: Retrying, retry budget charged
    pub async fn schedule_retry(&self, id: &TaskId) {
        let mut inner = self.inner.lock().await;
        if let Some(record) = inner.live.get_mut(id) {
            record.schedule_retry();
        }
    }

    /// Back to Queued after the backoff sleep, just before re-enqueue
    pub async fn requeue(&self, id: &TaskId) {
        self.set_status(id, TaskStatus::Queued).await;
    }

    fn finalize_locked(
        inner: &mut RegistryInner,
        record: TaskRecord,
        outcome: TaskOutcome,
        execution_time: Duration,
    ) {
        let status = outcome.status();
        debug!(id = %record.id, %status, "TaskRegistry::finalize");
        let result = TaskResult {
            task_id: record.id.clone(),
            status,
            outcome,
            started_at: record.started_at,
            completed_at: Utc::now(),
            execution_time,
            retry_count: record.retry_count,
            metadata: record.config.metadata,
        };
        inner.results.insert(record.id, result);
    }

    /// The single atomic move from live registry to result store.
    ///
    /// Returns false when the id is unknown or already terminal; the
    /// transition happens at most once per id.
    pub async fn finalize(&self, id: &TaskId, outcome: TaskOutcome, execution_time: Duration) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.live.remove(id) else {
            warn!(%id, "TaskRegistry::finalize: unknown or already finalized");
            return false;
        };
        Self::finalize_locked(&mut inner, record, outcome, execution_time);
        true
    }

    /// Cancel a task that no worker has claimed yet.
    ///
    /// Only Pending and Queued records are cancellable; Running, Retrying,
    /// and terminal tasks return false. The status check and the move
    /// happen under one lock acquisition so a worker cannot claim the
    /// task in between.
    pub async fn cancel(&self, id: &TaskId) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.live.get(id).map(|r| r.status) {
            Some(TaskStatus::Pending | TaskStatus::Queued) => {
                if let Some(record) = inner.live.remove(id) {
                    Self::finalize_locked(&mut inner, record, TaskOutcome::Cancelled, Duration::ZERO);
                }
                true
            }
            _ => false,
        }
    }

    pub async fn status(&self, id: &TaskId) -> Option<TaskStatus> {
        let inner = self.inner.lock().await;
        inner
            .live
            .get(id)
            .map(|r| r.status)
            .or_else(|| inner.results.get(id).map(|r| r.status))
    }

    /// Terminal result, cloned out; the store keeps results queryable for
    /// the lifetime of the manager
    pub async fn result(&self, id: &TaskId) -> Option<TaskResult> {
        self.inner.lock().await.results.get(id).cloned()
    }

    /// Readiness of a dependency list against current task states
    pub async fn dependency_state(&self, deps: &[TaskId]) -> DependencyState {
        let inner = self.inner.lock().await;
        for dep in deps {
            match inner.results.get(dep).map(|r| r.status) {
                Some(TaskStatus::Completed) => continue,
                Some(_) => return DependencyState::Blocked(dep.clone()),
                None => return DependencyState::Waiting,
            }
        }
        DependencyState::Satisfied
    }

    /// Counts by status; `queue_depth` is left for the manager to fill
    pub async fn stats(&self) -> SystemStats {
        let inner = self.inner.lock().await;
        let mut stats = SystemStats::default();
        for record in inner.live.values() {
            match record.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Queued => stats.queued += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Retrying => stats.retrying += 1,
                // Terminal records never live in the registry
                _ => {}
            }
        }
        for result in inner.results.values() {
            match result.status {
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
                _ => {}
            }
        }
        stats
    }

    /// Helper for failing a task whose dependency can never complete
    pub async fn fail_dependency(&self, id: &TaskId, dep: &TaskId) -> bool {
        self.finalize(
            id,
            TaskOutcome::Failed(TaskFailure::Dependency(format!(
                "dependency {} did not complete",
                dep
            ))),
            Duration::ZERO,
        )
        .await
    }
}
