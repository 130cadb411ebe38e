//! Terminal results
//!
//! Failures are modeled as an explicit sum type rather than letting payload
//! errors propagate past the worker loop: once a task reaches a terminal
//! state, its outcome is frozen into a `TaskResult` and stays queryable for
//! the lifetime of the manager.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::TaskId;
use super::record::TaskStatus;

/// Why one attempt (or the whole task) failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFailure {
    /// The payload signaled an error during invocation
    Execution(String),
    /// The attempt outlived its per-task deadline
    Timeout { limit: Duration },
    /// A dependency finished Failed or Cancelled; never retried
    Dependency(String),
}

impl TaskFailure {
    /// Execution errors and timeouts may be retried; dependency failures may not
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution(_) | Self::Timeout { .. })
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Execution(msg) => write!(f, "payload error: {}", msg),
            Self::Timeout { limit } => write!(f, "attempt exceeded {:?} timeout", limit),
            Self::Dependency(msg) => write!(f, "dependency not satisfiable: {}", msg),
        }
    }
}

/// How a task ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed(Value),
    Failed(TaskFailure),
    Cancelled,
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Completed(_) => TaskStatus::Completed,
            Self::Failed(_) => TaskStatus::Failed,
            Self::Cancelled => TaskStatus::Cancelled,
        }
    }
}

/// Immutable snapshot of a task that reached a terminal state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub outcome: TaskOutcome,
    /// When the final attempt started; None if no worker ever picked it up
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
    /// Wall time of the final attempt's payload invocation
    pub execution_time: Duration,
    /// Retries consumed before the terminal state
    pub retry_count: u32,
    pub metadata: HashMap<String, Value>,
}

impl TaskResult {
    /// Success payload; None unless the task completed
    pub fn value(&self) -> Option<&Value> {
        match &self.outcome {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Failure description; None unless the task failed
    pub fn error(&self) -> Option<&TaskFailure> {
        match &self.outcome {
            TaskOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Completed(_))
    }
}
