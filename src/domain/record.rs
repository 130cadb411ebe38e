//! Task records: execution policy and live state for one unit of work

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::payload::TaskFn;

use super::id::TaskId;
use super::priority::Priority;

/// Where a task currently sits in its lifecycle.
///
/// `Pending -> Queued -> Running -> {Completed | Failed}`, with
/// `Failed -> Retrying -> Queued` while retry budget remains, and
/// `Pending/Queued -> Cancelled` for cancellation before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted but not yet enqueued
    #[default]
    Pending,
    /// Waiting in the priority queue
    Queued,
    /// Owned by exactly one worker
    Running,
    /// Failed attempt closed, backoff in progress before re-queueing
    Retrying,
    /// Finished successfully
    Completed,
    /// Finished with retries exhausted (or a non-retryable failure)
    Failed,
    /// Cancelled before any worker picked it up
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Retrying => write!(f, "retrying"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Execution policy attached to one task at submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Attempts after the first one (a task runs at most `max_retries + 1` times)
    pub max_retries: u32,

    /// Delay before the first retry
    pub retry_delay: Duration,

    /// Multiplier applied to the delay on each further retry
    pub backoff_factor: f64,

    /// Per-attempt deadline; None disables the guard
    pub timeout: Option<Duration>,

    /// Dispatch priority
    pub priority: Priority,

    /// Task ids that must reach Completed before this task executes
    pub dependencies: Vec<TaskId>,

    /// Opaque caller data, copied into the terminal result
    pub metadata: HashMap<String, Value>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            timeout: None,
            priority: Priority::Normal,
            dependencies: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

impl TaskConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependency(mut self, dep: impl Into<TaskId>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Checked at submission; invalid policy never reaches a worker
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.backoff_factor < 1.0 || !self.backoff_factor.is_finite() {
            return Err(ValidationError::BackoffFactor {
                value: self.backoff_factor,
            });
        }
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(ValidationError::ZeroTimeout);
            }
        }
        Ok(())
    }
}

/// One submitted unit of work.
///
/// The live registry owns the record from submission until its terminal
/// transition, at which point it is moved (never copied) into the result
/// store as a `TaskResult`. A record with status `Running` is held by
/// exactly one worker.
#[derive(Clone)]
pub struct TaskRecord {
    pub id: TaskId,
    pub payload: Arc<dyn TaskFn>,
    pub args: Vec<Value>,
    /// Set when the payload was resolved from a registered name; keys the rate limiter
    pub fn_name: Option<String>,
    pub config: TaskConfig,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(id: TaskId, payload: Arc<dyn TaskFn>, args: Vec<Value>, config: TaskConfig) -> Self {
        Self {
            id,
            payload,
            args,
            fn_name: None,
            config,
            status: TaskStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_fn_name(mut self, name: impl Into<String>) -> Self {
        self.fn_name = Some(name.into());
        self
    }

    /// Mark the record as picked up by a worker
    pub fn begin_attempt(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Close a failed attempt and charge one unit of retry budget
    pub fn schedule_retry(&mut self) {
        self.status = TaskStatus::Retrying;
        self.retry_count += 1;
        self.started_at = None;
    }

    /// Put the record back in line without charging retry budget
    pub fn defer(&mut self) {
        self.status = TaskStatus::Queued;
        self.started_at = None;
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl std::fmt::Debug for TaskRecord {
    // payload is an opaque callable, skip it
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("fn_name", &self.fn_name)
            .field("status", &self.status)
            .field("retry_count", &self.retry_count)
            .field("priority", &self.config.priority)
            .finish_non_exhaustive()
    }
}
