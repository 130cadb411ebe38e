//! Error types for the scheduler's synchronous surface
//!
//! Execution-time failures never travel through these types; they are
//! captured per-attempt as [`TaskFailure`](crate::domain::TaskFailure) and
//! end up inside a `TaskResult`. Only submission-time problems reach the
//! caller as a `TaskError`.

use thiserror::Error;

/// Rejections raised synchronously by `submit` before a task is accepted
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("unknown task function: {name}")]
    UnknownFunction { name: String },

    #[error("duplicate task id: {id}")]
    DuplicateId { id: String },

    #[error("dependency references unknown task id: {id}")]
    UnknownDependency { id: String },

    #[error("task id must not be empty")]
    EmptyId,

    #[error("backoff factor must be >= 1.0, got {value}")]
    BackoffFactor { value: f64 },

    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

/// Errors returned to callers of the TaskManager
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TaskError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("queue full: capacity {capacity} reached")]
    QueueFull { capacity: usize },
}

impl TaskError {
    /// Whether this rejection could succeed on a later resubmission
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }
}
