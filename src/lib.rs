//! taskpool - in-process asynchronous priority task scheduler
//!
//! A queue of deferred units of work, executed by a bounded pool of
//! concurrent tokio workers, with per-task retry/backoff, timeout
//! enforcement, and per-function rate limiting.
//!
//! # Core Concepts
//!
//! - **Priority then FIFO**: among ready tasks, strictly higher priority
//!   dispatches first; ties break by submission order
//! - **Exactly One Executor**: the queue hands each task to exactly one
//!   worker; the registry owns every live record until its single
//!   terminal transition into the result store
//! - **Failures Are Values**: payload errors and timeouts become
//!   `TaskResult` outcomes, never panics or escaped errors
//! - **Cooperative Deadlines**: timeouts finalize the attempt at the
//!   deadline but cannot forcibly kill a non-cooperative payload
//!
//! # Modules
//!
//! - [`domain`] - task identity, policy, lifecycle, and results
//! - [`queue`] - the shared priority queue
//! - [`policy`] - retry/backoff decisions and rate limits
//! - [`registry`] - live-record registry and result store
//! - [`manager`] - the `TaskManager` façade
//! - [`config`] - configuration types and loading
//!
//! # Example
//!
//! ```
//! use taskpool::{Priority, TaskConfig, TaskManager, payload};
//!
//! # async fn demo() -> Result<(), taskpool::TaskError> {
//! let manager = TaskManager::with_defaults();
//! manager
//!     .register_task_function(
//!         "double",
//!         payload::from_fn(|args| {
//!             Box::pin(async move {
//!                 let n = args[0].as_i64().ok_or("expected integer")?;
//!                 Ok(serde_json::json!(n * 2))
//!             })
//!         }),
//!     )
//!     .await;
//!
//! manager.start().await;
//! let id = manager
//!     .submit(
//!         "double",
//!         vec![serde_json::json!(21)],
//!         Some(TaskConfig::new().with_priority(Priority::High)),
//!     )
//!     .await?;
//!
//! manager.wait_for_completion().await;
//! let result = manager.get_task_result(&id).await.expect("terminal result");
//! assert_eq!(result.value(), Some(&serde_json::json!(42)));
//! manager.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod manager;
pub mod payload;
pub mod policy;
pub mod queue;
pub mod registry;

pub(crate) mod worker;

// Re-export commonly used types
pub use config::ManagerConfig;
pub use domain::{
    Priority, TaskConfig, TaskFailure, TaskId, TaskOutcome, TaskRecord, TaskResult, TaskStatus,
};
pub use error::{TaskError, ValidationError};
pub use manager::{Target, TaskManager};
pub use payload::TaskFn;
pub use policy::{RateLimit, RateLimiter, RetryDecision, RetryPolicy};
pub use queue::PriorityTaskQueue;
pub use registry::{DependencyState, SystemStats, TaskRegistry};
