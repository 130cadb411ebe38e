//! TaskManager: the top-level façade
//!
//! Owns the queue, registry, limiter, worker pool, and the
//! registered-function table. All state hangs off the instance, so
//! independent managers in one process share nothing.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ManagerConfig;
use crate::domain::{TaskConfig, TaskId, TaskRecord, TaskResult, TaskStatus};
use crate::error::{TaskError, ValidationError};
use crate::payload::TaskFn;
use crate::policy::{RateLimit, RateLimiter, RetryPolicy};
use crate::queue::PriorityTaskQueue;
use crate::registry::{SystemStats, TaskRegistry};
use crate::worker::{WorkerContext, join_workers, spawn_workers};

/// What a submission points at: a registered name or a direct payload
#[derive(Clone)]
pub enum Target {
    Name(String),
    Payload(Arc<dyn TaskFn>),
}

impl Target {
    /// Reference a function registered on the manager
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Submit a one-off closure directly
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> futures::future::BoxFuture<'static, Result<Value, String>>
            + Send
            + Sync
            + 'static,
    {
        Self::Payload(crate::payload::from_fn(f))
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<Arc<dyn TaskFn>> for Target {
    fn from(payload: Arc<dyn TaskFn>) -> Self {
        Self::Payload(payload)
    }
}

/// In-process asynchronous priority task scheduler.
///
/// Wrap in an `Arc` to share across tasks; every method takes `&self`.
pub struct TaskManager {
    config: ManagerConfig,
    queue: Arc<PriorityTaskQueue>,
    registry: Arc<TaskRegistry>,
    limiter: Arc<RateLimiter>,
    functions: RwLock<HashMap<String, Arc<dyn TaskFn>>>,
    /// Worker handles; non-empty iff the pool is running
    pool: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            queue: Arc::new(PriorityTaskQueue::new(config.queue_capacity)),
            registry: Arc::new(TaskRegistry::new()),
            limiter: Arc::new(RateLimiter::new()),
            functions: RwLock::new(HashMap::new()),
            pool: Mutex::new(Vec::new()),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ManagerConfig::default())
    }

    /// Bind a symbolic name to a payload; re-registering replaces the
    /// binding (and clears any previous rate limit)
    pub async fn register_task_function(&self, name: impl Into<String>, payload: Arc<dyn TaskFn>) {
        let name = name.into();
        debug!(%name, "TaskManager::register_task_function");
        self.limiter.remove(&name).await;
        self.functions.write().await.insert(name, payload);
    }

    /// Bind a name and cap its invocation frequency across all workers
    pub async fn register_task_function_with_limit(
        &self,
        name: impl Into<String>,
        payload: Arc<dyn TaskFn>,
        limit: RateLimit,
    ) {
        let name = name.into();
        debug!(%name, ?limit, "TaskManager::register_task_function_with_limit");
        self.limiter.install(name.clone(), limit).await;
        self.functions.write().await.insert(name, payload);
    }

    /// Submit a task with a generated id
    pub async fn submit(
        &self,
        target: impl Into<Target>,
        args: Vec<Value>,
        config: Option<TaskConfig>,
    ) -> Result<TaskId, TaskError> {
        self.submit_with_id(None, target, args, config).await
    }

    /// Submit a task, optionally under a caller-supplied id.
    ///
    /// Validates policy and resolves the target synchronously, enqueues,
    /// and returns the id immediately; nothing here waits on execution.
    pub async fn submit_with_id(
        &self,
        id: Option<TaskId>,
        target: impl Into<Target>,
        args: Vec<Value>,
        config: Option<TaskConfig>,
    ) -> Result<TaskId, TaskError> {
        let config = config
            .unwrap_or_else(|| TaskConfig::default().with_priority(self.config.default_priority));
        config.validate()?;

        let (payload, fn_name) = match target.into() {
            Target::Name(name) => {
                let payload = self
                    .functions
                    .read()
                    .await
                    .get(&name)
                    .cloned()
                    .ok_or(ValidationError::UnknownFunction { name: name.clone() })?;
                (payload, Some(name))
            }
            Target::Payload(payload) => (payload, None),
        };

        let id = match id {
            Some(id) if id.is_empty() => return Err(ValidationError::EmptyId.into()),
            Some(id) => id,
            None => TaskId::generate(),
        };

        // Dependencies must reference tasks this manager already knows;
        // since a task cannot name one submitted after it, cycles are
        // structurally impossible
        for dep in &config.dependencies {
            if !self.registry.contains(dep).await {
                return Err(ValidationError::UnknownDependency { id: dep.to_string() }.into());
            }
        }

        let priority = config.priority;
        let record = match &fn_name {
            Some(name) => TaskRecord::new(id.clone(), payload, args, config).with_fn_name(name),
            None => TaskRecord::new(id.clone(), payload, args, config),
        };

        self.registry.insert(record).await?;
        self.registry.set_status(&id, TaskStatus::Queued).await;
        if let Err(e) = self.queue.try_enqueue(id.clone(), priority).await {
            // Roll the record back out so the id is not half-admitted
            self.registry.remove(&id).await;
            return Err(e);
        }

        debug!(%id, %priority, "task submitted");
        Ok(id)
    }

    /// Spawn the worker pool; idempotent
    pub async fn start(&self) {
        let mut pool = self.pool.lock().await;
        if !pool.is_empty() {
            debug!("TaskManager::start: pool already running");
            return;
        }
        self.queue.resume().await;

        let ctx = Arc::new(WorkerContext {
            queue: self.queue.clone(),
            registry: self.registry.clone(),
            limiter: self.limiter.clone(),
            retry: RetryPolicy::new(self.config.backoff_cap()),
            dependency_poll: self.config.dependency_poll(),
        });
        *pool = spawn_workers(ctx, self.config.workers);
        info!(workers = self.config.workers, "worker pool started");
    }

    /// Stop the pool after in-flight attempts finish; idempotent.
    ///
    /// Queued tasks are not dropped: they stay queryable as Queued and a
    /// later `start` resumes them.
    pub async fn stop(&self) {
        let mut pool = self.pool.lock().await;
        if pool.is_empty() {
            debug!("TaskManager::stop: pool not running");
            return;
        }
        self.queue.stop().await;
        join_workers(pool.drain(..).collect()).await;
        info!("worker pool stopped");
    }

    /// Block until every submitted task has reached a terminal state.
    ///
    /// Call while the pool is running; with the pool stopped, queued work
    /// cannot drain and this will wait indefinitely.
    pub async fn wait_for_completion(&self) {
        self.queue.join().await;
    }

    /// Cancel a task no worker has claimed yet; true on success
    pub async fn cancel(&self, id: &TaskId) -> bool {
        if self.registry.cancel(id).await {
            info!(%id, "task cancelled");
            // The id reached a terminal state; its stale queue entry is
            // skipped by whichever worker dequeues it
            self.queue.task_done().await;
            true
        } else {
            false
        }
    }

    pub async fn get_task_status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.registry.status(id).await
    }

    pub async fn get_task_result(&self, id: &TaskId) -> Option<TaskResult> {
        self.registry.result(id).await
    }

    pub async fn get_system_stats(&self) -> SystemStats {
        let mut stats = self.registry.stats().await;
        stats.queue_depth = self.queue.len().await;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> Arc<dyn TaskFn> {
        crate::payload::from_fn(|args| {
            Box::pin(async move { Ok(args.into_iter().next().unwrap_or(Value::Null)) })
        })
    }

    #[tokio::test]
    async fn test_submit_unknown_function_rejected() {
        let manager = TaskManager::with_defaults();
        let err = manager
            .submit("no-such-fn", vec![], None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TaskError::Validation(ValidationError::UnknownFunction {
                name: "no-such-fn".into()
            })
        );
    }

    #[tokio::test]
    async fn test_submit_duplicate_id_rejected() {
        let manager = TaskManager::with_defaults();
        manager.register_task_function("echo", echo()).await;

        let id = Some(TaskId::from("same"));
        manager
            .submit_with_id(id.clone(), "echo", vec![], None)
            .await
            .unwrap();
        let err = manager
            .submit_with_id(id, "echo", vec![], None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TaskError::Validation(ValidationError::DuplicateId { id: "same".into() })
        );
    }

    #[tokio::test]
    async fn test_submit_unknown_dependency_rejected() {
        let manager = TaskManager::with_defaults();
        manager.register_task_function("echo", echo()).await;

        let config = TaskConfig::default().with_dependency("never-submitted");
        let err = manager
            .submit("echo", vec![], Some(config))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TaskError::Validation(ValidationError::UnknownDependency { .. })
        ));
    }

    #[tokio::test]
    async fn test_submit_invalid_config_rejected_before_enqueue() {
        let manager = TaskManager::with_defaults();
        let config = TaskConfig::default().with_backoff_factor(0.0);
        let err = manager
            .submit(Target::from_fn(|_| Box::pin(async { Ok(Value::Null) })), vec![], Some(config))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
        assert_eq!(manager.get_system_stats().await.queue_depth, 0);
    }

    #[tokio::test]
    async fn test_queue_full_rolls_back_submission() {
        let manager = TaskManager::new(ManagerConfig {
            queue_capacity: Some(1),
            ..Default::default()
        });
        manager.register_task_function("echo", echo()).await;

        manager.submit("echo", vec![json!(1)], None).await.unwrap();
        let err = manager.submit("echo", vec![json!(2)], None).await.unwrap_err();
        assert_eq!(err, TaskError::QueueFull { capacity: 1 });

        // The rejected task left no trace
        let stats = manager.get_system_stats().await;
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.queue_depth, 1);
    }

    #[tokio::test]
    async fn test_submitted_task_is_queued_before_start() {
        let manager = TaskManager::with_defaults();
        manager.register_task_function("echo", echo()).await;

        let id = manager.submit("echo", vec![json!(5)], None).await.unwrap();
        assert_eq!(manager.get_task_status(&id).await, Some(TaskStatus::Queued));
        assert!(manager.get_task_result(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_status_for_unknown_id_is_none() {
        let manager = TaskManager::with_defaults();
        assert_eq!(manager.get_task_status(&TaskId::from("ghost")).await, None);
        assert!(manager.get_task_result(&TaskId::from("ghost")).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let manager = TaskManager::with_defaults();
        manager.register_task_function("echo", echo()).await;

        let id = manager.submit("echo", vec![], None).await.unwrap();
        assert!(manager.cancel(&id).await);
        assert!(!manager.cancel(&id).await);
        assert_eq!(
            manager.get_task_status(&id).await,
            Some(TaskStatus::Cancelled)
        );

        // wait_for_completion must not hang on the cancelled task
        manager.wait_for_completion().await;
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let manager = TaskManager::with_defaults();
        manager.start().await;
        manager.start().await;
        manager.stop().await;
        manager.stop().await;
    }
}
