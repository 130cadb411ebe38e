//! Worker pool: N concurrent execution units pulling from one queue
//!
//! Every suspension a worker makes (empty-queue wait, rate-limiter wait,
//! payload await, backoff sleep) suspends only that worker. The rest of
//! the pool keeps servicing the queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{TaskId, TaskOutcome};
use crate::policy::{RateLimiter, RetryDecision, RetryPolicy};
use crate::queue::{PriorityTaskQueue, QueueEntry};
use crate::registry::{Attempt, DependencyState, TaskRegistry};

use super::executor;

/// Shared collaborators handed to every worker
pub(crate) struct WorkerContext {
    pub queue: Arc<PriorityTaskQueue>,
    pub registry: Arc<TaskRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub retry: RetryPolicy,
    /// Re-queue delay while a task's dependencies are still live
    pub dependency_poll: Duration,
}

/// Spawn `count` workers against the shared context
pub(crate) fn spawn_workers(ctx: Arc<WorkerContext>, count: usize) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker_id| {
            let ctx = ctx.clone();
            tokio::spawn(worker_loop(ctx, worker_id))
        })
        .collect()
}

/// One worker: dequeue, gate, execute, settle; exit when the queue drains
async fn worker_loop(ctx: Arc<WorkerContext>, worker_id: usize) {
    debug!(worker_id, "worker started");
    while let Some(entry) = ctx.queue.dequeue().await {
        process_entry(&ctx, entry).await;
    }
    debug!(worker_id, "worker stopped");
}

async fn process_entry(ctx: &WorkerContext, entry: QueueEntry) {
    let task_id = entry.id;

    // Claim the record; a stale entry (cancelled while queued) is skipped
    // without touching the completion accounting
    let Some(attempt) = ctx.registry.begin_attempt(&task_id).await else {
        debug!(%task_id, "stale queue entry, skipping");
        return;
    };

    // Dependency gate: deps still live defer the task, deps that can never
    // complete fail it without charging retry budget
    if !attempt.config.dependencies.is_empty() {
        match ctx.registry.dependency_state(&attempt.config.dependencies).await {
            DependencyState::Satisfied => {}
            DependencyState::Waiting => {
                ctx.registry.defer(&task_id).await;
                tokio::time::sleep(ctx.dependency_poll).await;
                ctx.queue.requeue(task_id, attempt.config.priority).await;
                return;
            }
            DependencyState::Blocked(dep) => {
                warn!(%task_id, %dep, "dependency unsatisfiable, failing task");
                ctx.registry.fail_dependency(&task_id, &dep).await;
                ctx.queue.task_done().await;
                return;
            }
        }
    }

    // Throttle gate for named functions; closures have no name and pass
    if let Some(name) = &attempt.fn_name {
        ctx.limiter.acquire(name).await;
    }

    let t0 = Instant::now();
    let outcome = executor::run_attempt(&attempt).await;
    let execution_time = t0.elapsed();

    match outcome {
        Ok(value) => {
            debug!(%task_id, ?execution_time, "task completed");
            ctx.registry
                .finalize(&task_id, TaskOutcome::Completed(value), execution_time)
                .await;
            ctx.queue.task_done().await;
        }
        Err(failure) => match ctx.retry.decide(attempt.retry_count, &attempt.config, &failure) {
            RetryDecision::Retry { delay } => {
                warn!(
                    %task_id,
                    ?delay,
                    retry = attempt.retry_count + 1,
                    error = %failure,
                    "attempt failed, scheduling retry"
                );
                retry_after_backoff(ctx, task_id, delay, attempt).await;
            }
            RetryDecision::Finalize => {
                warn!(%task_id, error = %failure, "task failed terminally");
                ctx.registry
                    .finalize(&task_id, TaskOutcome::Failed(failure), execution_time)
                    .await;
                ctx.queue.task_done().await;
            }
        },
    }
}

/// Sleep out the backoff (this worker only) and put the task back in line.
///
/// The sleep is cut short when the pool starts draining so shutdown never
/// waits on a long backoff; the task re-enters the queue either way and is
/// resumed by a restarted pool.
async fn retry_after_backoff(ctx: &WorkerContext, task_id: TaskId, delay: Duration, attempt: Attempt) {
    ctx.registry.schedule_retry(&task_id).await;

    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = ctx.queue.stopped() => {
            debug!(%task_id, "backoff interrupted by shutdown, re-queueing early");
        }
    }

    ctx.registry.requeue(&task_id).await;
    ctx.queue.requeue(task_id, attempt.config.priority).await;
    // No task_done here: completion is counted per task id, and this id is
    // still outstanding
}

/// Await worker handles during shutdown
pub(crate) async fn join_workers(handles: Vec<JoinHandle<()>>) {
    let count = handles.len();
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "worker task panicked");
        }
    }
    info!(workers = count, "worker pool drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, TaskConfig, TaskRecord, TaskStatus};
    use crate::payload;
    use serde_json::{Value, json};

    fn context() -> Arc<WorkerContext> {
        Arc::new(WorkerContext {
            queue: Arc::new(PriorityTaskQueue::new(None)),
            registry: Arc::new(TaskRegistry::new()),
            limiter: Arc::new(RateLimiter::new()),
            retry: RetryPolicy::default(),
            dependency_poll: Duration::from_millis(5),
        })
    }

    async fn submit(ctx: &WorkerContext, id: &str, payload: Arc<dyn crate::payload::TaskFn>, config: TaskConfig) {
        let priority = config.priority;
        let record = TaskRecord::new(TaskId::from(id), payload, vec![], config);
        ctx.registry.insert(record).await.unwrap();
        ctx.registry.set_status(&TaskId::from(id), TaskStatus::Queued).await;
        ctx.queue.try_enqueue(TaskId::from(id), priority).await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_runs_task_to_completion() {
        let ctx = context();
        submit(
            &ctx,
            "t-1",
            payload::from_fn(|_| Box::pin(async { Ok(json!("ok")) })),
            TaskConfig::default(),
        )
        .await;

        let workers = spawn_workers(ctx.clone(), 1);
        ctx.queue.join().await;

        let result = ctx.registry.result(&TaskId::from("t-1")).await.unwrap();
        assert_eq!(result.value(), Some(&json!("ok")));

        ctx.queue.stop().await;
        join_workers(workers).await;
    }

    #[tokio::test]
    async fn test_worker_retries_until_budget_spent() {
        let ctx = context();
        submit(
            &ctx,
            "flaky",
            payload::from_fn(|_| Box::pin(async { Err("always fails".to_string()) })),
            TaskConfig::default()
                .with_max_retries(2)
                .with_retry_delay(Duration::from_millis(5))
                .with_backoff_factor(1.0),
        )
        .await;

        let workers = spawn_workers(ctx.clone(), 1);
        ctx.queue.join().await;

        let result = ctx.registry.result(&TaskId::from("flaky")).await.unwrap();
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.retry_count, 2);

        ctx.queue.stop().await;
        join_workers(workers).await;
    }

    #[tokio::test]
    async fn test_dependency_failure_propagates() {
        let ctx = context();
        submit(
            &ctx,
            "upstream",
            payload::from_fn(|_| Box::pin(async { Err("broken".to_string()) })),
            TaskConfig::default().with_max_retries(0),
        )
        .await;
        submit(
            &ctx,
            "downstream",
            payload::from_fn(|_| Box::pin(async { Ok(Value::Null) })),
            TaskConfig::default().with_dependency("upstream"),
        )
        .await;

        let workers = spawn_workers(ctx.clone(), 2);
        ctx.queue.join().await;

        let result = ctx.registry.result(&TaskId::from("downstream")).await.unwrap();
        assert_eq!(result.status, TaskStatus::Failed);
        assert!(matches!(
            result.error(),
            Some(crate::domain::TaskFailure::Dependency(_))
        ));

        ctx.queue.stop().await;
        join_workers(workers).await;
    }

    #[tokio::test]
    async fn test_dependency_defers_until_complete() {
        let ctx = context();
        submit(
            &ctx,
            "slow-dep",
            payload::from_fn(|_| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    Ok(json!(1))
                })
            }),
            TaskConfig::default(),
        )
        .await;
        submit(
            &ctx,
            "dependent",
            payload::from_fn(|_| Box::pin(async { Ok(json!(2)) })),
            TaskConfig::default().with_dependency("slow-dep"),
        )
        .await;

        let workers = spawn_workers(ctx.clone(), 2);
        ctx.queue.join().await;

        let dep = ctx.registry.result(&TaskId::from("slow-dep")).await.unwrap();
        let dependent = ctx.registry.result(&TaskId::from("dependent")).await.unwrap();
        assert!(dep.is_success());
        assert!(dependent.is_success());
        assert!(dependent.completed_at >= dep.completed_at);

        ctx.queue.stop().await;
        join_workers(workers).await;
    }
}
