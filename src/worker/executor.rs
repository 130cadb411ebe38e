//! Single-attempt execution with timeout enforcement

use serde_json::Value;

use crate::domain::TaskFailure;
use crate::registry::Attempt;

/// Invoke the payload once, under the task's deadline when one is set.
///
/// The guard fires at the deadline itself, not after the payload returns:
/// a payload sleeping `2T` against a `T` timeout is failed within bounded
/// overhead of `T`. The guard cannot forcibly kill a non-cooperative
/// payload: the orphaned future is dropped and any value it would have
/// produced is discarded, since the attempt is already finalized.
pub(crate) async fn run_attempt(attempt: &Attempt) -> Result<Value, TaskFailure> {
    let invocation = attempt.payload.call(attempt.args.clone());
    match attempt.config.timeout {
        Some(limit) => match tokio::time::timeout(limit, invocation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(TaskFailure::Execution(message)),
            Err(_) => Err(TaskFailure::Timeout { limit }),
        },
        None => invocation.await.map_err(TaskFailure::Execution),
    }
}
