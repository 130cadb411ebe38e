//! The payload boundary
//!
//! A payload is an external collaborator: the scheduler only requires that
//! it be invocable with its submitted arguments and either return a value
//! or signal a failure. What it does (network call, file write,
//! computation) is entirely the caller's concern.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

/// A unit of work the scheduler can invoke.
///
/// `Err` is converted into a retryable execution failure by the worker; it
/// never propagates past the worker loop.
#[async_trait]
pub trait TaskFn: Send + Sync {
    async fn call(&self, args: Vec<Value>) -> Result<Value, String>;
}

/// Adapter turning a closure that returns a boxed future into a [`TaskFn`]
struct FnPayload<F>(F);

#[async_trait]
impl<F> TaskFn for FnPayload<F>
where
    F: Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync,
{
    async fn call(&self, args: Vec<Value>) -> Result<Value, String> {
        (self.0)(args).await
    }
}

/// Wrap a closure as a shareable payload.
///
/// ```
/// use taskpool::payload;
///
/// let double = payload::from_fn(|args| {
///     Box::pin(async move {
///         let n = args
///             .first()
///             .and_then(|v| v.as_i64())
///             .ok_or_else(|| "expected an integer argument".to_string())?;
///         Ok(serde_json::json!(n * 2))
///     })
/// });
/// # let _ = double;
/// ```
pub fn from_fn<F>(f: F) -> Arc<dyn TaskFn>
where
    F: Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync + 'static,
{
    Arc::new(FnPayload(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_closure_payload_success() {
        let payload = from_fn(|args| {
            Box::pin(async move {
                let n = args[0].as_i64().unwrap();
                Ok(json!(n + 1))
            })
        });

        let value = payload.call(vec![json!(41)]).await.unwrap();
        assert_eq!(value, json!(42));
    }

    #[tokio::test]
    async fn test_closure_payload_error() {
        let payload = from_fn(|_args| Box::pin(async { Err("no can do".to_string()) }));

        let err = payload.call(Vec::new()).await.unwrap_err();
        assert_eq!(err, "no can do");
    }

    #[tokio::test]
    async fn test_payload_reinvocable() {
        let payload = from_fn(|args| Box::pin(async move { Ok(json!(args.len())) }));

        assert_eq!(payload.call(vec![json!(1)]).await.unwrap(), json!(1));
        assert_eq!(
            payload.call(vec![json!(1), json!(2)]).await.unwrap(),
            json!(2)
        );
    }
}
