//! Per-function rate limiting
//!
//! One shared, lock-protected token bucket per registered function name,
//! installed at registration and consulted by every worker before
//! dispatch. A worker waiting for a token suspends only itself; the rest
//! of the pool keeps servicing the queue.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

/// Invocation cap for one registered function, across all workers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Sustained invocations per second
    pub rate_per_sec: f64,
    /// Invocations that may proceed without waiting after an idle period
    pub burst: u32,
}

impl RateLimit {
    pub fn per_second(rate_per_sec: f64) -> Self {
        Self {
            rate_per_sec,
            burst: 1,
        }
    }

    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst.max(1);
        self
    }
}

/// Token bucket state for one function name
#[derive(Debug)]
struct Bucket {
    limit: RateLimit,
    tokens: f64,
    refreshed: Instant,
}

impl Bucket {
    fn new(limit: RateLimit, now: Instant) -> Self {
        Self {
            limit,
            tokens: limit.burst as f64,
            refreshed: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.refreshed);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * self.limit.rate_per_sec).min(self.limit.burst as f64);
        self.refreshed = now;
    }

    /// Take one token, or report how long until one accrues
    fn try_take(&mut self, now: Instant) -> Option<Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return None;
        }
        let deficit = 1.0 - self.tokens;
        Some(Duration::from_secs_f64(deficit / self.limit.rate_per_sec))
    }
}

/// Shared throttle keyed by registered function name.
///
/// Functions without an installed limit (and direct closure payloads,
/// which have no name) pass through untouched.
#[derive(Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the bucket for a function name
    pub async fn install(&self, name: impl Into<String>, limit: RateLimit) {
        let name = name.into();
        debug!(%name, ?limit, "RateLimiter::install");
        self.buckets
            .lock()
            .await
            .insert(name, Bucket::new(limit, Instant::now()));
    }

    /// Drop the bucket for a function name, if any
    pub async fn remove(&self, name: &str) {
        self.buckets.lock().await.remove(name);
    }

    /// Block until the named function may be invoked.
    ///
    /// The wait happens outside the lock so other workers (and other
    /// function names) are never held up by one throttled worker.
    pub async fn acquire(&self, name: &str) {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                match buckets.get_mut(name) {
                    None => return,
                    Some(bucket) => bucket.try_take(Instant::now()),
                }
            };
            match wait {
                None => return,
                Some(delay) => {
                    debug!(%name, ?delay, "RateLimiter::acquire: throttled");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
