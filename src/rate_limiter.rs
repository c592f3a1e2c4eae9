//! Token-bucket + concurrency-semaphore rate limiter with a generic
//! retry/backoff executor. Generalized from the teacher's
//! `throttled_get`/exponential-backoff HTTP fetcher into a provider-agnostic
//! `execute` that any vendor or LLM call can be wrapped in.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Semaphore};
use tracing::warn;

use crate::config::RateLimiterConfig;
use crate::error::DomainError;

struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_second: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_per_second: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_per_second,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;
    }

    /// Returns `Some(wait)` if a token is not currently available and the
    /// caller should sleep `wait` before retrying; consumes a token and
    /// returns `None` when one is available.
    fn try_consume(&mut self) -> Option<Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - self.tokens;
            Some(Duration::from_secs_f64(deficit / self.refill_per_second))
        }
    }
}

/// Combines a counting semaphore (concurrency gate) with a token bucket
/// (request-rate gate) and a generic retry executor.
pub struct RateLimiter {
    semaphore: Semaphore,
    bucket: Mutex<TokenBucket>,
    max_retries: u32,
    backoff_delays: Vec<Duration>,
}

impl RateLimiter {
    pub fn new(config: &RateLimiterConfig) -> Self {
        Self {
            semaphore: Semaphore::new(config.max_concurrent),
            bucket: Mutex::new(TokenBucket::new(
                config.max_concurrent as f64,
                config.requests_per_second,
            )),
            max_retries: config.max_retries,
            backoff_delays: config.backoff_delays.clone(),
        }
    }

    /// Acquires a concurrency permit and a rate-limit token, suspending the
    /// caller on either as needed. Returns the permit, which must be held
    /// for the duration of the call it gates.
    async fn acquire(&self) -> tokio::sync::SemaphorePermit<'_> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                bucket.try_consume()
            };
            match wait {
                None => break,
                Some(duration) => tokio::time::sleep(duration).await,
            }
        }
        permit
    }

    fn backoff_for(&self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            if hint > Duration::ZERO {
                return hint;
            }
        }
        self.backoff_delays
            .get(attempt)
            .copied()
            .unwrap_or_else(|| *self.backoff_delays.last().unwrap())
    }

    /// Calls `factory()` to obtain a fresh future on every attempt (never
    /// re-polls a completed one), retrying up to `max_retries` times on
    /// `DomainError::RateLimitExceeded` only. Every other error — including
    /// `TickerNotFound` and `InsufficientData` — propagates immediately.
    pub async fn execute<F, Fut, T>(
        &self,
        ticker: &str,
        source: &str,
        mut factory: F,
    ) -> Result<T, DomainError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let mut attempt = 0usize;
        loop {
            let _permit = self.acquire().await;
            match factory().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries as usize => {
                    let delay = self.backoff_for(attempt, err.retry_after());
                    warn!(
                        ticker,
                        source,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, retrying after backoff"
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
