//! Retry with exponential backoff and jitter.
//!
//! One policy object is shared by the manifest and layer fetch paths so the
//! backoff contract stays testable in isolation instead of being duplicated
//! as inline loops.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::warn;

use crate::constants::{FETCH_BASE_DELAY, FETCH_JITTER_MAX, FETCH_MAX_ATTEMPTS};
use crate::error::{Error, Result};

/// Bounded retry policy for registry fetches.
///
/// Retries only errors reported transient by [`Error::is_transient`]:
/// network failures and 5xx responses. A 4xx answer or any local failure
/// propagates immediately. When the budget is exhausted the last error is
/// returned unchanged.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base delay, doubled per attempt.
    pub base_delay: Duration,
    /// Upper bound of the uniform jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: FETCH_MAX_ATTEMPTS,
            base_delay: FETCH_BASE_DELAY,
            jitter: FETCH_JITTER_MAX,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before the retry following `attempt` (0-based), jitter
    /// excluded.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter.is_zero() {
            Duration::ZERO
        } else {
            rand::thread_rng().gen_range(Duration::ZERO..self.jitter)
        };
        self.backoff_delay(attempt) + jitter
    }

    /// Runs `op` until it succeeds, fails terminally, or the attempt budget
    /// is spent.
    pub async fn run<F, Fut, T>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if !err.is_transient() || attempt >= self.max_attempts {
                        return Err(err);
                    }

                    let delay = self.jittered_delay(attempt - 1);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient error"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
