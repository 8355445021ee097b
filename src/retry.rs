use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Bounded exponential backoff for storage-layer failures.
///
/// Attempt `n` (0-based) that fails waits `base_delay * 2^n`, capped at
/// `max_delay`, before attempt `n + 1`. At most `max_attempts` attempts run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(10), Duration::from_millis(200))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with an error `is_retryable` rejects,
    /// or the attempt budget is spent. The last error is returned.
    pub async fn run<F, Fut, T, E>(&self, what: &str, is_retryable: impl Fn(&E) -> bool, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if !is_retryable(&e) => return Err(e),
                Err(e) => {
                    if attempt + 1 >= self.max_attempts {
                        warn!("{what}: giving up after {} attempts: {e}", attempt + 1);
                        return Err(e);
                    }
                    let delay = self.delay_for(attempt);
                    warn!("{what}: attempt {} failed ({e}), retrying in {delay:?}", attempt + 1);
                    metrics::counter!(crate::observability::STORE_RETRIES_TOTAL, "op" => what.to_string())
                        .increment(1);
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
