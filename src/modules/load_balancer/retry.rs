//! Bounded retry with linear backoff.

use super::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Linear backoff retry policy.
///
/// Attempt `n` (1-based) that fails is followed by a pause of
/// `min(delay * n, max_delay)` before attempt `n + 1`. No pause follows the
/// final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` is clamped to at least one.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            max_delay,
        }
    }

    /// Maximum number of attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff after the given failed attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt).min(self.max_delay)
    }

    /// Run `op` until it succeeds or the attempts are exhausted.
    ///
    /// Returns the last error when every attempt fails.
    pub async fn run<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            debug!(attempt, max_attempts = self.max_attempts, "Retry attempt");
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    debug!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "Waiting before next attempt");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(config.max_attempts, config.delay, config.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_is_linear_and_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(250));

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(250));
        assert_eq!(policy.delay_for(10), Duration::from_millis(250));
    }

    #[test]
    fn test_max_attempts_clamped() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(15));
        let calls = Arc::new(AtomicU32::new(0));

        let started = tokio::time::Instant::now();
        let counter = Arc::clone(&calls);
        let result: Result<(), String> = policy
            .run(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("down".to_string())
                }
            })
            .await;

        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 10ms after the first failure, 15ms (capped) after the second, none after the last.
        assert_eq!(started.elapsed(), Duration::from_millis(25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_returns_first_success() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10), Duration::from_millis(100));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = Arc::clone(&calls);
        let result: Result<u32, String> = policy
            .run(|| {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n == 2 {
                        Ok(n)
                    } else {
                        Err(format!("attempt {n} failed"))
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
