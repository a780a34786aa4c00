//! Retry utilities with exponential backoff for calls to the speech backend.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff schedule. Defaults: 3 attempts, 500 ms doubling up to 10 s.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Includes the first attempt.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Default::default()
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let max_ms = self.max_delay.as_millis() as f64;
        Duration::from_millis(delay_ms.min(max_ms) as u64)
    }
}

/// Runs `f` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. The last error is returned.
pub async fn retry_with_backoff<F, T, E, Fut>(
    config: &RetryConfig,
    mut f: F,
    is_retryable: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(attempt, "succeeded after retrying");
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= max_attempts || !is_retryable(&e) {
                    return Err(e);
                }
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure; backing off"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Request timeout, rate limiting and server errors.
pub fn is_http_retryable(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_schedule_doubles_from_half_a_second() {
        let config = RetryConfig::default();
        let delays: Vec<_> = (1..=4).map(|a| config.delay_for_attempt(a)).collect();
        assert_eq!(
            delays,
            [500, 1_000, 2_000, 4_000].map(Duration::from_millis).to_vec()
        );
    }

    #[test]
    fn delay_is_capped() {
        let config = RetryConfig {
            backoff_multiplier: 10.0,
            max_delay: Duration::from_secs(1),
            ..RetryConfig::new(10, Duration::from_millis(100))
        };
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn transient_statuses_are_retryable() {
        for status in [408, 429, 500, 502, 503, 599] {
            assert!(is_http_retryable(status), "{status}");
        }
        for status in [200, 400, 401, 403, 404, 422] {
            assert!(!is_http_retryable(status), "{status}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, u16> = retry_with_backoff(
            &RetryConfig::default(),
            || async {
                match calls.fetch_add(1, Ordering::Relaxed) {
                    0 => Err(503),
                    n => Ok(n),
                }
            },
            |status| is_http_retryable(*status),
        )
        .await;
        assert_eq!(result, Ok(1));
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), u16> = retry_with_backoff(
            &RetryConfig::default(),
            || async {
                calls.fetch_add(1, Ordering::Relaxed);
                Err(401)
            },
            |status| is_http_retryable(*status),
        )
        .await;
        assert_eq!(result, Err(401));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), u16> = retry_with_backoff(
            &RetryConfig::new(3, Duration::from_millis(10)),
            || async {
                calls.fetch_add(1, Ordering::Relaxed);
                Err(500)
            },
            |status| is_http_retryable(*status),
        )
        .await;
        assert_eq!(result, Err(500));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }
}
