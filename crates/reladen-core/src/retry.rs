//! Retry with capped exponential backoff and jitter

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// How many times to retry and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct RetryOptions {
    /// Retries after the first attempt
    pub retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the random extra delay per wait
    pub jitter_ms: u64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            retries: 2,
            base_delay_ms: 250,
            max_delay_ms: 1_500,
            jitter_ms: 100,
        }
    }
}

impl RetryOptions {
    /// Delay before retry number `attempt` (0-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        self.backoff(attempt) + Duration::from_millis(jitter)
    }
}

/// Run `op` until it succeeds, `should_retry` rejects the error, or the
/// retries are exhausted. The last error is returned.
pub async fn with_retry<T, E, F, Fut, P>(
    mut op: F,
    options: RetryOptions,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < options.retries && should_retry(&error) => {
                let delay = options.jittered(attempt);
                tracing::debug!(
                    "Attempt {} failed: {}; retrying in {:?}",
                    attempt + 1,
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryOptions {
        RetryOptions {
            retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            jitter_ms: 0,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let options = RetryOptions::default();
        assert_eq!(options.backoff(0), Duration::from_millis(250));
        assert_eq!(options.backoff(1), Duration::from_millis(500));
        assert_eq!(options.backoff(2), Duration::from_millis(1_000));
        assert_eq!(options.backoff(3), Duration::from_millis(1_500));
        assert_eq!(options.backoff(80), Duration::from_millis(1_500));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<u32, String> = with_retry(
            || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("flaky".to_string())
                    } else {
                        Ok(n)
                    }
                }
            },
            fast(),
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_gives_up_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), String> = with_retry(
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("down".to_string()) }
            },
            fast(),
            |_| true,
        )
        .await;

        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_non_retryable_error_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), String> = with_retry(
            || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("unauthorized".to_string()) }
            },
            fast(),
            |error| error != "unauthorized",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
