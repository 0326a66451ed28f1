//! Backoff for coordinator calls that are safe to repeat.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Exponential backoff policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Repeats after the first call
    pub max_retries: u32,
    /// Wait before the first repeat; doubled for each one after
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Name used in logs
    pub operation: &'static str,
}

impl RetryConfig {
    pub fn new(operation: &'static str) -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            operation,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Wait before repeat number `retry` (1-based).
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Call `op` until it succeeds, `retryable` rejects the error, or the
/// retries run out. The last error is returned.
pub async fn retry_async<T, E, Op, Fut, P>(config: &RetryConfig, retryable: P, op: Op) -> Result<T, E>
where
    Op: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut retry = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if retry >= config.max_retries || !retryable(&err) {
            return Err(err);
        }
        retry += 1;
        let wait = config.backoff(retry);
        debug!(
            operation = config.operation,
            retry,
            wait_ms = wait.as_millis() as u64,
            "Retrying after error: {}", err
        );
        tokio::time::sleep(wait).await;
    }
}

/// Counts consecutive failures of a periodic call so only the first few
/// are logged while the coordinator stays unreachable.
#[derive(Debug)]
pub struct FailureStreak {
    count: u32,
    loud: u32,
}

impl FailureStreak {
    pub fn new(loud: u32) -> Self {
        Self { count: 0, loud }
    }

    /// Returns whether this failure should be logged.
    pub fn fail(&mut self) -> bool {
        self.count += 1;
        if self.count == self.loud + 1 {
            warn!("{} consecutive failures, muting until the next success", self.loud);
        }
        self.count <= self.loud
    }

    pub fn reset(&mut self) {
        if self.count > self.loud {
            debug!("Recovered after {} consecutive failures", self.count);
        }
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig::new("test").with_base_delay(Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(100));
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(4), Duration::from_millis(800));
        assert_eq!(config.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn test_streak_mutes_then_resets() {
        let mut streak = FailureStreak::new(2);
        assert!(streak.fail());
        assert!(streak.fail());
        assert!(!streak.fail());
        assert_eq!(streak.count(), 3);

        streak.reset();
        assert_eq!(streak.count(), 0);
        assert!(streak.fail());
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_async(&fast(), |_: &String| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(format!("call {}", n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejected_error_is_not_repeated() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_async(&fast(), |e: &String| e != "not_owner", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("not_owner".to_string()) }
        })
        .await;

        assert_eq!(result, Err("not_owner".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stops_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = retry_async(&fast().with_max_retries(2), |_: &String| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("conflict".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
