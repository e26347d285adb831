//! Retry mechanism with exponential backoff and jitter
//!
//! Backend methods do not retry internally; call sites expecting transient
//! failures (throttling, flaky networks) wrap individual calls explicitly.

use std::time::Duration;

use crate::error::{Error, Result};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempt count before the last error is returned
    pub max_attempts: u32,
    /// Base for the exponential backoff, conventionally 2
    pub base: f64,
    /// Cap on any single sleep, in seconds
    pub max_backoff_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: 2.0,
            max_backoff_secs: 10.0,
        }
    }
}

/// Retry a fallible async operation with exponential backoff
///
/// Sleeps `min(random(0,1) * base^attempt, max_backoff)` seconds between
/// attempts. Stops on success, on a non-retryable error, or once the attempt
/// count is exceeded, returning the last result either way.
///
/// # Example
/// ```ignore
/// let result = retry_with_backoff(
///     &config,
///     || async { store.get_object(input.clone()).await },
///     is_retryable_error,
/// ).await;
/// ```
pub async fn retry_with_backoff<T, F, Fut, R>(
    config: &RetryConfig,
    mut operation: F,
    is_retryable: R,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    R: Fn(&Error) -> bool,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= config.max_attempts || !is_retryable(&e) {
                    return Err(e);
                }

                let backoff = calculate_backoff(config, attempt);
                tracing::debug!(
                    attempt = attempt,
                    backoff_ms = backoff.as_millis(),
                    error = %e,
                    "Retrying after transient error"
                );

                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Calculate backoff duration with jitter
fn calculate_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let secs = (unit_jitter() * config.base.powi(attempt as i32)).min(config.max_backoff_secs);
    Duration::from_secs_f64(secs.max(0.0))
}

/// Pseudo-random value in [0, 1) without an external RNG dependency
fn unit_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos() as f64;
    (nanos % 1_000_000.0) / 1_000_000.0
}

/// Check if an error is retryable (transient)
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Network(msg) => {
            let msg_lower = msg.to_lowercase();
            msg_lower.contains("timeout")
                || msg_lower.contains("connection reset")
                || msg_lower.contains("connection refused")
                || msg_lower.contains("503")
                || msg_lower.contains("service unavailable")
                || msg_lower.contains("too many requests")
                || msg_lower.contains("429")
                || msg_lower.contains("request rate")
                || msg_lower.contains("slow down")
        }
        Error::Io(e) => {
            matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            )
        }
        Error::NotFound(_)
        | Error::InvalidInput(_)
        | Error::InvalidRange(_)
        | Error::Config(_)
        | Error::Session(_)
        | Error::Cancelled => false,
        Error::General(msg) => {
            let msg_lower = msg.to_lowercase();
            msg_lower.contains("timeout") || msg_lower.contains("temporary")
        }
    }
}

/// Retry configuration builder for easy customization
#[derive(Debug, Clone)]
pub struct RetryBuilder {
    max_attempts: u32,
    base: f64,
    max_backoff_secs: f64,
}

impl RetryBuilder {
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            base: 2.0,
            max_backoff_secs: 10.0,
        }
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn base(mut self, base: f64) -> Self {
        self.base = base;
        self
    }

    pub fn max_backoff_secs(mut self, secs: f64) -> Self {
        self.max_backoff_secs = secs;
        self
    }

    pub fn build(self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base: self.base,
            max_backoff_secs: self.max_backoff_secs,
        }
    }
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_bounded_by_exponent() {
        let config = RetryConfig {
            max_attempts: 5,
            base: 2.0,
            max_backoff_secs: 60.0,
        };

        // jitter is in [0, 1), so the sleep never exceeds base^attempt
        for attempt in 1..5 {
            let b = calculate_backoff(&config, attempt);
            assert!(b.as_secs_f64() < 2.0f64.powi(attempt as i32));
        }
    }

    #[test]
    fn test_backoff_cap() {
        let config = RetryConfig {
            max_attempts: 20,
            base: 2.0,
            max_backoff_secs: 5.0,
        };

        for attempt in 1..20 {
            let b = calculate_backoff(&config, attempt);
            assert!(b.as_secs_f64() <= 5.0);
        }
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error(&Error::Network(
            "connection timeout".to_string()
        )));
        assert!(is_retryable_error(&Error::Network(
            "503 Service Unavailable".to_string()
        )));
        assert!(is_retryable_error(&Error::Network(
            "429 Too Many Requests".to_string()
        )));

        assert!(!is_retryable_error(&Error::NotFound(
            "object not found".to_string()
        )));
        assert!(!is_retryable_error(&Error::InvalidRange(
            "bad range".to_string()
        )));
        assert!(!is_retryable_error(&Error::Cancelled));
    }

    #[test]
    fn test_retry_builder() {
        let config = RetryBuilder::new()
            .max_attempts(5)
            .base(3.0)
            .max_backoff_secs(20.0)
            .build();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base, 3.0);
        assert_eq!(config.max_backoff_secs, 20.0);
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let config = RetryConfig::default();
        let mut calls = 0;

        let result = retry_with_backoff(
            &config,
            || {
                calls += 1;
                async { Ok::<_, Error>(42) }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failure() {
        let config = RetryConfig {
            max_attempts: 3,
            base: 1.0, // keeps test sleeps under a second
            max_backoff_secs: 0.01,
        };
        let call_count = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result = retry_with_backoff(
            &config,
            || {
                let cc = call_count_clone.clone();
                async move {
                    let count = cc.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    if count < 2 {
                        Err(Error::Network("timeout".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            },
            is_retryable_error,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let config = RetryConfig {
            max_attempts: 2,
            base: 1.0,
            max_backoff_secs: 0.01,
        };
        let mut calls = 0;

        let result: Result<()> = retry_with_backoff(
            &config,
            || {
                calls += 1;
                async { Err(Error::Network("always fails".to_string())) }
            },
            |_| true,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_retry_non_retryable() {
        let config = RetryConfig {
            max_attempts: 3,
            base: 1.0,
            max_backoff_secs: 0.01,
        };
        let mut calls = 0;

        let result: Result<()> = retry_with_backoff(
            &config,
            || {
                calls += 1;
                async { Err(Error::NotFound("not found".to_string())) }
            },
            is_retryable_error,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls, 1); // Should not retry
    }
}
