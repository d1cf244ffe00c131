//! Retry with backoff for external calls.
//!
//! [`call_with_retry`] runs one operation with a per-attempt timeout and retries transient
//! failures according to a [`RetryPolicy`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ExternalServiceError;

/// How many times and with what delay to retry a failed call.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryPolicy {
    /// No retry - fail immediately on error.
    None,
    /// Exponential backoff retry - retry with exponentially increasing delays.
    Exponential {
        /// Maximum number of retries after the first attempt.
        max_attempts: usize,
        /// Delay before the first retry.
        initial_interval: Duration,
        /// Cap on any single delay.
        max_interval: Duration,
        /// Multiplier for exponential backoff (e.g., 2.0 doubles each time).
        multiplier: f64,
    },
}

impl RetryPolicy {
    pub fn none() -> Self {
        RetryPolicy::None
    }

    pub fn exponential(
        max_attempts: usize,
        initial_interval: Duration,
        max_interval: Duration,
        multiplier: f64,
    ) -> Self {
        RetryPolicy::Exponential {
            max_attempts,
            initial_interval,
            max_interval,
            multiplier,
        }
    }

    /// Returns `true` if the attempt number is less than the maximum attempts.
    pub fn should_retry(&self, attempt: usize) -> bool {
        match self {
            RetryPolicy::None => false,
            RetryPolicy::Exponential { max_attempts, .. } => attempt < *max_attempts,
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: usize) -> Duration {
        match self {
            RetryPolicy::None => Duration::ZERO,
            RetryPolicy::Exponential {
                initial_interval,
                max_interval,
                multiplier,
                ..
            } => {
                let delay_secs = initial_interval.as_secs_f64() * multiplier.powi(attempt as i32);
                Duration::from_secs_f64(delay_secs).min(*max_interval)
            }
        }
    }

    pub fn max_attempts(&self) -> usize {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::Exponential { max_attempts, .. } => *max_attempts,
        }
    }
}

impl Default for RetryPolicy {
    /// 3 retries, 500 ms initial delay, doubling, capped at 8 s.
    fn default() -> Self {
        RetryPolicy::exponential(3, Duration::from_millis(500), Duration::from_secs(8), 2.0)
    }
}

/// Errors that [`call_with_retry`] knows how to classify.
pub trait RetryableError: Display {
    /// True when another attempt may succeed.
    fn is_transient(&self) -> bool;

    /// The error reported when one attempt exceeds its timeout.
    fn timed_out(after: Duration) -> Self;
}

impl RetryableError for ExternalServiceError {
    fn is_transient(&self) -> bool {
        ExternalServiceError::is_transient(self)
    }

    fn timed_out(after: Duration) -> Self {
        ExternalServiceError::Timeout(after)
    }
}

/// Runs `op` until it succeeds, fails permanently, or the policy runs out of retries.
///
/// Each attempt gets its own `timeout`; an elapsed attempt counts as a transient failure.
pub async fn call_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    timeout: Option<Duration>,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    E: RetryableError,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, op()).await {
                Ok(r) => r,
                Err(_) => Err(E::timed_out(limit)),
            },
            None => op().await,
        };
        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && policy.should_retry(attempt) => {
                let delay = policy.delay(attempt);
                warn!(
                    call = label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn fast_policy(retries: usize) -> RetryPolicy {
        RetryPolicy::exponential(
            retries,
            Duration::from_millis(1),
            Duration::from_millis(4),
            2.0,
        )
    }

    #[test]
    fn default_policy_backs_off_to_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(10), Duration::from_secs(8));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn none_never_retries() {
        let policy = RetryPolicy::none();
        assert!(!policy.should_retry(0));
        assert_eq!(policy.delay(0), Duration::ZERO);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let out: Result<&str, ExternalServiceError> =
            call_with_retry(&fast_policy(3), None, "test", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ExternalServiceError::RateLimited("429".into()))
                } else {
                    Ok("done")
                }
            })
            .await;
        assert_eq!(out.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_errors_are_not_retried() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let out: Result<(), ExternalServiceError> =
            call_with_retry(&fast_policy(3), None, "test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExternalServiceError::Auth("bad key".into()))
            })
            .await;
        assert!(matches!(out, Err(ExternalServiceError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let out: Result<(), ExternalServiceError> =
            call_with_retry(&fast_policy(2), None, "test", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ExternalServiceError::Network("reset".into()))
            })
            .await;
        assert!(out.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_attempt_times_out() {
        let out: Result<(), ExternalServiceError> = call_with_retry(
            &RetryPolicy::none(),
            Some(Duration::from_millis(10)),
            "test",
            || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;
        assert_eq!(out, Err(ExternalServiceError::Timeout(Duration::from_millis(10))));
    }
}
