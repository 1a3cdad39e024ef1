//! Generic bounded retry for asynchronous operations
//!
//! An operation is invoked up to a configured number of attempts. Between
//! attempts a [`RetryPolicy`] classifies the error: a non-retryable error
//! propagates immediately, otherwise the next attempt runs after the
//! configured backoff delay. When every attempt has failed the last error
//! propagates.
//!
//! [`BackoffStrategy::None`] reproduces the historical behavior of retrying
//! with no delay at all. That is a known design limitation rather than a
//! recommendation: under a sustained outage it hammers the remote end, so
//! callers that talk to a network should prefer the bounded exponential
//! default.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can come out of a retry sequence
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the error from the final attempt.
    #[error("all {attempts} attempts failed: {source}")]
    Exhausted { attempts: u32, source: E },

    /// The policy classified the error as not worth retrying.
    #[error("non-retryable error: {source}")]
    NonRetryable { source: E },

    /// The retry configuration itself is unusable.
    #[error("invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> RetryError<E> {
    /// The underlying operation error, when there is one.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source } => Some(source),
            Self::InvalidConfiguration { .. } => None,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Determines whether a failed attempt should be retried
pub trait RetryPolicy<E> {
    /// Classify the error observed on the given 0-based attempt.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run the next attempt after the configured backoff
    Retry,
    /// Stop immediately and propagate the error
    Stop,
}

/// Backoff strategy for calculating the delay before the next attempt
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// No delay between attempts
    None,
    /// Fixed delay between attempts
    Fixed(Duration),
    /// Exponential backoff: `initial_delay * base^attempt`, capped at
    /// `max_delay`
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Delay to apply after the given 0-based attempt has failed
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, base, max_delay } => {
                let delay = initial_delay.as_millis() as f64 * base.powi(attempt as i32);
                let delay_ms = delay.min(max_delay.as_millis() as f64) as u64;
                Duration::from_millis(delay_ms)
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Backoff strategy applied between attempts
    pub backoff: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(100),
                base: 2.0,
                max_delay: Duration::from_secs(30),
            },
        }
    }
}

impl RetryConfig {
    /// Bounded attempts with no delay between them.
    ///
    /// Matches the behavior of retry loops that predate backoff support;
    /// see the module docs for why network callers should avoid it.
    pub fn immediate(max_attempts: u32) -> Self {
        Self { max_attempts, backoff: BackoffStrategy::None }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".to_string());
        }
        if let BackoffStrategy::Exponential { base, .. } = &self.backoff {
            if *base <= 0.0 {
                return Err("exponential base must be greater than 0".to_string());
            }
        }
        Ok(())
    }
}

/// Execute an operation with retry logic
///
/// The policy is consulted only when another attempt is still available;
/// the final attempt's error is returned as [`RetryError::Exhausted`]
/// without classification.
pub async fn retry_with_policy<F, Fut, T, E, P>(
    config: &RetryConfig,
    policy: &P,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: RetryPolicy<E>,
    E: fmt::Debug,
{
    if let Err(message) = config.validate() {
        return Err(RetryError::InvalidConfiguration { message });
    }

    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("operation succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(error) => {
                let attempts = attempt + 1;
                if attempts >= config.max_attempts {
                    warn!(attempts, error = ?error, "all retry attempts exhausted");
                    return Err(RetryError::Exhausted { attempts, source: error });
                }
                if policy.should_retry(&error, attempt) == RetryDecision::Stop {
                    debug!(error = ?error, "retry policy stopped the sequence");
                    return Err(RetryError::NonRetryable { source: error });
                }
                let delay = config.backoff.delay_after(attempt);
                if !delay.is_zero() {
                    debug!(attempt = attempts, ?delay, "attempt failed, backing off");
                    tokio::time::sleep(delay).await;
                }
                attempt = attempts;
            }
        }
    }
}

/// Convenience wrapper using the default configuration
pub async fn retry<F, Fut, T, E, P>(policy: &P, operation: F) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: RetryPolicy<E>,
    E: fmt::Debug,
{
    retry_with_policy(&RetryConfig::default(), policy, operation).await
}

/// Pre-defined retry policies for common scenarios
pub mod policies {
    use super::{RetryDecision, RetryPolicy};

    /// Retries on any error
    #[derive(Debug, Clone, Copy)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retries
    #[derive(Debug, Clone, Copy)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }

    /// Retries while the predicate returns `true` for the error
    #[derive(Debug)]
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> PredicateRetry<F> {
        /// Wrap a `Fn(&E, attempt) -> bool` classifier.
        pub fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<F, E> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E, u32) -> bool,
    {
        fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision {
            if (self.predicate)(error, attempt) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for retry strategies and policies

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::policies::{AlwaysRetry, NeverRetry, PredicateRetry};
    use super::*;

    #[derive(Debug, PartialEq)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    #[test]
    fn test_backoff_none_is_zero() {
        assert_eq!(BackoffStrategy::None.delay_after(0), Duration::ZERO);
        assert_eq!(BackoffStrategy::None.delay_after(7), Duration::ZERO);
    }

    #[test]
    fn test_backoff_fixed() {
        let strategy = BackoffStrategy::Fixed(Duration::from_millis(100));
        assert_eq!(strategy.delay_after(0), Duration::from_millis(100));
        assert_eq!(strategy.delay_after(5), Duration::from_millis(100));
    }

    #[test]
    fn test_backoff_exponential_doubles_and_caps() {
        let strategy = BackoffStrategy::Exponential {
            initial_delay: Duration::from_millis(100),
            base: 2.0,
            max_delay: Duration::from_secs(10),
        };

        assert_eq!(strategy.delay_after(0), Duration::from_millis(100));
        assert_eq!(strategy.delay_after(1), Duration::from_millis(200));
        assert_eq!(strategy.delay_after(2), Duration::from_millis(400));

        // Capped at max_delay
        assert_eq!(strategy.delay_after(20), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_attempts_is_invalid() {
        let config = RetryConfig { max_attempts: 0, backoff: BackoffStrategy::None };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_first_attempt_success_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: RetryResult<u32, TestError> =
            retry_with_policy(&RetryConfig::immediate(3), &AlwaysRetry, move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: RetryResult<u32, TestError> =
            retry_with_policy(&RetryConfig::immediate(5), &AlwaysRetry, move || {
                let calls = calls_clone.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TestError("transient"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_propagates_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();

        let result: RetryResult<u32, TestError> =
            retry_with_policy(&RetryConfig::immediate(3), &AlwaysRetry, move || {
                let calls = calls_clone.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Err(if n == 2 { TestError("final") } else { TestError("earlier") })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RetryError::Exhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert_eq!(source, TestError("final"));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_classifier_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let policy = PredicateRetry::new(|e: &TestError, _| e.0 != "fatal");

        let result: RetryResult<u32, TestError> =
            retry_with_policy(&RetryConfig::immediate(5), &policy, move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("fatal"))
                }
            })
            .await;

        // One call, no retries: the classifier rejected the error
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::NonRetryable { source: TestError("fatal") })));
    }

    #[tokio::test]
    async fn test_never_retry_policy() {
        let result: RetryResult<u32, TestError> =
            retry_with_policy(&RetryConfig::immediate(5), &NeverRetry, || async {
                Err(TestError("nope"))
            })
            .await;

        assert!(matches!(result, Err(RetryError::NonRetryable { .. })));
    }

    #[tokio::test]
    async fn test_backoff_delays_are_applied() {
        // Paused clock: sleeps auto-advance, so this stays fast while still
        // proving the executor sleeps between attempts.
        tokio::time::pause();
        let start = tokio::time::Instant::now();

        let config = RetryConfig {
            max_attempts: 3,
            backoff: BackoffStrategy::Fixed(Duration::from_secs(1)),
        };
        let result: RetryResult<u32, TestError> =
            retry_with_policy(&config, &AlwaysRetry, || async { Err(TestError("down")) }).await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        // Two sleeps of 1s between three attempts
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_invalid_configuration_short_circuits() {
        let config = RetryConfig { max_attempts: 0, backoff: BackoffStrategy::None };
        let result: RetryResult<u32, TestError> =
            retry_with_policy(&config, &AlwaysRetry, || async { Ok(1) }).await;

        assert!(matches!(result, Err(RetryError::InvalidConfiguration { .. })));
    }
}
