//! Resilience patterns for absorbing transient failures
//!
//! Currently this is bounded retry with pluggable retry policies and
//! backoff strategies. The abstractions are generic over the error type so
//! any fallible async operation can be wrapped without coupling to a
//! particular transport or domain error.

pub mod retry;

// Re-export retry types
pub use retry::{
    policies, retry, retry_with_policy, BackoffStrategy, RetryConfig, RetryDecision, RetryError,
    RetryPolicy, RetryResult,
};
