//! Generic building blocks shared across Beacon crates.
//!
//! Nothing in this crate knows about metrics, collectors, or the telemetry
//! domain; it provides the fault-tolerance and timing primitives the
//! pipeline crates build on.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod resilience;
pub mod time;

// Re-export commonly used types for convenience
pub use resilience::{
    policies, retry, retry_with_policy, BackoffStrategy, RetryConfig, RetryDecision, RetryError,
    RetryPolicy, RetryResult,
};
pub use time::Interval;
