//! Error types for the telemetry pipeline
//!
//! The split mirrors how failures are handled: configuration problems are
//! fatal at construction and never retried, an unknown time base is a
//! programmer error surfaced to the caller, and transport failures are
//! recoverable, so the periodic paths log and continue. A non-2xx response
//! from the collector is deliberately *not* an error here; it is carried as
//! data in the delivery report so callers can log and count it.

use thiserror::Error;

/// Result type for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors produced by the telemetry pipeline
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Invalid or missing configuration; fatal at construction
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The requested time base was never configured
    #[error("unknown time base: {0}s")]
    UnknownTimeBase(u64),

    /// Transport-level failure (DNS, connect, timeout) on an outbound call
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for TelemetryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
