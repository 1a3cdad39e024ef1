//! Timing utilities built on `tokio::time`

pub mod interval;

pub use interval::Interval;
