//! Self-telemetry pipeline: interval accounting, EMA smoothing, and
//! collector delivery.
//!
//! The pipeline has three moving parts. An [`IntervalAccountant`] owns the
//! raw request counters, samples external CPU counters on a fixed tick, and
//! folds per-interval deltas into exponential moving averages. A
//! [`MetricsReporter`] periodically shapes a smoothed snapshot plus process
//! stats into a flat metric batch and POSTs it to a remote collector,
//! surviving individual delivery failures. An [`AnnotationClient`] ships
//! discrete point-in-time events (deploys, restarts) to the same collector
//! family on demand.
//!
//! The instrumentation agent is abstracted behind
//! [`agent::InstrumentationSource`]; the pipeline runs unchanged against
//! [`agent::InertInstrumentation`] when no agent is loaded.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod accounting;
pub mod agent;
pub mod annotations;
pub mod ema;
pub mod error;
pub mod process;
pub mod reporter;

pub use accounting::{AccountingConfig, AccountingHandle, AccountingSnapshot, IntervalAccountant};
pub use agent::{CpuUsage, InertInstrumentation, InstrumentationSource};
pub use annotations::{AnnotationClient, AnnotationResponse, AnnotationStats};
pub use ema::EmaFilter;
pub use error::{TelemetryError, TelemetryResult};
pub use process::{MemoryStats, ProcessStats};
pub use reporter::{
    standard_snapshot, BaselineDelta, DeliveryReport, MetricBatch, MetricsReporter,
    ReporterConfig, ReporterHandle, ReporterState,
};
