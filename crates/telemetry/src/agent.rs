//! Instrumentation-source abstraction
//!
//! The accountant and reporter never reach into an ambient agent singleton;
//! they take an [`InstrumentationSource`] and read everything through it.
//! That keeps the pipeline testable and lets it run against a stand-in when
//! no real agent is loaded.

use serde_json::{Map, Value};

use crate::process::ProcessStats;

/// Cumulative CPU time consumed by the process, split by mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuUsage {
    /// Microseconds spent in user mode since process start
    pub user_micros: u64,
    /// Microseconds spent in kernel mode since process start
    pub system_micros: u64,
}

/// Counter and event source backing the accounting pipeline.
///
/// `last_observation_sampled` and `cpu_usage` must be cheap, synchronous,
/// and non-blocking: the former is consulted on every counted request and
/// the latter on every accounting tick. The span and internal-counter
/// accessors are optional; returning `None` must leave the pipeline fully
/// functional.
pub trait InstrumentationSource: Send + Sync {
    /// Whether the most recently observed request was selected for deep
    /// tracing.
    fn last_observation_sampled(&self) -> bool;

    /// Cumulative user/system CPU time for the process.
    fn cpu_usage(&self) -> CpuUsage;

    /// Spans currently in flight (entries not yet matched by an exit), when
    /// the agent tracks them.
    fn active_spans(&self) -> Option<i64> {
        None
    }

    /// Agent-internal counters worth forwarding to the collector, when
    /// available. Values that are not numbers are ignored downstream.
    fn internal_counters(&self) -> Option<Map<String, Value>> {
        None
    }
}

/// Stand-in source used when no instrumentation agent is loaded.
///
/// Nothing is ever sampled and no agent internals exist, but CPU usage is
/// still read from the real process so interval accounting keeps producing
/// meaningful per-transaction figures.
#[derive(Debug, Default)]
pub struct InertInstrumentation {
    process: ProcessStats,
}

impl InertInstrumentation {
    /// Create an inert source backed by the current process.
    pub fn new() -> Self {
        Self::default()
    }
}

impl InstrumentationSource for InertInstrumentation {
    fn last_observation_sampled(&self) -> bool {
        false
    }

    fn cpu_usage(&self) -> CpuUsage {
        self.process.cpu_usage()
    }
}
