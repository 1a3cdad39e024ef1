//! Interval accounting for request and resource counters
//!
//! An [`IntervalAccountant`] owns two monotonic counters (requests seen,
//! requests sampled), reads cumulative CPU counters from the injected
//! [`InstrumentationSource`] on a fixed tick, and folds per-interval deltas
//! into a set of [`EmaFilter`]s. Counting is a lock-free atomic increment;
//! all smoothing state lives behind a mutex touched only on ticks and
//! snapshot reads.
//!
//! Deltas are folded in only when at least one request occurred during the
//! tick. A genuinely idle interval says nothing about per-request behavior,
//! and letting true-zero ticks through would dilute the averages. The
//! active-spans gauge is the exception: it is a direct sample, not a delta
//! average, and is written on every tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use beacon_common::time::Interval;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::agent::{CpuUsage, InstrumentationSource};
use crate::ema::EmaFilter;
use crate::error::{TelemetryError, TelemetryResult};

/// Default weight given to the newest interval's observation.
pub const DEFAULT_ALPHA: f64 = 0.1;

/// Configuration for an [`IntervalAccountant`]
#[derive(Debug, Clone)]
pub struct AccountingConfig {
    /// Tick period; must be at least one second
    pub interval: Duration,
    /// EMA weight for the newest observation, in `(0, 1]`
    pub alpha: f64,
}

impl AccountingConfig {
    /// Configuration with the default alpha.
    pub fn new(interval: Duration) -> Self {
        Self { interval, alpha: DEFAULT_ALPHA }
    }

    /// Override the EMA weight.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    fn validate(&self) -> TelemetryResult<()> {
        if self.interval < Duration::from_secs(1) {
            return Err(TelemetryError::Configuration(
                "accounting interval must be at least one second".to_string(),
            ));
        }
        if self.alpha <= 0.0 || self.alpha > 1.0 {
            return Err(TelemetryError::Configuration(format!(
                "alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Point-in-time view of the accounting state.
///
/// Averages are rounded for stable external reporting: request averages to
/// two decimals, per-transaction CPU and the span gauge to whole numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountingSnapshot {
    /// Total requests observed since construction
    pub count: u64,
    /// Requests selected for deep tracing since construction
    pub sampled: u64,
    /// Smoothed requests per interval
    pub total_averages: f64,
    /// Smoothed sampled requests per interval
    pub sampled_averages: f64,
    /// Smoothed user-mode CPU microseconds per request
    pub cpu_user_per_tx: f64,
    /// Smoothed kernel-mode CPU microseconds per request
    pub cpu_system_per_tx: f64,
    /// Spans in flight at the last tick (direct sample)
    pub spans_active: f64,
}

/// EMA set plus the span gauge for one time base.
#[derive(Debug)]
struct TimeBase {
    total_averages: EmaFilter,
    sampled_averages: EmaFilter,
    cpu_user_per_tx: EmaFilter,
    cpu_system_per_tx: EmaFilter,
    spans_active: f64,
}

impl TimeBase {
    fn new(alpha: f64) -> Self {
        Self {
            total_averages: EmaFilter::new(alpha),
            sampled_averages: EmaFilter::new(alpha),
            cpu_user_per_tx: EmaFilter::new(alpha),
            cpu_system_per_tx: EmaFilter::new(alpha),
            spans_active: 0.0,
        }
    }
}

/// Baseline captured at the previous tick, private to one accounting loop.
#[derive(Debug, Clone, Copy)]
struct TickBaseline {
    total: u64,
    sampled: u64,
    cpu: CpuUsage,
}

/// Owns the raw request counters and the smoothed interval state.
///
/// One instance per process. [`count`](Self::count) is called once per
/// observed request; [`start_interval_averages`](Self::start_interval_averages)
/// drives the delta computation on a timer.
pub struct IntervalAccountant {
    total: AtomicU64,
    sampled: AtomicU64,
    ticks: AtomicU64,
    interval: Duration,
    interval_secs: u64,
    agent: Arc<dyn InstrumentationSource>,
    bases: Mutex<HashMap<u64, TimeBase>>,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for IntervalAccountant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalAccountant")
            .field("total", &self.total)
            .field("sampled", &self.sampled)
            .field("interval_secs", &self.interval_secs)
            .finish_non_exhaustive()
    }
}

impl IntervalAccountant {
    /// Create an accountant with a single time base keyed by the interval's
    /// whole seconds.
    ///
    /// # Errors
    ///
    /// `Configuration` when the interval is below one second or alpha is
    /// outside `(0, 1]`.
    pub fn new(
        config: AccountingConfig,
        agent: Arc<dyn InstrumentationSource>,
    ) -> TelemetryResult<Self> {
        config.validate()?;
        let interval_secs = config.interval.as_secs_f64().round() as u64;

        let mut bases = HashMap::new();
        bases.insert(interval_secs, TimeBase::new(config.alpha));

        Ok(Self {
            total: AtomicU64::new(0),
            sampled: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            interval: config.interval,
            interval_secs,
            agent,
            bases: Mutex::new(bases),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Record one observed request.
    ///
    /// Safe to call at arbitrary frequency: a counter increment plus one
    /// non-blocking query of the instrumentation source, no allocation.
    pub fn count(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if self.agent.last_observation_sampled() {
            self.sampled.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Total requests observed so far.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Sampled requests observed so far.
    pub fn sampled(&self) -> u64 {
        self.sampled.load(Ordering::Relaxed)
    }

    /// Ticks processed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// The time base this accountant reports under, in seconds.
    pub fn time_base(&self) -> u64 {
        self.interval_secs
    }

    /// Snapshot the smoothed state for a time base.
    ///
    /// # Errors
    ///
    /// `UnknownTimeBase` when `time_base` was never configured.
    pub fn get(&self, time_base: u64) -> TelemetryResult<AccountingSnapshot> {
        let bases = self.lock_bases();
        let tb = bases.get(&time_base).ok_or(TelemetryError::UnknownTimeBase(time_base))?;
        Ok(AccountingSnapshot {
            count: self.total(),
            sampled: self.sampled(),
            total_averages: rounded(tb.total_averages.get(), 2),
            sampled_averages: rounded(tb.sampled_averages.get(), 2),
            cpu_user_per_tx: rounded(tb.cpu_user_per_tx.get(), 0),
            cpu_system_per_tx: rounded(tb.cpu_system_per_tx.get(), 0),
            spans_active: rounded(tb.spans_active, 0),
        })
    }

    /// Begin the repeating delta/EMA computation.
    ///
    /// Only one accounting loop may run per accountant: the loop keeps a
    /// private previous-tick baseline, and two loops re-baselining the same
    /// shared counters would corrupt each other's deltas. A second call
    /// while a loop is live is rejected; stopping the returned handle
    /// re-arms it.
    ///
    /// # Errors
    ///
    /// `Configuration` when a loop is already running.
    pub fn start_interval_averages(self: &Arc<Self>) -> TelemetryResult<AccountingHandle> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(TelemetryError::Configuration(
                "interval averaging is already running for this accountant".to_string(),
            ));
        }

        let accountant = Arc::clone(self);
        let mut baseline = TickBaseline {
            total: self.total(),
            sampled: self.sampled(),
            cpu: self.agent.cpu_usage(),
        };
        let task = tokio::spawn(async move {
            let mut interval = Interval::new(accountant.interval);
            // The immediate first tick is the baseline point, not a delta.
            interval.tick().await;
            loop {
                interval.tick().await;
                accountant.observe_tick(&mut baseline);
            }
        });

        Ok(AccountingHandle {
            accountant: Arc::clone(self),
            running: Arc::clone(&self.running),
            task,
        })
    }

    /// One tick: capture counters, compute deltas against the baseline,
    /// re-baseline, and fold into the EMA set.
    fn observe_tick(&self, baseline: &mut TickBaseline) {
        self.ticks.fetch_add(1, Ordering::Relaxed);

        let total = self.total();
        let sampled = self.sampled();
        let cpu = self.agent.cpu_usage();

        let delta_total = total.saturating_sub(baseline.total);
        let delta_sampled = sampled.saturating_sub(baseline.sampled);
        let delta_user = cpu.user_micros.saturating_sub(baseline.cpu.user_micros);
        let delta_system = cpu.system_micros.saturating_sub(baseline.cpu.system_micros);

        *baseline = TickBaseline { total, sampled, cpu };

        let spans_active = self.agent.active_spans();

        let mut bases = self.lock_bases();
        for tb in bases.values_mut() {
            // Gauge, not a delta average: sampled on every tick.
            if let Some(spans) = spans_active {
                tb.spans_active = spans as f64;
            }
            if delta_total > 0 {
                tb.total_averages.update(delta_total as f64);
                tb.sampled_averages.update(delta_sampled as f64);
                tb.cpu_user_per_tx.update(delta_user as f64 / delta_total as f64);
                tb.cpu_system_per_tx.update(delta_system as f64 / delta_total as f64);
            }
        }
        drop(bases);

        debug!(delta_total, delta_sampled, delta_user, delta_system, "accounting tick");
    }

    fn lock_bases(&self) -> MutexGuard<'_, HashMap<u64, TimeBase>> {
        match self.bases.lock() {
            Ok(guard) => guard,
            // A panic while holding the lock cannot leave partial state
            // here; the EMA set is always internally consistent.
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Cancellable handle for a running accounting loop.
///
/// Dropping the handle stops the loop; only future ticks are cancelled.
#[derive(Debug)]
pub struct AccountingHandle {
    accountant: Arc<IntervalAccountant>,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl AccountingHandle {
    /// Ticks processed by the loop this handle controls.
    pub fn ticks(&self) -> u64 {
        self.accountant.ticks()
    }

    /// Stop the loop and allow `start_interval_averages` to be called
    /// again.
    pub fn stop(&self) {
        self.task.abort();
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the loop is still scheduled.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for AccountingHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn rounded(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}
