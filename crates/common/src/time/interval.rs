//! Recurring wall-clock intervals
//!
//! Thin wrapper over [`tokio::time::interval`] that skips missed ticks and
//! allows the period to be swapped out between ticks. Skipping matters for
//! callers whose tick body can outlast the period (a slow remote endpoint,
//! for example): after a long cycle the loop resumes on the next scheduled
//! boundary instead of firing a burst of catch-up ticks.

use std::time::Duration;

use tokio::time::{Instant, Interval as TokioInterval, MissedTickBehavior};

/// A recurring interval that skips missed ticks
#[derive(Debug)]
pub struct Interval {
    period: Duration,
    inner: TokioInterval,
}

impl Interval {
    /// Create an interval with the given period.
    ///
    /// The first tick completes immediately, matching `tokio::time::interval`.
    pub fn new(period: Duration) -> Self {
        Self { period, inner: Self::make_inner(period) }
    }

    fn make_inner(period: Duration) -> TokioInterval {
        let mut inner = tokio::time::interval(period);
        inner.set_missed_tick_behavior(MissedTickBehavior::Skip);
        inner
    }

    /// Wait for the next tick
    pub async fn tick(&mut self) -> Instant {
        self.inner.tick().await
    }

    /// The current period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Replace the period; takes effect from the next tick.
    ///
    /// The underlying timer is rebuilt, so the next tick completes
    /// immediately and subsequent ticks follow the new period.
    pub fn set_period(&mut self, period: Duration) {
        self.period = period;
        self.inner = Self::make_inner(period);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tick_cadence() {
        tokio::time::pause();

        let mut interval = Interval::new(Duration::from_millis(100));

        let start = Instant::now();
        interval.tick().await; // immediate
        let first = Instant::now();
        interval.tick().await;
        let second = Instant::now();

        assert!(first.duration_since(start) < Duration::from_millis(5));
        assert!(second.duration_since(first) >= Duration::from_millis(95));
    }

    #[tokio::test]
    async fn test_set_period_applies_to_later_ticks() {
        tokio::time::pause();

        let mut interval = Interval::new(Duration::from_millis(100));
        interval.tick().await;

        interval.set_period(Duration::from_millis(300));
        assert_eq!(interval.period(), Duration::from_millis(300));

        interval.tick().await; // immediate after rebuild
        let before = Instant::now();
        interval.tick().await;
        assert!(Instant::now().duration_since(before) >= Duration::from_millis(295));
    }
}
