//! Exponential moving average smoothing
//!
//! Single-pass recency-weighted averaging: each observation is blended with
//! the prior mean using a fixed weight, so no sliding window is stored and
//! stale history is discounted geometrically.

/// Exponentially weighted moving average over a stream of observations.
///
/// `alpha` is the weight of the most recent observation and `1 - alpha` the
/// weight of everything before it; useful values lie in `(0, 1]`. With
/// `alpha = 1` the mean tracks the latest observation; with `alpha = 0` it
/// never moves after the first.
///
/// The first observation becomes the mean exactly. Without that cold-start
/// rule an implicit starting value of zero would depress the average for a
/// long time at low alpha.
#[derive(Debug, Clone, PartialEq)]
pub struct EmaFilter {
    alpha: f64,
    mean: Option<f64>,
}

impl EmaFilter {
    /// Create a filter with no prior mean.
    pub fn new(alpha: f64) -> Self {
        Self { alpha, mean: None }
    }

    /// Create a filter seeded with an estimated mean.
    pub fn with_mean(alpha: f64, mean: f64) -> Self {
        Self { alpha, mean: Some(mean) }
    }

    /// Fold a new observation into the average and return the new mean.
    pub fn update(&mut self, observation: f64) -> f64 {
        let new_mean = match self.mean {
            None => observation,
            Some(mean) => (1.0 - self.alpha) * mean + self.alpha * observation,
        };
        self.mean = Some(new_mean);
        new_mean
    }

    /// Current mean, or `0.0` if nothing has been observed.
    pub fn get(&self) -> f64 {
        self.mean.unwrap_or(0.0)
    }

    /// The recent-observation weight this filter was built with.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_mean_is_zero() {
        let filter = EmaFilter::new(0.1);
        assert_eq!(filter.get(), 0.0);
    }

    #[test]
    fn test_first_update_equals_first_observation() {
        let mut filter = EmaFilter::new(0.1);
        assert_eq!(filter.update(42.0), 42.0);
        assert_eq!(filter.get(), 42.0);
    }

    #[test]
    fn test_alpha_one_tracks_latest_observation() {
        let mut filter = EmaFilter::new(1.0);
        filter.update(10.0);
        filter.update(3.0);
        assert_eq!(filter.get(), 3.0);
        filter.update(99.0);
        assert_eq!(filter.get(), 99.0);
    }

    #[test]
    fn test_alpha_zero_freezes_after_first_observation() {
        let mut filter = EmaFilter::new(0.0);
        filter.update(5.0);
        filter.update(100.0);
        filter.update(-100.0);
        assert_eq!(filter.get(), 5.0);
    }

    #[test]
    fn test_blend_weights() {
        let mut filter = EmaFilter::new(0.1);
        filter.update(10.0);
        // 0.9 * 10 + 0.1 * 20
        assert!((filter.update(20.0) - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_seeded_mean_skips_cold_start() {
        let mut filter = EmaFilter::with_mean(0.5, 8.0);
        // 0.5 * 8 + 0.5 * 4
        assert!((filter.update(4.0) - 6.0).abs() < 1e-12);
    }
}
