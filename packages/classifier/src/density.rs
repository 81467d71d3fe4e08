//! Residential feature count to density score.

use cellplan_models::{DensityScore, FeatureElement};

/// Placeholder calibration divisor: residential ways per density point.
pub const DEFAULT_DENSITY_DIVISOR: f64 = 5.0;

/// Converts a residential feature count into a [`DensityScore`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityEstimator {
    divisor: f64,
}

impl Default for DensityEstimator {
    fn default() -> Self {
        Self {
            divisor: DEFAULT_DENSITY_DIVISOR,
        }
    }
}

impl DensityEstimator {
    /// Returns `None` unless `divisor` is finite and strictly positive.
    #[must_use]
    pub fn new(divisor: f64) -> Option<Self> {
        (divisor.is_finite() && divisor > 0.0).then_some(Self { divisor })
    }

    #[must_use]
    pub const fn divisor(&self) -> f64 {
        self.divisor
    }

    /// `count / divisor`. Every element counts, with or without geometry.
    #[must_use]
    pub fn estimate(&self, residential: &[FeatureElement]) -> DensityScore {
        self.estimate_count(residential.len())
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn estimate_count(&self, count: usize) -> DensityScore {
        DensityScore::new(count as f64 / self.divisor).unwrap_or_default()
    }
}
