#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Decision logic turning traffic speed and density into a configuration.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. speed > 70 km/h **and** density > 50 → [`NetworkConfig::MmWave`]
//! 2. speed > 50 km/h **and** density > 30 → [`NetworkConfig::CBand`]
//! 3. otherwise → [`NetworkConfig::LowBand`]
//!
//! Both comparisons are strict, so a point sitting exactly on a tier-one
//! threshold falls through to tier two. The thresholds are calibration
//! values rather than validated domain constants and can be replaced via
//! [`Thresholds`].

pub mod density;

use cellplan_models::{DensityScore, NetworkConfig, TrafficSpeed};
use serde::Deserialize;

pub use density::{DEFAULT_DENSITY_DIVISOR, DensityEstimator};

/// Tier one requires a speed strictly above this (km/h).
pub const TIER_ONE_MIN_SPEED_KMH: f64 = 70.0;
/// Tier one requires a density strictly above this.
pub const TIER_ONE_MIN_DENSITY: f64 = 50.0;
/// Tier two requires a speed strictly above this (km/h).
pub const TIER_TWO_MIN_SPEED_KMH: f64 = 50.0;
/// Tier two requires a density strictly above this.
pub const TIER_TWO_MIN_DENSITY: f64 = 30.0;

/// Configuration chosen when speed and density clear tier one.
pub const TIER_ONE: NetworkConfig = NetworkConfig::MmWave;
/// Configuration chosen when speed and density clear tier two only.
pub const TIER_TWO: NetworkConfig = NetworkConfig::CBand;
/// Configuration chosen otherwise.
pub const FALLBACK: NetworkConfig = NetworkConfig::LowBand;

/// Tunable thresholds for the ordered rules.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Speed (km/h) tier one must exceed.
    pub tier_one_min_speed_kmh: f64,
    /// Density tier one must exceed.
    pub tier_one_min_density: f64,
    /// Speed (km/h) tier two must exceed.
    pub tier_two_min_speed_kmh: f64,
    /// Density tier two must exceed.
    pub tier_two_min_density: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Thresholds {
    /// The documented default thresholds (70 / 50 / 50 / 30).
    pub const DEFAULT: Self = Self {
        tier_one_min_speed_kmh: TIER_ONE_MIN_SPEED_KMH,
        tier_one_min_density: TIER_ONE_MIN_DENSITY,
        tier_two_min_speed_kmh: TIER_TWO_MIN_SPEED_KMH,
        tier_two_min_density: TIER_TWO_MIN_DENSITY,
    };

    /// Picks the configuration for the given inputs. Total: every input
    /// pair maps to exactly one configuration.
    #[must_use]
    pub fn classify(&self, speed: TrafficSpeed, density: DensityScore) -> NetworkConfig {
        let speed = speed.kmh();
        let density = density.value();

        if speed > self.tier_one_min_speed_kmh && density > self.tier_one_min_density {
            TIER_ONE
        } else if speed > self.tier_two_min_speed_kmh && density > self.tier_two_min_density {
            TIER_TWO
        } else {
            FALLBACK
        }
    }

    /// Names of thresholds that are negative or not finite.
    #[must_use]
    pub fn invalid_fields(&self) -> Vec<&'static str> {
        [
            ("tier_one_min_speed_kmh", self.tier_one_min_speed_kmh),
            ("tier_one_min_density", self.tier_one_min_density),
            ("tier_two_min_speed_kmh", self.tier_two_min_speed_kmh),
            ("tier_two_min_density", self.tier_two_min_density),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_finite() || *value < 0.0)
        .map(|(name, _)| name)
        .collect()
    }
}

/// Classifies with the default thresholds.
#[must_use]
pub fn classify(speed: TrafficSpeed, density: DensityScore) -> NetworkConfig {
    Thresholds::DEFAULT.classify(speed, density)
}
