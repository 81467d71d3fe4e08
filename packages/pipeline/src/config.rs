//! Pipeline configuration.
//!
//! A default configuration is embedded at compile time from
//! `config/default.toml`. A file on disk may replace it, and a handful of
//! environment variables override individual values afterwards:
//!
//! | variable | overrides |
//! |---|---|
//! | `TOMTOM_API_KEY` | `traffic.api_key` |
//! | `CELLPLAN_OVERPASS_URL` | `overpass.endpoint` |
//! | `CELLPLAN_TRAFFIC_URL` | `traffic.endpoint` |

use std::path::Path;
use std::time::Duration;

use cellplan_classifier::{DEFAULT_DENSITY_DIVISOR, DensityEstimator, Thresholds};
use cellplan_feeds::Credential;
use serde::Deserialize;

use crate::retry::RetryPolicy;

const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

/// Search radius used when the configuration does not set one.
pub const DEFAULT_RADIUS_METERS: u32 = 5000;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed into a configuration.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is out of range or missing.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Which value is wrong and why.
        message: String,
    },
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// `[overpass]`
    pub overpass: OverpassConfig,
    /// `[traffic]`
    pub traffic: TrafficConfig,
    /// `[density]`
    #[serde(default)]
    pub density: DensityConfig,
    /// `[classifier]`
    #[serde(default)]
    pub classifier: Thresholds,
    /// `[retry]`
    #[serde(default)]
    pub retry: RetryPolicy,
    /// `[timeouts]`
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Geospatial feature source.
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassConfig {
    /// Overpass `interpreter` URL.
    pub endpoint: String,
    /// Search radius around the point.
    #[serde(default = "default_radius")]
    pub radius_meters: u32,
}

/// Traffic-flow source.
#[derive(Clone, Deserialize)]
pub struct TrafficConfig {
    /// `flowSegmentData` base URL.
    pub endpoint: String,
    /// Speed unit requested, `KMPH` by default.
    #[serde(default = "default_unit")]
    pub unit: String,
    /// Usually supplied through `TOMTOM_API_KEY` instead.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for TrafficConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrafficConfig")
            .field("endpoint", &self.endpoint)
            .field("unit", &self.unit)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Density calibration.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DensityConfig {
    /// Residential ways per density point.
    pub divisor: f64,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            divisor: DEFAULT_DENSITY_DIVISOR,
        }
    }
}

/// Query timeouts.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TimeoutConfig {
    /// Per-attempt limit for every query. Absent means no timeout.
    #[serde(default)]
    pub query_timeout_ms: Option<u64>,
}

impl TimeoutConfig {
    #[must_use]
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

const fn default_radius() -> u32 {
    DEFAULT_RADIUS_METERS
}

fn default_unit() -> String {
    "KMPH".to_string()
}

impl PipelineConfig {
    /// Parses and validates the embedded default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the embedded TOML is invalid.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml_str(DEFAULT_CONFIG_TOML)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] on parse errors and
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, else the embedded default, then applies
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                log::info!("Loading configuration from {}", path.display());
                Self::from_toml_str(&std::fs::read_to_string(path)?)?
            }
            None => Self::embedded()?,
        };

        let config = config.with_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides looked up by environment variable name.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup("TOMTOM_API_KEY").filter(|k| !k.is_empty()) {
            self.traffic.api_key = Some(key);
        }
        if let Some(url) = lookup("CELLPLAN_OVERPASS_URL").filter(|u| !u.is_empty()) {
            self.overpass.endpoint = url;
        }
        if let Some(url) = lookup("CELLPLAN_TRAFFIC_URL").filter(|u| !u.is_empty()) {
            self.traffic.endpoint = url;
        }
        self
    }

    /// Checks every value for range errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.overpass.endpoint.trim().is_empty() {
            return Err(invalid("overpass.endpoint must not be empty"));
        }
        if self.overpass.radius_meters == 0 {
            return Err(invalid("overpass.radius_meters must be positive"));
        }
        if self.traffic.endpoint.trim().is_empty() {
            return Err(invalid("traffic.endpoint must not be empty"));
        }
        if self.traffic.unit.trim().is_empty() {
            return Err(invalid("traffic.unit must not be empty"));
        }
        self.density_estimator()?;
        if let Some(field) = self.classifier.invalid_fields().first() {
            return Err(invalid(&format!(
                "classifier.{field} must be finite and non-negative"
            )));
        }
        if self.timeouts.query_timeout_ms == Some(0) {
            return Err(invalid("timeouts.query_timeout_ms must be positive"));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] unless the divisor is finite and
    /// strictly positive.
    pub fn density_estimator(&self) -> Result<DensityEstimator, ConfigError> {
        DensityEstimator::new(self.density.divisor).ok_or_else(|| {
            invalid(&format!(
                "density.divisor must be finite and positive, got {}",
                self.density.divisor
            ))
        })
    }

    /// The traffic credential, if one is configured.
    #[must_use]
    pub fn credential(&self) -> Option<Credential> {
        self.traffic
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .map(Credential::new)
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}
