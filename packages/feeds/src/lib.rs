#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Query clients for the two live data sources behind a recommendation.
//!
//! 1. **Overpass** ([`overpass`]): map features (roads, buildings,
//!    residential land use) within a radius of a point.
//! 2. **`TomTom` traffic flow** ([`tomtom`]): current speed on the road
//!    segment nearest to a point.
//!
//! Each client issues exactly one HTTP request per call and never
//! retries; retry and timeout policy belongs to the orchestrator. The
//! orchestrator talks to the clients through the [`FeatureSource`] and
//! [`TrafficSource`] traits so that tests can substitute fakes.

pub mod overpass;
pub mod tomtom;

use std::fmt;

use async_trait::async_trait;
use cellplan_models::{FailureKind, FeatureKind, FeatureSet, PointOfInterest, TrafficSpeed};

/// Errors from a single source query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Transport failure, non-success HTTP status, or timeout.
    #[error("Source unavailable: {message}")]
    SourceUnavailable {
        /// Description of the transport failure.
        message: String,
    },

    /// The response body could not be parsed into the expected shape.
    #[error("Malformed response: {message}")]
    MalformedResponse {
        /// Description of the parsing failure.
        message: String,
    },

    /// The response was well formed but carried no data for the point.
    #[error("No data for this point")]
    NoData,
}

impl QueryError {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::SourceUnavailable { .. } => FailureKind::SourceUnavailable,
            Self::MalformedResponse { .. } => FailureKind::MalformedResponse,
            Self::NoData => FailureKind::NoData,
        }
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(e: reqwest::Error) -> Self {
        Self::SourceUnavailable {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedResponse {
            message: e.to_string(),
        }
    }
}

/// Anything that can answer a feature query for a point.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// Fetches all features of `kind` within `radius_meters` of `point`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::SourceUnavailable`] on transport failure and
    /// [`QueryError::MalformedResponse`] if the body cannot be parsed.
    async fn fetch_features(
        &self,
        point: PointOfInterest,
        kind: FeatureKind,
        radius_meters: u32,
    ) -> Result<FeatureSet, QueryError>;
}

/// Anything that can report the current traffic speed at a point.
#[async_trait]
pub trait TrafficSource: Send + Sync {
    /// Fetches the current speed on the segment nearest to `point`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NoData`] when no tracked segment covers the
    /// point, in addition to the transport and parsing failures.
    async fn fetch_speed(&self, point: PointOfInterest) -> Result<TrafficSpeed, QueryError>;
}

/// An opaque API credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    #[must_use]
    pub const fn new(secret: String) -> Self {
        Self(secret)
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Returns at most `max` bytes of `text`, cut on a char boundary.
pub(crate) fn preview(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
