#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for the cellplan aggregation pipeline.
//!
//! A [`PointOfInterest`] is analyzed by querying three kinds of map
//! features ([`FeatureKind`]) and the current traffic speed around it.
//! The residential feature count becomes a [`DensityScore`], which is
//! combined with the [`TrafficSpeed`] into a recommended
//! [`NetworkConfig`]. The outcome of one analysis is a
//! [`PipelineResult`].

pub mod network;
pub mod result;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use network::{CyclicPrefix, NetworkConfig};
pub use result::{
    AvailableData, FailureKind, PipelineResult, PipelineStatus, ResultView, SourceFailure,
};

/// Errors from constructing a [`PointOfInterest`].
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CoordinateError {
    /// Latitude or longitude was NaN or infinite.
    #[error("Coordinate is not finite: ({latitude}, {longitude})")]
    NotFinite {
        /// Latitude as supplied.
        latitude: f64,
        /// Longitude as supplied.
        longitude: f64,
    },
}

/// The geographic coordinate currently being analyzed.
///
/// Always normalized: latitude is clamped into `[-90, 90]` and longitude
/// is wrapped into `(-180, 180]`. Fields are private so the invariant
/// cannot be bypassed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointOfInterest {
    latitude: f64,
    longitude: f64,
}

impl PointOfInterest {
    /// Builds a normalized point from raw map coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError::NotFinite`] if either coordinate is NaN
    /// or infinite.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(CoordinateError::NotFinite {
                latitude,
                longitude,
            });
        }

        Ok(Self {
            latitude: latitude.clamp(-90.0, 90.0),
            longitude: wrap_longitude(longitude),
        })
    }

    /// Latitude in degrees, within `[-90, 90]`.
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees, within `(-180, 180]`.
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Wraps a finite longitude into `(-180, 180]`.
fn wrap_longitude(longitude: f64) -> f64 {
    let wrapped = (longitude + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 { 180.0 } else { wrapped }
}

/// One vertex of a feature geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

/// The three logical feature queries issued per point.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureKind {
    /// Ways tagged `highway`.
    Roads,
    /// Ways tagged `building`.
    Buildings,
    /// Ways tagged `landuse=residential`.
    Residential,
}

impl FeatureKind {
    /// Every feature kind, in query order.
    pub const ALL: [Self; 3] = [Self::Roads, Self::Buildings, Self::Residential];

    /// The tag filter selecting this kind of way.
    #[must_use]
    pub const fn tag_selector(self) -> &'static str {
        match self {
            Self::Roads => "highway",
            Self::Buildings => "building",
            Self::Residential => "landuse=residential",
        }
    }

    /// The source name failures of this query are reported under.
    #[must_use]
    pub const fn source(self) -> SourceName {
        match self {
            Self::Roads => SourceName::Roads,
            Self::Buildings => SourceName::Buildings,
            Self::Residential => SourceName::Residential,
        }
    }
}

/// Names of the four independently failing data sources.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceName {
    /// Road feature query.
    Roads,
    /// Building feature query.
    Buildings,
    /// Residential land-use feature query.
    Residential,
    /// Traffic-flow query.
    Traffic,
}

/// One feature returned by a feature query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureElement {
    /// Identifier assigned by the data source.
    pub id: u64,
    /// Ordered vertices. Empty for non-polygonal features.
    pub geometry: Vec<LatLon>,
    /// Raw tags as returned by the source.
    pub tags: BTreeMap<String, String>,
}

impl FeatureElement {
    /// Whether the element carries a drawable geometry.
    #[must_use]
    pub fn has_geometry(&self) -> bool {
        !self.geometry.is_empty()
    }
}

/// The elements returned by one feature query for one point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSet {
    /// Which query produced this set.
    pub kind: FeatureKind,
    /// The point the query was issued for.
    pub point: PointOfInterest,
    /// Elements in source order.
    pub elements: Vec<FeatureElement>,
}

impl FeatureSet {
    /// Number of elements, including those without geometry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements that have a drawable geometry.
    pub fn drawable(&self) -> impl Iterator<Item = &FeatureElement> {
        self.elements.iter().filter(|e| e.has_geometry())
    }
}

/// Unitless density proxy derived from the residential feature count.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize)]
pub struct DensityScore(f64);

impl DensityScore {
    /// Returns `None` for negative or non-finite values.
    #[must_use]
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value >= 0.0).then_some(Self(value))
    }

    /// The raw score.
    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Radius of the density overlay circle drawn around the point.
    #[must_use]
    pub fn overlay_radius_meters(self) -> f64 {
        self.0 * 100.0
    }
}

/// Current traffic speed in km/h.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize)]
pub struct TrafficSpeed(f64);

impl TrafficSpeed {
    /// Returns `None` for negative or non-finite speeds.
    #[must_use]
    pub fn new(kmh: f64) -> Option<Self> {
        (kmh.is_finite() && kmh >= 0.0).then_some(Self(kmh))
    }

    #[must_use]
    pub const fn kmh(self) -> f64 {
        self.0
    }
}
