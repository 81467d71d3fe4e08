//! Externally visible outcome of one analysis.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

use crate::{DensityScore, FeatureSet, NetworkConfig, SourceName, TrafficSpeed};

/// How a source failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Transport or HTTP failure, including timeouts.
    SourceUnavailable,
    /// The body could not be parsed into the expected shape.
    MalformedResponse,
    /// Well-formed response without the expected data.
    NoData,
}

/// One failed source and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    /// Which source failed.
    pub source: SourceName,
    /// Failure category.
    pub kind: FailureKind,
    /// Error message as reported by the client.
    pub message: String,
}

/// Whatever data a partially failed analysis still produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvailableData {
    /// Road ways, if the road query succeeded.
    pub roads: Option<FeatureSet>,
    /// Building ways, if the building query succeeded.
    pub buildings: Option<FeatureSet>,
    /// Present when the residential query succeeded.
    pub density_score: Option<DensityScore>,
    /// Present when the traffic query ran and succeeded.
    pub traffic_speed: Option<TrafficSpeed>,
    /// Present only when both density and speed are.
    pub config: Option<NetworkConfig>,
}

impl AvailableData {
    /// Whether no field holds any data.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.roads.is_none()
            && self.buildings.is_none()
            && self.density_score.is_none()
            && self.traffic_speed.is_none()
    }
}

/// Status tag rendered by the presentation shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PipelineStatus {
    /// Queries are still in flight.
    Loading,
    /// Some sources failed.
    Partial,
    /// Every source succeeded.
    Complete,
    /// No source produced data.
    Failed,
}

/// The result published for a single point of interest.
///
/// Replaced wholesale whenever a newer point supersedes the current one.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResult {
    /// Queries are in flight.
    Pending,
    /// Some sources failed; the rest of the data is kept.
    PartialFailure {
        /// One entry per failed source, ordered by source.
        failures: Vec<SourceFailure>,
        /// What the surviving sources produced.
        data: AvailableData,
    },
    /// No source produced any data.
    Failed {
        /// Summary naming every failed source.
        reason: String,
        /// One entry per failed source, ordered by source.
        failures: Vec<SourceFailure>,
    },
    /// Every source succeeded.
    Complete {
        /// Road ways around the point.
        roads: FeatureSet,
        /// Building ways around the point.
        buildings: FeatureSet,
        /// Density derived from the residential ways.
        density_score: DensityScore,
        /// Current traffic speed at the point.
        traffic_speed: TrafficSpeed,
        /// The recommended configuration.
        config: NetworkConfig,
    },
}

impl PipelineResult {
    /// The status tag for this result.
    #[must_use]
    pub const fn status(&self) -> PipelineStatus {
        match self {
            Self::Pending => PipelineStatus::Loading,
            Self::PartialFailure { .. } => PipelineStatus::Partial,
            Self::Failed { .. } => PipelineStatus::Failed,
            Self::Complete { .. } => PipelineStatus::Complete,
        }
    }

    /// Per-source failure details. Empty unless partial or failed.
    #[must_use]
    pub fn failures(&self) -> &[SourceFailure] {
        match self {
            Self::PartialFailure { failures, .. } | Self::Failed { failures, .. } => failures,
            Self::Pending | Self::Complete { .. } => &[],
        }
    }

    /// Names of the failed sources.
    #[must_use]
    pub fn failed_sources(&self) -> BTreeSet<SourceName> {
        self.failures().iter().map(|f| f.source).collect()
    }

    /// Road ways, if available.
    #[must_use]
    pub const fn roads(&self) -> Option<&FeatureSet> {
        match self {
            Self::Complete { roads, .. } => Some(roads),
            Self::PartialFailure { data, .. } => data.roads.as_ref(),
            Self::Pending | Self::Failed { .. } => None,
        }
    }

    /// Building ways, if available.
    #[must_use]
    pub const fn buildings(&self) -> Option<&FeatureSet> {
        match self {
            Self::Complete { buildings, .. } => Some(buildings),
            Self::PartialFailure { data, .. } => data.buildings.as_ref(),
            Self::Pending | Self::Failed { .. } => None,
        }
    }

    /// Density score, if the residential query succeeded.
    #[must_use]
    pub const fn density_score(&self) -> Option<DensityScore> {
        match self {
            Self::Complete { density_score, .. } => Some(*density_score),
            Self::PartialFailure { data, .. } => data.density_score,
            Self::Pending | Self::Failed { .. } => None,
        }
    }

    /// Traffic speed, if the traffic query ran and succeeded.
    #[must_use]
    pub const fn traffic_speed(&self) -> Option<TrafficSpeed> {
        match self {
            Self::Complete { traffic_speed, .. } => Some(*traffic_speed),
            Self::PartialFailure { data, .. } => data.traffic_speed,
            Self::Pending | Self::Failed { .. } => None,
        }
    }

    /// The recommendation; absent unless both speed and density are known.
    #[must_use]
    pub const fn config(&self) -> Option<NetworkConfig> {
        match self {
            Self::Complete { config, .. } => Some(*config),
            Self::PartialFailure { data, .. } => data.config,
            Self::Pending | Self::Failed { .. } => None,
        }
    }

    /// Flattens the result into the fields the presentation shell renders.
    #[must_use]
    pub fn view(&self) -> ResultView<'_> {
        ResultView {
            status: self.status(),
            failed_sources: self.failed_sources(),
            roads: self.roads(),
            buildings: self.buildings(),
            density_score: self.density_score(),
            traffic_speed: self.traffic_speed(),
            config: self.config(),
        }
    }
}

/// Flat, serializable projection of a [`PipelineResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultView<'a> {
    /// `loading`, `partial`, `complete` or `failed`.
    pub status: PipelineStatus,
    /// Empty unless partial or failed.
    pub failed_sources: BTreeSet<SourceName>,
    /// Road ways, if available.
    pub roads: Option<&'a FeatureSet>,
    /// Building ways, if available.
    pub buildings: Option<&'a FeatureSet>,
    /// Density score, if available.
    pub density_score: Option<DensityScore>,
    /// Traffic speed, if available.
    pub traffic_speed: Option<TrafficSpeed>,
    /// Recommended configuration, if available.
    pub config: Option<NetworkConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FeatureKind, PointOfInterest};

    fn empty_set(kind: FeatureKind) -> FeatureSet {
        FeatureSet {
            kind,
            point: PointOfInterest::new(47.5103, 6.7984).unwrap(),
            elements: Vec::new(),
        }
    }

    #[test]
    fn pending_exposes_nothing() {
        let view = PipelineResult::Pending.view();
        assert_eq!(view.status, PipelineStatus::Loading);
        assert!(view.failed_sources.is_empty());
        assert!(view.roads.is_none());
        assert!(view.config.is_none());
    }

    #[test]
    fn partial_failure_names_failed_sources() {
        let result = PipelineResult::PartialFailure {
            failures: vec![SourceFailure {
                source: SourceName::Traffic,
                kind: FailureKind::NoData,
                message: "no flow segment".to_string(),
            }],
            data: AvailableData {
                roads: Some(empty_set(FeatureKind::Roads)),
                buildings: Some(empty_set(FeatureKind::Buildings)),
                density_score: DensityScore::new(3.0),
                traffic_speed: None,
                config: None,
            },
        };

        assert_eq!(result.status(), PipelineStatus::Partial);
        assert_eq!(
            result.failed_sources(),
            BTreeSet::from([SourceName::Traffic])
        );
        assert!(result.roads().is_some());
        assert_eq!(result.density_score(), DensityScore::new(3.0));
        assert!(result.config().is_none());
    }

    #[test]
    fn view_serializes_status_tags() {
        let result = PipelineResult::Failed {
            reason: "all sources failed".to_string(),
            failures: vec![SourceFailure {
                source: SourceName::Roads,
                kind: FailureKind::SourceUnavailable,
                message: "HTTP 503".to_string(),
            }],
        };
        let json = serde_json::to_value(result.view()).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["failedSources"], serde_json::json!(["roads"]));
        assert!(json["config"].is_null());
    }

    #[test]
    fn available_data_emptiness_ignores_config() {
        assert!(AvailableData::default().is_empty());
        let data = AvailableData {
            traffic_speed: TrafficSpeed::new(12.0),
            ..AvailableData::default()
        };
        assert!(!data.is_empty());
    }
}
