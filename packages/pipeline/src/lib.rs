#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Location-triggered aggregation pipeline.
//!
//! Every new point of interest starts a *generation*. A generation runs:
//!
//! 1. the road, building and residential feature queries concurrently,
//! 2. the density estimate from the residential features,
//! 3. the traffic query, only once density is known,
//! 4. the classifier, only once both speed and density are known,
//!
//! and then publishes a single terminal [`PipelineResult`].
//!
//! The published state lives in one `tokio::sync::watch` slot holding the
//! current generation number together with its result. Starting a
//! generation and publishing a result both happen under the slot's lock,
//! and a result is only written if its generation is still the current
//! one. In-flight queries of a superseded generation are allowed to finish
//! but their results are dropped on arrival.

pub mod config;
pub mod retry;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cellplan_classifier::{DensityEstimator, Thresholds};
use cellplan_feeds::overpass::OverpassClient;
use cellplan_feeds::tomtom::TomTomClient;
use cellplan_feeds::{FeatureSource, QueryError, TrafficSource};
use cellplan_models::{
    AvailableData, CoordinateError, FeatureKind, FeatureSet, PipelineResult, PipelineStatus,
    PointOfInterest, SourceFailure, SourceName, TrafficSpeed,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, DEFAULT_RADIUS_METERS, PipelineConfig};
use crate::retry::{RetryPolicy, run_query};

/// Identifies one aggregation attempt. Strictly increasing; `0` means no
/// point has been set yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of the current generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No point has been set.
    Idle,
    /// Queries for the current point are in flight.
    Fetching,
    /// Every source succeeded.
    Complete,
    /// Some sources failed.
    PartialFailure,
    /// No source produced data.
    Failed,
}

/// The single published slot: the current generation and its result.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    /// Generation the point and result belong to.
    pub generation: Generation,
    /// `None` only while idle.
    pub point: Option<PointOfInterest>,
    /// Pending until the generation finishes.
    pub result: PipelineResult,
}

impl Published {
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        if self.point.is_none() {
            return PipelineState::Idle;
        }
        match self.result.status() {
            PipelineStatus::Loading => PipelineState::Fetching,
            PipelineStatus::Partial => PipelineState::PartialFailure,
            PipelineStatus::Complete => PipelineState::Complete,
            PipelineStatus::Failed => PipelineState::Failed,
        }
    }
}

/// Tunables the orchestrator needs at run time.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Search radius of the feature queries.
    pub radius_meters: u32,
    /// Residential count to density conversion.
    pub estimator: DensityEstimator,
    /// Classifier rule thresholds.
    pub thresholds: Thresholds,
    /// Retry policy applied to every query.
    pub retry: RetryPolicy,
    /// Per-attempt timeout applied to every query.
    pub query_timeout: Option<Duration>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            radius_meters: DEFAULT_RADIUS_METERS,
            estimator: DensityEstimator::default(),
            thresholds: Thresholds::DEFAULT,
            retry: RetryPolicy::default(),
            query_timeout: None,
        }
    }
}

impl PipelineSettings {
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the density divisor is invalid.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            radius_meters: config.overpass.radius_meters,
            estimator: config.density_estimator()?,
            thresholds: config.classifier,
            retry: config.retry,
            query_timeout: config.timeouts.query_timeout(),
        })
    }
}

/// Orchestrates the feature and traffic queries for the current point.
pub struct AggregationPipeline {
    features: Arc<dyn FeatureSource>,
    traffic: Arc<dyn TrafficSource>,
    settings: PipelineSettings,
    slot: watch::Sender<Published>,
}

impl AggregationPipeline {
    /// Creates an idle pipeline over the given sources.
    #[must_use]
    pub fn new(
        features: Arc<dyn FeatureSource>,
        traffic: Arc<dyn TrafficSource>,
        settings: PipelineSettings,
    ) -> Self {
        let (slot, _) = watch::channel(Published {
            generation: Generation::default(),
            point: None,
            result: PipelineResult::Pending,
        });

        Self {
            features,
            traffic,
            settings,
            slot,
        }
    }

    /// Builds a pipeline talking to the Overpass and `TomTom` endpoints
    /// named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if no traffic credential is
    /// configured or a value is out of range.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let credential = config.credential().ok_or_else(|| ConfigError::Invalid {
            message: "traffic.api_key is not set (set TOMTOM_API_KEY)".to_string(),
        })?;

        let client = reqwest::Client::new();
        let features = OverpassClient::new(client.clone(), config.overpass.endpoint.clone());
        let traffic = TomTomClient::new(
            client,
            config.traffic.endpoint.clone(),
            config.traffic.unit.clone(),
            credential,
        );

        Ok(Self::new(
            Arc::new(features),
            Arc::new(traffic),
            PipelineSettings::from_config(config)?,
        ))
    }

    #[must_use]
    pub const fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Receives every change of the published slot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Published> {
        self.slot.subscribe()
    }

    /// A copy of the published slot.
    #[must_use]
    pub fn current(&self) -> Published {
        self.slot.borrow().clone()
    }

    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.slot.borrow().generation == generation
    }

    /// Normalizes the coordinate, starts a new generation for it and runs
    /// the generation in a background task.
    ///
    /// The task resolves to the result it published, or `None` if a newer
    /// point superseded it first.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinateError`] if the coordinate is not finite; the
    /// current generation is left untouched in that case.
    pub fn set_point_of_interest(
        self: &Arc<Self>,
        latitude: f64,
        longitude: f64,
    ) -> Result<JoinHandle<Option<PipelineResult>>, CoordinateError> {
        let point = PointOfInterest::new(latitude, longitude)?;
        let generation = self.begin(point);
        let pipeline = Arc::clone(self);

        Ok(tokio::spawn(async move {
            pipeline.run(generation, point).await
        }))
    }

    /// Starts a new generation for `point`: bumps the counter and resets
    /// the published result to [`PipelineResult::Pending`].
    pub fn begin(&self, point: PointOfInterest) -> Generation {
        let mut generation = Generation::default();
        self.slot.send_modify(|published| {
            published.generation = published.generation.next();
            published.point = Some(point);
            published.result = PipelineResult::Pending;
            generation = published.generation;
        });

        log::info!(
            "Generation {generation}: analyzing ({}, {})",
            point.latitude(),
            point.longitude()
        );
        generation
    }

    /// Runs `generation` to completion and publishes its result.
    ///
    /// Returns the published result, or `None` if the generation was
    /// superseded and nothing was published.
    pub async fn run(
        &self,
        generation: Generation,
        point: PointOfInterest,
    ) -> Option<PipelineResult> {
        let result = self.aggregate(generation, point).await?;
        self.publish(generation, result.clone()).then_some(result)
    }

    /// Writes `result` if `generation` is still current. Returns whether
    /// it was written.
    fn publish(&self, generation: Generation, result: PipelineResult) -> bool {
        let status = result.status();
        let written = self.slot.send_if_modified(|published| {
            if published.generation != generation {
                return false;
            }
            published.result = result;
            true
        });

        if written {
            log::info!("Generation {generation}: {status}");
        } else {
            log::debug!("Generation {generation}: superseded, discarding {status} result");
        }
        written
    }

    /// Runs every stage. Returns `None` as soon as the generation is
    /// found to be stale.
    async fn aggregate(
        &self,
        generation: Generation,
        point: PointOfInterest,
    ) -> Option<PipelineResult> {
        let (roads, buildings, residential) = futures::future::join3(
            self.query_features(generation, point, FeatureKind::Roads),
            self.query_features(generation, point, FeatureKind::Buildings),
            self.query_features(generation, point, FeatureKind::Residential),
        )
        .await;

        if !self.is_current(generation) {
            log::debug!("Generation {generation}: superseded before density");
            return None;
        }

        let mut failures = Vec::new();
        let roads = record(roads, FeatureKind::Roads.source(), &mut failures);
        let buildings = record(buildings, FeatureKind::Buildings.source(), &mut failures);
        let residential = record(residential, FeatureKind::Residential.source(), &mut failures);

        let density_score = residential
            .as_ref()
            .map(|set| self.settings.estimator.estimate(&set.elements));

        // Without density there is nothing to classify, so traffic is not
        // queried at all.
        let traffic_speed = match density_score {
            Some(_) => {
                let speed = self.query_speed(generation, point).await;
                if !self.is_current(generation) {
                    log::debug!("Generation {generation}: superseded before classification");
                    return None;
                }
                record(speed, SourceName::Traffic, &mut failures)
            }
            None => None,
        };

        let config = match (traffic_speed, density_score) {
            (Some(speed), Some(density)) => Some(self.settings.thresholds.classify(speed, density)),
            _ => None,
        };

        failures.sort_by_key(|f| f.source);

        Some(match (roads, buildings, density_score, traffic_speed, config) {
            (Some(roads), Some(buildings), Some(density_score), Some(traffic_speed), Some(config))
                if failures.is_empty() =>
            {
                PipelineResult::Complete {
                    roads,
                    buildings,
                    density_score,
                    traffic_speed,
                    config,
                }
            }
            (roads, buildings, density_score, traffic_speed, config) => {
                let data = AvailableData {
                    roads,
                    buildings,
                    density_score,
                    traffic_speed,
                    config,
                };
                if data.is_empty() {
                    PipelineResult::Failed {
                        reason: failure_reason(&failures),
                        failures,
                    }
                } else {
                    PipelineResult::PartialFailure { failures, data }
                }
            }
        })
    }

    async fn query_features(
        &self,
        generation: Generation,
        point: PointOfInterest,
        kind: FeatureKind,
    ) -> Result<FeatureSet, QueryError> {
        let label = format!("Generation {generation} {kind}");
        run_query(
            &label,
            &self.settings.retry,
            self.settings.query_timeout,
            || self.is_current(generation),
            || {
                self.features
                    .fetch_features(point, kind, self.settings.radius_meters)
            },
        )
        .await
    }

    async fn query_speed(
        &self,
        generation: Generation,
        point: PointOfInterest,
    ) -> Result<TrafficSpeed, QueryError> {
        let label = format!("Generation {generation} traffic");
        run_query(
            &label,
            &self.settings.retry,
            self.settings.query_timeout,
            || self.is_current(generation),
            || self.traffic.fetch_speed(point),
        )
        .await
    }
}

/// Keeps the value of a successful query or records its failure.
fn record<T>(
    result: Result<T, QueryError>,
    source: SourceName,
    failures: &mut Vec<SourceFailure>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("{source} query failed: {e}");
            failures.push(SourceFailure {
                source,
                kind: e.kind(),
                message: e.to_string(),
            });
            None
        }
    }
}

fn failure_reason(failures: &[SourceFailure]) -> String {
    let parts: Vec<String> = failures
        .iter()
        .map(|f| format!("{} ({})", f.source, f.kind))
        .collect();
    format!("no source returned data: {}", parts.join(", "))
}
