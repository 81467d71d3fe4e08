//! Overpass API client for map feature queries.
//!
//! Each query selects ways carrying one tag filter within a radius of the
//! point and asks for `out geom`, so every way arrives with its vertex
//! list inline.
//!
//! See <https://wiki.openstreetmap.org/wiki/Overpass_API/Overpass_QL>

use std::collections::BTreeMap;

use async_trait::async_trait;
use cellplan_models::{FeatureElement, FeatureKind, FeatureSet, LatLon, PointOfInterest};
use serde::Deserialize;

use crate::{FeatureSource, QueryError, preview};

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// Client for an Overpass `interpreter` endpoint.
#[derive(Debug, Clone)]
pub struct OverpassClient {
    client: reqwest::Client,
    endpoint: String,
}

impl OverpassClient {
    /// Creates a client for `endpoint` (e.g.
    /// `"https://overpass-api.de/api/interpreter"`).
    #[must_use]
    pub const fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Builds the Overpass QL text selecting ways of `kind` around `point`.
#[must_use]
pub fn build_query(point: PointOfInterest, kind: FeatureKind, radius_meters: u32) -> String {
    format!(
        "[out:json];\nway[{selector}](around:{radius_meters},{lat},{lon});\nout geom;",
        selector = kind.tag_selector(),
        lat = point.latitude(),
        lon = point.longitude(),
    )
}

#[derive(Deserialize)]
struct OverpassResponse {
    elements: Vec<OverpassElement>,
    /// Set by the server when the query ran into a runtime limit.
    #[serde(default)]
    remark: Option<String>,
}

#[derive(Deserialize)]
struct OverpassElement {
    id: u64,
    /// Vertices outside the server's clipping area come back as `null`.
    #[serde(default)]
    geometry: Vec<Option<LatLon>>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Parses an Overpass JSON body into a [`FeatureSet`].
///
/// # Errors
///
/// Returns [`QueryError::MalformedResponse`] if the body is not JSON or
/// lacks the `elements` array.
pub fn parse_response(
    body: &str,
    kind: FeatureKind,
    point: PointOfInterest,
) -> Result<FeatureSet, QueryError> {
    let response: OverpassResponse = serde_json::from_str(body).map_err(|e| {
        log::debug!(
            "Overpass {kind} response did not parse: {e}\n  body preview: {}",
            preview(body, BODY_PREVIEW_LEN)
        );
        QueryError::from(e)
    })?;

    if let Some(remark) = &response.remark {
        log::warn!("Overpass {kind} query returned a remark: {remark}");
    }

    let elements = response
        .elements
        .into_iter()
        .map(|element| FeatureElement {
            id: element.id,
            geometry: element.geometry.into_iter().flatten().collect(),
            tags: element.tags,
        })
        .collect();

    Ok(FeatureSet {
        kind,
        point,
        elements,
    })
}

#[async_trait]
impl FeatureSource for OverpassClient {
    async fn fetch_features(
        &self,
        point: PointOfInterest,
        kind: FeatureKind,
        radius_meters: u32,
    ) -> Result<FeatureSet, QueryError> {
        let query = build_query(point, kind, radius_meters);
        log::debug!("Overpass {kind} query: {}", query.replace('\n', " "));

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("data", query.as_str())])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(QueryError::SourceUnavailable {
                message: format!("Overpass returned status {}", resp.status()),
            });
        }

        let body = resp.text().await?;
        let features = parse_response(&body, kind, point)?;
        log::debug!("Overpass {kind}: {} elements", features.len());
        Ok(features)
    }
}
