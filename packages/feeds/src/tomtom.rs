//! `TomTom` Traffic Flow client.
//!
//! Queries the flow segment nearest to a point using the absolute style
//! at zoom level 10 and reads `flowSegmentData.currentSpeed`. Points that
//! are not close to any tracked segment yield [`QueryError::NoData`],
//! whether the server answers `200` without a segment or `400` with an
//! error body.
//!
//! See <https://developer.tomtom.com/traffic-api/documentation/traffic-flow/flow-segment-data>

use async_trait::async_trait;
use cellplan_models::{PointOfInterest, TrafficSpeed};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::{Credential, QueryError, TrafficSource, preview};

/// Style and zoom appended to the flow segment endpoint.
pub const FLOW_SEGMENT_PATH: &str = "absolute/10/json";

const BODY_PREVIEW_LEN: usize = 300;

/// Client for the `flowSegmentData` endpoint.
#[derive(Debug, Clone)]
pub struct TomTomClient {
    client: reqwest::Client,
    endpoint: String,
    unit: String,
    credential: Credential,
}

impl TomTomClient {
    /// Creates a client. `endpoint` is the `flowSegmentData` base URL
    /// (e.g. `"https://api.tomtom.com/traffic/services/4/flowSegmentData"`)
    /// and `unit` the speed unit requested (`"KMPH"`).
    #[must_use]
    pub const fn new(
        client: reqwest::Client,
        endpoint: String,
        unit: String,
        credential: Credential,
    ) -> Self {
        Self {
            client,
            endpoint,
            unit,
            credential,
        }
    }

    /// Full request URL without query parameters.
    #[must_use]
    pub fn flow_segment_url(&self) -> String {
        format!(
            "{}/{FLOW_SEGMENT_PATH}",
            self.endpoint.trim_end_matches('/')
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowResponse {
    #[serde(default)]
    flow_segment_data: Option<FlowSegmentData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowSegmentData {
    current_speed: f64,
    #[serde(default)]
    free_flow_speed: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parses a flow segment JSON body into the current speed.
///
/// # Errors
///
/// Returns [`QueryError::NoData`] if `flowSegmentData` is absent and
/// [`QueryError::MalformedResponse`] if the body is not JSON or the speed
/// is missing, negative, or not finite.
pub fn parse_response(body: &str) -> Result<TrafficSpeed, QueryError> {
    let response: FlowResponse = serde_json::from_str(body).map_err(|e| {
        log::debug!(
            "TomTom response did not parse: {e}\n  body preview: {}",
            preview(body, BODY_PREVIEW_LEN)
        );
        QueryError::from(e)
    })?;

    let Some(segment) = response.flow_segment_data else {
        return Err(QueryError::NoData);
    };

    log::debug!(
        "TomTom segment: current={} free_flow={:?} confidence={:?}",
        segment.current_speed,
        segment.free_flow_speed,
        segment.confidence
    );

    TrafficSpeed::new(segment.current_speed).ok_or_else(|| QueryError::MalformedResponse {
        message: format!("currentSpeed {} is not a valid speed", segment.current_speed),
    })
}

/// Maps a non-success response to an error.
///
/// Points away from every tracked segment are answered with `400` or `404`
/// and a JSON error body without `flowSegmentData`; those are
/// [`QueryError::NoData`]. Everything else (auth errors, `429`, `5xx`,
/// non-JSON bodies) is [`QueryError::SourceUnavailable`].
#[must_use]
pub fn status_error(status: StatusCode, body: &str) -> QueryError {
    let off_segment = matches!(status, StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND)
        && serde_json::from_str::<FlowResponse>(body)
            .is_ok_and(|response| response.flow_segment_data.is_none());

    if off_segment {
        log::debug!(
            "TomTom {status}: no segment near point: {}",
            preview(body, BODY_PREVIEW_LEN)
        );
        return QueryError::NoData;
    }

    QueryError::SourceUnavailable {
        message: format!("TomTom returned status {status}"),
    }
}

#[async_trait]
impl TrafficSource for TomTomClient {
    async fn fetch_speed(&self, point: PointOfInterest) -> Result<TrafficSpeed, QueryError> {
        let point_param = format!("{},{}", point.latitude(), point.longitude());
        log::debug!("TomTom flow query at {point_param}");

        let resp = self
            .client
            .get(self.flow_segment_url())
            .query(&[
                ("point", point_param.as_str()),
                ("unit", self.unit.as_str()),
                ("key", self.credential.expose()),
            ])
            .send()
            .await
            // reqwest includes the URL (and so the key) in its messages.
            .map_err(|e| QueryError::SourceUnavailable {
                message: e.without_url().to_string(),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| QueryError::SourceUnavailable {
            message: e.without_url().to_string(),
        })?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::serve_once;

    #[test]
    fn parses_current_speed() {
        let body = serde_json::json!({
            "flowSegmentData": {
                "frc": "FRC2",
                "currentSpeed": 71,
                "freeFlowSpeed": 90,
                "currentTravelTime": 120,
                "freeFlowTravelTime": 95,
                "confidence": 0.97,
                "roadClosure": false
            }
        })
        .to_string();

        let speed = parse_response(&body).unwrap();
        assert!((speed.kmh() - 71.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_segment_is_no_data() {
        assert_eq!(parse_response("{}").unwrap_err(), QueryError::NoData);
        assert_eq!(
            parse_response(r#"{"flowSegmentData": null}"#).unwrap_err(),
            QueryError::NoData
        );
    }

    #[test]
    fn missing_speed_is_malformed() {
        let err = parse_response(r#"{"flowSegmentData": {"frc": "FRC0"}}"#).unwrap_err();
        assert!(matches!(err, QueryError::MalformedResponse { .. }));
    }

    #[test]
    fn negative_speed_is_malformed() {
        let err = parse_response(r#"{"flowSegmentData": {"currentSpeed": -3}}"#).unwrap_err();
        assert!(matches!(err, QueryError::MalformedResponse { .. }));
    }

    #[test]
    fn non_json_is_malformed() {
        let err = parse_response("Developer Inactive").unwrap_err();
        assert!(matches!(err, QueryError::MalformedResponse { .. }));
    }

    #[test]
    fn url_appends_flow_segment_path() {
        let client = TomTomClient::new(
            reqwest::Client::new(),
            "https://api.tomtom.com/traffic/services/4/flowSegmentData/".to_string(),
            "KMPH".to_string(),
            Credential::new("k".to_string()),
        );
        assert_eq!(
            client.flow_segment_url(),
            "https://api.tomtom.com/traffic/services/4/flowSegmentData/absolute/10/json"
        );
    }

    fn client(endpoint: String) -> TomTomClient {
        TomTomClient::new(
            reqwest::Client::new(),
            endpoint,
            "KMPH".to_string(),
            Credential::new("super-secret".to_string()),
        )
    }

    fn point() -> PointOfInterest {
        PointOfInterest::new(47.5103, 6.7984).unwrap()
    }

    const TOO_FAR: &str = concat!(
        r#"{"error":"Point too far from nearest existing segment.","httpStatusCode":400,"#,
        r#""detailedError":{"code":"INVALID_REQUEST","#,
        r#""message":"Point too far from nearest existing segment."}}"#,
    );

    #[test]
    fn off_segment_error_body_is_no_data() {
        assert_eq!(status_error(StatusCode::BAD_REQUEST, TOO_FAR), QueryError::NoData);
        assert_eq!(status_error(StatusCode::NOT_FOUND, "{}"), QueryError::NoData);
    }

    #[test]
    fn other_statuses_are_unavailable() {
        for (status, body) in [
            (StatusCode::SERVICE_UNAVAILABLE, "{}"),
            (StatusCode::TOO_MANY_REQUESTS, TOO_FAR),
            (StatusCode::FORBIDDEN, "{}"),
            (StatusCode::BAD_REQUEST, "<h1>Developer Inactive</h1>"),
        ] {
            let err = status_error(status, body);
            assert!(matches!(err, QueryError::SourceUnavailable { .. }), "{status}: {err:?}");
        }
    }

    #[tokio::test]
    async fn point_away_from_roads_is_no_data() {
        let endpoint = serve_once("400 Bad Request", TOO_FAR).await;

        let err = client(endpoint).fetch_speed(point()).await.unwrap_err();

        assert_eq!(err, QueryError::NoData);
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let endpoint = serve_once("503 Service Unavailable", r#"{"error":"busy"}"#).await;

        let err = client(endpoint).fetch_speed(point()).await.unwrap_err();

        assert!(matches!(err, QueryError::SourceUnavailable { .. }), "{err:?}");
        assert!(!err.to_string().contains("super-secret"));
    }

    #[tokio::test]
    async fn successful_response_is_parsed() {
        let endpoint = serve_once("200 OK", r#"{"flowSegmentData":{"currentSpeed":64}}"#).await;

        let speed = client(endpoint).fetch_speed(point()).await.unwrap();

        assert!((speed.kmh() - 64.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable_without_leaking_key() {
        let client = client("http://127.0.0.1:9/flowSegmentData".to_string());
        let err = client.fetch_speed(point()).await.unwrap_err();
        assert!(matches!(err, QueryError::SourceUnavailable { .. }));
        assert!(!err.to_string().contains("super-secret"));
    }
}
