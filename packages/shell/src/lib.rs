#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal rendering of the published pipeline state, and parsing of
//! typed-in map clicks.

use cellplan_models::{FeatureSet, PipelineResult};
use cellplan_pipeline::{PipelineState, Published};

/// Latitude shown before the user picks a point.
pub const DEFAULT_LATITUDE: f64 = 47.5103;
/// Longitude shown before the user picks a point.
pub const DEFAULT_LONGITUDE: f64 = 6.7984;

/// Errors from parsing a `lat,lon` line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClickError {
    /// The line is not two comma-separated values.
    #[error("expected `lat,lon`, got {input:?}")]
    Shape {
        /// The trimmed input line.
        input: String,
    },

    /// One of the two values is not a number.
    #[error("{axis} is not a number: {value:?}")]
    Number {
        /// `latitude` or `longitude`.
        axis: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Parses one `lat,lon` line. Whitespace around either number is ignored,
/// and a semicolon is accepted in place of the comma.
///
/// # Errors
///
/// Returns [`ClickError`] if the line does not hold exactly two numbers.
pub fn parse_click(line: &str) -> Result<(f64, f64), ClickError> {
    let mut parts = line.trim().split([',', ';']);
    let (Some(lat), Some(lon), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ClickError::Shape {
            input: line.trim().to_string(),
        });
    };

    Ok((number("latitude", lat)?, number("longitude", lon)?))
}

fn number(axis: &'static str, value: &str) -> Result<f64, ClickError> {
    value.trim().parse().map_err(|_| ClickError::Number {
        axis,
        value: value.trim().to_string(),
    })
}

/// Renders the published slot as the text the information panel shows.
#[must_use]
pub fn render(published: &Published) -> String {
    let Some(point) = published.point else {
        return "Click the map (type `lat,lon`) to analyze a location.".to_string();
    };
    let header = format!(
        "[{}] ({:.4}, {:.4})",
        published.generation,
        point.latitude(),
        point.longitude()
    );

    let result = &published.result;
    match published.state() {
        PipelineState::Fetching => return format!("{header}\nLoading..."),
        PipelineState::Failed => {
            let reason = match result {
                PipelineResult::Failed { reason, .. } => reason.as_str(),
                _ => "no source returned data",
            };
            return format!("{header}\nAnalysis failed: {reason}");
        }
        PipelineState::Idle | PipelineState::Complete | PipelineState::PartialFailure => {}
    }

    let mut lines = vec![header];

    match result.config() {
        Some(config) => {
            lines.push(format!("Recommended: {config}"));
            lines.push(format!("  {}", config.description()));
        }
        None => lines.push("Recommended: unavailable".to_string()),
    }

    lines.push(format!("Roads: {}", drawable(result.roads())));
    lines.push(format!("Buildings: {}", drawable(result.buildings())));

    lines.push(result.density_score().map_or_else(
        || "Density: unavailable".to_string(),
        |density| {
            format!(
                "Density: {:.1} (overlay radius {:.0} m)",
                density.value(),
                density.overlay_radius_meters()
            )
        },
    ));

    lines.push(result.traffic_speed().map_or_else(
        || "Traffic: unavailable".to_string(),
        |speed| format!("Traffic: {:.1} km/h", speed.kmh()),
    ));

    let failed: Vec<String> = result
        .failures()
        .iter()
        .map(|f| format!("{} ({})", f.source, f.kind))
        .collect();
    if !failed.is_empty() {
        lines.push(format!("Failed sources: {}", failed.join(", ")));
    }

    lines.join("\n")
}

fn drawable(set: Option<&FeatureSet>) -> String {
    set.map_or_else(
        || "unavailable".to_string(),
        |set| format!("{} drawn", set.drawable().count()),
    )
}
