#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal front end for the aggregation pipeline.
//!
//! ```text
//! TOMTOM_API_KEY=... cellplan [--config cellplan.toml] [--lat 47.51 --lon 6.80]
//! ```
//!
//! The starting point is analyzed right away. Every further `lat,lon` line
//! read from stdin acts as a map click and supersedes the analysis still in
//! flight. The program exits once stdin is closed and the latest analysis
//! has settled.

use std::path::PathBuf;
use std::sync::Arc;

use cellplan_pipeline::config::PipelineConfig;
use cellplan_pipeline::{AggregationPipeline, PipelineState, Published};
use cellplan_shell::{DEFAULT_LATITUDE, DEFAULT_LONGITUDE, parse_click, render};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(
    name = "cellplan",
    about = "Recommend a 5G NR configuration for map locations"
)]
struct Args {
    /// TOML configuration file (defaults to the built-in configuration)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Latitude of the first point analyzed
    #[arg(long, default_value_t = DEFAULT_LATITUDE, allow_negative_numbers = true)]
    lat: f64,

    /// Longitude of the first point analyzed
    #[arg(long, default_value_t = DEFAULT_LONGITUDE, allow_negative_numbers = true)]
    lon: f64,

    /// Analyze the starting point only, without reading stdin
    #[arg(long)]
    once: bool,

    /// Print each update as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let args = Args::parse();

    let config = PipelineConfig::load(args.config.as_deref())?;
    let pipeline = Arc::new(AggregationPipeline::from_config(&config)?);

    let mut updates = pipeline.subscribe();
    pipeline.set_point_of_interest(args.lat, args.lon)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut reading = !args.once;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let published = updates.borrow_and_update().clone();
                print(&published, args.json)?;
                if !reading && published.state() != PipelineState::Fetching {
                    break;
                }
            }
            line = lines.next_line(), if reading => {
                let Some(line) = line? else {
                    reading = false;
                    if !updates.has_changed()?
                        && pipeline.current().state() != PipelineState::Fetching
                    {
                        break;
                    }
                    continue;
                };
                click(&pipeline, &line);
            }
        }
    }

    Ok(())
}

fn click(pipeline: &Arc<AggregationPipeline>, line: &str) {
    if line.trim().is_empty() {
        return;
    }

    let started = parse_click(line)
        .map_err(|e| e.to_string())
        .and_then(|(lat, lon)| {
            pipeline
                .set_point_of_interest(lat, lon)
                .map_err(|e| e.to_string())
        });

    if let Err(e) = started {
        log::warn!("Ignoring click: {e}");
        eprintln!("{e}");
    }
}

fn print(published: &Published, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", serde_json::to_string(&published.result.view())?);
    } else {
        println!("{}\n", render(published));
    }
    Ok(())
}
