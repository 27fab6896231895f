//! One-shot route query against a venue descriptor
//!
//! Prints the route as JSON on stdout, together with the legs clipped to
//! each floor plan in image pixels.
//!
//! Usage:
//!   cargo run --bin venue-route -- --venue venue.json --from 60.17,24.94,0 --to-poi cafe

use anyhow::{bail, Context};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use venue_nav::domain::{LatLngFloor, Route, Venue};
use venue_nav::infra::{Config, Metrics};
use venue_nav::io::load_venue;
use venue_nav::services::{create_route_worker, WayfindingGraph};

#[derive(Parser, Debug)]
#[command(name = "venue-route", version, about = "Compute one route through a venue")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// Venue descriptor (overrides venue.file)
    #[arg(long)]
    venue: Option<String>,

    /// Origin as "lat,lon,floor"
    #[arg(long, allow_hyphen_values = true)]
    from: LatLngFloor,

    /// Destination as "lat,lon,floor"
    #[arg(long, allow_hyphen_values = true, required_unless_present = "to_poi")]
    to: Option<LatLngFloor>,

    /// Destination by point-of-interest id
    #[arg(long, conflicts_with = "to")]
    to_poi: Option<String>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

/// A leg drawn on a floor plan, in image pixels
#[derive(Debug, Serialize)]
struct PlanSegment {
    leg: usize,
    floor_plan: String,
    start_px: [f64; 2],
    end_px: [f64; 2],
}

#[derive(Debug, Serialize)]
struct RouteOutput<'a> {
    venue: &'a str,
    from: LatLngFloor,
    to: LatLngFloor,
    length_m: f64,
    route: &'a Route,
    segments: Vec<PlanSegment>,
}

fn plan_segments(venue: &Venue, route: &Route) -> Vec<PlanSegment> {
    let mut segments = Vec::new();
    for (i, leg) in route.legs.iter().enumerate() {
        for plan in &venue.floor_plans {
            if let Some((a, b)) = plan.clip_leg(leg) {
                let (pa, pb) = (plan.local_to_pixel(&a), plan.local_to_pixel(&b));
                segments.push(PlanSegment {
                    leg: i,
                    floor_plan: plan.id().to_string(),
                    start_px: [pa.x, pa.y],
                    end_px: [pb.x, pb.y],
                });
            }
        }
    }
    segments
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays pure JSON
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::load_from_path(&args.config);
    if let Some(venue) = &args.venue {
        config = config.with_venue_file(venue.clone());
    }

    let venue = load_venue(config.venue_file(), config.poi_geofence_radius_m())?;
    let to = match (args.to, &args.to_poi) {
        (Some(to), _) => to,
        (None, Some(poi_id)) => {
            venue
                .poi(poi_id)
                .with_context(|| format!("Unknown point of interest {poi_id} in venue {}", venue.id))?
                .position
        }
        (None, None) => bail!("either --to or --to-poi is required"),
    };

    let graph = WayfindingGraph::from_venue(&venue, config.graph_config())
        .with_context(|| format!("Invalid routing graph in venue {}", venue.id))?;
    info!(nodes = %graph.node_count(), edges = %graph.edge_count(), "graph_loaded");

    let metrics = Arc::new(Metrics::new());
    let (router, worker, _results) = create_route_worker(graph, metrics, 1);
    let worker_handle = tokio::spawn(worker.run());

    let route = router.request_route(args.from.into(), to.into()).await;
    drop(router);
    worker_handle.await.ok();

    if let Some(error) = route.error {
        bail!("no route from {} to {}: {}", args.from, to, error);
    }

    let output = RouteOutput {
        venue: &venue.id,
        from: args.from,
        to,
        length_m: route.length(),
        segments: plan_segments(&venue, &route),
        route: &route,
    };
    let json = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_config_path_from_env_or_flag() {
        let command = Args::command();
        let config = command.get_arguments().find(|a| a.get_id() == "config").unwrap();
        assert_eq!(config.get_env().and_then(|v| v.to_str()), Some("CONFIG_FILE"));

        let args =
            Args::try_parse_from(["venue-route", "--config=config/mall.toml", "--from", "60.17,24.94,0", "--to-poi", "cafe"])
                .unwrap();
        assert_eq!(args.config, "config/mall.toml");
        assert_eq!(args.to_poi.as_deref(), Some("cafe"));
    }
}
