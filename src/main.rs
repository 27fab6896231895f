//! venue-nav - indoor geofencing and wayfinding session
//!
//! Loads a venue, replays or streams location fixes through one session and
//! writes geofence and route events to a JSONL egress file.
//!
//! Module structure:
//! - `domain/` - Core types (fixes, geofences, floor plans, routes, venue)
//! - `geometry/` - Geodesic and planar math
//! - `io/` - External interfaces (venue file, fix source, egress)
//! - `services/` - Business logic (GeofenceIndex, WayfindingGraph, Session)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use venue_nav::domain::LatLngFloor;
use venue_nav::infra::{Config, Metrics};
use venue_nav::io::{create_egress_channel, load_venue, run_fix_source, Egress};
use venue_nav::services::{create_route_worker, create_session_channel, Session, WayfindingGraph};

/// Indoor geofence and wayfinding session
#[derive(Parser, Debug)]
#[command(name = "venue-nav", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    /// Venue descriptor (overrides venue.file)
    #[arg(long)]
    venue: Option<String>,

    /// Fix source: JSONL file or "-" for stdin (overrides fixes.source)
    #[arg(long)]
    fixes: Option<String>,

    /// Destination as "lat,lon,floor"
    #[arg(long, allow_hyphen_values = true)]
    destination: Option<LatLngFloor>,

    /// Destination by point-of-interest id
    #[arg(long, conflicts_with = "destination")]
    poi: Option<String>,

    /// Pin every fix to this floor
    #[arg(long, allow_negative_numbers = true)]
    lock_floor: Option<i32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-fix visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "venue-nav starting");

    let args = Args::parse();

    let mut config = Config::load_from_path(&args.config);
    if let Some(venue) = &args.venue {
        config = config.with_venue_file(venue.clone());
    }
    if let Some(fixes) = &args.fixes {
        config = config.with_fix_source(fixes.clone());
    }

    info!(
        config_file = %config.config_file(),
        venue_file = %config.venue_file(),
        fix_source = %config.fix_source(),
        egress_file = %config.egress_file(),
        reroute_threshold_m = %config.reroute_threshold_m(),
        distance_filter_m = %config.distance_filter_m(),
        time_filter_ms = %config.time_filter_ms(),
        "config_loaded"
    );

    let venue = load_venue(config.venue_file(), config.poi_geofence_radius_m())?;

    // Resolve before the venue moves into the session
    let destination = match (&args.destination, &args.poi) {
        (Some(target), _) => Some(*target),
        (None, Some(poi_id)) => {
            let poi = venue
                .poi(poi_id)
                .with_context(|| format!("Unknown point of interest {poi_id} in venue {}", venue.id))?;
            Some(poi.position)
        }
        (None, None) => None,
    };

    let metrics = Arc::new(Metrics::new());

    // Start with an empty graph; replace_venue installs the real one
    let empty_graph = WayfindingGraph::new(Vec::new(), &[], config.graph_config())?;
    let (router, worker, route_results) =
        create_route_worker(empty_graph, metrics.clone(), config.route_worker_capacity());
    let worker_handle = tokio::spawn(worker.run());

    let mut session = Session::new(config.clone(), router, metrics.clone());
    session.replace_venue(venue)?;

    let (egress_sender, egress_rx) =
        create_egress_channel(config.egress_channel_capacity(), session.trace_id().to_string(), metrics.clone());
    session.add_listener(Arc::new(egress_sender.clone()));
    let egress = Egress::new(config.egress_file());
    let egress_handle = tokio::spawn(egress.run(egress_rx));

    if let Some(level) = args.lock_floor {
        session.lock_floor(level);
    }
    if let Some(target) = destination {
        session.set_destination(target);
    }

    let (handle, cmd_rx) = create_session_channel(config.session_channel_capacity(), metrics.clone());

    // Metrics reporter: log and egress a summary every interval (0 disables)
    let metrics_interval = config.metrics_interval_secs();
    let reporter = (metrics_interval > 0).then(|| {
        let reporter_metrics = metrics.clone();
        let reporter_egress = egress_sender.clone();
        let snapshot = session.snapshot_handle();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
            // First tick fires immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let monitored = snapshot.read().monitored_geofences;
                let summary = reporter_metrics.report(monitored);
                summary.log();
                reporter_egress.send_metrics(&summary);
            }
        })
    });

    let source = config.fix_source().to_string();
    let replay_interval = Duration::from_millis(config.replay_interval_ms());
    let source_metrics = metrics.clone();
    let mut source_task = tokio::spawn(async move {
        if let Err(e) = run_fix_source(&source, handle, source_metrics, replay_interval).await {
            error!(error = %format!("{e:#}"), "fix_source_failed");
        }
    });

    // Ctrl+C stops the source; dropping its handle ends the session loop
    let abort = source_task.abort_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        abort.abort();
    });

    session.run(cmd_rx, route_results).await;

    if let Err(e) = (&mut source_task).await {
        if !e.is_cancelled() {
            warn!(error = %e, "fix_source_task_failed");
        }
    }

    if let Some(reporter) = reporter {
        reporter.abort();
        reporter.await.ok();
    }
    let summary = metrics.report(session.index().len());
    summary.log();
    egress_sender.send_metrics(&summary);

    // Dropping the last senders lets the worker and egress writer finish
    drop(session);
    drop(egress_sender);
    worker_handle.await.ok();
    let written = egress_handle.await.unwrap_or(0);

    info!(events_written = %written, "venue-nav shutdown complete");
    Ok(())
}
