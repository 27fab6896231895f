//! Venue descriptor loading
//!
//! Reads the venue JSON (floor plans, geofences, POIs, routing graph) and
//! turns it into a validated [`Venue`]. Malformed geofences and inconsistent
//! floor plans are logged and skipped so a single bad entry does not take the
//! whole venue down; a malformed document or graph shape is an error.

use crate::domain::floor_plan::FloorPlan;
use crate::domain::geofence::Geofence;
use crate::domain::types::LatLngFloor;
use crate::domain::venue::{GraphEdge, Poi, Venue};
use crate::geometry::Coordinate;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct VenueDescriptor {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    floor_plans: Vec<FloorPlanDescriptor>,
    #[serde(default)]
    geofences: Vec<GeofenceDescriptor>,
    #[serde(default)]
    pois: Vec<Poi>,
    #[serde(default)]
    graph: GraphDescriptor,
}

/// Placed either by three corners or by center plus bearing
#[derive(Debug, Deserialize)]
struct FloorPlanDescriptor {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    floor: Option<i32>,
    width_px: u32,
    height_px: u32,
    pixel_to_meter: f64,
    #[serde(default)]
    top_left: Option<Coordinate>,
    #[serde(default)]
    top_right: Option<Coordinate>,
    #[serde(default)]
    bottom_left: Option<Coordinate>,
    #[serde(default)]
    bottom_right: Option<Coordinate>,
    #[serde(default)]
    center: Option<Coordinate>,
    #[serde(default)]
    bearing: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ShapeDescriptor {
    Polygon { coordinates: Vec<Coordinate> },
    Circle { center: Coordinate, radius: f64 },
}

#[derive(Debug, Deserialize)]
struct GeofenceDescriptor {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    floor: Option<i32>,
    #[serde(flatten)]
    shape: ShapeDescriptor,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct GraphDescriptor {
    #[serde(default)]
    nodes: Vec<LatLngFloor>,
    #[serde(default)]
    edges: Vec<GraphEdge>,
}

impl FloorPlanDescriptor {
    fn build(self) -> anyhow::Result<FloorPlan> {
        let plan = match (self.top_left, self.top_right, self.bottom_left, self.center, self.bearing) {
            (Some(tl), Some(tr), Some(bl), _, _) => {
                let plan = FloorPlan::new(&self.id, self.width_px, self.height_px, self.pixel_to_meter, tl, tr, bl)?;
                if let Err(e) = plan.check_consistency(self.center, self.bottom_right) {
                    warn!(floor_plan_id = %self.id, error = %e, "floor_plan_corners_inconsistent");
                }
                plan
            }
            (_, _, _, Some(center), Some(bearing)) => FloorPlan::from_anchor(
                &self.id,
                center,
                bearing,
                self.width_px,
                self.height_px,
                self.pixel_to_meter,
            )?,
            _ => anyhow::bail!("needs top_left/top_right/bottom_left or center/bearing"),
        };
        if let Err(e) = plan.validate() {
            warn!(floor_plan_id = %self.id, error = %e, "floor_plan_invalid");
        }

        let plan = match self.name {
            Some(name) => plan.with_name(name),
            None => plan,
        };
        Ok(match self.floor {
            Some(level) => plan.with_floor(level),
            None => plan,
        })
    }
}

impl GeofenceDescriptor {
    fn build(self) -> anyhow::Result<Geofence> {
        let fence = match self.shape {
            ShapeDescriptor::Polygon { coordinates } => Geofence::polygon(self.id, self.floor, coordinates)?,
            ShapeDescriptor::Circle { center, radius } => Geofence::circle(self.id, self.floor, center, radius)?,
        };
        let fence = match self.name {
            Some(name) => fence.with_name(name),
            None => fence,
        };
        Ok(match self.payload {
            Some(payload) => fence.with_payload(payload),
            None => fence,
        }
        .into_cloud())
    }
}

/// Parse a venue descriptor.
///
/// With `poi_geofence_radius_m` set, every POI also yields a circular venue
/// geofence with id `poi:<id>`.
pub fn parse_venue(json: &str, poi_geofence_radius_m: Option<f64>) -> anyhow::Result<Venue> {
    let descriptor: VenueDescriptor = serde_json::from_str(json).context("Failed to parse venue descriptor")?;

    let mut venue = Venue::new(descriptor.id);
    venue.name = descriptor.name;

    for plan in descriptor.floor_plans {
        let id = plan.id.clone();
        match plan.build() {
            Ok(plan) => venue.floor_plans.push(plan),
            Err(e) => warn!(floor_plan_id = %id, error = %format!("{e:#}"), "floor_plan_skipped"),
        }
    }

    for fence in descriptor.geofences {
        let id = fence.id.clone();
        match fence.build() {
            Ok(fence) => venue.geofences.push(fence),
            Err(e) => warn!(geofence_id = %id, error = %format!("{e:#}"), "geofence_skipped"),
        }
    }

    if let Some(radius) = poi_geofence_radius_m {
        for poi in &descriptor.pois {
            match poi.to_geofence(radius) {
                Ok(fence) => venue.geofences.push(fence),
                Err(e) => warn!(poi_id = %poi.id, error = %e, "poi_geofence_skipped"),
            }
        }
    }
    venue.pois = descriptor.pois;
    venue.graph_nodes = descriptor.graph.nodes;
    venue.graph_edges = descriptor.graph.edges;

    Ok(venue)
}

/// Load a venue descriptor from a JSON file
pub fn load_venue<P: AsRef<Path>>(path: P, poi_geofence_radius_m: Option<f64>) -> anyhow::Result<Venue> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read venue file {}", path.display()))?;
    let venue = parse_venue(&content, poi_geofence_radius_m)
        .with_context(|| format!("Failed to load venue file {}", path.display()))?;

    info!(
        venue_id = %venue.id,
        floor_plans = %venue.floor_plans.len(),
        geofences = %venue.geofences.len(),
        pois = %venue.pois.len(),
        nodes = %venue.graph_nodes.len(),
        edges = %venue.graph_edges.len(),
        "venue_loaded"
    );
    Ok(venue)
}
