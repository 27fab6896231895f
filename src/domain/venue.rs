//! Venue: floor plans, cloud geofences, points of interest and routing graph

use crate::domain::floor_plan::FloorPlan;
use crate::domain::geofence::{Geofence, GeofenceError};
use crate::domain::types::LatLngFloor;
use serde::{Deserialize, Serialize};

/// Point of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub position: LatLngFloor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Poi {
    pub fn new(id: impl Into<String>, position: LatLngFloor) -> Self {
        Self { id: id.into(), name: None, position, payload: None }
    }

    /// Circular venue geofence around the POI, pinned to its floor
    pub fn to_geofence(&self, radius_m: f64) -> Result<Geofence, GeofenceError> {
        let mut fence = Geofence::circle(
            format!("poi:{}", self.id),
            Some(self.position.floor),
            self.position.coordinate,
            radius_m,
        )?
        .into_cloud();
        if let Some(name) = &self.name {
            fence = fence.with_name(name.clone());
        }
        if let Some(payload) = &self.payload {
            fence = fence.with_payload(payload.clone());
        }
        Ok(fence)
    }
}

fn default_true() -> bool {
    true
}

/// Routing graph edge as published with the venue
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub begin: usize,
    pub end: usize,
    /// Traversal cost; defaults to the geodesic length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default = "default_true")]
    pub bidirectional: bool,
    /// Forced floor-transition flag; edges between floors are transitions anyway
    #[serde(default)]
    pub floor_transition: bool,
}

impl GraphEdge {
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end, weight: None, bidirectional: true, floor_transition: false }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn one_way(mut self) -> Self {
        self.bidirectional = false;
        self
    }
}

/// Everything the session knows about one venue
#[derive(Debug, Clone, Default)]
pub struct Venue {
    pub id: String,
    pub name: Option<String>,
    pub floor_plans: Vec<FloorPlan>,
    /// Cloud-origin fences, including those derived from POIs
    pub geofences: Vec<Geofence>,
    pub pois: Vec<Poi>,
    pub graph_nodes: Vec<LatLngFloor>,
    pub graph_edges: Vec<GraphEdge>,
}

impl Venue {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    pub fn has_graph(&self) -> bool {
        !self.graph_nodes.is_empty()
    }

    pub fn floor_plan_for(&self, floor: i32) -> Option<&FloorPlan> {
        self.floor_plans.iter().find(|fp| fp.floor() == Some(floor))
    }

    pub fn poi(&self, id: &str) -> Option<&Poi> {
        self.pois.iter().find(|p| p.id == id)
    }

    /// Sorted distinct floor levels referenced by plans, POIs and graph nodes
    pub fn floors(&self) -> Vec<i32> {
        let mut floors: Vec<i32> = self
            .floor_plans
            .iter()
            .filter_map(FloorPlan::floor)
            .chain(self.pois.iter().map(|p| p.position.floor))
            .chain(self.graph_nodes.iter().map(|n| n.floor))
            .collect();
        floors.sort_unstable();
        floors.dedup();
        floors
    }
}
