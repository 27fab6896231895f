//! Route value objects produced by wayfinding queries

use crate::domain::types::LatLngFloor;
use crate::geometry::{point_segment_distance, Coordinate, EnuFrame};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Why a route could not be produced
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteError {
    /// Graph present but no path connects the endpoints
    #[error("routing failed: no path between endpoints")]
    RoutingFailed,
    /// No routing graph, or no node within snapping distance on the floor
    #[error("wayfinding graph not available")]
    GraphNotAvailable,
}

impl RouteError {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteError::RoutingFailed => "routing_failed",
            RouteError::GraphNotAvailable => "graph_not_available",
        }
    }
}

/// Serialize an optional graph index as -1 when absent
fn serialize_index<S: Serializer>(index: &Option<usize>, s: S) -> Result<S::Ok, S::Error> {
    match index {
        Some(i) => s.serialize_i64(*i as i64),
        None => s.serialize_i64(-1),
    }
}

/// A route endpoint or waypoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteNode {
    #[serde(flatten)]
    pub position: LatLngFloor,
    /// Index in the source graph; `None` for virtual (off-graph) nodes
    #[serde(serialize_with = "serialize_index")]
    pub node_index: Option<usize>,
}

impl RouteNode {
    pub fn graph(position: LatLngFloor, index: usize) -> Self {
        Self { position, node_index: Some(index) }
    }

    pub fn virtual_node(position: LatLngFloor) -> Self {
        Self { position, node_index: None }
    }

    pub fn is_virtual(&self) -> bool {
        self.node_index.is_none()
    }
}

/// Straight segment between two route nodes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteLeg {
    pub begin: RouteNode,
    pub end: RouteNode,
    /// Meters
    pub length: f64,
    /// Degrees, 0 = north, 90 = east
    pub direction: f64,
    /// Source edge; `None` for virtual legs
    #[serde(serialize_with = "serialize_index")]
    pub edge_index: Option<usize>,
}

impl RouteLeg {
    pub fn is_virtual(&self) -> bool {
        self.edge_index.is_none()
    }

    /// Distance from a point to this leg, in meters
    pub fn distance_to(&self, point: &Coordinate) -> f64 {
        let frame = EnuFrame::new(self.begin.position.coordinate);
        let a = frame.to_local(&self.begin.position.coordinate);
        let b = frame.to_local(&self.end.position.coordinate);
        point_segment_distance(&frame.to_local(point), &a, &b)
    }

    fn touches_floor(&self, floor: i32) -> bool {
        self.begin.position.floor == floor || self.end.position.floor == floor
    }
}

/// Result of a wayfinding query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub legs: Vec<RouteLeg>,
    pub is_successful: bool,
    pub error: Option<RouteError>,
}

impl Route {
    pub fn successful(legs: Vec<RouteLeg>) -> Self {
        Self { legs, is_successful: true, error: None }
    }

    /// Failed route; never carries legs
    pub fn failed(error: RouteError) -> Self {
        Self { legs: Vec::new(), is_successful: false, error: Some(error) }
    }

    /// Total length in meters
    pub fn length(&self) -> f64 {
        self.legs.iter().map(|l| l.length).sum()
    }

    pub fn origin(&self) -> Option<&RouteNode> {
        self.legs.first().map(|l| &l.begin)
    }

    pub fn destination(&self) -> Option<&RouteNode> {
        self.legs.last().map(|l| &l.end)
    }

    /// Corridor distance: meters from `point` to the nearest leg on `floor`.
    ///
    /// With no floor every leg is considered. `None` when no leg qualifies.
    pub fn distance_to(&self, point: &Coordinate, floor: Option<i32>) -> Option<f64> {
        self.legs
            .iter()
            .filter(|leg| floor.is_none_or(|f| leg.touches_floor(f)))
            .map(|leg| leg.distance_to(point))
            .min_by(f64::total_cmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{bearing_degrees, destination, haversine_meters};

    fn leg(a: LatLngFloor, b: LatLngFloor, edge: Option<usize>) -> RouteLeg {
        RouteLeg {
            begin: RouteNode::graph(a, 0),
            end: RouteNode::graph(b, 1),
            length: haversine_meters(&a.coordinate, &b.coordinate),
            direction: bearing_degrees(&a.coordinate, &b.coordinate),
            edge_index: edge,
        }
    }

    #[test]
    fn test_failed_route_has_no_legs() {
        let route = Route::failed(RouteError::GraphNotAvailable);
        assert!(!route.is_successful);
        assert!(route.legs.is_empty());
        assert_eq!(route.error, Some(RouteError::GraphNotAvailable));
        assert_eq!(route.length(), 0.0);
        assert!(route.distance_to(&Coordinate::new(60.0, 24.0), None).is_none());
    }

    #[test]
    fn test_corridor_distance() {
        let a = LatLngFloor::new(60.0, 24.0, 0);
        let b_coord = destination(&a.coordinate, 90.0, 20.0);
        let b = LatLngFloor { coordinate: b_coord, floor: 0 };
        let route = Route::successful(vec![leg(a, b, Some(0))]);

        // 10 m along the leg, 3 m to the north of it
        let along = destination(&a.coordinate, 90.0, 10.0);
        let off = destination(&along, 0.0, 3.0);
        let d = route.distance_to(&off, Some(0)).unwrap();
        assert!((d - 3.0).abs() < 0.05, "got {d}");

        // Legs on other floors are ignored
        assert!(route.distance_to(&off, Some(1)).is_none());
        assert!(route.distance_to(&off, None).is_some());
    }

    #[test]
    fn test_route_serializes_virtual_indices_as_minus_one() {
        let a = LatLngFloor::new(60.0, 24.0, 0);
        let b = LatLngFloor::new(60.0001, 24.0, 0);
        let mut l = leg(a, b, None);
        l.begin = RouteNode::virtual_node(a);
        let route = Route::successful(vec![l]);

        let json = serde_json::to_value(&route).unwrap();
        assert_eq!(json["legs"][0]["edge_index"], -1);
        assert_eq!(json["legs"][0]["begin"]["node_index"], -1);
        assert_eq!(json["legs"][0]["end"]["node_index"], 1);
        assert_eq!(json["legs"][0]["begin"]["floor"], 0);
        assert_eq!(json["error"], serde_json::Value::Null);

        let failed = serde_json::to_value(Route::failed(RouteError::RoutingFailed)).unwrap();
        assert_eq!(failed["error"], "routing_failed");
    }
}
