//! Geometry kernel - pure, stateless spatial functions
//!
//! - `planar` - local-frame points, polygons, segment intersection
//! - `geodesic` - WGS84 coordinates, haversine, bearings, ENU linearization
//!
//! Frame safety is mostly enforced by types: [`LocalPoint`] and
//! [`Coordinate`] cannot be mixed in the typed helpers. [`Position`] exists
//! for callers that carry either frame at runtime; mixing frames there is
//! reported as [`GeometryError::InvalidFrame`].

pub mod geodesic;
pub mod planar;

pub use geodesic::{
    bearing_degrees, destination, haversine_meters, normalize_degrees, Coordinate, EnuFrame,
    EARTH_RADIUS_M,
};
pub use planar::{
    is_degenerate, point_in_polygon, point_segment_distance, polygon_area, polygon_centroid,
    polygon_is_simple, segment_intersection, segments_intersect, BoundingBox, LocalPoint,
    PlanarPoint,
};

use thiserror::Error;

/// Errors raised by frame-generic geometry operations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    /// Operands live in different coordinate frames
    #[error("invalid frame: cannot mix geographic and floor-local positions")]
    InvalidFrame,
}

/// A position in either the geographic or a floor-local frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    Geographic(Coordinate),
    Local(LocalPoint),
}

impl From<Coordinate> for Position {
    fn from(c: Coordinate) -> Self {
        Position::Geographic(c)
    }
}

impl From<LocalPoint> for Position {
    fn from(p: LocalPoint) -> Self {
        Position::Local(p)
    }
}

/// Distance in meters: Euclidean for local points, haversine for coordinates
pub fn distance_meters(a: &Position, b: &Position) -> Result<f64, GeometryError> {
    match (a, b) {
        (Position::Local(a), Position::Local(b)) => Ok(a.distance(b)),
        (Position::Geographic(a), Position::Geographic(b)) => Ok(haversine_meters(a, b)),
        _ => Err(GeometryError::InvalidFrame),
    }
}

/// Bearing from `a` to `b` in [0, 360), 0 = north (+y for local points)
pub fn bearing_between(a: &Position, b: &Position) -> Result<f64, GeometryError> {
    match (a, b) {
        (Position::Local(a), Position::Local(b)) => Ok(a.bearing_to(b)),
        (Position::Geographic(a), Position::Geographic(b)) => Ok(bearing_degrees(a, b)),
        _ => Err(GeometryError::InvalidFrame),
    }
}
