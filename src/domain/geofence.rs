//! Geofence regions: polygonal and circular areas pinned to an optional floor

use crate::geometry::{
    destination, haversine_meters, is_degenerate, point_in_polygon, polygon_centroid,
    polygon_is_simple, BoundingBox, Coordinate,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of vertices used to approximate a circle boundary
const CIRCLE_BOUNDARY_SEGMENTS: usize = 32;

/// Reasons a geofence cannot be constructed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeofenceError {
    #[error("geofence identifier must not be empty")]
    EmptyIdentifier,

    #[error("polygon needs at least 3 distinct vertices, got {0}")]
    TooFewVertices(usize),

    #[error("vertex {0} is not a finite WGS84 coordinate")]
    NonFiniteCoordinate(usize),

    #[error("vertex {0} repeats the previous vertex")]
    DuplicateVertex(usize),

    #[error("polygon encloses no area")]
    ZeroArea,

    #[error("polygon edges intersect each other")]
    SelfIntersecting,

    #[error("circle radius must be positive and finite, got {0}")]
    InvalidRadius(f64),
}

/// Where a geofence was defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeofenceOrigin {
    /// Pushed from the venue definition; read-only to the session
    Cloud,
    /// Registered at runtime by the session owner
    Dynamic,
}

impl GeofenceOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeofenceOrigin::Cloud => "cloud",
            GeofenceOrigin::Dynamic => "dynamic",
        }
    }
}

/// Validated polygon ring
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonRegion {
    vertices: Vec<Coordinate>,
    bbox: BoundingBox,
}

impl PolygonRegion {
    /// Validate a ring. A closing vertex equal to the first one is dropped.
    pub fn new(mut vertices: Vec<Coordinate>) -> Result<Self, GeofenceError> {
        if let Some(i) = vertices.iter().position(|v| !v.is_valid()) {
            return Err(GeofenceError::NonFiniteCoordinate(i));
        }
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(GeofenceError::TooFewVertices(vertices.len()));
        }
        if let Some(i) = (1..vertices.len()).find(|&i| vertices[i] == vertices[i - 1]) {
            return Err(GeofenceError::DuplicateVertex(i));
        }
        if is_degenerate(&vertices) {
            return Err(GeofenceError::ZeroArea);
        }
        if !polygon_is_simple(&vertices) {
            return Err(GeofenceError::SelfIntersecting);
        }
        let bbox = BoundingBox::of(&vertices).ok_or(GeofenceError::TooFewVertices(0))?;
        Ok(Self { vertices, bbox })
    }

    pub fn vertices(&self) -> &[Coordinate] {
        &self.vertices
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        self.bbox.contains(point) && point_in_polygon(point, &self.vertices)
    }
}

/// Circle defined by a center and a radius in meters (POI-like regions)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleRegion {
    center: Coordinate,
    radius_m: f64,
}

impl CircleRegion {
    pub fn new(center: Coordinate, radius_m: f64) -> Result<Self, GeofenceError> {
        if !center.is_valid() {
            return Err(GeofenceError::NonFiniteCoordinate(0));
        }
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(GeofenceError::InvalidRadius(radius_m));
        }
        Ok(Self { center, radius_m })
    }

    pub fn center(&self) -> Coordinate {
        self.center
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Boundary points are inside
    pub fn contains(&self, point: &Coordinate) -> bool {
        haversine_meters(&self.center, point) <= self.radius_m
    }
}

/// Region capability set shared by every geofence kind
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    Polygon(PolygonRegion),
    Circle(CircleRegion),
}

impl Region {
    pub fn contains(&self, point: &Coordinate) -> bool {
        match self {
            Region::Polygon(p) => p.contains(point),
            Region::Circle(c) => c.contains(point),
        }
    }

    /// Boundary ring; circles are approximated by a regular polygon
    pub fn boundary(&self) -> Vec<Coordinate> {
        match self {
            Region::Polygon(p) => p.vertices.clone(),
            Region::Circle(c) => (0..CIRCLE_BOUNDARY_SEGMENTS)
                .map(|i| {
                    let bearing = 360.0 * i as f64 / CIRCLE_BOUNDARY_SEGMENTS as f64;
                    destination(&c.center, bearing, c.radius_m)
                })
                .collect(),
        }
    }

    /// Representative center: polygon area centroid or circle center
    pub fn center(&self) -> Coordinate {
        match self {
            Region::Polygon(p) => polygon_centroid(&p.vertices).unwrap_or(p.vertices[0]),
            Region::Circle(c) => c.center,
        }
    }
}

/// A named region used to trigger enter/exit events
#[derive(Debug, Clone, PartialEq)]
pub struct Geofence {
    id: String,
    name: Option<String>,
    floor: Option<i32>,
    region: Region,
    payload: Option<serde_json::Value>,
    origin: GeofenceOrigin,
}

impl Geofence {
    /// Runtime-defined polygon geofence
    pub fn polygon(
        id: impl Into<String>,
        floor: Option<i32>,
        vertices: Vec<Coordinate>,
    ) -> Result<Self, GeofenceError> {
        let region = Region::Polygon(PolygonRegion::new(vertices)?);
        Self::with_region(id.into(), floor, region)
    }

    /// Runtime-defined circular geofence
    pub fn circle(
        id: impl Into<String>,
        floor: Option<i32>,
        center: Coordinate,
        radius_m: f64,
    ) -> Result<Self, GeofenceError> {
        let region = Region::Circle(CircleRegion::new(center, radius_m)?);
        Self::with_region(id.into(), floor, region)
    }

    fn with_region(id: String, floor: Option<i32>, region: Region) -> Result<Self, GeofenceError> {
        if id.is_empty() {
            return Err(GeofenceError::EmptyIdentifier);
        }
        Ok(Self { id, name: None, floor, region, payload: None, origin: GeofenceOrigin::Dynamic })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Mark as venue-defined
    pub fn into_cloud(mut self) -> Self {
        self.origin = GeofenceOrigin::Cloud;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn floor(&self) -> Option<i32> {
        self.floor
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }

    pub fn origin(&self) -> GeofenceOrigin {
        self.origin
    }

    pub fn is_cloud(&self) -> bool {
        self.origin == GeofenceOrigin::Cloud
    }

    /// A fence without a floor matches any floor; a fix without a floor only
    /// matches floorless fences.
    #[inline]
    pub fn matches_floor(&self, floor: Option<i32>) -> bool {
        match self.floor {
            None => true,
            Some(level) => floor == Some(level),
        }
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        self.region.contains(point)
    }

    pub fn boundary(&self) -> Vec<Coordinate> {
        self.region.boundary()
    }

    pub fn center(&self) -> Coordinate {
        self.region.center()
    }
}
