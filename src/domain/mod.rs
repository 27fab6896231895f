//! Domain models - value types shared by every layer
//!
//! - `types` - floors, location fixes, timestamps
//! - `geofence` - validated polygon/circle regions
//! - `floor_plan` - raster placement and frame conversions
//! - `route` - routes, legs, route errors
//! - `venue` - POIs, graph edges, the venue aggregate

pub mod floor_plan;
pub mod geofence;
pub mod route;
pub mod types;
pub mod venue;

// Re-export commonly used types at module level
pub use floor_plan::{FloorPlan, FloorPlanError, PixelPoint};
pub use geofence::{Geofence, GeofenceError, GeofenceOrigin, Region};
pub use route::{Route, RouteError, RouteLeg, RouteNode};
pub use types::{FloorRef, LatLngFloor, LocationFix, ParseLatLngFloorError};
pub use venue::{GraphEdge, Poi, Venue};
