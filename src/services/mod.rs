//! Services - business logic and state management
//!
//! This module contains the core services:
//! - `geofence_index` - Containment queries and enter/exit derivation
//! - `wayfinding_graph` - Floor-aware routing graph and shortest paths
//! - `route_builder` - Graph paths to legs with length and bearing
//! - `route_worker` - Async route computation off the session loop
//! - `fix_filter` - Distance/time update filter
//! - `region_tracker` - Venue and floor plan region enter/exit
//! - `session` - Central fix stream processor

pub mod fix_filter;
pub mod geofence_index;
pub mod region_tracker;
pub mod route_builder;
pub mod route_worker;
pub mod session;
pub mod wayfinding_graph;

// Re-export commonly used types
pub use geofence_index::GeofenceIndex;
pub use region_tracker::{RegionKind, RegionTracker, VenueRegion};
pub use route_worker::{create_route_worker, RouteClient, RouteWorker};
pub use session::{create_session_channel, Session, SessionHandle, SessionListener};
pub use wayfinding_graph::{Endpoint, GraphConfig, WayfindingGraph};
