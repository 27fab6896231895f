//! venue-nav library
//!
//! Indoor geofencing and wayfinding: geofence containment with enter/exit
//! derivation, floor-aware shortest paths, floor plan transforms and a
//! session that ties a stream of location fixes to both.
//!
//! Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod geometry;
pub mod infra;
pub mod io;
pub mod services;
