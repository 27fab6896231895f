//! Session operation handlers

use super::{GeofenceEvent, RegionEvent, RouteUpdate, Session, SessionError, SessionSnapshot};
use crate::domain::geofence::{Geofence, GeofenceOrigin};
use crate::domain::types::{FloorRef, LatLngFloor, LocationFix};
use crate::domain::venue::Venue;
use crate::geometry::haversine_meters;
use crate::services::fix_filter::FilterDecision;
use crate::services::geofence_index::{same_fence, AddOutcome, Transition};
use crate::services::region_tracker::RegionTransition;
use crate::services::route_worker::RouteResult;
use crate::services::wayfinding_graph::WayfindingGraph;
use std::time::Instant;
use tracing::{debug, info, warn};

impl Session {
    /// Process one location fix
    pub fn on_fix(&mut self, fix: LocationFix) {
        let process_start = Instant::now();
        let fix = self.apply_floor_lock(fix);

        let decision = self.filter.check(&fix);
        if decision != FilterDecision::Accept {
            self.metrics.record_fix_filtered();
            debug!(
                session = %self.trace_id,
                reason = %decision.as_str(),
                timestamp_ms = %fix.timestamp_ms,
                "fix_filtered"
            );
            return;
        }

        self.current_fix = Some(fix);
        let fences = self.advance_inside(&fix);
        let regions = self.regions.advance(&fix);
        self.emit_transition(&fences, &regions, &fix);
        self.check_reroute(&fix);
        self.publish_snapshot();

        self.metrics.record_fix_processed(process_start.elapsed().as_micros() as u64);
    }

    fn apply_floor_lock(&self, mut fix: LocationFix) -> LocationFix {
        if let Some(level) = self.floor_lock {
            fix.floor = Some(FloorRef::new(level));
        }
        fix
    }

    /// Diff the fences containing `fix` against those reported so far
    fn advance_inside(&mut self, fix: &LocationFix) -> Transition {
        let now = self.index.query(&fix.coordinate, fix.floor_level());
        let exited = self
            .reported_inside
            .iter()
            .filter(|r| !now.iter().any(|n| same_fence(n, r)))
            .cloned()
            .collect();
        let entered = now
            .iter()
            .filter(|n| !self.reported_inside.iter().any(|r| same_fence(r, n)))
            .cloned()
            .collect();
        self.reported_inside = now;
        Transition { entered, exited }
    }

    /// Point reported fences at the current index entries. Fences no longer
    /// monitored are forgotten without an exit event.
    fn reconcile_reported(&mut self) {
        let index = &self.index;
        self.reported_inside = self
            .reported_inside
            .iter()
            .filter_map(|r| index.get(r.origin(), r.id()).cloned())
            .collect();
    }

    /// Notify listeners: fence exits, region exits, region enters, fence enters
    fn emit_transition(&self, fences: &Transition, regions: &RegionTransition, fix: &LocationFix) {
        for geofence in &fences.exited {
            self.metrics.record_geofence_exit();
            info!(
                session = %self.trace_id,
                geofence_id = %geofence.id(),
                origin = %geofence.origin().as_str(),
                "geofence_exited"
            );
            let event = GeofenceEvent { geofence: geofence.clone(), fix: *fix };
            for listener in &self.listeners {
                listener.on_geofence_exited(&event);
            }
        }

        for region in &regions.exited {
            info!(
                session = %self.trace_id,
                region_id = %region.id,
                kind = %region.kind.as_str(),
                "region_exited"
            );
            let event = RegionEvent { region: region.clone(), fix: *fix };
            for listener in &self.listeners {
                listener.on_region_exited(&event);
            }
        }

        for region in &regions.entered {
            info!(
                session = %self.trace_id,
                region_id = %region.id,
                kind = %region.kind.as_str(),
                "region_entered"
            );
            let event = RegionEvent { region: region.clone(), fix: *fix };
            for listener in &self.listeners {
                listener.on_region_entered(&event);
            }
        }

        for geofence in &fences.entered {
            self.metrics.record_geofence_enter();
            info!(
                session = %self.trace_id,
                geofence_id = %geofence.id(),
                origin = %geofence.origin().as_str(),
                "geofence_entered"
            );
            let event = GeofenceEvent { geofence: geofence.clone(), fix: *fix };
            for listener in &self.listeners {
                listener.on_geofence_entered(&event);
            }
        }
    }

    /// Request a fresh route when the active one no longer fits `fix`
    fn check_reroute(&mut self, fix: &LocationFix) {
        if self.destination.is_none() || self.pending_request.is_some() {
            return;
        }
        if let Some(reason) = self.reroute_reason(fix) {
            self.request_route(fix, reason);
        }
    }

    fn reroute_reason(&self, fix: &LocationFix) -> Option<&'static str> {
        let threshold = self.config.reroute_threshold_m();
        let (Some(route), Some(origin)) = (&self.route, &self.route_origin) else {
            return Some("no_route");
        };
        if origin.floor_level() != fix.floor_level() {
            return Some("floor_changed");
        }
        if route.legs.is_empty() {
            // Failed or zero-length route: retry once the user has moved on
            let moved = haversine_meters(&origin.coordinate, &fix.coordinate);
            return (moved > threshold).then_some("moved");
        }
        match route.distance_to(&fix.coordinate, fix.floor_level()) {
            Some(d) if d <= threshold => None,
            _ => Some("off_route"),
        }
    }

    fn request_route(&mut self, fix: &LocationFix, reason: &'static str) {
        let (Some(from), Some(to)) = (fix.lat_lng_floor(), self.destination) else {
            debug!(session = %self.trace_id, "route_skipped_no_floor");
            return;
        };

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        match self.router.submit(from.into(), to.into(), self.generation, request_id) {
            Ok(()) => {
                self.pending_request = Some(request_id);
                self.route_origin = Some(*fix);
                info!(
                    session = %self.trace_id,
                    request_id = %request_id,
                    generation = %self.generation,
                    reason = %reason,
                    from = %from,
                    to = %to,
                    "route_requested"
                );
            }
            Err(e) => {
                warn!(
                    session = %self.trace_id,
                    request_id = %request_id,
                    error = %e,
                    "route_request_failed"
                );
            }
        }
    }

    /// Make `target` the active destination, superseding any previous one
    pub fn set_destination(&mut self, target: LatLngFloor) {
        self.reset_route();
        self.destination = Some(target);
        info!(
            session = %self.trace_id,
            generation = %self.generation,
            destination = %target,
            "destination_set"
        );

        if let Some(fix) = self.current_fix {
            self.check_reroute(&fix);
        }
        self.publish_snapshot();
    }

    pub fn clear_destination(&mut self) {
        if self.destination.is_none() {
            return;
        }
        self.reset_route();
        self.destination = None;
        info!(session = %self.trace_id, generation = %self.generation, "destination_cleared");
        self.publish_snapshot();
    }

    /// Start a new generation; results for the old one become stale
    fn reset_route(&mut self) {
        self.generation += 1;
        self.pending_request = None;
        self.route = None;
        self.route_origin = None;
    }

    /// Deliver a route result if it still belongs to the active destination
    pub fn on_route_computed(&mut self, result: RouteResult) {
        let Some(destination) = self.destination else {
            self.discard_stale(&result);
            return;
        };
        if result.generation != self.generation || result.request_id <= self.last_delivered_request {
            self.discard_stale(&result);
            return;
        }

        if self.pending_request == Some(result.request_id) {
            self.pending_request = None;
        }
        self.last_delivered_request = result.request_id;
        self.route = Some(result.route.clone());
        self.metrics.record_route_delivered(result.route.is_successful);

        info!(
            session = %self.trace_id,
            request_id = %result.request_id,
            generation = %result.generation,
            successful = %result.route.is_successful,
            error = %result.route.error.map(|e| e.as_str()).unwrap_or("none"),
            legs = %result.route.legs.len(),
            "route_updated"
        );

        let update = RouteUpdate {
            generation: result.generation,
            request_id: result.request_id,
            destination,
            route: result.route,
        };
        for listener in &self.listeners {
            listener.on_route_updated(&update);
        }
        self.publish_snapshot();
    }

    fn discard_stale(&self, result: &RouteResult) {
        self.metrics.record_route_stale();
        debug!(
            session = %self.trace_id,
            request_id = %result.request_id,
            generation = %result.generation,
            current_generation = %self.generation,
            "route_result_stale"
        );
    }

    /// Add or replace a dynamic geofence
    pub fn monitor_geofence(&mut self, geofence: Geofence) -> Result<AddOutcome, SessionError> {
        if geofence.is_cloud() {
            return Err(SessionError::CloudGeofenceReadOnly(geofence.id().to_string()));
        }
        let id = geofence.id().to_string();
        let outcome = self.index.add(geofence);
        info!(
            session = %self.trace_id,
            geofence_id = %id,
            replaced = %(outcome == AddOutcome::Replaced),
            "geofence_monitored"
        );
        self.reconcile_reported();
        self.publish_snapshot();
        Ok(outcome)
    }

    /// Stop monitoring a dynamic geofence. Removal emits no exit event.
    ///
    /// Returns whether a fence was removed; an id that only names a venue
    /// fence is rejected.
    pub fn unmonitor_geofence(&mut self, id: &str) -> Result<bool, SessionError> {
        if let Some(removed) = self.index.remove(id) {
            info!(session = %self.trace_id, geofence_id = %removed.id(), "geofence_unmonitored");
            self.reconcile_reported();
            self.publish_snapshot();
            return Ok(true);
        }
        if self.index.get(GeofenceOrigin::Cloud, id).is_some() {
            return Err(SessionError::CloudGeofenceReadOnly(id.to_string()));
        }
        Ok(false)
    }

    /// Pin every following fix to `level`, overriding the fix's own floor
    pub fn lock_floor(&mut self, level: i32) {
        self.floor_lock = Some(level);
        info!(session = %self.trace_id, level = %level, "floor_locked");
        self.publish_snapshot();
    }

    pub fn unlock_floor(&mut self) {
        if self.floor_lock.take().is_some() {
            info!(session = %self.trace_id, "floor_unlocked");
            self.publish_snapshot();
        }
    }

    /// Wholesale venue refresh: cloud geofences, regions and routing graph.
    ///
    /// Fences and regions already reported as entered stay entered when the
    /// new venue still has them; the rest are dropped without an exit.
    ///
    /// Routes computed on the old graph are dropped and the active
    /// destination, if any, is routed again from the last fix.
    pub fn replace_venue(&mut self, venue: Venue) -> Result<(), SessionError> {
        let graph = WayfindingGraph::from_venue(&venue, self.config.graph_config())?;
        info!(
            session = %self.trace_id,
            venue_id = %venue.id,
            nodes = %graph.node_count(),
            edges = %graph.edge_count(),
            geofences = %venue.geofences.len(),
            "venue_replaced"
        );

        self.router.replace_graph(graph);
        self.regions.replace_venue(&venue);
        self.index.replace_cloud(venue.geofences);
        self.reconcile_reported();
        self.venue_id = Some(venue.id);

        self.reset_route();
        if let Some(fix) = self.current_fix {
            self.check_reroute(&fix);
        }
        self.publish_snapshot();
        Ok(())
    }

    pub(crate) fn publish_snapshot(&self) {
        *self.snapshot.write() = SessionSnapshot {
            last_fix: self.current_fix,
            route: self.route.clone(),
            inside: self.reported_inside.clone(),
            regions: self.regions.inside().to_vec(),
            destination: self.destination,
            floor_lock: self.floor_lock,
            monitored_geofences: self.index.len(),
        };
    }
}
