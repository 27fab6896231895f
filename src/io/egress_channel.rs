//! Typed channel for egress messages
//!
//! Provides a non-blocking way to get session events to the egress writer.
//! Uses bounded mpsc channels to prevent unbounded memory growth; when the
//! channel is full the message is dropped and counted.

use crate::domain::route::Route;
use crate::domain::types::{epoch_ms, LatLngFloor};
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::services::session::{GeofenceEvent, RegionEvent, RouteUpdate, SessionListener};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Messages that can be sent to the egress writer
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EgressMessage {
    Geofence(GeofenceEventPayload),
    Region(RegionEventPayload),
    Route(RouteUpdatePayload),
    Metrics(MetricsPayload),
}

/// Payload for geofence enter/exit events
#[derive(Debug, Clone, Serialize)]
pub struct GeofenceEventPayload {
    /// Event type (geofence_entered, geofence_exited)
    pub t: &'static str,
    /// Timestamp (epoch ms)
    pub ts: u64,
    /// Session trace id
    pub session: String,
    /// Geofence id
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// cloud or dynamic
    pub origin: &'static str,
    /// Floor the geofence is pinned to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor: Option<i32>,
    pub lat: f64,
    pub lon: f64,
    /// Floor of the fix that crossed the boundary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_floor: Option<i32>,
    /// Timestamp of the fix (epoch ms)
    pub fix_ts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl GeofenceEventPayload {
    fn new(t: &'static str, session: &str, event: &GeofenceEvent) -> Self {
        let geofence = &event.geofence;
        Self {
            t,
            ts: epoch_ms(),
            session: session.to_string(),
            id: geofence.id().to_string(),
            name: geofence.name().map(str::to_string),
            origin: geofence.origin().as_str(),
            floor: geofence.floor(),
            lat: event.fix.coordinate.latitude,
            lon: event.fix.coordinate.longitude,
            fix_floor: event.fix.floor_level(),
            fix_ts: event.fix.timestamp_ms,
            payload: geofence.payload().cloned(),
        }
    }
}

/// Payload for venue and floor plan region enter/exit events
#[derive(Debug, Clone, Serialize)]
pub struct RegionEventPayload {
    /// Event type (region_entered, region_exited)
    pub t: &'static str,
    pub ts: u64,
    pub session: String,
    /// venue or floor_plan
    pub kind: &'static str,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Floor of a floor plan region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor: Option<i32>,
    pub lat: f64,
    pub lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_floor: Option<i32>,
    pub fix_ts: u64,
}

impl RegionEventPayload {
    fn new(t: &'static str, session: &str, event: &RegionEvent) -> Self {
        let region = &event.region;
        Self {
            t,
            ts: epoch_ms(),
            session: session.to_string(),
            kind: region.kind.as_str(),
            id: region.id.clone(),
            name: region.name.clone(),
            floor: region.floor,
            lat: event.fix.coordinate.latitude,
            lon: event.fix.coordinate.longitude,
            fix_floor: event.fix.floor_level(),
            fix_ts: event.fix.timestamp_ms,
        }
    }
}

/// Payload for route updates
#[derive(Debug, Clone, Serialize)]
pub struct RouteUpdatePayload {
    /// Always route_updated
    pub t: &'static str,
    pub ts: u64,
    pub session: String,
    pub request_id: u64,
    pub generation: u64,
    pub destination: LatLngFloor,
    /// Total route length in meters
    pub length_m: f64,
    pub route: Route,
}

/// Payload for the periodic metrics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct MetricsPayload {
    /// Always metrics
    pub t: &'static str,
    pub ts: u64,
    pub session: String,
    pub fixes_total: u64,
    pub fixes_per_sec: f64,
    pub fixes_filtered: u64,
    pub fixes_dropped: u64,
    pub fixes_malformed: u64,
    pub geofence_enters: u64,
    pub geofence_exits: u64,
    pub geofences: usize,
    pub route_requests: u64,
    pub routes_delivered: u64,
    pub routes_stale: u64,
    pub route_failures: u64,
    /// Per-fix processing latency (µs)
    pub fix_p50_us: u64,
    pub fix_p99_us: u64,
    /// Route computation latency (µs)
    pub route_p50_us: u64,
    pub route_p99_us: u64,
    pub route_max_us: u64,
}

impl MetricsPayload {
    pub fn from_summary(summary: &MetricsSummary, session: String) -> Self {
        Self {
            t: "metrics",
            ts: epoch_ms(),
            session,
            fixes_total: summary.fixes_total,
            fixes_per_sec: summary.fixes_per_sec,
            fixes_filtered: summary.fixes_filtered,
            fixes_dropped: summary.fixes_dropped,
            fixes_malformed: summary.fixes_malformed,
            geofence_enters: summary.geofence_enters,
            geofence_exits: summary.geofence_exits,
            geofences: summary.monitored_geofences,
            route_requests: summary.route_requests,
            routes_delivered: summary.routes_delivered,
            routes_stale: summary.routes_stale,
            route_failures: summary.route_failures,
            fix_p50_us: summary.fix_latency.p50_us,
            fix_p99_us: summary.fix_latency.p99_us,
            route_p50_us: summary.route_latency.p50_us,
            route_p99_us: summary.route_latency.p99_us,
            route_max_us: summary.route_latency.max_us,
        }
    }
}

/// Sender handle for egress messages
///
/// Clone this to share across multiple producers. Attach it to a session as
/// a listener to forward every event.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<EgressMessage>,
    session: String,
    metrics: Arc<Metrics>,
}

impl EgressSender {
    pub fn new(tx: mpsc::Sender<EgressMessage>, session: String, metrics: Arc<Metrics>) -> Self {
        Self { tx, session, metrics }
    }

    fn send(&self, msg: EgressMessage) {
        // Use try_send to avoid blocking the session - drop if channel full
        if self.tx.try_send(msg).is_err() {
            self.metrics.record_egress_dropped();
        }
    }

    /// Send a metrics snapshot
    pub fn send_metrics(&self, summary: &MetricsSummary) {
        self.send(EgressMessage::Metrics(MetricsPayload::from_summary(summary, self.session.clone())));
    }
}

impl SessionListener for EgressSender {
    fn on_geofence_entered(&self, event: &GeofenceEvent) {
        self.send(EgressMessage::Geofence(GeofenceEventPayload::new("geofence_entered", &self.session, event)));
    }

    fn on_geofence_exited(&self, event: &GeofenceEvent) {
        self.send(EgressMessage::Geofence(GeofenceEventPayload::new("geofence_exited", &self.session, event)));
    }

    fn on_region_entered(&self, event: &RegionEvent) {
        self.send(EgressMessage::Region(RegionEventPayload::new("region_entered", &self.session, event)));
    }

    fn on_region_exited(&self, event: &RegionEvent) {
        self.send(EgressMessage::Region(RegionEventPayload::new("region_exited", &self.session, event)));
    }

    fn on_route_updated(&self, update: &RouteUpdate) {
        self.send(EgressMessage::Route(RouteUpdatePayload {
            t: "route_updated",
            ts: epoch_ms(),
            session: self.session.clone(),
            request_id: update.request_id,
            generation: update.generation,
            destination: update.destination,
            length_m: update.route.length(),
            route: update.route.as_ref().clone(),
        }));
    }
}

/// Create a new egress channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// session is the trace id stamped on every payload.
pub fn create_egress_channel(
    buffer_size: usize,
    session: String,
    metrics: Arc<Metrics>,
) -> (EgressSender, mpsc::Receiver<EgressMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EgressSender::new(tx, session, metrics), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geofence::Geofence;
    use crate::domain::route::RouteError;
    use crate::domain::types::LocationFix;
    use crate::geometry::Coordinate;
    use crate::services::region_tracker::{RegionKind, VenueRegion};

    fn event() -> GeofenceEvent {
        let center = Coordinate::new(60.17, 24.94);
        let geofence = Geofence::circle("kiosk", Some(1), center, 3.0)
            .unwrap()
            .with_name("Kiosk")
            .with_payload(serde_json::json!({"k": 1}));
        GeofenceEvent { geofence: Arc::new(geofence), fix: LocationFix::new(center, 42).with_floor(1) }
    }

    #[test]
    fn test_geofence_payload_shape() {
        let metrics = Arc::new(Metrics::new());
        let (sender, mut rx) = create_egress_channel(4, "s-1".to_string(), metrics);
        sender.on_geofence_entered(&event());

        let msg = rx.try_recv().unwrap();
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["t"], "geofence_entered");
        assert_eq!(json["session"], "s-1");
        assert_eq!(json["id"], "kiosk");
        assert_eq!(json["name"], "Kiosk");
        assert_eq!(json["origin"], "dynamic");
        assert_eq!(json["floor"], 1);
        assert_eq!(json["fix_ts"], 42);
        assert_eq!(json["payload"]["k"], 1);
    }

    #[test]
    fn test_region_payload_shape() {
        let metrics = Arc::new(Metrics::new());
        let (sender, mut rx) = create_egress_channel(4, "s-1".to_string(), metrics);
        let region = VenueRegion {
            kind: RegionKind::FloorPlan,
            id: "fp-2".to_string(),
            name: Some("Level 2".to_string()),
            floor: Some(2),
        };
        let fix = LocationFix::new(Coordinate::new(60.17, 24.94), 42).with_floor(2);
        sender.on_region_exited(&RegionEvent { region, fix });

        let json = serde_json::to_value(rx.try_recv().unwrap()).unwrap();
        assert_eq!(json["t"], "region_exited");
        assert_eq!(json["kind"], "floor_plan");
        assert_eq!(json["id"], "fp-2");
        assert_eq!(json["name"], "Level 2");
        assert_eq!(json["floor"], 2);
        assert_eq!(json["fix_floor"], 2);
        assert_eq!(json["fix_ts"], 42);
    }

    #[test]
    fn test_failed_route_payload() {
        let metrics = Arc::new(Metrics::new());
        let (sender, mut rx) = create_egress_channel(4, "s-1".to_string(), metrics);
        sender.on_route_updated(&RouteUpdate {
            generation: 3,
            request_id: 7,
            destination: LatLngFloor::new(60.17, 24.94, 0),
            route: Arc::new(Route::failed(RouteError::GraphNotAvailable)),
        });

        let json = serde_json::to_value(rx.try_recv().unwrap()).unwrap();
        assert_eq!(json["t"], "route_updated");
        assert_eq!(json["request_id"], 7);
        assert_eq!(json["destination"]["floor"], 0);
        assert_eq!(json["route"]["is_successful"], false);
        assert_eq!(json["route"]["error"], "graph_not_available");
        assert_eq!(json["route"]["legs"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn test_full_channel_counts_drops() {
        let metrics = Arc::new(Metrics::new());
        let (sender, _rx) = create_egress_channel(1, "s-1".to_string(), metrics.clone());
        sender.on_geofence_entered(&event());
        sender.on_geofence_exited(&event());

        let summary = metrics.report(0);
        assert_eq!(summary.egress_dropped, 1);
    }
}
