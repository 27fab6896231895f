//! Session coordinator
//!
//! The Session is the single stream processor that coordinates:
//! - Location fixes (floor lock, update filter, current fix)
//! - Geofence and region enter/exit derivation and listener notification
//! - Destination tracking and re-route decisions
//! - Route results coming back from the route worker
//!
//! All mutation happens on one task. Embedders drive it either through the
//! synchronous methods or by feeding `SessionCommand`s into [`Session::run`]
//! via a [`SessionHandle`].

mod handlers;

use crate::domain::geofence::Geofence;
use crate::domain::route::Route;
use crate::domain::types::{new_uuid_v7, LatLngFloor, LocationFix};
use crate::domain::venue::Venue;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::fix_filter::FixFilter;
use crate::services::geofence_index::GeofenceIndex;
use crate::services::region_tracker::{RegionTracker, VenueRegion};
use crate::services::route_worker::{RouteClient, RouteResult};
use crate::services::wayfinding_graph::GraphError;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

/// How long a closing session waits for an in-flight route
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("geofence {0} belongs to the venue and is read-only")]
    CloudGeofenceReadOnly(String),
    #[error("session channel closed")]
    ChannelClosed,
    #[error("session channel full")]
    ChannelFull,
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Commands accepted by [`Session::run`]
#[derive(Debug)]
pub enum SessionCommand {
    Fix(LocationFix),
    SetDestination(LatLngFloor),
    ClearDestination,
    Monitor(Geofence),
    Unmonitor(String),
    LockFloor(i32),
    UnlockFloor,
    ReplaceVenue(Box<Venue>),
}

/// A fence crossing observed at `fix`
#[derive(Debug, Clone)]
pub struct GeofenceEvent {
    pub geofence: Arc<Geofence>,
    pub fix: LocationFix,
}

/// A venue or floor plan region crossing observed at `fix`
#[derive(Debug, Clone)]
pub struct RegionEvent {
    pub region: VenueRegion,
    pub fix: LocationFix,
}

/// A route delivered for the active destination
#[derive(Debug, Clone)]
pub struct RouteUpdate {
    pub generation: u64,
    pub request_id: u64,
    pub destination: LatLngFloor,
    pub route: Arc<Route>,
}

/// Receives session events. Every method defaults to a no-op.
///
/// Called on the session task; implementations must not block.
pub trait SessionListener: Send + Sync {
    fn on_geofence_entered(&self, _event: &GeofenceEvent) {}

    fn on_geofence_exited(&self, _event: &GeofenceEvent) {}

    fn on_region_entered(&self, _event: &RegionEvent) {}

    fn on_region_exited(&self, _event: &RegionEvent) {}

    fn on_route_updated(&self, _update: &RouteUpdate) {}
}

/// Read-only view of the session published after every change
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub last_fix: Option<LocationFix>,
    pub route: Option<Arc<Route>>,
    /// Fences reported as entered and not yet exited, ordered by (origin, id)
    pub inside: Vec<Arc<Geofence>>,
    /// Venue and floor plan regions reported as entered
    pub regions: Vec<VenueRegion>,
    pub destination: Option<LatLngFloor>,
    pub floor_lock: Option<i32>,
    /// Cloud plus dynamic fences in the index
    pub monitored_geofences: usize,
}

/// Non-blocking front end for a running session
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    metrics: Arc<Metrics>,
}

impl SessionHandle {
    /// Enqueue a command; a full channel drops it and counts the drop
    pub fn send(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        match self.tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(cmd)) => {
                match cmd {
                    SessionCommand::Fix(_) => self.metrics.record_fix_dropped(),
                    _ => self.metrics.record_command_dropped(),
                }
                Err(SessionError::ChannelFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SessionError::ChannelClosed),
        }
    }

    pub fn on_fix(&self, fix: LocationFix) -> Result<(), SessionError> {
        self.send(SessionCommand::Fix(fix))
    }

    /// Enqueue a fix, waiting for capacity instead of dropping.
    ///
    /// For replay sources, where the input can simply be read more slowly.
    pub async fn feed_fix(&self, fix: LocationFix) -> Result<(), SessionError> {
        self.tx.send(SessionCommand::Fix(fix)).await.map_err(|_| SessionError::ChannelClosed)
    }

    pub fn set_destination(&self, target: LatLngFloor) -> Result<(), SessionError> {
        self.send(SessionCommand::SetDestination(target))
    }

    pub fn clear_destination(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::ClearDestination)
    }

    /// Cloud fences are rejected here, before reaching the session
    pub fn monitor_geofence(&self, geofence: Geofence) -> Result<(), SessionError> {
        if geofence.is_cloud() {
            return Err(SessionError::CloudGeofenceReadOnly(geofence.id().to_string()));
        }
        self.send(SessionCommand::Monitor(geofence))
    }

    pub fn unmonitor_geofence(&self, id: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::Unmonitor(id.into()))
    }

    pub fn lock_floor(&self, level: i32) -> Result<(), SessionError> {
        self.send(SessionCommand::LockFloor(level))
    }

    pub fn unlock_floor(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::UnlockFloor)
    }

    pub fn replace_venue(&self, venue: Venue) -> Result<(), SessionError> {
        self.send(SessionCommand::ReplaceVenue(Box::new(venue)))
    }
}

/// Create the session command channel
///
/// Returns the handle (for fix sources and embedders) and the receiver to
/// pass to [`Session::run`].
pub fn create_session_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (SessionHandle, mpsc::Receiver<SessionCommand>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (SessionHandle { tx, metrics }, rx)
}

pub struct Session {
    /// UUIDv7 identifying this session in logs and egress
    pub(crate) trace_id: String,
    pub(crate) config: Config,
    pub(crate) index: GeofenceIndex,
    /// Fences reported as entered and not yet exited; events are the diff
    /// between this set and the fences containing the next fix
    pub(crate) reported_inside: Vec<Arc<Geofence>>,
    pub(crate) regions: RegionTracker,
    pub(crate) router: RouteClient,
    pub(crate) filter: FixFilter,
    pub(crate) floor_lock: Option<i32>,
    pub(crate) current_fix: Option<LocationFix>,
    pub(crate) destination: Option<LatLngFloor>,
    /// Bumped on every destination change and venue refresh
    pub(crate) generation: u64,
    pub(crate) next_request_id: u64,
    /// Request in flight for the current generation
    pub(crate) pending_request: Option<u64>,
    pub(crate) last_delivered_request: u64,
    pub(crate) route: Option<Arc<Route>>,
    /// Fix the current route (or pending request) was computed from
    pub(crate) route_origin: Option<LocationFix>,
    pub(crate) venue_id: Option<String>,
    pub(crate) listeners: Vec<Arc<dyn SessionListener>>,
    pub(crate) snapshot: Arc<RwLock<SessionSnapshot>>,
    pub(crate) metrics: Arc<Metrics>,
}

impl Session {
    pub fn new(config: Config, router: RouteClient, metrics: Arc<Metrics>) -> Self {
        let filter = FixFilter::new(config.distance_filter_m(), config.time_filter_ms());
        let trace_id = new_uuid_v7();
        info!(session = %trace_id, "session_created");
        Self {
            trace_id,
            config,
            index: GeofenceIndex::new(),
            reported_inside: Vec::new(),
            regions: RegionTracker::new(),
            router,
            filter,
            floor_lock: None,
            current_fix: None,
            destination: None,
            generation: 0,
            next_request_id: 0,
            pending_request: None,
            last_delivered_request: 0,
            route: None,
            route_origin: None,
            venue_id: None,
            listeners: Vec::new(),
            snapshot: Arc::new(RwLock::new(SessionSnapshot::default())),
            metrics,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn add_listener(&mut self, listener: Arc<dyn SessionListener>) {
        self.listeners.push(listener);
    }

    /// Shared snapshot cell, for observers outside the session task
    pub fn snapshot_handle(&self) -> Arc<RwLock<SessionSnapshot>> {
        self.snapshot.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.read().clone()
    }

    pub fn index(&self) -> &GeofenceIndex {
        &self.index
    }

    pub fn current_route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    pub fn destination(&self) -> Option<LatLngFloor> {
        self.destination
    }

    pub fn venue_id(&self) -> Option<&str> {
        self.venue_id.as_deref()
    }

    /// Process commands and route results until the command channel closes.
    ///
    /// On close, waits briefly for an in-flight route so its update is not
    /// lost.
    pub async fn run(
        &mut self,
        mut cmd_rx: mpsc::Receiver<SessionCommand>,
        mut result_rx: mpsc::Receiver<RouteResult>,
    ) {
        info!(session = %self.trace_id, "session_started");

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => break,
                    }
                }
                Some(result) = result_rx.recv() => {
                    self.on_route_computed(result);
                }
            }
        }

        while self.pending_request.is_some() {
            match timeout(DRAIN_TIMEOUT, result_rx.recv()).await {
                Ok(Some(result)) => self.on_route_computed(result),
                Ok(None) => break,
                Err(_) => {
                    warn!(session = %self.trace_id, "route_drain_timeout");
                    break;
                }
            }
        }

        info!(session = %self.trace_id, "session_stopped");
    }

    /// Apply one command, logging rejected ones
    pub fn handle_command(&mut self, cmd: SessionCommand) {
        let result = match cmd {
            SessionCommand::Fix(fix) => {
                self.on_fix(fix);
                Ok(())
            }
            SessionCommand::SetDestination(target) => {
                self.set_destination(target);
                Ok(())
            }
            SessionCommand::ClearDestination => {
                self.clear_destination();
                Ok(())
            }
            SessionCommand::Monitor(geofence) => self.monitor_geofence(geofence).map(|_| ()),
            SessionCommand::Unmonitor(id) => self.unmonitor_geofence(&id).map(|_| ()),
            SessionCommand::LockFloor(level) => {
                self.lock_floor(level);
                Ok(())
            }
            SessionCommand::UnlockFloor => {
                self.unlock_floor();
                Ok(())
            }
            SessionCommand::ReplaceVenue(venue) => self.replace_venue(*venue),
        };

        if let Err(e) = result {
            warn!(session = %self.trace_id, error = %e, "session_command_rejected");
        }
    }
}
