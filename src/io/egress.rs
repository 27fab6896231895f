//! Event egress - writes session events to file
//!
//! Events are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::io::egress_channel::EgressMessage;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Egress writer for session events
pub struct Egress {
    file_path: String,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write one event to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_message(&self, msg: &EgressMessage) -> bool {
        let json = match serde_json::to_string(msg) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "egress_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => true,
            Err(e) => {
                error!(file = %self.file_path, error = %e, "egress_write_failed");
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }

    /// Drain the egress channel until every sender is dropped.
    ///
    /// Returns the number of lines written.
    pub async fn run(self, mut rx: mpsc::Receiver<EgressMessage>) -> usize {
        let mut written = 0;
        while let Some(msg) = rx.recv().await {
            if self.write_message(&msg) {
                written += 1;
            }
        }
        info!(file = %self.file_path, written = %written, "egress_stopped");
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geofence::Geofence;
    use crate::domain::route::Route;
    use crate::domain::types::{LatLngFloor, LocationFix};
    use crate::geometry::Coordinate;
    use crate::infra::metrics::Metrics;
    use crate::io::egress_channel::create_egress_channel;
    use crate::services::session::{GeofenceEvent, RouteUpdate, SessionListener};
    use std::fs;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn geofence_event() -> GeofenceEvent {
        let center = Coordinate::new(60.17, 24.94);
        let geofence = Geofence::circle("kiosk", None, center, 3.0).unwrap();
        GeofenceEvent { geofence: Arc::new(geofence), fix: LocationFix::new(center, 1_000) }
    }

    fn route_update() -> RouteUpdate {
        RouteUpdate {
            generation: 1,
            request_id: 1,
            destination: LatLngFloor::new(60.17, 24.94, 0),
            route: Arc::new(Route::successful(Vec::new())),
        }
    }

    #[test]
    fn test_egress_new() {
        let egress = Egress::new("test.jsonl");
        assert_eq!(egress.file_path, "test.jsonl");
    }

    #[tokio::test]
    async fn test_run_writes_one_line_per_event() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("events.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        let (sender, rx) = create_egress_channel(8, "s-1".to_string(), Arc::new(Metrics::new()));
        sender.on_geofence_entered(&geofence_event());
        sender.on_route_updated(&route_update());
        sender.on_geofence_exited(&geofence_event());
        drop(sender);

        assert_eq!(egress.run(rx).await, 3);

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));
        let kinds: Vec<String> = content
            .lines()
            .map(|line| {
                let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
                parsed["t"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(kinds, vec!["geofence_entered", "route_updated", "geofence_exited"]);
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested_path = dir.path().join("nested").join("dir").join("events.jsonl");
        let egress = Egress::new(nested_path.to_str().unwrap());

        let (sender, rx) = create_egress_channel(8, "s-1".to_string(), Arc::new(Metrics::new()));
        sender.on_route_updated(&route_update());
        drop(sender);

        assert_eq!(egress.run(rx).await, 1);
        assert!(nested_path.exists());
    }

    #[tokio::test]
    async fn test_append_mode() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("events.jsonl");

        // Pre-create file with existing content
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let egress = Egress::new(file_path.to_str().unwrap());
        let (sender, rx) = create_egress_channel(8, "s-1".to_string(), Arc::new(Metrics::new()));
        sender.on_geofence_entered(&geofence_event());
        drop(sender);
        egress.run(rx).await;

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        // Pre-existing line is kept, new event appended
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("existing"));
        assert!(lines[1].contains("kiosk"));
    }
}
