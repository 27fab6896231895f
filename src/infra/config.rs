//! Configuration loading from TOML files
//!
//! The binaries pick the file with `--config <path>`, falling back to the
//! CONFIG_FILE environment variable and then config/dev.toml.
//!
//! Every section and key is optional; missing values take the defaults below.

use crate::services::fix_filter::{DEFAULT_DISTANCE_FILTER_M, DEFAULT_TIME_FILTER_MS};
use crate::services::wayfinding_graph::GraphConfig;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Corridor distance beyond which a fresh route is requested
    pub reroute_threshold_m: f64,
    /// Session command channel capacity
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { reroute_threshold_m: 5.0, channel_capacity: 256 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    /// Venue descriptor JSON
    pub file: String,
    /// Radius of the cloud geofence generated around every POI; unset disables
    pub poi_geofence_radius_m: Option<f64>,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self { file: "venue.json".to_string(), poi_geofence_radius_m: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FixesConfig {
    /// JSONL fix source: a file path, or "-" for stdin
    pub source: String,
    /// Delay between fixes when replaying a file (0 = as fast as possible)
    pub replay_interval_ms: u64,
}

impl Default for FixesConfig {
    fn default() -> Self {
        Self { source: "-".to_string(), replay_interval_ms: 0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    /// Minimum movement for a fix to pass, meters
    pub distance_m: f64,
    /// Minimum time between passing fixes, milliseconds
    pub interval_ms: u64,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self { distance_m: DEFAULT_DISTANCE_FILTER_M, interval_ms: DEFAULT_TIME_FILTER_MS }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub floor_transition_penalty: f64,
    pub max_snap_distance_m: f64,
    /// Route worker queue capacity
    pub worker_capacity: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let graph = GraphConfig::default();
        Self {
            floor_transition_penalty: graph.floor_transition_penalty,
            max_snap_distance_m: graph.max_snap_distance_m,
            worker_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EgressConfig {
    /// File path for event egress (JSONL format)
    pub file: String,
    pub channel_capacity: usize,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: "events.jsonl".to_string(), channel_capacity: 1024 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Reporting interval (0 disables the reporter)
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TomlConfig {
    pub session: SessionConfig,
    pub venue: VenueConfig,
    pub fixes: FixesConfig,
    pub filters: FiltersConfig,
    pub routing: RoutingConfig,
    pub egress: EgressConfig,
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    reroute_threshold_m: f64,
    session_channel_capacity: usize,
    venue_file: String,
    poi_geofence_radius_m: Option<f64>,
    fix_source: String,
    replay_interval_ms: u64,
    distance_filter_m: f64,
    time_filter_ms: u64,
    floor_transition_penalty: f64,
    max_snap_distance_m: f64,
    route_worker_capacity: usize,
    egress_file: String,
    egress_channel_capacity: usize,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            reroute_threshold_m: toml_config.session.reroute_threshold_m,
            session_channel_capacity: toml_config.session.channel_capacity.max(1),
            venue_file: toml_config.venue.file,
            poi_geofence_radius_m: toml_config.venue.poi_geofence_radius_m,
            fix_source: toml_config.fixes.source,
            replay_interval_ms: toml_config.fixes.replay_interval_ms,
            distance_filter_m: toml_config.filters.distance_m,
            time_filter_ms: toml_config.filters.interval_ms,
            floor_transition_penalty: toml_config.routing.floor_transition_penalty,
            max_snap_distance_m: toml_config.routing.max_snap_distance_m,
            route_worker_capacity: toml_config.routing.worker_capacity.max(1),
            egress_file: toml_config.egress.file,
            egress_channel_capacity: toml_config.egress.channel_capacity.max(1),
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load a specific file, falling back to defaults with a warning
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn reroute_threshold_m(&self) -> f64 {
        self.reroute_threshold_m
    }

    pub fn session_channel_capacity(&self) -> usize {
        self.session_channel_capacity
    }

    pub fn venue_file(&self) -> &str {
        &self.venue_file
    }

    pub fn poi_geofence_radius_m(&self) -> Option<f64> {
        self.poi_geofence_radius_m
    }

    pub fn fix_source(&self) -> &str {
        &self.fix_source
    }

    pub fn replay_interval_ms(&self) -> u64 {
        self.replay_interval_ms
    }

    pub fn distance_filter_m(&self) -> f64 {
        self.distance_filter_m
    }

    pub fn time_filter_ms(&self) -> u64 {
        self.time_filter_ms
    }

    pub fn graph_config(&self) -> GraphConfig {
        GraphConfig {
            floor_transition_penalty: self.floor_transition_penalty,
            max_snap_distance_m: self.max_snap_distance_m,
        }
    }

    pub fn route_worker_capacity(&self) -> usize {
        self.route_worker_capacity
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn egress_channel_capacity(&self) -> usize {
        self.egress_channel_capacity
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Override the venue descriptor path (command line takes precedence)
    pub fn with_venue_file(mut self, path: impl Into<String>) -> Self {
        self.venue_file = path.into();
        self
    }

    /// Override the fix source (command line takes precedence)
    pub fn with_fix_source(mut self, source: impl Into<String>) -> Self {
        self.fix_source = source.into();
        self
    }

    /// Builder method for tests to set the update filter
    #[cfg(test)]
    pub fn with_fix_filter(mut self, distance_m: f64, interval_ms: u64) -> Self {
        self.distance_filter_m = distance_m;
        self.time_filter_ms = interval_ms;
        self
    }
}
