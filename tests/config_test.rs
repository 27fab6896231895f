//! Integration tests for configuration loading

use std::io::Write;
use tempfile::NamedTempFile;
use venue_nav::infra::Config;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[session]
reroute_threshold_m = 8.0
channel_capacity = 32

[venue]
file = "venues/mall.json"
poi_geofence_radius_m = 4.0

[fixes]
source = "fixes/walk.jsonl"
replay_interval_ms = 250

[filters]
distance_m = 1.5
interval_ms = 500

[routing]
floor_transition_penalty = 12.0
max_snap_distance_m = 30.0
worker_capacity = 8

[egress]
file = "out/events.jsonl"
channel_capacity = 0

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.reroute_threshold_m(), 8.0);
    assert_eq!(config.session_channel_capacity(), 32);
    assert_eq!(config.venue_file(), "venues/mall.json");
    assert_eq!(config.poi_geofence_radius_m(), Some(4.0));
    assert_eq!(config.fix_source(), "fixes/walk.jsonl");
    assert_eq!(config.replay_interval_ms(), 250);
    assert_eq!(config.distance_filter_m(), 1.5);
    assert_eq!(config.time_filter_ms(), 500);
    assert_eq!(config.graph_config().floor_transition_penalty, 12.0);
    assert_eq!(config.graph_config().max_snap_distance_m, 30.0);
    assert_eq!(config.route_worker_capacity(), 8);
    assert_eq!(config.egress_file(), "out/events.jsonl");
    // Zero capacity is clamped so the channel can be created
    assert_eq!(config.egress_channel_capacity(), 1);
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_partial_file_keeps_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[filters]\ndistance_m = 0.0\n").unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();
    let defaults = Config::default();

    assert_eq!(config.distance_filter_m(), 0.0);
    assert_eq!(config.time_filter_ms(), defaults.time_filter_ms());
    assert_eq!(config.reroute_threshold_m(), defaults.reroute_threshold_m());
    assert_eq!(config.venue_file(), defaults.venue_file());
}

#[test]
fn test_invalid_toml_is_an_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[session\nreroute_threshold_m = ").unwrap();
    temp_file.flush().unwrap();

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.reroute_threshold_m(), 5.0);
    assert_eq!(config.distance_filter_m(), 0.7);
    assert_eq!(config.time_filter_ms(), 2000);
    assert_eq!(config.fix_source(), "-");
    assert_eq!(config.egress_file(), "events.jsonl");
    assert_eq!(config.config_file(), "default");
}
