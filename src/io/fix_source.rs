//! Location fix source - JSONL from a file or stdin
//!
//! One fix per line:
//! `{"latitude":60.17,"longitude":24.94,"floor":2,"floor_certainty":0.9,
//!   "timestamp":1700000000000,"accuracy":1.5}`
//!
//! `timestamp` may be epoch milliseconds or an RFC 3339 string; when absent
//! the receive time is used. Blank lines and lines starting with `#` are
//! ignored.

use crate::domain::types::{deserialize_timestamp, epoch_ms, FloorRef, LocationFix, TimestampValue};
use crate::geometry::Coordinate;
use crate::infra::metrics::Metrics;
use crate::services::session::{SessionError, SessionHandle};
use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct FixRecord {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    floor: Option<i32>,
    #[serde(default)]
    floor_certainty: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    timestamp: TimestampValue,
    #[serde(default)]
    accuracy: Option<f32>,
}

/// Parse one JSONL fix line
pub fn parse_fix_line(line: &str) -> anyhow::Result<LocationFix> {
    let record: FixRecord = serde_json::from_str(line).context("Failed to parse fix")?;

    let timestamp_ms = match &record.timestamp {
        TimestampValue::None => epoch_ms(),
        ts => ts.to_epoch_ms().with_context(|| format!("Invalid fix timestamp {ts:?}"))?,
    };
    let coordinate = Coordinate::new(record.latitude, record.longitude);
    anyhow::ensure!(coordinate.is_valid(), "Fix coordinate out of range: {coordinate}");

    let mut fix = LocationFix::new(coordinate, timestamp_ms);
    if let Some(level) = record.floor {
        let certainty = record.floor_certainty.unwrap_or(1.0);
        fix = fix.with_floor_ref(FloorRef::with_certainty(level, certainty));
    }
    if let Some(accuracy) = record.accuracy {
        fix = fix.with_accuracy(accuracy);
    }
    Ok(fix)
}

/// How the source reacts to a full session channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Live input: drop the fix (the handle counts it)
    Drop,
    /// Replay: wait for capacity
    Wait,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixSourceStats {
    pub lines: u64,
    pub fixes: u64,
    pub malformed: u64,
}

/// Feed every fix in `reader` into the session.
///
/// Stops at end of input or when the session goes away.
pub async fn pump_fixes<R>(
    reader: R,
    handle: &SessionHandle,
    metrics: &Metrics,
    backpressure: Backpressure,
    interval: Duration,
) -> anyhow::Result<FixSourceStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = FixSourceStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await.context("Failed to read fix source")? {
        stats.lines += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fix = match parse_fix_line(line) {
            Ok(fix) => fix,
            Err(e) => {
                stats.malformed += 1;
                metrics.record_fix_malformed();
                warn!(line = %stats.lines, error = %format!("{e:#}"), "fix_malformed");
                continue;
            }
        };

        let sent = match backpressure {
            Backpressure::Drop => handle.on_fix(fix),
            Backpressure::Wait => handle.feed_fix(fix).await,
        };
        match sent {
            Ok(()) => stats.fixes += 1,
            Err(SessionError::ChannelFull) => {
                debug!(line = %stats.lines, "fix_dropped_channel_full");
            }
            Err(e) => {
                info!(line = %stats.lines, reason = %e, "fix_source_session_gone");
                break;
            }
        }

        if !interval.is_zero() {
            sleep(interval).await;
        }
    }

    Ok(stats)
}

/// Read fixes from `source` ("-" for stdin, otherwise a file path)
pub async fn run_fix_source(
    source: &str,
    handle: SessionHandle,
    metrics: Arc<Metrics>,
    replay_interval: Duration,
) -> anyhow::Result<FixSourceStats> {
    info!(source = %source, "fix_source_started");

    let stats = if source == "-" {
        let reader = BufReader::new(tokio::io::stdin());
        pump_fixes(reader, &handle, &metrics, Backpressure::Drop, replay_interval).await?
    } else {
        let file = tokio::fs::File::open(source)
            .await
            .with_context(|| format!("Failed to open fix source {source}"))?;
        pump_fixes(BufReader::new(file), &handle, &metrics, Backpressure::Wait, replay_interval).await?
    };

    info!(
        source = %source,
        lines = %stats.lines,
        fixes = %stats.fixes,
        malformed = %stats.malformed,
        "fix_source_finished"
    );
    Ok(stats)
}
