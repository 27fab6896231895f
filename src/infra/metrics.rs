//! Lock-free metrics collection and periodic reporting
//!
//! Counters are plain atomics updated from the session loop, the route worker
//! and the fix source. Reporting swaps the periodic counters to zero.
//!
//! NOTE: All atomics use Relaxed ordering: these are statistical counters
//! only. Do NOT use them for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Upper bound of the bucket holding the given percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile).ceil() as u64;
    let mut cumulative = 0u64;

    // Last bucket reports twice the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Latency histogram reset on every report
struct Histogram {
    count: AtomicU64,
    sum_us: AtomicU64,
    max_us: AtomicU64,
    buckets: [AtomicU64; NUM_BUCKETS],
}

/// Swapped-out histogram contents
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyStats {
    pub count: u64,
    pub avg_us: u64,
    pub max_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
}

impl Histogram {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_us: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    #[inline]
    fn record(&self, value_us: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(value_us, Ordering::Relaxed);
        self.buckets[bucket_index(value_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.max_us, value_us);
    }

    fn take(&self) -> LatencyStats {
        let count = self.count.swap(0, Ordering::Relaxed);
        let sum = self.sum_us.swap(0, Ordering::Relaxed);
        let max_us = self.max_us.swap(0, Ordering::Relaxed);
        let mut buckets = [0u64; NUM_BUCKETS];
        for (i, bucket) in self.buckets.iter().enumerate() {
            buckets[i] = bucket.swap(0, Ordering::Relaxed);
        }
        LatencyStats {
            count,
            avg_us: if count > 0 { sum / count } else { 0 },
            max_us,
            p50_us: percentile_from_buckets(&buckets, 0.50),
            p99_us: percentile_from_buckets(&buckets, 0.99),
        }
    }
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Fixes processed by the session (monotonic)
    fixes_total: AtomicU64,
    /// Fixes since last report (reset on report)
    fixes_since_report: AtomicU64,
    /// Fixes rejected by the update filter or floor lock (monotonic)
    fixes_filtered: AtomicU64,
    /// Fixes dropped because the session channel was full (monotonic)
    fixes_dropped: AtomicU64,
    /// Fix lines that failed to parse (monotonic)
    fixes_malformed: AtomicU64,
    /// Session commands other than fixes dropped on a full channel (monotonic)
    commands_dropped: AtomicU64,
    geofence_enters: AtomicU64,
    geofence_exits: AtomicU64,
    route_requests: AtomicU64,
    routes_delivered: AtomicU64,
    /// Results discarded because a newer request superseded them
    routes_stale: AtomicU64,
    /// Delivered routes that carried an error
    route_failures: AtomicU64,
    /// Egress events dropped on a full channel (monotonic)
    egress_dropped: AtomicU64,
    /// Session processing time per fix
    fix_latency: Histogram,
    /// Route computation time, enqueue to result
    route_latency: Histogram,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            fixes_total: AtomicU64::new(0),
            fixes_since_report: AtomicU64::new(0),
            fixes_filtered: AtomicU64::new(0),
            fixes_dropped: AtomicU64::new(0),
            fixes_malformed: AtomicU64::new(0),
            commands_dropped: AtomicU64::new(0),
            geofence_enters: AtomicU64::new(0),
            geofence_exits: AtomicU64::new(0),
            route_requests: AtomicU64::new(0),
            routes_delivered: AtomicU64::new(0),
            routes_stale: AtomicU64::new(0),
            route_failures: AtomicU64::new(0),
            egress_dropped: AtomicU64::new(0),
            fix_latency: Histogram::new(),
            route_latency: Histogram::new(),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_fix_processed(&self, latency_us: u64) {
        self.fixes_total.fetch_add(1, Ordering::Relaxed);
        self.fixes_since_report.fetch_add(1, Ordering::Relaxed);
        self.fix_latency.record(latency_us);
    }

    #[inline]
    pub fn record_fix_filtered(&self) {
        self.fixes_filtered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fix_dropped(&self) {
        self.fixes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fix_malformed(&self) {
        self.fixes_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_command_dropped(&self) {
        self.commands_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_geofence_enter(&self) {
        self.geofence_enters.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_geofence_exit(&self) {
        self.geofence_exits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_route_request(&self) {
        self.route_requests.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_route_computed(&self, latency_us: u64) {
        self.route_latency.record(latency_us);
    }

    #[inline]
    pub fn record_route_delivered(&self, successful: bool) {
        self.routes_delivered.fetch_add(1, Ordering::Relaxed);
        if !successful {
            self.route_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_route_stale(&self) {
        self.routes_stale.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_egress_dropped(&self) {
        self.egress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fixes_total(&self) -> u64 {
        self.fixes_total.load(Ordering::Relaxed)
    }

    pub fn fixes_filtered(&self) -> u64 {
        self.fixes_filtered.load(Ordering::Relaxed)
    }

    pub fn fixes_dropped(&self) -> u64 {
        self.fixes_dropped.load(Ordering::Relaxed)
    }

    pub fn fixes_malformed(&self) -> u64 {
        self.fixes_malformed.load(Ordering::Relaxed)
    }

    pub fn geofence_enters(&self) -> u64 {
        self.geofence_enters.load(Ordering::Relaxed)
    }

    pub fn geofence_exits(&self) -> u64 {
        self.geofence_exits.load(Ordering::Relaxed)
    }

    pub fn route_requests(&self) -> u64 {
        self.route_requests.load(Ordering::Relaxed)
    }

    pub fn routes_delivered(&self) -> u64 {
        self.routes_delivered.load(Ordering::Relaxed)
    }

    pub fn routes_stale(&self) -> u64 {
        self.routes_stale.load(Ordering::Relaxed)
    }

    /// Build a summary and reset the periodic counters
    pub fn report(&self, monitored_geofences: usize) -> MetricsSummary {
        let fixes_count = self.fixes_since_report.swap(0, Ordering::Relaxed);
        let fix_latency = self.fix_latency.take();
        let route_latency = self.route_latency.take();

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };
        let fixes_per_sec = if elapsed.as_secs_f64() > 0.0 {
            fixes_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        MetricsSummary {
            fixes_total: self.fixes_total(),
            fixes_per_sec,
            fixes_filtered: self.fixes_filtered(),
            fixes_dropped: self.fixes_dropped(),
            fixes_malformed: self.fixes_malformed(),
            commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
            geofence_enters: self.geofence_enters(),
            geofence_exits: self.geofence_exits(),
            monitored_geofences,
            route_requests: self.route_requests(),
            routes_delivered: self.routes_delivered(),
            routes_stale: self.routes_stale(),
            route_failures: self.route_failures.load(Ordering::Relaxed),
            egress_dropped: self.egress_dropped.load(Ordering::Relaxed),
            fix_latency,
            route_latency,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub fixes_total: u64,
    pub fixes_per_sec: f64,
    pub fixes_filtered: u64,
    pub fixes_dropped: u64,
    pub fixes_malformed: u64,
    pub commands_dropped: u64,
    pub geofence_enters: u64,
    pub geofence_exits: u64,
    /// Cloud plus dynamic fences in the index at report time
    pub monitored_geofences: usize,
    pub route_requests: u64,
    pub routes_delivered: u64,
    pub routes_stale: u64,
    pub route_failures: u64,
    pub egress_dropped: u64,
    /// Per-fix session processing time since the last report
    pub fix_latency: LatencyStats,
    /// Route computation time since the last report
    pub route_latency: LatencyStats,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            fixes_total = %self.fixes_total,
            fixes_per_sec = format!("{:.1}", self.fixes_per_sec),
            fixes_filtered = %self.fixes_filtered,
            fixes_dropped = %self.fixes_dropped,
            fix_p99_us = %self.fix_latency.p99_us,
            enters = %self.geofence_enters,
            exits = %self.geofence_exits,
            geofences = %self.monitored_geofences,
            route_requests = %self.route_requests,
            routes_delivered = %self.routes_delivered,
            routes_stale = %self.routes_stale,
            route_failures = %self.route_failures,
            route_p99_us = %self.route_latency.p99_us,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.fixes_total(), 0);
        assert_eq!(metrics.route_requests(), 0);
    }

    #[test]
    fn test_record_fix() {
        let metrics = Metrics::new();

        metrics.record_fix_processed(100);
        assert_eq!(metrics.fixes_total(), 1);
        metrics.record_fix_processed(200);
        assert_eq!(metrics.fixes_total(), 2);
        assert_eq!(metrics.fix_latency.sum_us.load(Ordering::Relaxed), 300);
    }

    #[test]
    fn test_report() {
        let metrics = Metrics::new();

        metrics.record_fix_processed(100);
        metrics.record_fix_processed(200);
        metrics.record_fix_processed(300);
        metrics.record_fix_filtered();
        metrics.record_route_request();
        metrics.record_route_delivered(false);
        metrics.record_route_stale();

        let summary = metrics.report(4);

        assert_eq!(summary.fixes_total, 3);
        assert_eq!(summary.fix_latency.count, 3);
        assert_eq!(summary.fix_latency.avg_us, 200);
        assert_eq!(summary.fix_latency.max_us, 300);
        assert_eq!(summary.fixes_filtered, 1);
        assert_eq!(summary.monitored_geofences, 4);
        assert_eq!(summary.route_requests, 1);
        assert_eq!(summary.routes_delivered, 1);
        assert_eq!(summary.route_failures, 1);
        assert_eq!(summary.routes_stale, 1);

        // Periodic counters reset, monotonic ones kept
        assert_eq!(metrics.fixes_since_report.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.fix_latency.sum_us.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.fixes_total(), 3);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(51201), 10);
    }

    #[test]
    fn test_percentiles() {
        let mut buckets = [0u64; NUM_BUCKETS];
        buckets[0] = 90;
        buckets[5] = 10;
        assert_eq!(percentile_from_buckets(&buckets, 0.50), 100);
        assert_eq!(percentile_from_buckets(&buckets, 0.99), 3200);
        assert_eq!(percentile_from_buckets(&[0; NUM_BUCKETS], 0.99), 0);
    }
}
