//! Location update filter
//!
//! A fix passes when it moved at least `distance_m` from the last accepted
//! fix or at least `interval_ms` elapsed since it. A floor change always
//! passes. Setting either threshold to zero lets every valid fix through.

use crate::domain::types::LocationFix;
use crate::geometry::haversine_meters;

pub const DEFAULT_DISTANCE_FILTER_M: f64 = 0.7;
pub const DEFAULT_TIME_FILTER_MS: u64 = 2_000;

/// Outcome of [`FixFilter::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    /// Neither distance nor time threshold reached
    Throttled,
    /// Timestamp older than the last accepted fix
    OutOfOrder,
    /// Coordinate not finite or outside WGS84 ranges
    Invalid,
}

impl FilterDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterDecision::Accept => "accept",
            FilterDecision::Throttled => "throttled",
            FilterDecision::OutOfOrder => "out_of_order",
            FilterDecision::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixFilter {
    distance_m: f64,
    interval_ms: u64,
    last_accepted: Option<LocationFix>,
}

impl Default for FixFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DISTANCE_FILTER_M, DEFAULT_TIME_FILTER_MS)
    }
}

impl FixFilter {
    pub fn new(distance_m: f64, interval_ms: u64) -> Self {
        Self { distance_m: distance_m.max(0.0), interval_ms, last_accepted: None }
    }

    /// Filter that accepts every valid, in-order fix
    pub fn pass_through() -> Self {
        Self::new(0.0, 0)
    }

    /// Decide on `fix`; accepted fixes become the new reference
    pub fn check(&mut self, fix: &LocationFix) -> FilterDecision {
        if !fix.coordinate.is_valid() {
            return FilterDecision::Invalid;
        }
        let Some(last) = &self.last_accepted else {
            self.last_accepted = Some(*fix);
            return FilterDecision::Accept;
        };
        if fix.timestamp_ms < last.timestamp_ms {
            return FilterDecision::OutOfOrder;
        }

        let floor_changed = fix.floor_level() != last.floor_level();
        let moved = haversine_meters(&last.coordinate, &fix.coordinate) >= self.distance_m;
        let waited = fix.timestamp_ms - last.timestamp_ms >= self.interval_ms;

        if floor_changed || moved || waited {
            self.last_accepted = Some(*fix);
            FilterDecision::Accept
        } else {
            FilterDecision::Throttled
        }
    }

    /// Forget the reference fix; the next valid fix passes
    pub fn reset(&mut self) {
        self.last_accepted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{destination, Coordinate};

    fn origin() -> Coordinate {
        Coordinate::new(60.17, 24.94)
    }

    #[test]
    fn test_first_fix_accepted() {
        let mut filter = FixFilter::default();
        assert_eq!(filter.check(&LocationFix::new(origin(), 0)), FilterDecision::Accept);
    }

    #[test]
    fn test_distance_or_time_threshold() {
        let mut filter = FixFilter::default();
        filter.check(&LocationFix::new(origin(), 0));

        // 0.3 m after 500 ms: neither threshold
        let near = destination(&origin(), 90.0, 0.3);
        assert_eq!(filter.check(&LocationFix::new(near, 500)), FilterDecision::Throttled);

        // 1 m after 600 ms: distance
        let far = destination(&origin(), 90.0, 1.0);
        assert_eq!(filter.check(&LocationFix::new(far, 600)), FilterDecision::Accept);

        // Same spot 2 s later: time
        assert_eq!(filter.check(&LocationFix::new(far, 2_600)), FilterDecision::Accept);
    }

    #[test]
    fn test_floor_change_always_passes() {
        let mut filter = FixFilter::default();
        filter.check(&LocationFix::new(origin(), 0).with_floor(0));
        assert_eq!(filter.check(&LocationFix::new(origin(), 10).with_floor(1)), FilterDecision::Accept);
    }

    #[test]
    fn test_rejects_out_of_order_and_invalid() {
        let mut filter = FixFilter::pass_through();
        filter.check(&LocationFix::new(origin(), 1_000));
        assert_eq!(filter.check(&LocationFix::new(origin(), 999)), FilterDecision::OutOfOrder);
        assert_eq!(
            filter.check(&LocationFix::new(Coordinate::new(f64::NAN, 0.0), 2_000)),
            FilterDecision::Invalid
        );
        assert_eq!(filter.check(&LocationFix::new(origin(), 1_000)), FilterDecision::Accept);
    }

    #[test]
    fn test_reset_forgets_reference() {
        let mut filter = FixFilter::default();
        filter.check(&LocationFix::new(origin(), 1_000));
        filter.reset();
        assert_eq!(filter.check(&LocationFix::new(origin(), 0)), FilterDecision::Accept);
    }
}
