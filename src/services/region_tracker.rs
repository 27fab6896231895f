//! Venue and floor plan region tracking
//!
//! A fix is inside the venue region while any of the venue's floor plans
//! covers it, on any floor. It is inside a floor plan region while that plan
//! covers it and the plan's floor matches the fix floor; plans without a
//! floor match every fix. A venue without floor plans has no regions.

use crate::domain::floor_plan::FloorPlan;
use crate::domain::types::LocationFix;
use crate::domain::venue::Venue;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Venue,
    FloorPlan,
}

impl RegionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Venue => "venue",
            Self::FloorPlan => "floor_plan",
        }
    }
}

/// A venue or one of its floor plans, as reported to listeners
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VenueRegion {
    pub kind: RegionKind,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Floor of a floor plan region; never set for the venue region
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floor: Option<i32>,
}

impl VenueRegion {
    fn same(&self, other: &VenueRegion) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

/// Regions entered and exited at one fix.
///
/// Exits list floor plans before the venue, enters the venue first.
#[derive(Debug, Clone, Default)]
pub struct RegionTransition {
    pub entered: Vec<VenueRegion>,
    pub exited: Vec<VenueRegion>,
}

#[derive(Debug, Default)]
pub struct RegionTracker {
    venue: Option<VenueRegion>,
    /// Sorted by id
    plans: Vec<FloorPlan>,
    /// Regions reported as entered and not yet exited, venue first
    inside: Vec<VenueRegion>,
}

impl RegionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in the regions of `venue`.
    ///
    /// Reported regions that still exist stay entered; the rest are dropped
    /// without an exit, like removed geofences.
    pub fn replace_venue(&mut self, venue: &Venue) {
        let mut plans = venue.floor_plans.clone();
        plans.sort_by(|a, b| a.id().cmp(b.id()));
        self.venue = (!plans.is_empty()).then(|| VenueRegion {
            kind: RegionKind::Venue,
            id: venue.id.clone(),
            name: venue.name.clone(),
            floor: None,
        });
        self.plans = plans;

        let known: Vec<VenueRegion> = self.venue.iter().cloned().chain(self.plans.iter().map(plan_region)).collect();
        let before = self.inside.len();
        self.inside = known.into_iter().filter(|k| self.inside.iter().any(|r| r.same(k))).collect();
        debug!(
            floor_plans = self.plans.len(),
            dropped = before - self.inside.len(),
            "venue_regions_replaced"
        );
    }

    /// Regions containing the fix, venue first then plans by id
    pub fn regions_at(&self, fix: &LocationFix) -> Vec<VenueRegion> {
        let Some(venue) = &self.venue else {
            return Vec::new();
        };
        if !self.plans.iter().any(|p| p.contains(&fix.coordinate)) {
            return Vec::new();
        }

        let floor = fix.floor_level();
        let mut regions = vec![venue.clone()];
        regions.extend(
            self.plans
                .iter()
                .filter(|p| p.floor().is_none() || p.floor() == floor)
                .filter(|p| p.contains(&fix.coordinate))
                .map(plan_region),
        );
        regions
    }

    /// Diff the regions at `fix` against those reported so far
    pub fn advance(&mut self, fix: &LocationFix) -> RegionTransition {
        let now = self.regions_at(fix);
        let exited = self.inside.iter().rev().filter(|r| !now.iter().any(|n| n.same(r))).cloned().collect();
        let entered = now.iter().filter(|n| !self.inside.iter().any(|r| r.same(n))).cloned().collect();
        self.inside = now;
        RegionTransition { entered, exited }
    }

    pub fn inside(&self) -> &[VenueRegion] {
        &self.inside
    }
}

fn plan_region(plan: &FloorPlan) -> VenueRegion {
    VenueRegion {
        kind: RegionKind::FloorPlan,
        id: plan.id().to_string(),
        name: plan.name().map(str::to_string),
        floor: plan.floor(),
    }
}
