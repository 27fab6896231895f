//! Geofence index - containment queries and enter/exit derivation
//!
//! Fences live in two namespaces keyed by origin: cloud fences come from the
//! venue and are refreshed wholesale, dynamic fences are added and removed at
//! runtime. The same identifier may exist in both namespaces.
//!
//! Queries return fences ordered by (origin, id) so event order is stable
//! across runs.

use crate::domain::geofence::{Geofence, GeofenceOrigin};
use crate::domain::types::LocationFix;
use crate::geometry::Coordinate;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fence list sized for the common case of a handful of hits
pub type FenceList = SmallVec<[Arc<Geofence>; 4]>;

/// Result of [`GeofenceIndex::add`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    /// A fence with the same id and origin was replaced
    Replaced,
}

/// Fences entered and exited between two consecutive fixes
#[derive(Debug, Clone, Default)]
pub struct Transition {
    pub entered: FenceList,
    pub exited: FenceList,
}

impl Transition {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.exited.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct GeofenceIndex {
    cloud: BTreeMap<String, Arc<Geofence>>,
    dynamic: BTreeMap<String, Arc<Geofence>>,
}

impl GeofenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn namespace(&mut self, origin: GeofenceOrigin) -> &mut BTreeMap<String, Arc<Geofence>> {
        match origin {
            GeofenceOrigin::Cloud => &mut self.cloud,
            GeofenceOrigin::Dynamic => &mut self.dynamic,
        }
    }

    /// Insert a fence into its origin's namespace, replacing any fence with
    /// the same id there.
    pub fn add(&mut self, geofence: Geofence) -> AddOutcome {
        let origin = geofence.origin();
        let id = geofence.id().to_string();
        match self.namespace(origin).insert(id, Arc::new(geofence)) {
            Some(_) => AddOutcome::Replaced,
            None => AddOutcome::Inserted,
        }
    }

    /// Remove a dynamic fence; unknown ids are ignored
    pub fn remove(&mut self, id: &str) -> Option<Arc<Geofence>> {
        self.dynamic.remove(id)
    }

    /// Swap the whole cloud namespace for the given fences.
    ///
    /// A repeated id keeps the later fence; returns how many were dropped.
    pub fn replace_cloud(&mut self, fences: impl IntoIterator<Item = Geofence>) -> usize {
        let mut cloud = BTreeMap::new();
        let mut duplicates = 0;
        for g in fences {
            let g = if g.is_cloud() { g } else { g.into_cloud() };
            let id = g.id().to_string();
            if cloud.insert(id.clone(), Arc::new(g)).is_some() {
                duplicates += 1;
                warn!(geofence_id = %id, "cloud_geofence_duplicate_id");
            }
        }
        self.cloud = cloud;
        debug!(count = self.cloud.len(), duplicates, "cloud_geofences_replaced");
        duplicates
    }

    pub fn get(&self, origin: GeofenceOrigin, id: &str) -> Option<&Arc<Geofence>> {
        match origin {
            GeofenceOrigin::Cloud => self.cloud.get(id),
            GeofenceOrigin::Dynamic => self.dynamic.get(id),
        }
    }

    pub fn len(&self) -> usize {
        self.cloud.len() + self.dynamic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every fence on `floor` containing `point`, ordered by (origin, id)
    pub fn query(&self, point: &Coordinate, floor: Option<i32>) -> Vec<Arc<Geofence>> {
        self.matching(point, floor).collect()
    }

    fn matching<'a>(
        &'a self,
        point: &'a Coordinate,
        floor: Option<i32>,
    ) -> impl Iterator<Item = Arc<Geofence>> + 'a {
        // Cloud sorts before Dynamic and each map is ordered by id
        self.cloud
            .values()
            .chain(self.dynamic.values())
            .filter(move |g| g.matches_floor(floor) && g.contains(point))
            .cloned()
    }

    fn inside(&self, fix: &LocationFix) -> FenceList {
        self.matching(&fix.coordinate, fix.floor_level()).collect()
    }

    /// Fences entered and exited moving from `previous` to `current`.
    ///
    /// Computed from the geometry of both fixes against the current index
    /// contents; with no previous fix only enters are reported.
    pub fn transition(&self, previous: Option<&LocationFix>, current: &LocationFix) -> Transition {
        let now = self.inside(current);
        let before = previous.map(|p| self.inside(p)).unwrap_or_default();

        let entered = now.iter().filter(|g| !before.iter().any(|b| same_fence(b, g))).cloned().collect();
        let exited = before.iter().filter(|g| !now.iter().any(|n| same_fence(n, g))).cloned().collect();
        Transition { entered, exited }
    }
}

#[inline]
pub(crate) fn same_fence(a: &Geofence, b: &Geofence) -> bool {
    a.origin() == b.origin() && a.id() == b.id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::FloorRef;
    use crate::geometry::destination;

    fn origin() -> Coordinate {
        Coordinate::new(60.17, 24.94)
    }

    /// Square of `side_m` meters with its south-west corner at `sw`
    fn square(id: &str, floor: Option<i32>, sw: Coordinate, side_m: f64) -> Geofence {
        let se = destination(&sw, 90.0, side_m);
        let ne = destination(&se, 0.0, side_m);
        let nw = destination(&sw, 0.0, side_m);
        Geofence::polygon(id, floor, vec![sw, nw, ne, se]).unwrap()
    }

    fn fix_at(coord: Coordinate, floor: Option<i32>) -> LocationFix {
        let fix = LocationFix::new(coord, 1_000);
        match floor {
            Some(level) => fix.with_floor(level),
            None => fix,
        }
    }

    fn ids(list: &[Arc<Geofence>]) -> Vec<(GeofenceOrigin, String)> {
        list.iter().map(|g| (g.origin(), g.id().to_string())).collect()
    }

    #[test]
    fn test_add_replaces_within_namespace_only() {
        let mut index = GeofenceIndex::new();
        assert_eq!(index.add(square("a", None, origin(), 10.0)), AddOutcome::Inserted);
        assert_eq!(index.add(square("a", None, origin(), 20.0)), AddOutcome::Replaced);
        assert_eq!(index.add(square("a", None, origin(), 10.0).into_cloud()), AddOutcome::Inserted);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_remove_only_touches_dynamic() {
        let mut index = GeofenceIndex::new();
        index.add(square("a", None, origin(), 10.0).into_cloud());
        assert!(index.remove("a").is_none());
        assert!(index.remove("missing").is_none());
        assert_eq!(index.len(), 1);

        index.add(square("a", None, origin(), 10.0));
        assert!(index.remove("a").is_some());
        assert!(index.get(GeofenceOrigin::Cloud, "a").is_some());
    }

    #[test]
    fn test_query_floor_matching_and_order() {
        let mut index = GeofenceIndex::new();
        index.add(square("b", Some(1), origin(), 10.0));
        index.add(square("a", None, origin(), 10.0));
        index.add(square("z", None, origin(), 10.0).into_cloud());
        index.add(square("c", Some(2), origin(), 10.0));

        let inside = destination(&destination(&origin(), 0.0, 5.0), 90.0, 5.0);
        assert_eq!(
            ids(&index.query(&inside, Some(1))),
            vec![
                (GeofenceOrigin::Cloud, "z".to_string()),
                (GeofenceOrigin::Dynamic, "a".to_string()),
                (GeofenceOrigin::Dynamic, "b".to_string()),
            ]
        );
        // No floor on the query: only floorless fences
        assert_eq!(
            ids(&index.query(&inside, None)),
            vec![(GeofenceOrigin::Cloud, "z".to_string()), (GeofenceOrigin::Dynamic, "a".to_string())]
        );

        let outside = destination(&origin(), 180.0, 50.0);
        assert!(index.query(&outside, Some(1)).is_empty());
    }

    #[test]
    fn test_first_fix_only_enters() {
        let mut index = GeofenceIndex::new();
        index.add(square("a", None, origin(), 10.0));
        let inside = destination(&destination(&origin(), 0.0, 5.0), 90.0, 5.0);

        let t = index.transition(None, &fix_at(inside, Some(0)));
        assert_eq!(ids(&t.entered), vec![(GeofenceOrigin::Dynamic, "a".to_string())]);
        assert!(t.exited.is_empty());
    }

    #[test]
    fn test_enter_then_exit() {
        let mut index = GeofenceIndex::new();
        index.add(square("a", Some(0), origin(), 10.0));
        let outside = destination(&origin(), 180.0, 5.0);
        let inside = destination(&destination(&origin(), 0.0, 5.0), 90.0, 5.0);

        let f1 = fix_at(outside, Some(0));
        let f2 = fix_at(inside, Some(0));
        let enter = index.transition(Some(&f1), &f2);
        assert_eq!(enter.entered.len(), 1);
        assert!(enter.exited.is_empty());

        let exit = index.transition(Some(&f2), &f1);
        assert!(exit.entered.is_empty());
        assert_eq!(exit.exited.len(), 1);

        let stay = index.transition(Some(&f2), &f2);
        assert!(stay.is_empty());
    }

    #[test]
    fn test_floor_change_exits_floor_bound_fence() {
        let mut index = GeofenceIndex::new();
        index.add(square("lobby", Some(0), origin(), 10.0));
        index.add(square("atrium", None, origin(), 10.0));
        let inside = destination(&destination(&origin(), 0.0, 5.0), 90.0, 5.0);

        let t = index.transition(Some(&fix_at(inside, Some(0))), &fix_at(inside, Some(1)));
        assert!(t.entered.is_empty());
        assert_eq!(ids(&t.exited), vec![(GeofenceOrigin::Dynamic, "lobby".to_string())]);
    }

    #[test]
    fn test_invalid_floor_treated_as_missing() {
        let mut index = GeofenceIndex::new();
        index.add(square("a", Some(3), origin(), 10.0));
        let inside = destination(&destination(&origin(), 0.0, 5.0), 90.0, 5.0);
        let fix = LocationFix::new(inside, 0).with_floor_ref(FloorRef::with_certainty(3, -1.0));
        assert!(index.transition(None, &fix).entered.is_empty());
    }

    #[test]
    fn test_entered_and_exited_disjoint() {
        let mut index = GeofenceIndex::new();
        for (i, offset) in [0.0, 4.0, 8.0, 12.0].iter().enumerate() {
            let sw = destination(&origin(), 90.0, *offset);
            index.add(square(&format!("f{i}"), None, sw, 6.0));
        }
        let path: Vec<LocationFix> = (0..20)
            .map(|step| {
                let east = destination(&origin(), 90.0, step as f64);
                fix_at(destination(&east, 0.0, 3.0), None)
            })
            .collect();

        let mut prev: Option<&LocationFix> = None;
        for fix in &path {
            let t = index.transition(prev, fix);
            for g in &t.entered {
                assert!(!t.exited.iter().any(|e| Arc::ptr_eq(e, g)));
            }
            prev = Some(fix);
        }
    }

    #[test]
    fn test_replace_cloud_swaps_namespace() {
        let mut index = GeofenceIndex::new();
        index.replace_cloud(vec![square("a", None, origin(), 10.0), square("b", None, origin(), 10.0)]);
        assert!(index.get(GeofenceOrigin::Cloud, "a").is_some());
        index.add(square("d", None, origin(), 10.0));

        index.replace_cloud(vec![square("c", None, origin(), 10.0).into_cloud()]);
        assert!(index.get(GeofenceOrigin::Cloud, "a").is_none());
        assert!(index.get(GeofenceOrigin::Cloud, "c").is_some());
        assert!(index.get(GeofenceOrigin::Dynamic, "d").is_some());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_replace_cloud_duplicate_id_keeps_last() {
        let mut index = GeofenceIndex::new();
        let far = destination(&origin(), 90.0, 100.0);
        let dropped = index.replace_cloud(vec![
            square("gate", Some(0), origin(), 10.0),
            square("gate", Some(0), far, 10.0),
            square("kiosk", Some(0), origin(), 10.0),
        ]);
        assert_eq!(dropped, 1);
        assert_eq!(index.len(), 2);

        let inside_far = destination(&destination(&far, 0.0, 5.0), 90.0, 5.0);
        assert_eq!(ids(&index.query(&inside_far, Some(0))), vec![(GeofenceOrigin::Cloud, "gate".to_string())]);
    }
}
