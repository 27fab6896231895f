//! Planar primitives: points, polygons and segments
//!
//! Everything here works on any [`PlanarPoint`], so the same routines serve
//! floor-local meters ([`LocalPoint`]) and geographic polygons tested in
//! (longitude, latitude) space.

use serde::{Deserialize, Serialize};

/// Relative tolerance for collinearity and zero-area tests
const REL_EPS: f64 = 1e-12;

/// A point that can be projected onto a plane
pub trait PlanarPoint: Copy {
    fn xy(&self) -> (f64, f64);
    fn from_xy(x: f64, y: f64) -> Self;
}

/// Planar point in meters within a floor-local frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocalPoint {
    pub x: f64,
    pub y: f64,
}

impl LocalPoint {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in meters
    #[inline]
    pub fn distance(&self, other: &LocalPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Planar bearing with +y as north, degrees in [0, 360)
    pub fn bearing_to(&self, other: &LocalPoint) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        super::geodesic::normalize_degrees(dx.atan2(dy).to_degrees())
    }
}

impl PlanarPoint for LocalPoint {
    #[inline]
    fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    #[inline]
    fn from_xy(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Bounding box of a point set, `None` when empty
    pub fn of<P: PlanarPoint>(points: &[P]) -> Option<Self> {
        let (x0, y0) = points.first()?.xy();
        let mut bbox = Self { min_x: x0, min_y: y0, max_x: x0, max_y: y0 };
        for p in &points[1..] {
            let (x, y) = p.xy();
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        Some(bbox)
    }

    #[inline]
    pub fn contains<P: PlanarPoint>(&self, point: &P) -> bool {
        let (x, y) = point.xy();
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

#[inline]
fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Sign of the turn o -> a -> b: 1 counter-clockwise, -1 clockwise, 0 collinear
fn orientation(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> i8 {
    let c = cross(o, a, b);
    let scale = (a.0 - o.0).hypot(a.1 - o.1) * (b.0 - o.0).hypot(b.1 - o.1);
    if c.abs() <= REL_EPS * scale {
        0
    } else if c > 0.0 {
        1
    } else {
        -1
    }
}

/// For collinear p, q, r: does q lie on segment pr
fn on_segment(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> bool {
    q.0 <= p.0.max(r.0) && q.0 >= p.0.min(r.0) && q.1 <= p.1.max(r.1) && q.1 >= p.1.min(r.1)
}

/// Signed shoelace area; positive for counter-clockwise rings
pub fn polygon_area<P: PlanarPoint>(polygon: &[P]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    // Shift to the first vertex to avoid cancellation with geographic input
    let (ox, oy) = polygon[0].xy();
    let mut sum = 0.0;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = polygon[i].xy();
        let (xj, yj) = polygon[j].xy();
        sum += (xj - ox) * (yi - oy) - (xi - ox) * (yj - oy);
        j = i;
    }
    sum / 2.0
}

/// True if the ring has fewer than 3 vertices or encloses no area
pub fn is_degenerate<P: PlanarPoint>(polygon: &[P]) -> bool {
    let Some(bbox) = BoundingBox::of(polygon) else {
        return true;
    };
    if polygon.len() < 3 || bbox.width() <= 0.0 || bbox.height() <= 0.0 {
        return true;
    }
    polygon_area(polygon).abs() <= REL_EPS * bbox.width() * bbox.height()
}

/// Area centroid of a non-degenerate ring
pub fn polygon_centroid<P: PlanarPoint>(polygon: &[P]) -> Option<P> {
    if is_degenerate(polygon) {
        return None;
    }
    // Shift to the first vertex to keep products small for geographic input
    let (ox, oy) = polygon[0].xy();
    let mut cx = 0.0;
    let mut cy = 0.0;
    let mut twice_area = 0.0;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = polygon[i].xy();
        let (xj, yj) = polygon[j].xy();
        let (xi, yi, xj, yj) = (xi - ox, yi - oy, xj - ox, yj - oy);
        let f = xj * yi - xi * yj;
        twice_area += f;
        cx += (xi + xj) * f;
        cy += (yi + yj) * f;
        j = i;
    }
    Some(P::from_xy(ox + cx / (3.0 * twice_area), oy + cy / (3.0 * twice_area)))
}

/// Ray-casting containment test.
///
/// Each edge owns its lower endpoint but not its upper one, and a crossing
/// counts only when it lies strictly to the right of the point. Shared
/// vertices are therefore never counted twice. On an axis-aligned rectangle
/// points on the minimum-x and minimum-y sides are inside, points on the
/// maximum sides are outside. Degenerate rings contain nothing.
pub fn point_in_polygon<P: PlanarPoint>(point: &P, polygon: &[P]) -> bool {
    if is_degenerate(polygon) {
        return false;
    }
    let (px, py) = point.xy();
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = polygon[i].xy();
        let (xj, yj) = polygon[j].xy();
        if (yi > py) != (yj > py) {
            let x_cross = xi + (py - yi) * (xj - xi) / (yj - yi);
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// True if segments p1p2 and q1q2 share at least one point (touching counts)
pub fn segments_intersect<P: PlanarPoint>(p1: &P, p2: &P, q1: &P, q2: &P) -> bool {
    let (a, b, c, d) = (p1.xy(), p2.xy(), q1.xy(), q2.xy());
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);

    if o1 != o2 && o3 != o4 {
        return true;
    }
    (o1 == 0 && on_segment(a, c, b))
        || (o2 == 0 && on_segment(a, d, b))
        || (o3 == 0 && on_segment(c, a, d))
        || (o4 == 0 && on_segment(c, b, d))
}

/// Intersection point of segments p1p2 and q1q2.
///
/// For collinear overlapping segments the overlap endpoint closest to `p1` is
/// returned.
pub fn segment_intersection<P: PlanarPoint>(p1: &P, p2: &P, q1: &P, q2: &P) -> Option<P> {
    if !segments_intersect(p1, p2, q1, q2) {
        return None;
    }
    let (a, b, c, d) = (p1.xy(), p2.xy(), q1.xy(), q2.xy());
    let r = (b.0 - a.0, b.1 - a.1);
    let s = (d.0 - c.0, d.1 - c.1);
    let denom = r.0 * s.1 - r.1 * s.0;

    if orientation(a, b, c) == 0 && orientation(a, b, d) == 0 {
        // Collinear overlap: pick the overlapping endpoint nearest p1
        let mut candidates: Vec<(f64, f64)> = Vec::with_capacity(4);
        for pt in [a, b] {
            if on_segment(c, pt, d) {
                candidates.push(pt);
            }
        }
        for pt in [c, d] {
            if on_segment(a, pt, b) {
                candidates.push(pt);
            }
        }
        let dist = |pt: &(f64, f64)| (pt.0 - a.0).hypot(pt.1 - a.1);
        return candidates
            .into_iter()
            .min_by(|x, y| dist(x).total_cmp(&dist(y)))
            .map(|(x, y)| P::from_xy(x, y));
    }

    let t = ((c.0 - a.0) * s.1 - (c.1 - a.1) * s.0) / denom;
    let t = t.clamp(0.0, 1.0);
    Some(P::from_xy(a.0 + t * r.0, a.1 + t * r.1))
}

/// True if no two edges of the ring cross or overlap.
///
/// Adjacent edges may only share their common vertex.
pub fn polygon_is_simple<P: PlanarPoint>(polygon: &[P]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    for i in 0..n {
        let a1 = polygon[i];
        let a2 = polygon[(i + 1) % n];
        for j in (i + 1)..n {
            let b1 = polygon[j];
            let b2 = polygon[(j + 1) % n];
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                // Shared vertex is fine; folding back along the same line is not
                let (shared, other_a, other_b) =
                    if j == i + 1 { (a2, a1, b2) } else { (a1, a2, b1) };
                let o = orientation(shared.xy(), other_a.xy(), other_b.xy());
                if o == 0 {
                    let (s, oa, ob) = (shared.xy(), other_a.xy(), other_b.xy());
                    let same_direction = (oa.0 - s.0) * (ob.0 - s.0) + (oa.1 - s.1) * (ob.1 - s.1) > 0.0;
                    if same_direction {
                        return false;
                    }
                }
                continue;
            }
            if segments_intersect(&a1, &a2, &b1, &b2) {
                return false;
            }
        }
    }
    true
}

/// Shortest distance from `p` to segment ab, in the units of the plane
pub fn point_segment_distance(p: &LocalPoint, a: &LocalPoint, b: &LocalPoint) -> f64 {
    let abx = b.x - a.x;
    let aby = b.y - a.y;
    let len2 = abx * abx + aby * aby;
    if len2 == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * abx + (p.y - a.y) * aby) / len2).clamp(0.0, 1.0);
    p.distance(&LocalPoint::new(a.x + t * abx, a.y + t * aby))
}
