//! Floor plan raster placement: pixel, floor-local meter and WGS84 conversions
//!
//! Pixel space has its origin in the top-left corner of the image with y
//! growing downwards. The floor-local frame ([`LocalPoint`]) is in meters with
//! its origin in the bottom-left corner, x along the bottom edge and y along
//! the left edge. Geographic conversions go through an affine map built in an
//! [`EnuFrame`] anchored at the top-left corner, so every conversion pair is an
//! exact inverse up to floating-point rounding.

use crate::domain::route::RouteLeg;
use crate::geometry::{bearing_degrees, Coordinate, EnuFrame, LocalPoint};
use thiserror::Error;

/// Corner mismatch tolerated by [`FloorPlan::validate`], as a fraction of the side
const CORNER_TOLERANCE_REL: f64 = 0.01;
/// Floor for the tolerance on very small plans, meters
const CORNER_TOLERANCE_MIN_M: f64 = 0.05;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FloorPlanError {
    #[error("floor plan dimensions must be positive: {width}x{height} px at {pixel_to_meter} m/px")]
    InvalidDimensions { width: u32, height: u32, pixel_to_meter: f64 },

    #[error("floor plan corners do not span a rectangle")]
    Degenerate,

    #[error("floor plan corner {corner} is {offset_m:.2} m away from its expected position")]
    InconsistentCorners { corner: &'static str, offset_m: f64 },
}

/// Position in image pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A floor plan image placed on the map
#[derive(Debug, Clone, PartialEq)]
pub struct FloorPlan {
    id: String,
    name: Option<String>,
    floor: Option<i32>,
    width_px: u32,
    height_px: u32,
    pixel_to_meter: f64,
    bearing: f64,
    center: Coordinate,
    top_left: Coordinate,
    top_right: Coordinate,
    bottom_left: Coordinate,
    bottom_right: Coordinate,
    frame: EnuFrame,
    /// Meters (east, north) per pixel step along the image x axis
    x_axis: LocalPoint,
    /// Meters (east, north) per pixel step along the image y axis
    y_axis: LocalPoint,
}

impl FloorPlan {
    /// Place a plan from three of its corners; the fourth corner, the center
    /// and the bearing are derived.
    pub fn new(
        id: impl Into<String>,
        width_px: u32,
        height_px: u32,
        pixel_to_meter: f64,
        top_left: Coordinate,
        top_right: Coordinate,
        bottom_left: Coordinate,
    ) -> Result<Self, FloorPlanError> {
        if width_px == 0 || height_px == 0 || !(pixel_to_meter.is_finite() && pixel_to_meter > 0.0)
        {
            return Err(FloorPlanError::InvalidDimensions {
                width: width_px,
                height: height_px,
                pixel_to_meter,
            });
        }
        if ![top_left, top_right, bottom_left].iter().all(Coordinate::is_valid) {
            return Err(FloorPlanError::Degenerate);
        }

        let frame = EnuFrame::new(top_left);
        let tr = frame.to_local(&top_right);
        let bl = frame.to_local(&bottom_left);
        let x_axis = LocalPoint::new(tr.x / width_px as f64, tr.y / width_px as f64);
        let y_axis = LocalPoint::new(bl.x / height_px as f64, bl.y / height_px as f64);

        let det = x_axis.x * y_axis.y - y_axis.x * x_axis.y;
        let scale = x_axis.distance(&LocalPoint::new(0.0, 0.0))
            * y_axis.distance(&LocalPoint::new(0.0, 0.0));
        if !det.is_finite() || scale == 0.0 || (det / scale).abs() < 1e-6 {
            return Err(FloorPlanError::Degenerate);
        }

        let bottom_right = frame.to_coordinate(&LocalPoint::new(tr.x + bl.x, tr.y + bl.y));
        let center = frame.to_coordinate(&LocalPoint::new((tr.x + bl.x) / 2.0, (tr.y + bl.y) / 2.0));

        Ok(Self {
            id: id.into(),
            name: None,
            floor: None,
            width_px,
            height_px,
            pixel_to_meter,
            bearing: bearing_degrees(&bottom_left, &top_left),
            center,
            top_left,
            top_right,
            bottom_left,
            bottom_right,
            frame,
            x_axis,
            y_axis,
        })
    }

    /// Place a plan by its center and the bearing of its left side
    /// (bottom-left towards top-left).
    pub fn from_anchor(
        id: impl Into<String>,
        center: Coordinate,
        bearing: f64,
        width_px: u32,
        height_px: u32,
        pixel_to_meter: f64,
    ) -> Result<Self, FloorPlanError> {
        let frame = EnuFrame::new(center);
        let (sin_b, cos_b) = bearing.to_radians().sin_cos();
        let half_w = width_px as f64 * pixel_to_meter / 2.0;
        let half_h = height_px as f64 * pixel_to_meter / 2.0;
        // Unit vectors of the image "up" and "right" directions in east/north
        let (up_x, up_y) = (sin_b, cos_b);
        let (right_x, right_y) = (cos_b, -sin_b);

        let corner = |r: f64, u: f64| {
            frame.to_coordinate(&LocalPoint::new(r * right_x + u * up_x, r * right_y + u * up_y))
        };
        Self::new(
            id,
            width_px,
            height_px,
            pixel_to_meter,
            corner(-half_w, half_h),
            corner(half_w, half_h),
            corner(-half_w, -half_h),
        )
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_floor(mut self, level: i32) -> Self {
        self.floor = Some(level);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn floor(&self) -> Option<i32> {
        self.floor
    }

    pub fn width_px(&self) -> u32 {
        self.width_px
    }

    pub fn height_px(&self) -> u32 {
        self.height_px
    }

    pub fn pixel_to_meter(&self) -> f64 {
        self.pixel_to_meter
    }

    pub fn meter_to_pixel(&self) -> f64 {
        1.0 / self.pixel_to_meter
    }

    pub fn width_m(&self) -> f64 {
        self.width_px as f64 * self.pixel_to_meter
    }

    pub fn height_m(&self) -> f64 {
        self.height_px as f64 * self.pixel_to_meter
    }

    /// Bearing of the left side, degrees clockwise from north
    pub fn bearing(&self) -> f64 {
        self.bearing
    }

    pub fn center(&self) -> Coordinate {
        self.center
    }

    pub fn top_left(&self) -> Coordinate {
        self.top_left
    }

    pub fn top_right(&self) -> Coordinate {
        self.top_right
    }

    pub fn bottom_left(&self) -> Coordinate {
        self.bottom_left
    }

    pub fn bottom_right(&self) -> Coordinate {
        self.bottom_right
    }

    pub fn pixel_to_coordinate(&self, pixel: PixelPoint) -> Coordinate {
        let east = pixel.x * self.x_axis.x + pixel.y * self.y_axis.x;
        let north = pixel.x * self.x_axis.y + pixel.y * self.y_axis.y;
        self.frame.to_coordinate(&LocalPoint::new(east, north))
    }

    pub fn coordinate_to_pixel(&self, coord: &Coordinate) -> PixelPoint {
        let l = self.frame.to_local(coord);
        let (u, v) = (self.x_axis, self.y_axis);
        // Construction guarantees a non-zero determinant
        let det = u.x * v.y - v.x * u.y;
        PixelPoint::new((l.x * v.y - v.x * l.y) / det, (u.x * l.y - l.x * u.y) / det)
    }

    pub fn pixel_to_local(&self, pixel: PixelPoint) -> LocalPoint {
        LocalPoint::new(
            pixel.x * self.pixel_to_meter,
            (self.height_px as f64 - pixel.y) * self.pixel_to_meter,
        )
    }

    pub fn local_to_pixel(&self, point: &LocalPoint) -> PixelPoint {
        let scale = self.meter_to_pixel();
        PixelPoint::new(point.x * scale, self.height_px as f64 - point.y * scale)
    }

    pub fn coordinate_to_local(&self, coord: &Coordinate) -> LocalPoint {
        self.pixel_to_local(self.coordinate_to_pixel(coord))
    }

    pub fn local_to_coordinate(&self, point: &LocalPoint) -> Coordinate {
        self.pixel_to_coordinate(self.local_to_pixel(point))
    }

    /// True if the coordinate falls on the plan image
    pub fn contains(&self, coord: &Coordinate) -> bool {
        let p = self.coordinate_to_pixel(coord);
        (0.0..=self.width_px as f64).contains(&p.x) && (0.0..=self.height_px as f64).contains(&p.y)
    }

    /// Check the stored corners against the pixel size and scale
    pub fn validate(&self) -> Result<(), FloorPlanError> {
        let tl = self.frame.to_local(&self.top_left);
        let checks = [
            ("top_right", self.frame.to_local(&self.top_right), self.width_m()),
            ("bottom_left", self.frame.to_local(&self.bottom_left), self.height_m()),
        ];
        for (corner, point, expected) in checks {
            let offset_m = (tl.distance(&point) - expected).abs();
            if offset_m > tolerance(expected) {
                return Err(FloorPlanError::InconsistentCorners { corner, offset_m });
            }
        }
        Ok(())
    }

    /// Compare externally supplied center and bottom-right corner with the
    /// derived ones.
    pub fn check_consistency(
        &self,
        center: Option<Coordinate>,
        bottom_right: Option<Coordinate>,
    ) -> Result<(), FloorPlanError> {
        let diagonal = self.width_m().hypot(self.height_m());
        let supplied = [("center", center, self.center), ("bottom_right", bottom_right, self.bottom_right)];
        for (corner, given, derived) in supplied {
            let Some(given) = given else { continue };
            let offset_m = self.frame.to_local(&given).distance(&self.frame.to_local(&derived));
            if offset_m > tolerance(diagonal) {
                return Err(FloorPlanError::InconsistentCorners { corner, offset_m });
            }
        }
        Ok(())
    }

    /// Clip a route leg to the plan rectangle, in floor-local meters.
    ///
    /// Returns `None` when the leg is on another floor or misses the plan.
    pub fn clip_leg(&self, leg: &RouteLeg) -> Option<(LocalPoint, LocalPoint)> {
        if let Some(level) = self.floor {
            if leg.begin.position.floor != level || leg.end.position.floor != level {
                return None;
            }
        }
        let a = self.coordinate_to_local(&leg.begin.position.coordinate);
        let b = self.coordinate_to_local(&leg.end.position.coordinate);
        clip_to_rect(a, b, self.width_m(), self.height_m())
    }
}

fn tolerance(side_m: f64) -> f64 {
    (side_m * CORNER_TOLERANCE_REL).max(CORNER_TOLERANCE_MIN_M)
}

/// Liang-Barsky clipping of segment ab against [0, w] x [0, h]
fn clip_to_rect(a: LocalPoint, b: LocalPoint, w: f64, h: f64) -> Option<(LocalPoint, LocalPoint)> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    for (p, q) in [(-dx, a.x), (dx, w - a.x), (-dy, a.y), (dy, h - a.y)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }

    let at = |t: f64| LocalPoint::new(a.x + t * dx, a.y + t * dy);
    Some((at(t0), at(t1)))
}
