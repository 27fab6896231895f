//! Geographic (WGS84) coordinates and great-circle math

use super::planar::{LocalPoint, PlanarPoint};
use serde::{Deserialize, Serialize};

/// Mean Earth radius (IUGG) used for haversine distances
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// WGS84 semi-major axis in meters
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// A WGS84 coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[inline]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// True if both components are finite and within WGS84 ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.7}, {:.7})", self.latitude, self.longitude)
    }
}

/// Longitude maps to x and latitude to y. Ray casting and segment tests are
/// affine invariant, so running them in degree space gives the same answer as
/// running them in a local metric frame.
impl PlanarPoint for Coordinate {
    #[inline]
    fn xy(&self) -> (f64, f64) {
        (self.longitude, self.latitude)
    }

    #[inline]
    fn from_xy(x: f64, y: f64) -> Self {
        Self { latitude: y, longitude: x }
    }
}

/// Great-circle distance in meters
pub fn haversine_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = lat2 - lat1;
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Forward azimuth from `from` to `to`, degrees clockwise from north in [0, 360)
pub fn bearing_degrees(from: &Coordinate, to: &Coordinate) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    normalize_degrees(y.atan2(x).to_degrees())
}

/// Wrap an angle into [0, 360)
#[inline]
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Point reached by travelling `distance_m` from `origin` along `bearing`
pub fn destination(origin: &Coordinate, bearing: f64, distance_m: f64) -> Coordinate {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    let longitude = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    Coordinate::new(lat2.to_degrees(), longitude)
}

/// Local east/north linearization around a fixed origin.
///
/// Uses the WGS84 ellipsoid's prime-vertical and meridional radii at the
/// origin latitude. Accurate to centimeters over building-sized extents;
/// re-anchor the frame when moving far from the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnuFrame {
    origin: Coordinate,
    meters_per_deg_lon: f64,
    meters_per_deg_lat: f64,
}

impl EnuFrame {
    pub fn new(origin: Coordinate) -> Self {
        let b = WGS84_A * (1.0 - WGS84_F);
        let a2 = WGS84_A * WGS84_A;
        let b2 = b * b;
        let (sin_lat, cos_lat) = origin.latitude.to_radians().sin_cos();
        let tmp = (a2 * cos_lat * cos_lat + b2 * sin_lat * sin_lat).sqrt();

        let deg = std::f64::consts::PI / 180.0;
        Self {
            origin,
            meters_per_deg_lon: deg * (a2 / tmp) * cos_lat,
            meters_per_deg_lat: deg * (a2 * b2 / (tmp * tmp * tmp)),
        }
    }

    pub fn origin(&self) -> Coordinate {
        self.origin
    }

    /// Coordinate to (east, north) meters relative to the origin
    #[inline]
    pub fn to_local(&self, coord: &Coordinate) -> LocalPoint {
        LocalPoint::new(
            self.meters_per_deg_lon * (coord.longitude - self.origin.longitude),
            self.meters_per_deg_lat * (coord.latitude - self.origin.latitude),
        )
    }

    /// (east, north) meters relative to the origin back to a coordinate
    #[inline]
    pub fn to_coordinate(&self, point: &LocalPoint) -> Coordinate {
        Coordinate::new(
            self.origin.latitude + point.y / self.meters_per_deg_lat,
            self.origin.longitude + point.x / self.meters_per_deg_lon,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_haversine_known_distance() {
        // Helsinki -> Tampere, roughly 160 km
        let helsinki = Coordinate::new(60.1699, 24.9384);
        let tampere = Coordinate::new(61.4978, 23.7610);
        let d = haversine_meters(&helsinki, &tampere);
        assert!((d - 160_500.0).abs() < 1_500.0, "got {d}");
    }

    #[test]
    fn test_haversine_symmetric_and_zero() {
        let a = Coordinate::new(60.0, 24.0);
        let b = Coordinate::new(60.001, 24.002);
        assert_relative_eq!(haversine_meters(&a, &b), haversine_meters(&b, &a));
        assert_eq!(haversine_meters(&a, &a), 0.0);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = Coordinate::new(0.0, 0.0);
        assert_relative_eq!(bearing_degrees(&origin, &Coordinate::new(1.0, 0.0)), 0.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_degrees(&origin, &Coordinate::new(0.0, 1.0)), 90.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_degrees(&origin, &Coordinate::new(-1.0, 0.0)), 180.0, epsilon = 1e-9);
        assert_relative_eq!(bearing_degrees(&origin, &Coordinate::new(0.0, -1.0)), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bearing_not_symmetric() {
        let a = Coordinate::new(60.0, 24.0);
        let b = Coordinate::new(60.0005, 24.001);
        let forward = bearing_degrees(&a, &b);
        let back = bearing_degrees(&b, &a);
        assert!((normalize_degrees(forward + 180.0) - back).abs() < 0.01);
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(725.0), 5.0);
        assert!(normalize_degrees(-1e-18) < 360.0);
    }

    #[test]
    fn test_destination_matches_distance_and_bearing() {
        let origin = Coordinate::new(60.17, 24.94);
        let target = destination(&origin, 45.0, 100.0);
        assert_relative_eq!(haversine_meters(&origin, &target), 100.0, max_relative = 1e-6);
        assert_relative_eq!(bearing_degrees(&origin, &target), 45.0, epsilon = 1e-3);
    }

    #[test]
    fn test_enu_round_trip_and_scale() {
        let frame = EnuFrame::new(Coordinate::new(60.17, 24.94));
        let coord = destination(&frame.origin(), 90.0, 50.0);
        let local = frame.to_local(&coord);
        // Ellipsoid vs sphere radii differ by well under 1%
        assert!((local.x - 50.0).abs() < 0.5, "east {}", local.x);
        assert!(local.y.abs() < 0.01, "north {}", local.y);

        let back = frame.to_coordinate(&local);
        assert_relative_eq!(back.latitude, coord.latitude, epsilon = 1e-12);
        assert_relative_eq!(back.longitude, coord.longitude, epsilon = 1e-12);
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(60.0, 24.0).is_valid());
        assert!(!Coordinate::new(91.0, 24.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 24.0).is_valid());
    }
}
