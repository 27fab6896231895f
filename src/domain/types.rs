//! Shared value types: floors, fixes, timestamps

use crate::geometry::Coordinate;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Floor level with the certainty that the level is correct.
///
/// Certainty is in [0, 1]; a negative value marks the floor as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloorRef {
    pub level: i32,
    pub certainty: f64,
}

impl FloorRef {
    /// Floor with full certainty
    #[inline]
    pub fn new(level: i32) -> Self {
        Self { level, certainty: 1.0 }
    }

    #[inline]
    pub fn with_certainty(level: i32, certainty: f64) -> Self {
        Self { level, certainty }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.certainty >= 0.0
    }
}

/// A coordinate pinned to a floor level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngFloor {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    pub floor: i32,
}

impl LatLngFloor {
    #[inline]
    pub fn new(latitude: f64, longitude: f64, floor: i32) -> Self {
        Self { coordinate: Coordinate::new(latitude, longitude), floor }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("expected \"latitude,longitude,floor\", got {0:?}")]
pub struct ParseLatLngFloorError(String);

/// Parses `"latitude,longitude,floor"`, as taken on the command line
impl FromStr for LatLngFloor {
    type Err = ParseLatLngFloorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseLatLngFloorError(s.to_string());
        let mut parts = s.split(',').map(str::trim);
        let (Some(lat), Some(lon), Some(floor), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(err());
        };
        let latitude: f64 = lat.parse().map_err(|_| err())?;
        let longitude: f64 = lon.parse().map_err(|_| err())?;
        let floor: i32 = floor.parse().map_err(|_| err())?;
        let parsed = LatLngFloor::new(latitude, longitude, floor);
        if !parsed.coordinate.is_valid() {
            return Err(err());
        }
        Ok(parsed)
    }
}

impl std::fmt::Display for LatLngFloor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.coordinate, self.floor)
    }
}

/// A single location estimate delivered by the positioning layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub coordinate: Coordinate,
    pub floor: Option<FloorRef>,
    /// Epoch milliseconds
    pub timestamp_ms: u64,
    /// Horizontal accuracy radius in meters
    pub accuracy_m: f32,
}

impl LocationFix {
    #[inline]
    pub fn new(coordinate: Coordinate, timestamp_ms: u64) -> Self {
        Self { coordinate, floor: None, timestamp_ms, accuracy_m: 0.0 }
    }

    pub fn with_floor(mut self, level: i32) -> Self {
        self.floor = Some(FloorRef::new(level));
        self
    }

    pub fn with_floor_ref(mut self, floor: FloorRef) -> Self {
        self.floor = Some(floor);
        self
    }

    pub fn with_accuracy(mut self, accuracy_m: f32) -> Self {
        self.accuracy_m = accuracy_m;
        self
    }

    /// Floor level if present and valid
    #[inline]
    pub fn floor_level(&self) -> Option<i32> {
        self.floor.filter(FloorRef::is_valid).map(|f| f.level)
    }

    /// Position as a wayfinding endpoint; requires a valid floor
    pub fn lat_lng_floor(&self) -> Option<LatLngFloor> {
        self.floor_level().map(|floor| LatLngFloor { coordinate: self.coordinate, floor })
    }
}

/// Timestamp that can be either ISO 8601 string or epoch milliseconds
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TimestampValue {
    #[default]
    None,
    IsoString(String),
    EpochMs(u64),
}

impl TimestampValue {
    /// Resolve to epoch milliseconds; unparseable strings yield `None`
    pub fn to_epoch_ms(&self) -> Option<u64> {
        match self {
            TimestampValue::None => None,
            TimestampValue::EpochMs(ms) => Some(*ms),
            TimestampValue::IsoString(s) => {
                let dt = OffsetDateTime::parse(s, &Rfc3339).ok()?;
                u64::try_from(dt.unix_timestamp_nanos() / 1_000_000).ok()
            }
        }
    }
}

pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<TimestampValue, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = TimestampValue;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer timestamp")
        }

        fn visit_str<E>(self, value: &str) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::EpochMs(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            // Negative epochs are clamped to 0
            let epoch_ms = u64::try_from(value).unwrap_or(0);
            Ok(TimestampValue::EpochMs(epoch_ms))
        }
    }

    deserializer.deserialize_any(TimestampVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_ref_validity() {
        assert!(FloorRef::new(2).is_valid());
        assert!(!FloorRef::with_certainty(2, -1.0).is_valid());
    }

    #[test]
    fn test_fix_floor_level_ignores_invalid_floor() {
        let coord = Coordinate::new(60.0, 24.0);
        let fix = LocationFix::new(coord, 0).with_floor_ref(FloorRef::with_certainty(3, -1.0));
        assert_eq!(fix.floor_level(), None);
        assert!(fix.lat_lng_floor().is_none());

        let fix = LocationFix::new(coord, 0).with_floor(3);
        assert_eq!(fix.floor_level(), Some(3));
        assert_eq!(fix.lat_lng_floor(), Some(LatLngFloor::new(60.0, 24.0, 3)));
    }

    #[test]
    fn test_timestamp_resolution() {
        assert_eq!(TimestampValue::EpochMs(42).to_epoch_ms(), Some(42));
        assert_eq!(
            TimestampValue::IsoString("2024-01-01T00:00:01Z".to_string()).to_epoch_ms(),
            Some(1_704_067_201_000)
        );
        assert_eq!(TimestampValue::IsoString("yesterday".to_string()).to_epoch_ms(), None);
        assert_eq!(TimestampValue::None.to_epoch_ms(), None);
    }

    #[test]
    fn test_lat_lng_floor_serde_is_flat() {
        let p = LatLngFloor::new(60.1, 24.9, 1);
        let json = serde_json::to_value(p).unwrap();
        assert_eq!(json["latitude"], 60.1);
        assert_eq!(json["floor"], 1);
        let back: LatLngFloor = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_lat_lng_floor_from_str() {
        assert_eq!("60.17, 24.94, -1".parse::<LatLngFloor>(), Ok(LatLngFloor::new(60.17, 24.94, -1)));
        assert!("60.17,24.94".parse::<LatLngFloor>().is_err());
        assert!("60.17,24.94,1,2".parse::<LatLngFloor>().is_err());
        assert!("95.0,24.94,1".parse::<LatLngFloor>().is_err());
        assert!("a,b,c".parse::<LatLngFloor>().is_err());
    }
}
