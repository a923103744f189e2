// src/geo/point.rs
//! Latitude/longitude value type

use crate::error::{LocationError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A position on the Earth's surface in decimal degrees.
///
/// Latitude is kept within [-90, 90] and longitude within [-180, 180].
/// Values deserialized from JSON go through the same check as [`GeoPoint::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = LocationError;

    fn try_from(raw: RawGeoPoint) -> Result<Self> {
        GeoPoint::new(raw.latitude, raw.longitude)
    }
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
        {
            return Err(LocationError::InvalidCoordinate { latitude, longitude });
        }
        Ok(Self { latitude, longitude })
    }

    /// Builds a point from computed coordinates, clamping latitude and
    /// wrapping longitude back into range.
    pub(crate) fn wrapped(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: latitude.clamp(-90.0, 90.0),
            longitude: wrap_longitude(longitude),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Initial great-circle bearing from this point to `other`, see [`super::bearing`].
    pub fn bearing_to(&self, other: &GeoPoint) -> f64 {
        super::bearing(self, other)
    }

    /// Great-circle distance to `other` in kilometers, see [`super::distance_km`].
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        super::distance_km(self, other)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

fn wrap_longitude(longitude: f64) -> f64 {
    if (-180.0..=180.0).contains(&longitude) {
        longitude
    } else {
        (longitude + 180.0).rem_euclid(360.0) - 180.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_point() {
        let point = GeoPoint::new(42.438878, -71.119277).unwrap();
        assert_eq!(point.latitude(), 42.438878);
        assert_eq!(point.longitude(), -71.119277);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(GeoPoint::new(90.5, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.1).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn test_wrapped_longitude() {
        let point = GeoPoint::wrapped(10.0, 190.0);
        assert!((point.longitude() - -170.0).abs() < 1e-9);
        let point = GeoPoint::wrapped(95.0, -200.0);
        assert_eq!(point.latitude(), 90.0);
        assert!((point.longitude() - 160.0).abs() < 1e-9);
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: GeoPoint = serde_json::from_str(r#"{"latitude":48.117,"longitude":11.517}"#).unwrap();
        assert_eq!(ok.latitude(), 48.117);

        let bad = serde_json::from_str::<GeoPoint>(r#"{"latitude":123.0,"longitude":11.517}"#);
        assert!(bad.is_err());
    }
}
