//! Great-circle distance between coordinates.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid coordinates ({latitude}, {longitude})")]
pub struct InvalidCoordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a point, rejecting out-of-range or non-finite coordinates.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinates> {
        let point = Self {
            latitude,
            longitude,
        };
        point.validate()?;
        Ok(point)
    }

    /// Deserialized points skip `new`, so request handlers call this.
    pub fn validate(&self) -> Result<(), InvalidCoordinates> {
        let lat_ok = self.latitude.is_finite() && (-90.0..=90.0).contains(&self.latitude);
        let lng_ok = self.longitude.is_finite() && (-180.0..=180.0).contains(&self.longitude);
        if lat_ok && lng_ok {
            Ok(())
        } else {
            Err(InvalidCoordinates {
                latitude: self.latitude,
                longitude: self.longitude,
            })
        }
    }

    pub fn distance_km_to(&self, other: &GeoPoint) -> f64 {
        distance_km(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

/// Calculate distance between two coordinates in kilometers
///
/// Haversine formula over a sphere of radius [`EARTH_RADIUS_KM`]. The
/// intermediate term is clamped to `[0, 1]`; rounding can push it just past 1
/// for antipodal points, which would otherwise yield NaN.
pub fn distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}
