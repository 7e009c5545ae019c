//! Great-circle distance between two coordinates.
//!
//! The geofence radii used by the ledger are calibrated against the exact
//! haversine formula below with a spherical Earth of radius
//! [`EARTH_RADIUS_M`]. Swapping in another approximation moves accept and
//! reject outcomes near the boundary.

use havn_types::Spot;

use crate::error::ValidationError;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A validated (latitude, longitude) pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// The coordinate of a spot. Stored spots are trusted as-is.
    pub const fn of_spot(spot: &Spot) -> Self {
        Self {
            latitude: spot.latitude,
            longitude: spot.longitude,
        }
    }

    /// Latitude in degrees.
    pub const fn latitude(self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    pub const fn longitude(self) -> f64 {
        self.longitude
    }
}

/// Haversine distance in meters between two coordinates.
///
/// `a = sin²(Δφ/2) + cos φ1 · cos φ2 · sin²(Δλ/2)`,
/// `d = 2R · atan2(√a, √(1−a))`.
pub fn haversine_distance(from: Coordinate, to: Coordinate) -> f64 {
    let phi1 = from.latitude.to_radians();
    let phi2 = to.latitude.to_radians();
    let delta_phi = (to.latitude - from.latitude).to_radians();
    let delta_lambda = (to.longitude - from.longitude).to_radians();

    let half_phi = (delta_phi / 2.0).sin();
    let half_lambda = (delta_lambda / 2.0).sin();
    let a = half_phi.mul_add(half_phi, phi1.cos() * phi2.cos() * half_lambda * half_lambda);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap_or(Coordinate {
            latitude: f64::NAN,
            longitude: f64::NAN,
        })
    }

    #[test]
    fn distance_to_self_is_zero() {
        let p = coord(37.5665, 126.978);
        assert!(haversine_distance(p, p).abs() < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            (coord(0.0, 0.0), coord(0.0, 0.002)),
            (coord(37.5665, 126.978), coord(35.1796, 129.0756)),
            (coord(-33.8688, 151.2093), coord(51.5074, -0.1278)),
            (coord(89.9, 0.0), coord(-89.9, 180.0)),
        ];
        for (a, b) in pairs {
            let ab = haversine_distance(a, b);
            let ba = haversine_distance(b, a);
            assert!((ab - ba).abs() < 1e-6, "{ab} != {ba}");
        }
    }

    #[test]
    fn equator_reference_distances() {
        let origin = coord(0.0, 0.0);
        let far = haversine_distance(origin, coord(0.0, 0.002));
        let near = haversine_distance(origin, coord(0.0, 0.0015));
        assert!((far - 222.39).abs() < 0.1, "far = {far}");
        assert!((near - 166.79).abs() < 0.1, "near = {near}");
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert_eq!(
            Coordinate::new(90.5, 0.0),
            Err(ValidationError::InvalidLatitude(90.5))
        );
        assert_eq!(
            Coordinate::new(0.0, -180.5),
            Err(ValidationError::InvalidLongitude(-180.5))
        );
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_err());
        assert!(Coordinate::new(-90.0, 180.0).is_ok());
    }
}
