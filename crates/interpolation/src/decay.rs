//! Distance metrics and the radial decay kernel.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Weight of an observation at `distance`, falling linearly from 1 at the
/// observation to 0 at `radius`. Zero at and beyond the radius, and for a
/// non-positive radius.
#[inline]
pub fn radial_decay(distance: f64, radius: f64) -> f64 {
    if radius > 0.0 && distance < radius {
        1.0 - distance / radius
    } else {
        0.0
    }
}

/// How distance between a cell and an observation is measured. The
/// observation radius is always in the same unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Euclidean difference of coordinates, in degrees.
    #[default]
    Planar,
    /// Great-circle distance, in meters.
    Haversine,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Planar => "planar",
            DistanceMetric::Haversine => "haversine",
        }
    }

    /// Distance between two `(latitude, longitude)` points.
    #[inline]
    pub fn distance(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
        match self {
            DistanceMetric::Planar => (lat1 - lat2).hypot(lon1 - lon2),
            DistanceMetric::Haversine => haversine(lat1, lon1, lat2, lon2),
        }
    }

    /// Half-extents in degrees `(lat, lon)` of the smallest box around a
    /// point at `latitude` that holds every point within `radius`.
    pub fn reach(&self, latitude: f64, radius: f64) -> (f64, f64) {
        match self {
            DistanceMetric::Planar => (radius, radius),
            DistanceMetric::Haversine => {
                let angular = radius / EARTH_RADIUS_M;
                if angular >= std::f64::consts::PI {
                    return (180.0, 360.0);
                }
                let dlat = angular.to_degrees();
                let cos_lat = latitude.to_radians().cos();
                let ratio = angular.sin() / cos_lat;
                // the cap reaches a pole
                if latitude.abs() + dlat >= 90.0 || !(ratio < 1.0) {
                    return (dlat, 360.0);
                }
                (dlat, ratio.asin().to_degrees())
            }
        }
    }
}

fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}
