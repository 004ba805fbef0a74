//! Great-circle distance helpers

use crate::model::Coordinate;

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two coordinates in kilometres.
pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Inclusive radius check.
pub fn within_radius(a: &Coordinate, b: &Coordinate, radius_km: f64) -> bool {
    haversine_km(a, b) <= radius_km
}
