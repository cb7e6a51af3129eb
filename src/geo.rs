//! Great-circle distance and nearest-neighbor search.

use serde::{Deserialize, Serialize};

/// Mean earth radius used by the haversine formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Upstream feeds encode "no position" as `0,0`; that and any
    /// non-finite component make the point unusable for matching.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite() && !(self.lat == 0.0 && self.lng == 0.0)
    }
}

/// Anything with a position on the map.
pub trait Located {
    fn position(&self) -> GeoPoint;
}

impl Located for GeoPoint {
    fn position(&self) -> GeoPoint {
        *self
    }
}

/// Haversine distance between two points in kilometres.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    // Clamp guards asin against rounding just above 1.0 for antipodal points.
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Returns the candidate closest to `reference` together with its distance.
///
/// Invalid candidates (see [`GeoPoint::is_valid`]) are skipped. On equal
/// distances the earliest candidate in input order wins. Returns `None` when
/// the slice is empty or every candidate is invalid.
pub fn nearest<T: Located>(reference: GeoPoint, candidates: &[T]) -> Option<(&T, f64)> {
    let mut best: Option<(&T, f64)> = None;

    for candidate in candidates {
        let pos = candidate.position();
        if !pos.is_valid() {
            continue;
        }

        let d = distance_km(reference, pos);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((candidate, d)),
        }
    }

    best
}
