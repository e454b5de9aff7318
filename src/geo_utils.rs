//! # Geographic Utilities
//!
//! Core geographic computations used by the routing policy, the segment
//! aggregator and the map layers.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two coordinates |
//! | [`round_coordinate`] | Bin a coordinate to a fixed number of decimals |
//! | [`round_route`] | Bin every coordinate of a route |
//! | [`polyline_length`] | Total length of a coordinate sequence in meters |
//! | [`compute_bounds`] | Bounding box of a set of coordinates |
//! | [`compute_center`] | Arithmetic centroid of a set of coordinates |
//! | [`convex_hull`] | Convex hull of a set of coordinates |
//!
//! ## Example
//!
//! ```rust
//! use school_routes::{Coordinate, geo_utils};
//!
//! let school = Coordinate::new(52.5200, 13.4050);
//! let home = Coordinate::new(52.5300, 13.4050);
//!
//! let dist = geo_utils::haversine_distance(&school, &home);
//! assert!((dist - 1112.0).abs() < 5.0);
//!
//! let noisy = Coordinate::new(52.5200004, 13.4049998);
//! assert_eq!(geo_utils::round_coordinate(&noisy, 5), school);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! Distances assume a spherical Earth with radius 6,371,000 m. This is the same
//! radius the radius rules in the model configuration were written against, so
//! it is applied directly instead of the slightly larger mean radius used by
//! `geo`.
//!
//! ### Rounding
//!
//! Coordinates are scaled by `10^precision` and rounded half-to-even, then
//! scaled back. Two raw coordinates that differ by sub-meter noise land on the
//! same binned value, and binning an already binned coordinate is a no-op.

use geo::{ConvexHull, MultiPoint, Point, Polygon};

use crate::{Bounds, Coordinate};

/// Earth radius used by [`haversine_distance`], in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Decimal digits kept when binning route coordinates (~1.1 m at the equator).
pub const DEFAULT_PRECISION: u32 = 5;

/// Meters per degree of latitude, used for coarse meter to degree conversion.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two coordinates using the
/// Haversine formula.
///
/// # Returns
///
/// Distance in meters along the Earth's surface.
///
/// # Example
///
/// ```rust
/// use school_routes::{Coordinate, geo_utils};
///
/// let a = Coordinate::new(52.0, 13.0);
/// let b = Coordinate::new(53.0, 13.0);
///
/// let dist = geo_utils::haversine_distance(&a, &b);
/// assert!((dist - 111_195.0).abs() < 10.0);
/// ```
#[inline]
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Calculate the total length of a polyline in meters.
///
/// Empty or single-point polylines return 0.0.
pub fn polyline_length(points: &[Coordinate]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Rounding
// =============================================================================

/// Round both components of a coordinate to `precision` decimal places.
///
/// Uses round-half-to-even on the scaled value. The operation is idempotent:
/// `round_coordinate(&round_coordinate(&c, p), p) == round_coordinate(&c, p)`.
#[inline]
pub fn round_coordinate(c: &Coordinate, precision: u32) -> Coordinate {
    let factor = 10f64.powi(precision as i32);
    Coordinate::new(
        round_scaled(c.latitude, factor),
        round_scaled(c.longitude, factor),
    )
}

/// Round every coordinate of a route. See [`round_coordinate`].
pub fn round_route(points: &[Coordinate], precision: u32) -> Vec<Coordinate> {
    points.iter().map(|p| round_coordinate(p, precision)).collect()
}

#[inline]
fn round_scaled(value: f64, factor: f64) -> f64 {
    let rounded = (value * factor).round_ties_even() / factor;
    // -0.0 and 0.0 must bin together
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

// =============================================================================
// Bounding Box / Center / Hull
// =============================================================================

/// Compute the bounding box of a set of coordinates.
///
/// Returns `None` for empty input.
pub fn compute_bounds(points: &[Coordinate]) -> Option<Bounds> {
    if points.is_empty() {
        return None;
    }

    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Some(Bounds { min_lat, max_lat, min_lng, max_lng })
}

/// Compute the arithmetic centroid of a set of coordinates.
///
/// Suitable for the small areas a school catchment covers. Returns `None` for
/// empty input.
pub fn compute_center(points: &[Coordinate]) -> Option<Coordinate> {
    if points.is_empty() {
        return None;
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    Some(Coordinate::new(sum_lat / n, sum_lng / n))
}

/// Convex hull of a set of coordinates in (x = longitude, y = latitude) order.
///
/// Fewer than three distinct points produce a degenerate polygon, which is
/// still a valid region key.
pub fn convex_hull(points: &[Coordinate]) -> Polygon<f64> {
    let multi: MultiPoint<f64> = points
        .iter()
        .map(|p| Point::new(p.longitude, p.latitude))
        .collect();
    multi.convex_hull()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = Coordinate::new(52.5200, 13.4050);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_symmetric() {
        let a = Coordinate::new(52.5200, 13.4050);
        let b = Coordinate::new(48.1351, 11.5820);
        assert_eq!(haversine_distance(&a, &b), haversine_distance(&b, &a));
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let a = Coordinate::new(10.0, 20.0);
        let b = Coordinate::new(11.0, 20.0);
        let dist = haversine_distance(&a, &b);
        assert!(approx_eq(dist, 111_320.0, 111_320.0 * 0.01));
    }

    #[test]
    fn test_haversine_known_value() {
        // Berlin to Munich is roughly 504 km
        let berlin = Coordinate::new(52.5200, 13.4050);
        let munich = Coordinate::new(48.1351, 11.5820);
        assert!(approx_eq(haversine_distance(&berlin, &munich), 504_000.0, 5_000.0));
    }

    #[test]
    fn test_round_coordinate_bins_noise() {
        let a = Coordinate::new(52.1234561, 13.0000049);
        let b = Coordinate::new(52.1234558, 12.9999951);
        assert_eq!(round_coordinate(&a, 5), round_coordinate(&b, 5));
        assert_eq!(round_coordinate(&a, 5), Coordinate::new(52.12346, 13.0));
    }

    #[test]
    fn test_round_coordinate_idempotent() {
        let samples = [
            Coordinate::new(52.123456789, 13.987654321),
            Coordinate::new(-33.868820, 151.209290),
            Coordinate::new(0.000005, -0.000015),
            Coordinate::new(89.999999, -179.999999),
        ];
        for c in samples {
            let once = round_coordinate(&c, DEFAULT_PRECISION);
            let twice = round_coordinate(&once, DEFAULT_PRECISION);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_round_coordinate_negative_zero() {
        let c = round_coordinate(&Coordinate::new(-0.000001, 0.000001), 5);
        assert_eq!(c.latitude.to_bits(), 0.0f64.to_bits());
        assert_eq!(c.longitude.to_bits(), 0.0f64.to_bits());
    }

    #[test]
    fn test_polyline_length() {
        assert_eq!(polyline_length(&[]), 0.0);
        assert_eq!(polyline_length(&[Coordinate::new(52.0, 13.0)]), 0.0);

        let track = [Coordinate::new(52.0, 13.0), Coordinate::new(52.001, 13.0)];
        assert!(approx_eq(polyline_length(&track), 111.2, 0.5));
    }

    #[test]
    fn test_compute_bounds() {
        let points = [
            Coordinate::new(52.50, 13.30),
            Coordinate::new(52.51, 13.32),
            Coordinate::new(52.505, 13.31),
        ];
        let bounds = compute_bounds(&points).unwrap();
        assert_eq!(bounds.min_lat, 52.50);
        assert_eq!(bounds.max_lat, 52.51);
        assert_eq!(bounds.min_lng, 13.30);
        assert_eq!(bounds.max_lng, 13.32);
        assert!(compute_bounds(&[]).is_none());
    }

    #[test]
    fn test_compute_center() {
        let points = [Coordinate::new(52.50, 13.10), Coordinate::new(52.52, 13.12)];
        let center = compute_center(&points).unwrap();
        assert!(approx_eq(center.latitude, 52.51, 1e-9));
        assert!(approx_eq(center.longitude, 13.11, 1e-9));
        assert!(compute_center(&[]).is_none());
    }

    #[test]
    fn test_convex_hull_drops_interior_points() {
        let points = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 1.0),
            Coordinate::new(1.0, 1.0),
            Coordinate::new(1.0, 0.0),
            Coordinate::new(0.5, 0.5),
        ];
        let hull = convex_hull(&points);
        // closed ring: 4 corners + repeated first vertex
        assert_eq!(hull.exterior().0.len(), 5);
        assert!(!hull
            .exterior()
            .0
            .iter()
            .any(|c| c.x == 0.5 && c.y == 0.5));
    }
}
