//! Geodesic measures on EPSG:4326 geometries.
//!
//! Areas are square meters and distances meters on the WGS84 ellipsoid;
//! the `_ft` helpers convert to the feet reported in analysis output.

use geo::{BooleanOps, Distance, Geodesic, GeodesicArea, Intersects, LineString, MultiPolygon, Point};
use tailor_models::FEET_PER_METER;

/// Geodesic area of a polygonal geometry in square meters.
#[must_use]
pub fn area_sq_m(polygons: &MultiPolygon<f64>) -> f64 {
    polygons.geodesic_area_unsigned()
}

/// Geodesic area of the intersection of two polygonal geometries in square
/// meters. Zero when they are disjoint or only touch.
#[must_use]
pub fn intersection_area_sq_m(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> f64 {
    if !a.intersects(b) {
        return 0.0;
    }
    area_sq_m(&a.intersection(b))
}

/// Geodesic distance between two points in meters.
#[must_use]
pub fn distance_m(a: Point<f64>, b: Point<f64>) -> f64 {
    Geodesic.distance(a, b)
}

/// Geodesic distance between two points in feet.
#[must_use]
pub fn distance_ft(a: Point<f64>, b: Point<f64>) -> f64 {
    distance_m(a, b) * FEET_PER_METER
}

/// Two-point line from `from` to `to`.
#[must_use]
pub fn line_between(from: Point<f64>, to: Point<f64>) -> LineString<f64> {
    LineString::from(vec![from.0, to.0])
}

/// Geodesic length of a two-point line in feet.
///
/// Lines with more vertices are measured segment by segment.
#[must_use]
pub fn line_length_ft(line: &LineString<f64>) -> f64 {
    line.points()
        .zip(line.points().skip(1))
        .map(|(a, b)| distance_ft(a, b))
        .sum()
}
