//! OGC validity checks and the single automatic repair pass.

use geo::{
    BooleanOps, Centroid, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point,
    Validation,
};

/// Whether a geometry is OGC-valid.
#[must_use]
pub fn is_valid(geometry: &Geometry<f64>) -> bool {
    geometry.is_valid()
}

/// Rebuilds a geometry from its polygonal portions.
///
/// Polygonal parts are re-noded through a boolean union, which resolves
/// self-intersections, ring orientation and overlapping parts into a valid
/// [`MultiPolygon`]. Returns `None` when the geometry has no polygonal
/// portion (points, lines, collections without polygons); such geometries
/// are left for the caller to keep unchanged.
#[must_use]
pub fn make_valid_polygonal(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    let polygons = polygonal_parts(geometry);
    if polygons.0.is_empty() {
        return None;
    }
    Some(polygons.union(&MultiPolygon::new(vec![])))
}

fn polygonal_parts(geometry: &Geometry<f64>) -> MultiPolygon<f64> {
    match geometry {
        Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon.clone()]),
        Geometry::MultiPolygon(multi) => multi.clone(),
        Geometry::Rect(rect) => MultiPolygon::new(vec![rect.to_polygon()]),
        Geometry::Triangle(triangle) => MultiPolygon::new(vec![triangle.to_polygon()]),
        Geometry::GeometryCollection(collection) => MultiPolygon::new(
            collection
                .iter()
                .flat_map(|part| polygonal_parts(part).0)
                .collect(),
        ),
        Geometry::Point(_)
        | Geometry::Line(_)
        | Geometry::LineString(_)
        | Geometry::MultiPoint(_)
        | Geometry::MultiLineString(_) => MultiPolygon::new(vec![]),
    }
}

/// Promotes a single-part geometry to its multi-part type. Multi-part
/// geometries and collections are returned unchanged.
#[must_use]
pub fn promote_to_multi(geometry: Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::Point(point) => Geometry::MultiPoint(MultiPoint::new(vec![point])),
        Geometry::LineString(line) => Geometry::MultiLineString(MultiLineString::new(vec![line])),
        Geometry::Line(line) => Geometry::MultiLineString(MultiLineString::new(vec![
            LineString::from(vec![line.start, line.end]),
        ])),
        Geometry::Polygon(polygon) => Geometry::MultiPolygon(MultiPolygon::new(vec![polygon])),
        Geometry::Rect(rect) => Geometry::MultiPolygon(MultiPolygon::new(vec![rect.to_polygon()])),
        Geometry::Triangle(triangle) => {
            Geometry::MultiPolygon(MultiPolygon::new(vec![triangle.to_polygon()]))
        }
        other @ (Geometry::MultiPoint(_)
        | Geometry::MultiLineString(_)
        | Geometry::MultiPolygon(_)
        | Geometry::GeometryCollection(_)) => other,
    }
}

/// Polygonal view of a geometry for area computations. Non-polygonal parts
/// are ignored.
#[must_use]
pub fn as_multi_polygon(geometry: &Geometry<f64>) -> MultiPolygon<f64> {
    polygonal_parts(geometry)
}

/// A single point standing in for a geometry in distance and line
/// computations: the point itself, the first point of a multipoint, or the
/// centroid of anything else.
#[must_use]
pub fn representative_point(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    match geometry {
        Geometry::Point(point) => Some(*point),
        Geometry::MultiPoint(points) => points.0.first().copied(),
        other => other.centroid(),
    }
}
