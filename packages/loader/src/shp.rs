//! ESRI Shapefile source reader.
//!
//! Requires the `.shp`, `.shx` and `.dbf` components. The `.prj`, when
//! present, must describe geographic WGS84 since no reprojection is done.

use std::path::Path;

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde_json::{Map, Number, Value};
use shapefile::dbase::FieldValue;
use shapefile::{PolygonRing, Shape};

use crate::{LoadError, SourceFeature};

/// Reads every shape and its attribute record.
///
/// With `relax_numeric_precision`, numeric fields are stored as plain
/// floating point values; otherwise integral values keep an integer
/// representation.
///
/// # Errors
///
/// Returns [`LoadError`] if a component is missing, the `.prj` names a
/// projected or non-WGS84 system, or a record cannot be read.
pub fn read(path: &Path, relax_numeric_precision: bool) -> Result<Vec<SourceFeature>, LoadError> {
    verify_components(path)?;
    check_projection(path)?;

    let mut reader = shapefile::Reader::from_path(path).map_err(|e| shapefile_error(path, e))?;

    let mut features = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.map_err(|e| shapefile_error(path, e))?;

        let mut properties = Map::new();
        for (name, value) in record {
            properties.insert(name, field_to_json(value, relax_numeric_precision));
        }

        features.push(SourceFeature {
            geometry: shape_to_geometry(shape),
            properties,
        });
    }

    log::debug!("Read {} shapes from {}", features.len(), path.display());

    Ok(features)
}

fn shapefile_error(path: &Path, e: shapefile::Error) -> LoadError {
    LoadError::Shapefile {
        path: path.to_path_buf(),
        source: Box::new(e),
    }
}

fn verify_components(path: &Path) -> Result<(), LoadError> {
    let missing: Vec<String> = ["shp", "shx", "dbf"]
        .iter()
        .filter(|ext| !path.with_extension(ext).exists())
        .map(|ext| format!(".{ext}"))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(LoadError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("missing Shapefile components: {}", missing.join(", ")),
            ),
        })
    }
}

/// Accepts a missing `.prj` (assumed WGS84) or a geographic WGS84 one.
fn check_projection(path: &Path) -> Result<(), LoadError> {
    let prj_path = path.with_extension("prj");
    if !prj_path.exists() {
        log::warn!(
            "{} has no .prj; assuming WGS84 longitude/latitude",
            path.display()
        );
        return Ok(());
    }

    let wkt = std::fs::read_to_string(&prj_path).map_err(|source| LoadError::Io {
        path: prj_path.clone(),
        source,
    })?;

    if is_geographic_wgs84(&wkt) {
        Ok(())
    } else {
        Err(LoadError::UnsupportedCrs {
            path: path.to_path_buf(),
            crs: wkt.trim().chars().take(80).collect(),
        })
    }
}

/// Whether a `.prj` WKT string is an unprojected WGS84 system.
fn is_geographic_wgs84(wkt: &str) -> bool {
    let upper = wkt.to_ascii_uppercase();
    let geographic = upper.trim_start().starts_with("GEOGCS") || upper.trim_start().starts_with("GEOGCRS");
    let wgs84 = upper.contains("WGS_1984") || upper.contains("WGS 84") || upper.contains("WGS84");
    geographic && wgs84 && !upper.contains("PROJCS")
}

fn field_to_json(value: FieldValue, relax_numeric_precision: bool) -> Value {
    match value {
        FieldValue::Character(text) => text.map_or(Value::Null, Value::String),
        FieldValue::Memo(text) => Value::String(text),
        FieldValue::Logical(flag) => flag.map_or(Value::Null, Value::Bool),
        FieldValue::Integer(n) => Value::from(n),
        FieldValue::Numeric(n) => n.map_or(Value::Null, |n| numeric(n, relax_numeric_precision)),
        FieldValue::Float(n) => n.map_or(Value::Null, |n| float(f64::from(n))),
        FieldValue::Double(n) | FieldValue::Currency(n) => float(n),
        FieldValue::Date(date) => date.map_or(Value::Null, |d| {
            Value::String(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }),
        other => Value::String(format!("{other:?}")),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn numeric(n: f64, relax_numeric_precision: bool) -> Value {
    if !relax_numeric_precision && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Value::from(n as i64);
    }
    float(n)
}

fn float(n: f64) -> Value {
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

fn shape_to_geometry(shape: Shape) -> Option<Geometry<f64>> {
    match shape {
        Shape::NullShape | Shape::Multipatch(_) => None,
        Shape::Point(p) => Some(Geometry::Point(Point::new(p.x, p.y))),
        Shape::PointM(p) => Some(Geometry::Point(Point::new(p.x, p.y))),
        Shape::PointZ(p) => Some(Geometry::Point(Point::new(p.x, p.y))),
        Shape::Multipoint(mp) => Some(multipoint(mp.points(), |p| Coord { x: p.x, y: p.y })),
        Shape::MultipointM(mp) => Some(multipoint(mp.points(), |p| Coord { x: p.x, y: p.y })),
        Shape::MultipointZ(mp) => Some(multipoint(mp.points(), |p| Coord { x: p.x, y: p.y })),
        Shape::Polyline(line) => Some(polyline(line.parts(), |p| Coord { x: p.x, y: p.y })),
        Shape::PolylineM(line) => Some(polyline(line.parts(), |p| Coord { x: p.x, y: p.y })),
        Shape::PolylineZ(line) => Some(polyline(line.parts(), |p| Coord { x: p.x, y: p.y })),
        Shape::Polygon(polygon) => Some(polygons(polygon.rings(), |p| Coord { x: p.x, y: p.y })),
        Shape::PolygonM(polygon) => Some(polygons(polygon.rings(), |p| Coord { x: p.x, y: p.y })),
        Shape::PolygonZ(polygon) => Some(polygons(polygon.rings(), |p| Coord { x: p.x, y: p.y })),
    }
}

fn multipoint<P>(points: &[P], xy: impl Fn(&P) -> Coord<f64>) -> Geometry<f64> {
    Geometry::MultiPoint(MultiPoint::new(points.iter().map(|p| Point::from(xy(p))).collect()))
}

fn polyline<P>(parts: &[Vec<P>], xy: impl Fn(&P) -> Coord<f64>) -> Geometry<f64> {
    let mut lines: Vec<LineString<f64>> = parts
        .iter()
        .map(|part| part.iter().map(&xy).collect())
        .collect();
    if lines.len() == 1 {
        Geometry::LineString(lines.remove(0))
    } else {
        Geometry::MultiLineString(MultiLineString::new(lines))
    }
}

/// Groups rings into polygons: each outer ring starts a polygon and the
/// inner rings that follow it become its holes.
fn polygons<P>(rings: &[PolygonRing<P>], xy: impl Fn(&P) -> Coord<f64>) -> Geometry<f64> {
    let mut result: Vec<Polygon<f64>> = Vec::new();

    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => {
                let exterior: LineString<f64> = points.iter().map(&xy).collect();
                result.push(Polygon::new(exterior, vec![]));
            }
            PolygonRing::Inner(points) => {
                let interior: LineString<f64> = points.iter().map(&xy).collect();
                match result.last_mut() {
                    Some(polygon) => polygon.interiors_push(interior),
                    None => result.push(Polygon::new(interior, vec![])),
                }
            }
        }
    }

    if result.len() == 1 {
        Geometry::Polygon(result.remove(0))
    } else {
        Geometry::MultiPolygon(MultiPolygon::new(result))
    }
}
