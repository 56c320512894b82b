#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry handling for tailor layers.
//!
//! Layer geometries are stored as `GeoJSON` text in EPSG:4326. This crate
//! converts them to [`geo`] types, checks and repairs OGC validity, measures
//! areas and distances geodesically, and builds R-tree indexes so the
//! classifier and matcher only test candidate pairs.

pub mod index;
pub mod measure;
pub mod validity;

use geo::{BoundingRect, Geometry, Rect};
use geojson::GeoJson;
use tailor_models::Extent;

pub use index::{FeatureIndex, IndexedFeature};

/// Errors from geometry parsing and serialization.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// Text is not valid `GeoJSON`, or could not be converted.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// Serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The `GeoJSON` document is a feature or collection, not a geometry.
    #[error("Expected a GeoJSON geometry, found a {kind}")]
    NotAGeometry {
        /// Kind of document found.
        kind: &'static str,
    },
}

impl From<geojson::Error> for SpatialError {
    fn from(e: geojson::Error) -> Self {
        Self::GeoJson(Box::new(e))
    }
}

/// Parses a stored `GeoJSON` geometry.
///
/// # Errors
///
/// Returns [`SpatialError`] if the text is not a `GeoJSON` geometry.
pub fn parse_geometry(text: &str) -> Result<Geometry<f64>, SpatialError> {
    match text.parse::<GeoJson>()? {
        GeoJson::Geometry(geometry) => from_geojson(geometry),
        GeoJson::Feature(_) => Err(SpatialError::NotAGeometry { kind: "Feature" }),
        GeoJson::FeatureCollection(_) => Err(SpatialError::NotAGeometry {
            kind: "FeatureCollection",
        }),
    }
}

/// Converts a parsed `GeoJSON` geometry.
///
/// # Errors
///
/// Returns [`SpatialError`] if the geometry cannot be represented.
pub fn from_geojson(geometry: geojson::Geometry) -> Result<Geometry<f64>, SpatialError> {
    Ok(Geometry::try_from(geometry)?)
}

/// Serializes a geometry to `GeoJSON` text for storage.
///
/// # Errors
///
/// Returns [`SpatialError`] if serialization fails.
pub fn to_geojson(geometry: &Geometry<f64>) -> Result<String, SpatialError> {
    let value = geojson::Value::from(geometry);
    Ok(serde_json::to_string(&geojson::Geometry::new(value))?)
}

/// Converts a [`Rect`] to an [`Extent`].
#[must_use]
pub fn rect_to_extent(rect: Rect<f64>) -> Extent {
    Extent {
        min_x: rect.min().x,
        min_y: rect.min().y,
        max_x: rect.max().x,
        max_y: rect.max().y,
    }
}

/// Bounding box of a single geometry, `None` when empty.
#[must_use]
pub fn geometry_extent(geometry: &Geometry<f64>) -> Option<Extent> {
    geometry.bounding_rect().map(rect_to_extent)
}

/// Bounding box covering every geometry, `None` when all are empty.
#[must_use]
pub fn combined_extent<'a>(geometries: impl IntoIterator<Item = &'a Geometry<f64>>) -> Option<Extent> {
    geometries
        .into_iter()
        .filter_map(geometry_extent)
        .reduce(|a, b| Extent {
            min_x: a.min_x.min(b.min_x),
            min_y: a.min_y.min(b.min_y),
            max_x: a.max_x.max(b.max_x),
            max_y: a.max_y.max(b.max_y),
        })
}

#[cfg(test)]
mod tests {
    use geo::{Point, point};

    use super::*;

    #[test]
    fn parses_and_serializes_points() {
        let geometry = parse_geometry(r#"{"type":"Point","coordinates":[-89.65,39.78]}"#).unwrap();
        assert_eq!(geometry, Geometry::Point(point! { x: -89.65, y: 39.78 }));

        let text = to_geojson(&geometry).unwrap();
        assert_eq!(parse_geometry(&text).unwrap(), geometry);
    }

    #[test]
    fn features_are_not_geometries() {
        let err = parse_geometry(
            r#"{"type":"Feature","geometry":null,"properties":{}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SpatialError::NotAGeometry { kind: "Feature" }));
        assert!(parse_geometry("not json").is_err());
    }

    #[test]
    fn combined_extent_covers_all() {
        let a = Geometry::Point(Point::new(1.0, 5.0));
        let b = Geometry::Point(Point::new(-2.0, 3.0));
        let extent = combined_extent([&a, &b]).unwrap();
        assert_eq!(
            extent,
            Extent {
                min_x: -2.0,
                min_y: 3.0,
                max_x: 1.0,
                max_y: 5.0
            }
        );
        assert!(combined_extent(std::iter::empty()).is_none());
    }
}
