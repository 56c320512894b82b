//! `GeoJSON` source reader.

use std::path::Path;

use geojson::{Feature, GeoJson};
use serde_json::{Map, Value};

use crate::{LoadError, SourceFeature};

/// CRS names accepted in a legacy `crs` member.
const WGS84_CRS_NAMES: &[&str] = &["CRS84", "EPSG:4326", "EPSG::4326"];

/// Reads a `FeatureCollection`, a single `Feature`, or a bare geometry.
///
/// # Errors
///
/// Returns [`LoadError`] if the file cannot be read or parsed, or declares
/// a non-WGS84 `crs`.
pub fn read(path: &Path) -> Result<Vec<SourceFeature>, LoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document = text.parse::<GeoJson>().map_err(|e| LoadError::GeoJson {
        path: path.to_path_buf(),
        source: Box::new(e),
    })?;

    match document {
        GeoJson::FeatureCollection(collection) => {
            check_crs(path, collection.foreign_members.as_ref())?;
            collection
                .features
                .into_iter()
                .map(convert_feature)
                .collect()
        }
        GeoJson::Feature(feature) => {
            check_crs(path, feature.foreign_members.as_ref())?;
            Ok(vec![convert_feature(feature)?])
        }
        GeoJson::Geometry(geometry) => Ok(vec![SourceFeature {
            geometry: Some(tailor_spatial::from_geojson(geometry)?),
            properties: Map::new(),
        }]),
    }
}

fn convert_feature(feature: Feature) -> Result<SourceFeature, LoadError> {
    let geometry = feature
        .geometry
        .map(tailor_spatial::from_geojson)
        .transpose()?;
    Ok(SourceFeature {
        geometry,
        properties: feature.properties.unwrap_or_default(),
    })
}

/// Rejects a legacy `crs` member naming anything but WGS84 longitude/latitude.
fn check_crs(path: &Path, foreign_members: Option<&Map<String, Value>>) -> Result<(), LoadError> {
    let Some(crs) = foreign_members.and_then(|m| m.get("crs")) else {
        return Ok(());
    };
    let name = crs
        .pointer("/properties/name")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if WGS84_CRS_NAMES.iter().any(|accepted| name.ends_with(accepted)) {
        Ok(())
    } else {
        Err(LoadError::UnsupportedCrs {
            path: path.to_path_buf(),
            crs: if name.is_empty() {
                crs.to_string()
            } else {
                name.to_string()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use geo::Geometry;

    use super::*;
    use crate::test_support::write_fixture;

    #[test]
    fn reads_feature_collection() {
        let path = write_fixture(
            "geojson_collection",
            "addresses.geojson",
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"FULLADDR":"123 MAIN ST"},
                 "geometry":{"type":"Point","coordinates":[-89.6,39.8]}}
            ]}"#,
        );
        let features = read(&path).unwrap();
        assert_eq!(features.len(), 1);
        assert!(matches!(features[0].geometry, Some(Geometry::Point(_))));
        assert_eq!(features[0].properties["FULLADDR"], Value::from("123 MAIN ST"));
    }

    #[test]
    fn accepts_crs84_and_rejects_projected() {
        let ok = write_fixture(
            "geojson_crs84",
            "b.geojson",
            r#"{"type":"FeatureCollection",
                "crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:OGC:1.3:CRS84"}},
                "features":[]}"#,
        );
        assert!(read(&ok).unwrap().is_empty());

        let projected = write_fixture(
            "geojson_projected",
            "b.geojson",
            r#"{"type":"FeatureCollection",
                "crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::3435"}},
                "features":[]}"#,
        );
        assert!(matches!(
            read(&projected),
            Err(LoadError::UnsupportedCrs { crs, .. }) if crs.ends_with("3435")
        ));
    }

    #[test]
    fn malformed_json_is_reported() {
        let path = write_fixture("geojson_bad", "bad.geojson", "{ nope");
        assert!(matches!(read(&path), Err(LoadError::GeoJson { .. })));
    }
}
