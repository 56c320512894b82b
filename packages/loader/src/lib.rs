#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Source file loaders for tailor layers.
//!
//! Reads a `GeoJSON`, Shapefile, or CSV point file, applies the load
//! options (spatial filter, promote-to-multi, coordinate columns), and
//! writes the result into a fresh layer table of the project store.
//! Geometry validation and boundary clipping happen afterwards in the
//! pipeline.

pub mod csv_points;
pub mod geojson_file;
pub mod shp;

use std::path::{Path, PathBuf};

use geo::Geometry;
use serde_json::{Map, Value};
use tailor_database::layers::{self, FeatureRow};
use tailor_database::{DbError, ProjectStore};
use tailor_models::{Layer, LoadOptions, PROJECT_EPSG};
use tailor_spatial::SpatialError;

/// Errors that can occur while loading a source file.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// I/O error reading the source.
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The source is not valid `GeoJSON`.
    #[error("GeoJSON error in {path}: {source}")]
    GeoJson {
        path: PathBuf,
        source: Box<geojson::Error>,
    },

    /// The Shapefile could not be read.
    #[error("Shapefile error in {path}: {source}")]
    Shapefile {
        path: PathBuf,
        source: Box<shapefile::Error>,
    },

    /// The CSV could not be read.
    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    /// Geometry conversion error.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// Project store error.
    #[error(transparent)]
    Database(#[from] DbError),

    /// The file extension names no supported format.
    #[error("Unsupported source format: {path}")]
    UnsupportedFormat { path: PathBuf },

    /// The source is not in (or cannot be stored as) the project CRS.
    #[error("{path} uses {crs}; only EPSG:4326 (WGS84 longitude/latitude) is supported")]
    UnsupportedCrs { path: PathBuf, crs: String },

    /// No coordinate column matched any candidate name.
    #[error("None of the columns {candidates:?} were found in {path}")]
    MissingColumn {
        path: PathBuf,
        candidates: Vec<String>,
    },

    /// A coordinate cell could not be parsed as a number.
    #[error("Invalid coordinate {value:?} in column {column} on line {line} of {path}")]
    InvalidCoordinate {
        path: PathBuf,
        column: String,
        line: u64,
        value: String,
    },
}

/// A supported source format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    GeoJson,
    Shapefile,
    Csv,
}

impl SourceFormat {
    /// Detects the format from the file extension (case-insensitive).
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "geojson" | "json" => Some(Self::GeoJson),
            "shp" => Some(Self::Shapefile),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// A feature read from a source file, before it is written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFeature {
    /// Geometry in project coordinates; `None` for features without one.
    pub geometry: Option<Geometry<f64>>,
    /// Source attributes.
    pub properties: Map<String, Value>,
}

/// A source file read and converted into layer rows, not yet written.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedLayer {
    /// Resolved source path.
    pub source: PathBuf,
    /// Rows to insert, numbered from 1 in source order.
    pub rows: Vec<FeatureRow>,
    /// Features outside the spatial filter.
    pub features_filtered: u64,
    /// Features skipped because they had no geometry.
    pub features_without_geometry: u64,
}

impl PreparedLayer {
    /// Whether any row carries the attribute `name`.
    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.rows.iter().any(|row| row.properties.contains_key(name))
    }

    /// Attribute names present on any row, sorted.
    #[must_use]
    pub fn property_names(&self) -> Vec<String> {
        let names: std::collections::BTreeSet<&String> =
            self.rows.iter().flat_map(|row| row.properties.keys()).collect();
        names.into_iter().cloned().collect()
    }
}

/// Counts from writing one source file into a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedLayer {
    /// Resolved source path.
    pub source: PathBuf,
    /// Features written to the store.
    pub features_loaded: u64,
    /// Features outside the spatial filter.
    pub features_filtered: u64,
    /// Features skipped because they had no geometry.
    pub features_without_geometry: u64,
}

/// Expands a leading `~` to the home directory.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

/// Reads every feature from a source file.
///
/// # Errors
///
/// Returns [`LoadError`] if the format is unsupported or the file cannot
/// be read.
pub fn read_source(path: &Path, options: &LoadOptions) -> Result<Vec<SourceFeature>, LoadError> {
    match SourceFormat::from_path(path) {
        Some(SourceFormat::GeoJson) => geojson_file::read(path),
        Some(SourceFormat::Shapefile) => shp::read(path, options.relax_numeric_precision),
        Some(SourceFormat::Csv) => csv_points::read(path, options),
        None => Err(LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Reads a source file and converts it into layer rows.
///
/// Applies `~` expansion, the spatial filter and promote-to-multi. Nothing
/// is written to the store.
///
/// # Errors
///
/// Returns [`LoadError`] if the target CRS is not the project CRS or the
/// source cannot be read.
pub fn prepare(source: &Path, options: &LoadOptions) -> Result<PreparedLayer, LoadError> {
    let source = expand_home(source);

    if options.target_epsg != PROJECT_EPSG {
        return Err(LoadError::UnsupportedCrs {
            path: source,
            crs: format!("target EPSG:{}", options.target_epsg),
        });
    }

    log::info!("Reading {}", source.display());
    let features = read_source(&source, options)?;

    let mut rows = Vec::with_capacity(features.len());
    let mut features_filtered = 0u64;
    let mut features_without_geometry = 0u64;

    for feature in features {
        let Some(geometry) = feature.geometry else {
            features_without_geometry += 1;
            continue;
        };

        if let Some(filter) = options.spatial_filter
            && !tailor_spatial::geometry_extent(&geometry).is_some_and(|e| e.intersects(&filter))
        {
            features_filtered += 1;
            continue;
        }

        let geometry = if options.promote_to_multi {
            tailor_spatial::validity::promote_to_multi(geometry)
        } else {
            geometry
        };

        let fid = i64::try_from(rows.len() + 1).map_err(|e| DbError::Conversion {
            message: format!("feature id overflow: {e}"),
        })?;
        rows.push(FeatureRow {
            fid,
            geometry: tailor_spatial::to_geojson(&geometry)?,
            properties: feature.properties,
        });
    }

    if features_without_geometry > 0 {
        log::warn!(
            "Skipped {features_without_geometry} features without geometry in {}",
            source.display()
        );
    }
    if features_filtered > 0 {
        log::debug!("{features_filtered} features outside the spatial filter");
    }

    Ok(PreparedLayer {
        source,
        rows,
        features_filtered,
        features_without_geometry,
    })
}

/// Writes prepared rows into a new `layer` table in one transaction.
///
/// # Errors
///
/// Returns [`LoadError`] if the layer exists and `overwrite` is false, or
/// the store write fails.
pub fn write(
    store: &ProjectStore,
    layer: Layer,
    prepared: PreparedLayer,
    overwrite: bool,
) -> Result<LoadedLayer, LoadError> {
    let mut conn = store.connect()?;
    let tx = conn.transaction().map_err(DbError::from)?;
    layers::create_layer_table(&tx, layer, overwrite)?;
    let features_loaded = layers::insert_features(&tx, layer, &prepared.rows)?;
    tx.commit().map_err(DbError::from)?;

    log::info!("Loaded {features_loaded} features into {layer}");

    Ok(LoadedLayer {
        source: prepared.source,
        features_loaded,
        features_filtered: prepared.features_filtered,
        features_without_geometry: prepared.features_without_geometry,
    })
}

/// Loads a source file into `layer`: [`prepare`] then [`write`].
///
/// # Errors
///
/// Returns [`LoadError`] if the source cannot be read or the store write
/// fails.
pub fn load(
    store: &ProjectStore,
    source: &Path,
    layer: Layer,
    options: &LoadOptions,
) -> Result<LoadedLayer, LoadError> {
    let prepared = prepare(source, options)?;
    write(store, layer, prepared, options.overwrite)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    /// Writes a fixture file under a per-test temp directory.
    pub fn write_fixture(test: &str, name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tailor_loader_test_{test}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

#[cfg(test)]
mod tests {
    use tailor_models::Extent;

    use super::*;
    use crate::test_support::write_fixture;

    const PARCELS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"pin": "A"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type": "Feature", "properties": {"pin": "B"},
             "geometry": {"type": "Polygon", "coordinates": [[[10,10],[11,10],[11,11],[10,11],[10,10]]]}},
            {"type": "Feature", "properties": {"pin": "C"}, "geometry": null}
        ]
    }"#;

    #[test]
    fn detects_formats_by_extension() {
        assert_eq!(
            SourceFormat::from_path(Path::new("a/b.GeoJSON")),
            Some(SourceFormat::GeoJson)
        );
        assert_eq!(SourceFormat::from_path(Path::new("b.shp")), Some(SourceFormat::Shapefile));
        assert_eq!(SourceFormat::from_path(Path::new("b.csv")), Some(SourceFormat::Csv));
        assert_eq!(SourceFormat::from_path(Path::new("b.kml")), None);
        assert_eq!(SourceFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn expands_home_prefix() {
        let Some(home) = std::env::var_os("HOME") else {
            return;
        };
        assert_eq!(
            expand_home(Path::new("~/data/parcels.shp")),
            PathBuf::from(home).join("data/parcels.shp")
        );
        assert_eq!(expand_home(Path::new("/abs/x.csv")), PathBuf::from("/abs/x.csv"));
        assert_eq!(expand_home(Path::new("~user/x.csv")), PathBuf::from("~user/x.csv"));
    }

    #[test]
    fn loads_with_spatial_filter_and_promotion() {
        let source = write_fixture("filter", "parcels.geojson", PARCELS);
        let store = ProjectStore::new(source.with_file_name("project.duckdb"));

        let options = LoadOptions::polygons().with_spatial_filter(Some(Extent {
            min_x: -1.0,
            min_y: -1.0,
            max_x: 2.0,
            max_y: 2.0,
        }));
        let loaded = load(&store, &source, Layer::Parcels, &options).unwrap();

        assert_eq!(loaded.features_loaded, 1);
        assert_eq!(loaded.features_filtered, 1);
        assert_eq!(loaded.features_without_geometry, 1);

        let conn = store.connect().unwrap();
        let rows = layers::read_features(&conn, Layer::Parcels).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fid, 1);
        assert_eq!(rows[0].properties["pin"], Value::from("A"));
        assert!(matches!(
            tailor_spatial::parse_geometry(&rows[0].geometry).unwrap(),
            Geometry::MultiPolygon(_)
        ));
    }

    #[test]
    fn reload_replaces_layer() {
        let source = write_fixture("reload", "parcels.geojson", PARCELS);
        let store = ProjectStore::new(source.with_file_name("project.duckdb"));

        load(&store, &source, Layer::Parcels, &LoadOptions::polygons()).unwrap();
        let loaded = load(&store, &source, Layer::Parcels, &LoadOptions::polygons()).unwrap();
        assert_eq!(loaded.features_loaded, 2);

        let conn = store.connect().unwrap();
        assert_eq!(layers::count_features(&conn, Layer::Parcels).unwrap(), 2);
    }

    #[test]
    fn rejects_other_target_crs() {
        let source = write_fixture("crs", "parcels.geojson", PARCELS);
        let store = ProjectStore::new(source.with_file_name("project.duckdb"));
        let options = LoadOptions {
            target_epsg: 3857,
            ..LoadOptions::polygons()
        };
        assert!(matches!(
            load(&store, &source, Layer::Parcels, &options),
            Err(LoadError::UnsupportedCrs { .. })
        ));
    }

    #[test]
    fn prepared_layer_lists_properties() {
        let source = write_fixture("prepare", "parcels.geojson", PARCELS);
        let prepared = prepare(&source, &LoadOptions::polygons()).unwrap();
        assert_eq!(prepared.rows.len(), 2);
        assert!(prepared.has_property("pin"));
        assert!(!prepared.has_property("PIN"));
        assert_eq!(prepared.property_names(), vec!["pin".to_string()]);
    }

    #[test]
    fn unsupported_extension_is_an_error() {
        let source = write_fixture("ext", "parcels.kml", "<kml/>");
        assert!(matches!(
            read_source(&source, &LoadOptions::default()),
            Err(LoadError::UnsupportedFormat { .. })
        ));
    }
}
