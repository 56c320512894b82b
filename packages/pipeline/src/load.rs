//! Load commands.
//!
//! Each command checks the source extension, reads the source (pre-filtered
//! to the boundary extent for every layer but the boundary), replaces the
//! layer, repairs its geometries, and clips it to the boundary. Bsls then
//! get their normalized address columns and addresses their comparison
//! column. Clipping and the derived columns also run when invalid
//! geometries are kept, so the layer stays usable once they are fixed.

use std::path::Path;

use tailor_database::{DbError, ProjectStore, layers};
use tailor_loader::PreparedLayer;
use tailor_models::{AddressMatchMode, Layer, LoadOptions, LoadReport, RepairOutcome};

use crate::clip::{boundary_extent, clip_to_boundary};
use crate::decision::Decider;
use crate::normalize::{normalize_fields, text_property};
use crate::validate::repair;
use crate::PipelineError;

/// Raw bsl attributes feeding the normalized columns.
const BSL_ADDRESS_FIELDS: [&str; 4] = ["address_primary", "city", "state", "zip"];

/// Work done after a layer is written, repaired and clipped.
#[derive(Debug, Clone)]
enum PostLoad {
    None,
    NormalizeBsls,
    AddressColumn {
        source_column: String,
        mode: AddressMatchMode,
    },
}

/// Loads the area-of-interest boundary.
///
/// # Errors
///
/// Returns [`PipelineError`] if the extension is not accepted, the source
/// cannot be loaded, or repair fails.
pub fn load_boundary(
    store: &ProjectStore,
    source: &Path,
    decider: &mut dyn Decider,
) -> Result<LoadReport, PipelineError> {
    run(store, Layer::Boundary, source, LoadOptions::polygons(), &PostLoad::None, decider)
}

/// Loads parcels.
///
/// # Errors
///
/// Returns [`PipelineError`] if the extension is not accepted, the source
/// cannot be loaded, or repair fails.
pub fn load_parcels(
    store: &ProjectStore,
    source: &Path,
    decider: &mut dyn Decider,
) -> Result<LoadReport, PipelineError> {
    run(store, Layer::Parcels, source, LoadOptions::polygons(), &PostLoad::None, decider)
}

/// Loads building footprints.
///
/// # Errors
///
/// Returns [`PipelineError`] if the extension is not accepted, the source
/// cannot be loaded, or repair fails.
pub fn load_buildings(
    store: &ProjectStore,
    source: &Path,
    decider: &mut dyn Decider,
) -> Result<LoadReport, PipelineError> {
    run(store, Layer::Buildings, source, LoadOptions::polygons(), &PostLoad::None, decider)
}

/// Loads bsls from a CSV with `Longitude`/`Latitude` columns and derives
/// `address_primary_norm`, `address_full` and `address_full_norm`.
///
/// # Errors
///
/// Returns [`PipelineError`] if the extension is not accepted, the source
/// cannot be loaded, or repair fails.
pub fn load_bsls(
    store: &ProjectStore,
    source: &Path,
    decider: &mut dyn Decider,
) -> Result<LoadReport, PipelineError> {
    run(
        store,
        Layer::Bsls,
        source,
        LoadOptions::bsl_points(),
        &PostLoad::NormalizeBsls,
        decider,
    )
}

/// Loads address points and copies `address_column` into the comparison
/// column for `mode`.
///
/// # Errors
///
/// Returns [`PipelineError::UnknownAddressSourceColumn`] if no feature
/// carries `address_column`; nothing is written in that case.
pub fn load_addresses(
    store: &ProjectStore,
    source: &Path,
    address_column: &str,
    mode: AddressMatchMode,
    decider: &mut dyn Decider,
) -> Result<LoadReport, PipelineError> {
    run(
        store,
        Layer::Addresses,
        source,
        LoadOptions::default(),
        &PostLoad::AddressColumn {
            source_column: address_column.to_string(),
            mode,
        },
        decider,
    )
}

/// Fails unless the extension of `source` is accepted for `layer`.
///
/// # Errors
///
/// Returns [`PipelineError::UnsupportedExtension`].
pub fn check_extension(layer: Layer, source: &Path) -> Result<(), PipelineError> {
    let allowed = layer.allowed_extensions();
    let accepted = source
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)));

    if accepted {
        Ok(())
    } else {
        Err(PipelineError::UnsupportedExtension {
            layer,
            path: source.to_path_buf(),
            allowed,
        })
    }
}

fn run(
    store: &ProjectStore,
    layer: Layer,
    source: &Path,
    options: LoadOptions,
    post: &PostLoad,
    decider: &mut dyn Decider,
) -> Result<LoadReport, PipelineError> {
    check_extension(layer, source)?;

    let options = if layer == Layer::Boundary {
        options
    } else {
        let extent = boundary_extent(store)?;
        if extent.is_some() {
            log::debug!("Filtering {layer} to the boundary extent");
        }
        options.with_spatial_filter(extent)
    };

    let prepared = tailor_loader::prepare(source, &options)?;
    if let PostLoad::AddressColumn { source_column, .. } = post {
        check_address_column(&prepared, source_column)?;
    }

    let loaded = tailor_loader::write(store, layer, prepared, options.overwrite)?;

    let repair = repair(store, layer, decider)?;
    if let RepairOutcome::Aborted { remaining } = repair {
        log::warn!("{layer} keeps {remaining} invalid geometries; fix them and reload");
    }

    let clip = if layer.is_clipped() {
        Some(clip_to_boundary(store, layer)?)
    } else {
        None
    };

    match post {
        PostLoad::None => {}
        PostLoad::NormalizeBsls => normalize_bsls(store)?,
        PostLoad::AddressColumn {
            source_column,
            mode,
        } => add_address_column(store, source_column, *mode)?,
    }

    Ok(LoadReport {
        layer,
        source: loaded.source,
        features_loaded: loaded.features_loaded,
        features_filtered: loaded.features_filtered,
        repair,
        clip,
    })
}

fn check_address_column(prepared: &PreparedLayer, column: &str) -> Result<(), PipelineError> {
    if prepared.rows.is_empty() || prepared.has_property(column) {
        return Ok(());
    }
    Err(PipelineError::UnknownAddressSourceColumn {
        column: column.to_string(),
        path: prepared.source.clone(),
        available: prepared.property_names(),
    })
}

fn normalize_bsls(store: &ProjectStore) -> Result<(), PipelineError> {
    log::info!("Normalizing bsl addresses...");
    let mut conn = store.connect()?;

    let mut primary_norm = Vec::new();
    let mut full = Vec::new();
    let mut full_norm = Vec::new();

    for feature in layers::read_features(&conn, Layer::Bsls)? {
        let [primary, city, state, zip] =
            BSL_ADDRESS_FIELDS.map(|field| text_property(&feature.properties, field));
        let columns = normalize_fields(
            primary.as_deref(),
            city.as_deref(),
            state.as_deref(),
            zip.as_deref(),
        );
        primary_norm.push((feature.fid, columns.address_primary_norm));
        full.push((feature.fid, columns.address_full));
        full_norm.push((feature.fid, columns.address_full_norm));
    }

    let derived = [
        ("address_primary_norm", primary_norm),
        ("address_full", full),
        ("address_full_norm", full_norm),
    ];

    // DuckDB cannot commit an ALTER and an UPDATE of the same table in one
    // transaction, so the columns are added first in autocommit mode.
    for (column, _) in &derived {
        layers::add_text_column(&conn, Layer::Bsls, column)?;
    }

    let tx = conn.transaction().map_err(DbError::from)?;
    for (column, values) in &derived {
        layers::set_text_values(&tx, Layer::Bsls, column, values)?;
    }
    tx.commit().map_err(DbError::from)?;

    layers::create_index(&conn, Layer::Bsls, "address_primary_norm")?;
    layers::create_index(&conn, Layer::Bsls, "address_full_norm")?;

    Ok(())
}

fn add_address_column(
    store: &ProjectStore,
    source_column: &str,
    mode: AddressMatchMode,
) -> Result<(), PipelineError> {
    let column = mode.address_column();
    log::info!("Copying {source_column} into {column}...");
    let mut conn = store.connect()?;

    let values: Vec<(i64, Option<String>)> = layers::read_features(&conn, Layer::Addresses)?
        .into_iter()
        .map(|feature| (feature.fid, text_property(&feature.properties, source_column)))
        .collect();

    layers::add_text_column(&conn, Layer::Addresses, column)?;
    let tx = conn.transaction().map_err(DbError::from)?;
    layers::set_text_values(&tx, Layer::Addresses, column, &values)?;
    tx.commit().map_err(DbError::from)?;

    layers::create_index(&conn, Layer::Addresses, column)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tailor_models::ClipOutcome;

    use super::*;
    use crate::decision::Policy;
    use crate::test_support::{temp_store, write_fixture};

    const BOUNDARY: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "aoi"},
             "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]]}}
        ]
    }"#;

    const BSLS: &str = "\
location_id,address_primary,city,state,zip,Longitude,Latitude
1001,123 MAIN ST BLDG A,Springfield,IL,62704,0.5,0.5
1002,9 ELM ST,Springfield,IL,62704,0.25,0.25
1003,77 FAR RD,Elsewhere,IL,62704,5.0,5.0
";

    const ADDRESSES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"street": "123 MAIN ST", "zip": 62704},
             "geometry": {"type": "Point", "coordinates": [0.5, 0.5001]}},
            {"type": "Feature", "properties": {"street": "9 ELM ST", "zip": 62704},
             "geometry": {"type": "Point", "coordinates": [0.25, 0.2501]}}
        ]
    }"#;

    fn fixtures(test: &str) -> (ProjectStore, PathBuf) {
        let (store, dir) = temp_store(test);
        write_fixture(&dir, "boundary.geojson", BOUNDARY);
        write_fixture(&dir, "bsls.csv", BSLS);
        write_fixture(&dir, "addresses.geojson", ADDRESSES);
        (store, dir)
    }

    #[test]
    fn unsupported_extension_is_rejected_before_touching_store() {
        let (store, dir) = temp_store("load_extension");
        let err = load_parcels(&store, &dir.join("parcels.kml"), &mut Policy::default()).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedExtension { .. }));

        let err = load_bsls(&store, &dir.join("bsls.geojson"), &mut Policy::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!(
                "bsls must be loaded from a .csv file, got {}",
                dir.join("bsls.geojson").display()
            )
        );
        assert!(!store.path().exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn extension_check_ignores_case() {
        assert!(check_extension(Layer::Parcels, Path::new("PARCELS.SHP")).is_ok());
        assert!(check_extension(Layer::Bsls, Path::new("bsls.CSV")).is_ok());
        assert!(check_extension(Layer::Addresses, Path::new("addresses")).is_err());
    }

    #[test]
    fn bsls_are_filtered_clipped_and_normalized() {
        let (store, dir) = fixtures("load_bsls");
        let mut policy = Policy::default();

        let boundary = load_boundary(&store, &dir.join("boundary.geojson"), &mut policy).unwrap();
        assert_eq!(boundary.features_loaded, 1);
        assert_eq!(boundary.clip, None);

        let report = load_bsls(&store, &dir.join("bsls.csv"), &mut policy).unwrap();
        assert_eq!(report.features_loaded, 2);
        assert_eq!(report.features_filtered, 1);
        assert_eq!(report.repair, RepairOutcome::AlreadyValid);
        assert_eq!(report.clip, Some(ClipOutcome::Clipped { removed: 0 }));

        let conn = store.connect().unwrap();
        let primary = layers::read_text_column(&conn, Layer::Bsls, "address_primary_norm").unwrap();
        assert_eq!(
            primary,
            vec![
                (1, Some("123 MAIN ST".to_string())),
                (2, Some("9 ELM ST".to_string())),
            ]
        );
        let full_norm = layers::read_text_column(&conn, Layer::Bsls, "address_full_norm").unwrap();
        assert_eq!(
            full_norm,
            vec![
                (1, Some("123 MAIN ST, Springfield, IL 62704".to_string())),
                (2, Some("9 ELM ST, Springfield, IL 62704".to_string())),
            ]
        );

        let columns = layers::columns(&conn, Layer::Bsls).unwrap();
        assert!(!columns.iter().any(|c| c == "Longitude"));
        drop(conn);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn addresses_get_comparison_column() {
        let (store, dir) = fixtures("load_addresses");
        let report = load_addresses(
            &store,
            &dir.join("addresses.geojson"),
            "street",
            AddressMatchMode::Street,
            &mut Policy::default(),
        )
        .unwrap();
        assert_eq!(report.features_loaded, 2);
        assert_eq!(report.clip, Some(ClipOutcome::NoBoundary));

        let conn = store.connect().unwrap();
        let values =
            layers::read_text_column(&conn, Layer::Addresses, "tailor_address_street").unwrap();
        assert_eq!(
            values,
            vec![
                (1, Some("123 MAIN ST".to_string())),
                (2, Some("9 ELM ST".to_string())),
            ]
        );
        drop(conn);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn unknown_address_column_writes_nothing() {
        let (store, dir) = fixtures("load_addresses_unknown");
        let err = load_addresses(
            &store,
            &dir.join("addresses.geojson"),
            "addr",
            AddressMatchMode::Full,
            &mut Policy::default(),
        )
        .unwrap_err();

        match err {
            PipelineError::UnknownAddressSourceColumn { column, available, .. } => {
                assert_eq!(column, "addr");
                assert_eq!(available, vec!["street".to_string(), "zip".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let conn = store.connect().unwrap();
        assert!(!layers::table_exists(&conn, Layer::Addresses).unwrap());
        drop(conn);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn kept_invalid_addresses_still_get_comparison_column() {
        let (store, dir) = fixtures("load_addresses_kept_invalid");
        let addresses = write_fixture(
            &dir,
            "addresses_with_line.geojson",
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"street": "123 MAIN ST"},
                 "geometry": {"type": "Point", "coordinates": [0.5, 0.5001]}},
                {"type": "Feature", "properties": {"street": "9 ELM ST"},
                 "geometry": {"type": "LineString", "coordinates": [[0.25, 0.25], [0.25, 0.25]]}}
            ]}"#,
        );
        let report = load_addresses(
            &store,
            &addresses,
            "street",
            AddressMatchMode::Street,
            &mut Policy::default(),
        )
        .unwrap();
        assert_eq!(report.repair, RepairOutcome::Aborted { remaining: 1 });
        assert_eq!(report.clip, Some(ClipOutcome::NoBoundary));

        let conn = store.connect().unwrap();
        let values =
            layers::read_text_column(&conn, Layer::Addresses, "tailor_address_street").unwrap();
        assert_eq!(
            values,
            vec![
                (1, Some("123 MAIN ST".to_string())),
                (2, Some("9 ELM ST".to_string())),
            ]
        );
        drop(conn);
        assert_eq!(
            crate::matching::detect_mode(&store.connect().unwrap()).unwrap(),
            AddressMatchMode::Street
        );
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn invalid_parcels_are_repaired_on_load() {
        let (store, dir) = temp_store("load_repair");
        let parcels = write_fixture(
            &dir,
            "parcels.geojson",
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [0.001, 0.001], [0.001, 0], [0, 0.001], [0, 0]]]}}
            ]}"#,
        );

        let report = load_parcels(&store, &parcels, &mut Policy::default()).unwrap();
        assert_eq!(report.repair, RepairOutcome::Repaired { repaired: 1 });
        assert_eq!(report.clip, Some(ClipOutcome::NoBoundary));
        let _ = std::fs::remove_dir_all(dir);
    }
}
