//! Bsl to address matching.
//!
//! Matching is exact text equality between the bsl comparison column and
//! the address layer's `tailor_address_*` column. `bsls_analyzed` records
//! whether a match exists and the distance to the lowest-id match; the
//! match lines connect each matched bsl to its nearest match instead.

use std::collections::HashMap;

use duckdb::Connection;
use geo::{Geometry, Point};
use tailor_database::analysis::{self, BslAnalysisRow, MatchLineRow};
use tailor_database::{DbError, ProjectStore, layers};
use tailor_models::{ADDRESS_COLUMN_PREFIX, AddressMatchMode, Layer, MatchSummary};
use tailor_spatial::measure::{distance_ft, distance_m, line_between, line_length_ft};
use tailor_spatial::validity::representative_point;

use crate::normalize::text_property;
use crate::{PipelineError, require_layers};

const BSL_TEXT_COLUMNS: [&str; 3] = ["address_primary_norm", "address_full", "address_full_norm"];

/// Position in [`BSL_TEXT_COLUMNS`] of the column compared under `mode`.
const fn comparison_index(mode: AddressMatchMode) -> usize {
    match mode {
        AddressMatchMode::Street => 0,
        AddressMatchMode::Full => 2,
    }
}

/// Attribute carried onto match lines.
const LOCATION_ID: &str = "location_id";

/// Comparison mode fixed by the `tailor_address_*` column of the address
/// layer.
///
/// # Errors
///
/// Returns [`PipelineError::MissingAddressColumn`] with no such column,
/// [`PipelineError::AmbiguousAddressColumns`] with several, and
/// [`PipelineError::UnrecognizedAddressColumn`] for an unknown suffix.
pub fn detect_mode(conn: &Connection) -> Result<AddressMatchMode, PipelineError> {
    let mut candidates: Vec<String> = layers::columns(conn, Layer::Addresses)?
        .into_iter()
        .filter(|column| column.starts_with(ADDRESS_COLUMN_PREFIX))
        .collect();

    match candidates.len() {
        0 => Err(PipelineError::MissingAddressColumn),
        1 => Ok(AddressMatchMode::from_address_column(&candidates.remove(0))?),
        _ => Err(PipelineError::AmbiguousAddressColumns {
            columns: candidates,
        }),
    }
}

/// Matches every bsl against the address layer and writes
/// `bsls_analyzed` and `bsls_address_match_lines`, replacing any previous
/// tables.
///
/// # Errors
///
/// Returns [`PipelineError`] if the layers are missing, the comparison mode
/// cannot be determined, or the store cannot be read or written.
pub fn match_addresses(store: &ProjectStore) -> Result<MatchSummary, PipelineError> {
    let mut conn = store.connect()?;
    require_layers(&conn, &[Layer::Bsls, Layer::Addresses])?;

    let mode = detect_mode(&conn)?;
    log::info!("Matching bsls to addresses by {mode} address...");

    let addresses = known_addresses(&conn, mode)?;
    log::debug!("{} distinct address values", addresses.len());

    let bsl_column = comparison_index(mode);

    let mut bsl_rows = Vec::new();
    let mut lines = Vec::new();

    for (feature, mut values) in layers::read_features_with_text(&conn, Layer::Bsls, &BSL_TEXT_COLUMNS)? {
        let geometry = tailor_spatial::parse_geometry(&feature.geometry)?;
        let location = representative_point(&geometry);
        let comparison = values[bsl_column].clone();

        let matches = comparison
            .as_deref()
            .and_then(|text| addresses.get(text))
            .map_or(&[][..], Vec::as_slice);

        let distance_to_known_address = match (matches.first(), location) {
            (Some(first), Some(bsl)) => Some(distance_ft(first.point, bsl)),
            _ => None,
        };

        if let (Some(bsl), Some(text)) = (location, comparison) {
            if let Some(nearest) = nearest(matches, bsl) {
                let line = line_between(nearest.point, bsl);
                lines.push(MatchLineRow {
                    bsl_fid: feature.fid,
                    address_fid: nearest.fid,
                    location_id: text_property(&feature.properties, LOCATION_ID),
                    bsl_address: text.clone(),
                    match_address: text,
                    geometry: tailor_spatial::to_geojson(&Geometry::LineString(line.clone()))?,
                    distance_ft: line_length_ft(&line),
                });
            }
        }

        bsl_rows.push(BslAnalysisRow {
            fid: feature.fid,
            geometry: feature.geometry,
            properties: feature.properties,
            address_full_norm: values.pop().flatten(),
            address_full: values.pop().flatten(),
            address_primary_norm: values.pop().flatten(),
            is_known_address: !matches.is_empty(),
            distance_to_known_address,
        });
    }

    let summary = MatchSummary {
        mode,
        bsls: bsl_rows.len() as u64,
        known_addresses: bsl_rows.iter().filter(|row| row.is_known_address).count() as u64,
        match_lines: lines.len() as u64,
    };

    let tx = conn.transaction().map_err(DbError::from)?;
    layers::drop_layers(&tx, &[Layer::BslsAnalyzed])?;
    analysis::create_bsls_analyzed(&tx, &bsl_rows)?;
    tx.commit().map_err(DbError::from)?;

    let tx = conn.transaction().map_err(DbError::from)?;
    layers::drop_layers(&tx, &[Layer::BslsAddressMatchLines])?;
    analysis::create_match_lines(&tx, &lines)?;
    tx.commit().map_err(DbError::from)?;

    log::info!(
        "{} of {} bsls match a known address",
        summary.known_addresses,
        summary.bsls
    );

    Ok(summary)
}

#[derive(Debug, Clone, Copy)]
struct AddressPoint {
    fid: i64,
    point: Point<f64>,
}

/// Address points grouped by comparison text, each group in `ogc_fid`
/// order.
fn known_addresses(
    conn: &Connection,
    mode: AddressMatchMode,
) -> Result<HashMap<String, Vec<AddressPoint>>, PipelineError> {
    let mut grouped: HashMap<String, Vec<AddressPoint>> = HashMap::new();

    for (feature, values) in
        layers::read_features_with_text(conn, Layer::Addresses, &[mode.address_column()])?
    {
        let Some(Some(text)) = values.into_iter().next() else {
            continue;
        };
        let geometry = tailor_spatial::parse_geometry(&feature.geometry)?;
        if let Some(point) = representative_point(&geometry) {
            grouped.entry(text).or_default().push(AddressPoint {
                fid: feature.fid,
                point,
            });
        }
    }

    Ok(grouped)
}

/// Geodesically nearest match. `matches` is in `ogc_fid` order, so keeping
/// the first of equal distances breaks ties by lowest id.
fn nearest(matches: &[AddressPoint], bsl: Point<f64>) -> Option<AddressPoint> {
    let mut best: Option<(AddressPoint, f64)> = None;
    for candidate in matches {
        let distance = distance_m(candidate.point, bsl);
        if best.is_none_or(|(_, shortest)| distance < shortest) {
            best = Some((*candidate, distance));
        }
    }
    best.map(|(address, _)| address)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tailor_database::analysis::{read_bsl_matches, read_match_lines};

    use super::*;
    use crate::test_support::{METERS_PER_DEGREE, point, properties, seed, seed_with_properties, temp_store};

    const FEET_PER_METER: f64 = tailor_models::FEET_PER_METER;

    /// Degrees of latitude spanning `feet` near the equator.
    fn feet_north(feet: f64) -> f64 {
        feet / FEET_PER_METER / METERS_PER_DEGREE
    }

    fn set_column(store: &ProjectStore, layer: Layer, column: &str, values: &[(i64, Option<&str>)]) {
        let conn = store.connect().unwrap();
        layers::add_text_column(&conn, layer, column).unwrap();
        let values: Vec<(i64, Option<String>)> = values
            .iter()
            .map(|(fid, value)| (*fid, value.map(str::to_string)))
            .collect();
        layers::set_text_values(&conn, layer, column, &values).unwrap();
    }

    #[test]
    fn comparison_index_points_at_mode_column() {
        for mode in [AddressMatchMode::Street, AddressMatchMode::Full] {
            assert_eq!(BSL_TEXT_COLUMNS[comparison_index(mode)], mode.bsl_column());
        }
    }

    /// Seeds bsls with street comparison text only.
    fn seed_bsls(store: &ProjectStore, rows: &[(i64, (f64, f64), Option<&str>)]) {
        seed_with_properties(
            store,
            Layer::Bsls,
            &rows
                .iter()
                .map(|(fid, (x, y), _)| {
                    (
                        *fid,
                        point(*x, *y),
                        properties(json!({ "location_id": format!("L{fid}") })),
                    )
                })
                .collect::<Vec<_>>(),
        );
        let primary: Vec<(i64, Option<&str>)> =
            rows.iter().map(|(fid, _, text)| (*fid, *text)).collect();
        set_column(store, Layer::Bsls, "address_primary_norm", &primary);
        let none: Vec<(i64, Option<&str>)> = rows.iter().map(|(fid, _, _)| (*fid, None)).collect();
        set_column(store, Layer::Bsls, "address_full", &none);
        set_column(store, Layer::Bsls, "address_full_norm", &none);
    }

    fn seed_addresses(store: &ProjectStore, column: &str, rows: &[(i64, (f64, f64), &str)]) {
        seed(
            store,
            Layer::Addresses,
            &rows
                .iter()
                .map(|(fid, (x, y), _)| (*fid, point(*x, *y)))
                .collect::<Vec<_>>(),
        );
        let values: Vec<(i64, Option<&str>)> =
            rows.iter().map(|(fid, _, text)| (*fid, Some(*text))).collect();
        set_column(store, Layer::Addresses, column, &values);
    }

    #[test]
    fn match_line_goes_to_nearer_address() {
        let (store, dir) = temp_store("match_nearest");
        seed_bsls(&store, &[(1, (0.0, 0.0), Some("123 MAIN ST"))]);
        seed_addresses(
            &store,
            "tailor_address_street",
            &[
                (1, (0.0, feet_north(30.0)), "123 MAIN ST"),
                (2, (0.0, feet_north(10.0)), "123 MAIN ST"),
            ],
        );

        let summary = match_addresses(&store).unwrap();
        assert_eq!(
            summary,
            MatchSummary {
                mode: AddressMatchMode::Street,
                bsls: 1,
                known_addresses: 1,
                match_lines: 1,
            }
        );

        let conn = store.connect().unwrap();
        let lines = read_match_lines(&conn).unwrap();
        assert_eq!(lines.len(), 1);
        let (bsl_fid, address_fid, distance) = lines[0];
        assert_eq!((bsl_fid, address_fid), (1, 2));
        assert!((distance - 10.0).abs() < 0.1, "distance was {distance}");

        // Distance to a known address uses the lowest-id match.
        let bsls = read_bsl_matches(&conn).unwrap();
        let (_, known, to_known) = bsls[0];
        assert!(known);
        let to_known = to_known.unwrap();
        assert!((to_known - 30.0).abs() < 0.1, "distance was {to_known}");
        drop(conn);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn matching_is_exact_and_case_sensitive() {
        let (store, dir) = temp_store("match_case");
        seed_bsls(
            &store,
            &[
                (1, (0.0, 0.0), Some("123 MAIN ST")),
                (2, (0.001, 0.0), Some("9 ELM ST")),
                (3, (0.002, 0.0), None),
            ],
        );
        seed_addresses(
            &store,
            "tailor_address_street",
            &[
                (1, (0.0, 0.0001), "123 Main St"),
                (2, (0.001, 0.0001), "9 ELM ST"),
                (3, (0.002, 0.0001), "9 ELM ST "),
            ],
        );

        let summary = match_addresses(&store).unwrap();
        assert_eq!(summary.known_addresses, 1);
        assert_eq!(summary.match_lines, 1);

        let conn = store.connect().unwrap();
        let flags: Vec<(i64, bool)> = read_bsl_matches(&conn)
            .unwrap()
            .into_iter()
            .map(|(fid, known, _)| (fid, known))
            .collect();
        assert_eq!(flags, vec![(1, false), (2, true), (3, false)]);
        let lines = read_match_lines(&conn).unwrap();
        assert_eq!((lines[0].0, lines[0].1), (2, 2));
        drop(conn);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn equal_distances_pick_lowest_fid() {
        let a = AddressPoint {
            fid: 4,
            point: Point::new(0.0, 0.001),
        };
        let b = AddressPoint {
            fid: 9,
            point: Point::new(0.0, -0.001),
        };
        let chosen = nearest(&[a, b], Point::new(0.0, 0.0)).unwrap();
        assert_eq!(chosen.fid, 4);
        assert!(nearest(&[], Point::new(0.0, 0.0)).is_none());
    }

    #[test]
    fn mode_detection_errors() {
        let (store, dir) = temp_store("match_mode");
        seed_bsls(&store, &[(1, (0.0, 0.0), Some("1 A ST"))]);
        seed(&store, Layer::Addresses, &[(1, point(0.0, 0.0))]);

        let err = match_addresses(&store).unwrap_err();
        assert!(matches!(err, PipelineError::MissingAddressColumn));

        set_column(&store, Layer::Addresses, "tailor_address_city", &[(1, Some("x"))]);
        let err = match_addresses(&store).unwrap_err();
        assert!(matches!(err, PipelineError::UnrecognizedAddressColumn(_)));

        set_column(&store, Layer::Addresses, "tailor_address_full", &[(1, Some("x"))]);
        let err = match_addresses(&store).unwrap_err();
        assert!(matches!(err, PipelineError::AmbiguousAddressColumns { .. }));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn full_mode_compares_full_norm() {
        let (store, dir) = temp_store("match_full");
        seed_bsls(&store, &[(1, (0.0, 0.0), Some("1 A ST"))]);
        let conn = store.connect().unwrap();
        layers::set_text_values(
            &conn,
            Layer::Bsls,
            "address_full_norm",
            &[(1, Some("1 A ST, Springfield, IL 62704".to_string()))],
        )
        .unwrap();
        drop(conn);
        seed_addresses(
            &store,
            "tailor_address_full",
            &[(1, (0.0, 0.0001), "1 A ST, Springfield, IL 62704")],
        );

        let summary = match_addresses(&store).unwrap();
        assert_eq!(summary.mode, AddressMatchMode::Full);
        assert_eq!(summary.known_addresses, 1);
        let _ = std::fs::remove_dir_all(dir);
    }
}
