//! Geometry repair workflow.
//!
//! 1. Find geometries failing OGC validity. None: done.
//! 2. Rebuild each invalid geometry from its polygonal portion. Geometries
//!    without one are left as they are.
//! 3. Recount. None left: repaired.
//! 4. Otherwise ask the operator to exclude the remaining rows or abort.
//!
//! Updates and deletes of one run share a transaction.

use duckdb::Connection;
use geo::Geometry;
use tailor_database::ProjectStore;
use tailor_database::layers;
use tailor_models::{Decision, DecisionRequest, Layer, RepairOutcome};
use tailor_spatial::validity::{is_valid, make_valid_polygonal};

use crate::PipelineError;
use crate::decision::{Decider, ask};

/// Runs the repair workflow on `layer`.
///
/// # Errors
///
/// Returns [`PipelineError`] if the store cannot be read or written, or no
/// decision can be obtained.
pub fn repair(
    store: &ProjectStore,
    layer: Layer,
    decider: &mut dyn Decider,
) -> Result<RepairOutcome, PipelineError> {
    let mut conn = store.connect()?;

    log::info!("Checking {layer} for invalid geometries...");
    let invalid = invalid_geometries(&conn, layer)?;

    if invalid.is_empty() {
        log::debug!("{layer}: all geometries valid");
        return Ok(RepairOutcome::AlreadyValid);
    }

    let initial = invalid.len() as u64;
    log::info!("Attempting to fix {initial} invalid geometries in {layer}...");

    let mut updates = Vec::new();
    for (fid, geometry) in &invalid {
        if let Some(repaired) = make_valid_polygonal(geometry) {
            updates.push((
                *fid,
                tailor_spatial::to_geojson(&Geometry::MultiPolygon(repaired))?,
            ));
        }
    }

    let tx = conn.transaction().map_err(tailor_database::DbError::from)?;
    layers::update_geometries(&tx, layer, &updates)?;

    let remaining: Vec<i64> = invalid_geometries(&tx, layer)?
        .into_iter()
        .map(|(fid, _)| fid)
        .collect();

    if remaining.is_empty() {
        tx.commit().map_err(tailor_database::DbError::from)?;
        log::info!("All invalid geometries in {layer} were fixed.");
        return Ok(RepairOutcome::Repaired { repaired: initial });
    }

    let remaining_count = remaining.len() as u64;
    log::warn!("{remaining_count} geometries in {layer} are still invalid after repair");

    let request = DecisionRequest::InvalidGeometries {
        layer,
        remaining: remaining_count,
    };

    let outcome = match ask(decider, &request)? {
        Decision::ExcludeInvalid => {
            let excluded = layers::delete_features(&tx, layer, &remaining)?;
            log::warn!("Excluded {excluded} invalid geometries from {layer}");
            RepairOutcome::Excluded {
                repaired: initial.saturating_sub(remaining_count),
                excluded,
            }
        }
        _ => {
            log::warn!(
                "Left {remaining_count} invalid geometries in {layer}; \
                 analysis results involving this layer are not guaranteed to be correct"
            );
            RepairOutcome::Aborted {
                remaining: remaining_count,
            }
        }
    };

    tx.commit().map_err(tailor_database::DbError::from)?;

    Ok(outcome)
}

/// Counts geometries in `layer` failing OGC validity.
///
/// # Errors
///
/// Returns [`PipelineError`] if the layer cannot be read.
pub fn count_invalid(store: &ProjectStore, layer: Layer) -> Result<u64, PipelineError> {
    let conn = store.connect()?;
    Ok(invalid_geometries(&conn, layer)?.len() as u64)
}

fn invalid_geometries(
    conn: &Connection,
    layer: Layer,
) -> Result<Vec<(i64, Geometry<f64>)>, PipelineError> {
    let mut invalid = Vec::new();
    for (fid, text) in layers::read_geometries(conn, layer)? {
        let geometry = tailor_spatial::parse_geometry(&text)?;
        if !is_valid(&geometry) {
            invalid.push((fid, geometry));
        }
    }
    Ok(invalid)
}
