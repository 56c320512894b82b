//! Boundary clipping.
//!
//! A feature survives when its geometry intersects at least one boundary
//! feature. Touching the boundary counts.

use geo::{BoundingRect, Geometry, Intersects};
use tailor_database::{DbError, ProjectStore, layers};
use tailor_models::{ClipOutcome, Extent, Layer};
use tailor_spatial::FeatureIndex;

use crate::PipelineError;

/// Bounding box of the boundary layer, `None` when no boundary is loaded or
/// it holds no geometry.
///
/// # Errors
///
/// Returns [`PipelineError`] if the boundary cannot be read.
pub fn boundary_extent(store: &ProjectStore) -> Result<Option<Extent>, PipelineError> {
    let conn = store.connect()?;
    if !layers::table_exists(&conn, Layer::Boundary)? {
        return Ok(None);
    }

    let geometries = read_layer(&conn, Layer::Boundary)?;
    Ok(tailor_spatial::combined_extent(
        geometries.iter().map(|(_, geometry)| geometry),
    ))
}

/// Deletes every feature of `layer` outside the boundary. A missing or
/// empty boundary layer clips nothing.
///
/// # Errors
///
/// Returns [`PipelineError`] if the store cannot be read or written.
pub fn clip_to_boundary(store: &ProjectStore, layer: Layer) -> Result<ClipOutcome, PipelineError> {
    if !layer.is_clipped() {
        return Ok(ClipOutcome::NoBoundary);
    }

    let mut conn = store.connect()?;
    if !layers::table_exists(&conn, Layer::Boundary)? {
        log::debug!("No boundary loaded; {layer} is not clipped");
        return Ok(ClipOutcome::NoBoundary);
    }

    let boundary = read_layer(&conn, Layer::Boundary)?;
    if boundary.is_empty() {
        log::debug!("Boundary layer is empty; {layer} is not clipped");
        return Ok(ClipOutcome::NoBoundary);
    }

    log::info!("Clipping {layer} to the boundary...");
    let boundary = FeatureIndex::new(boundary);

    let outside: Vec<i64> = read_layer(&conn, layer)?
        .into_iter()
        .filter(|(_, geometry)| !intersects_any(&boundary, geometry))
        .map(|(fid, _)| fid)
        .collect();

    let tx = conn.transaction().map_err(DbError::from)?;
    let removed = layers::delete_features(&tx, layer, &outside)?;
    tx.commit().map_err(DbError::from)?;

    if removed > 0 {
        log::info!("Removed {removed} {layer} features outside the boundary");
    }

    Ok(ClipOutcome::Clipped { removed })
}

fn intersects_any(boundary: &FeatureIndex<Geometry<f64>>, geometry: &Geometry<f64>) -> bool {
    let Some(rect) = geometry.bounding_rect() else {
        return false;
    };
    boundary
        .candidates(rect)
        .any(|candidate| candidate.geometry.intersects(geometry))
}

fn read_layer(
    conn: &duckdb::Connection,
    layer: Layer,
) -> Result<Vec<(i64, Geometry<f64>)>, PipelineError> {
    layers::read_geometries(conn, layer)?
        .into_iter()
        .map(|(fid, text)| Ok((fid, tailor_spatial::parse_geometry(&text)?)))
        .collect()
}
