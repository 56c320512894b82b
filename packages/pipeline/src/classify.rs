//! Parcel relationship classification.
//!
//! A building qualifies when a bsl point falls on it. A parcel has a
//! building when some building overlaps it by more than the threshold, and
//! has a bsl when a qualifying building does, or when a bsl point lies on
//! the parcel itself.

use std::collections::{BTreeMap, BTreeSet};

use geo::{BoundingRect, Geometry, Intersects, MultiPolygon, Point};
use tailor_database::analysis::{self, ParcelAnalysisRow};
use tailor_database::{DbError, ProjectStore, layers};
use tailor_models::{ClassificationSummary, Layer, OverlapThreshold};
use tailor_spatial::FeatureIndex;
use tailor_spatial::measure::intersection_area_sq_m;
use tailor_spatial::validity::{as_multi_polygon, representative_point};

use crate::{PipelineError, require_layers};

/// Classifies every parcel and writes `parcels_analyzed`, replacing any
/// previous table.
///
/// # Errors
///
/// Returns [`PipelineError::MissingLayer`] if an input layer is absent, or
/// [`PipelineError`] if the store cannot be read or written.
pub fn classify_parcels(
    store: &ProjectStore,
    threshold: OverlapThreshold,
) -> Result<ClassificationSummary, PipelineError> {
    let mut conn = store.connect()?;
    require_layers(&conn, &[Layer::Parcels, Layer::Buildings, Layer::Bsls])?;

    log::info!(
        "Classifying parcels (building overlap threshold {:.0} sq ft)...",
        threshold.square_feet()
    );

    let bsls = FeatureIndex::new(bsl_points(&conn)?);

    let building_rows = layers::read_geometries(&conn, Layer::Buildings)?;
    let qualifying = qualifying_buildings(&building_rows, &bsls)?;
    log::debug!("{} qualifying buildings", qualifying.len());

    let buildings = FeatureIndex::new(
        building_rows
            .iter()
            .map(|(fid, text)| {
                Ok((
                    *fid,
                    as_multi_polygon(&tailor_spatial::parse_geometry(text)?),
                ))
            })
            .collect::<Result<Vec<(i64, MultiPolygon<f64>)>, PipelineError>>()?,
    );

    let mut rows = Vec::new();
    let mut summary = ClassificationSummary {
        qualifying_buildings: qualifying.len() as u64,
        ..ClassificationSummary::default()
    };

    for parcel in layers::read_features(&conn, Layer::Parcels)? {
        let geometry = tailor_spatial::parse_geometry(&parcel.geometry)?;
        let evidence = classify(&geometry, threshold, &buildings, &qualifying, &bsls);

        summary.parcels += 1;
        if evidence.has_building {
            summary.with_building += 1;
        }
        if evidence.has_bsl() {
            summary.with_bsl += 1;
        }

        rows.push(ParcelAnalysisRow {
            fid: parcel.fid,
            geometry: parcel.geometry,
            properties: parcel.properties,
            has_building: evidence.has_building,
            has_bsl: evidence.has_bsl(),
            qualifying_building_fid: evidence.qualifying_building_fid,
            bsl_fid: evidence.bsl_fid,
        });
    }

    let tx = conn.transaction().map_err(DbError::from)?;
    layers::drop_layers(&tx, &[Layer::ParcelsAnalyzed])?;
    analysis::create_parcels_analyzed(&tx, &rows)?;
    tx.commit().map_err(DbError::from)?;

    log::info!(
        "{} parcels: {} with a building, {} with a bsl",
        summary.parcels,
        summary.with_building,
        summary.with_bsl
    );

    Ok(summary)
}

#[derive(Debug, Default)]
struct ParcelEvidence {
    has_building: bool,
    qualifying_building_fid: Option<i64>,
    bsl_fid: Option<i64>,
}

impl ParcelEvidence {
    const fn has_bsl(&self) -> bool {
        self.qualifying_building_fid.is_some() || self.bsl_fid.is_some()
    }
}

fn classify(
    parcel: &Geometry<f64>,
    threshold: OverlapThreshold,
    buildings: &FeatureIndex<MultiPolygon<f64>>,
    qualifying: &BTreeSet<i64>,
    bsls: &FeatureIndex<Point<f64>>,
) -> ParcelEvidence {
    let mut evidence = ParcelEvidence::default();
    let Some(rect) = parcel.bounding_rect() else {
        return evidence;
    };
    let area = as_multi_polygon(parcel);

    for building in buildings.candidates(rect) {
        if !building.geometry.intersects(parcel) {
            continue;
        }
        if !threshold.is_exceeded_by(intersection_area_sq_m(&area, &building.geometry)) {
            continue;
        }
        evidence.has_building = true;
        if qualifying.contains(&building.fid) {
            evidence.qualifying_building_fid = Some(
                evidence
                    .qualifying_building_fid
                    .map_or(building.fid, |fid| fid.min(building.fid)),
            );
        }
    }

    evidence.bsl_fid = bsls
        .candidates(rect)
        .filter(|bsl| parcel.intersects(&bsl.geometry))
        .map(|bsl| bsl.fid)
        .min();

    evidence
}

fn bsl_points(conn: &duckdb::Connection) -> Result<Vec<(i64, Point<f64>)>, PipelineError> {
    let mut points = Vec::new();
    for (fid, text) in layers::read_geometries(conn, Layer::Bsls)? {
        let geometry = tailor_spatial::parse_geometry(&text)?;
        if let Some(point) = representative_point(&geometry) {
            points.push((fid, point));
        }
    }
    Ok(points)
}

/// Buildings with a bsl point on them. Buildings sharing identical geometry
/// count once, under the lowest `ogc_fid`.
fn qualifying_buildings(
    buildings: &[(i64, String)],
    bsls: &FeatureIndex<Point<f64>>,
) -> Result<BTreeSet<i64>, PipelineError> {
    let mut by_geometry: BTreeMap<&str, i64> = BTreeMap::new();

    for (fid, text) in buildings {
        let geometry = tailor_spatial::parse_geometry(text)?;
        let Some(rect) = geometry.bounding_rect() else {
            continue;
        };
        let has_point = bsls
            .candidates(rect)
            .any(|bsl| geometry.intersects(&bsl.geometry));
        if has_point {
            by_geometry
                .entry(text.as_str())
                .and_modify(|kept| *kept = (*kept).min(*fid))
                .or_insert(*fid);
        }
    }

    Ok(by_geometry.into_values().collect())
}
