//! Analysis output tables.
//!
//! `parcels_analyzed`, `bsls_analyzed`, and `bsls_address_match_lines` are
//! always created from scratch. Callers wrap creation in a transaction so a
//! table is either fully present or absent.

use duckdb::Connection;
use serde_json::{Map, Value};
use tailor_models::Layer;

use crate::{DbError, quote_ident};

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 500;

/// One row of `parcels_analyzed`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelAnalysisRow {
    pub fid: i64,
    pub geometry: String,
    pub properties: Map<String, Value>,
    pub has_building: bool,
    pub has_bsl: bool,
    /// Lowest-id qualifying building overlapping the parcel above the
    /// threshold.
    pub qualifying_building_fid: Option<i64>,
    /// Lowest-id bsl point intersecting the parcel directly.
    pub bsl_fid: Option<i64>,
}

/// One row of `bsls_analyzed`.
#[derive(Debug, Clone, PartialEq)]
pub struct BslAnalysisRow {
    pub fid: i64,
    pub geometry: String,
    pub properties: Map<String, Value>,
    pub address_primary_norm: Option<String>,
    pub address_full: Option<String>,
    pub address_full_norm: Option<String>,
    pub is_known_address: bool,
    /// Feet to the lowest-id textually matching address.
    pub distance_to_known_address: Option<f64>,
}

/// One row of `bsls_address_match_lines`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchLineRow {
    pub bsl_fid: i64,
    pub address_fid: i64,
    pub location_id: Option<String>,
    /// Normalized bsl comparison text.
    pub bsl_address: String,
    /// Matching address comparison text.
    pub match_address: String,
    /// `GeoJSON` `LineString` from the address to the bsl.
    pub geometry: String,
    pub distance_ft: f64,
}

/// Creates `parcels_analyzed` and fills it.
///
/// # Errors
///
/// Returns [`DbError`] if the table already exists or an INSERT fails.
pub fn create_parcels_analyzed(
    conn: &Connection,
    rows: &[ParcelAnalysisRow],
) -> Result<u64, DbError> {
    let table = quote_ident(Layer::ParcelsAnalyzed.table());
    conn.execute_batch(&format!(
        "CREATE TABLE {table} (
            ogc_fid BIGINT NOT NULL,
            geom TEXT NOT NULL,
            properties TEXT NOT NULL,
            has_building BOOLEAN NOT NULL,
            has_bsl BOOLEAN NOT NULL,
            qualifying_building_fid BIGINT,
            bsl_fid BIGINT
        );"
    ))?;

    let mut total = 0u64;
    for chunk in rows.chunks(CHUNK_SIZE) {
        let mut stmt = conn.prepare(&insert_sql(&table, 7, chunk.len()))?;
        let mut idx = 1usize;
        for row in chunk {
            stmt.raw_bind_parameter(idx, row.fid)?;
            stmt.raw_bind_parameter(idx + 1, &row.geometry)?;
            stmt.raw_bind_parameter(idx + 2, serde_json::to_string(&row.properties)?)?;
            stmt.raw_bind_parameter(idx + 3, row.has_building)?;
            stmt.raw_bind_parameter(idx + 4, row.has_bsl)?;
            stmt.raw_bind_parameter(idx + 5, row.qualifying_building_fid)?;
            stmt.raw_bind_parameter(idx + 6, row.bsl_fid)?;
            idx += 7;
        }
        total += u64::try_from(stmt.raw_execute()?).unwrap_or(0);
    }

    log::debug!("Wrote {total} rows to parcels_analyzed");
    Ok(total)
}

/// Creates `bsls_analyzed` and fills it.
///
/// # Errors
///
/// Returns [`DbError`] if the table already exists or an INSERT fails.
pub fn create_bsls_analyzed(conn: &Connection, rows: &[BslAnalysisRow]) -> Result<u64, DbError> {
    let table = quote_ident(Layer::BslsAnalyzed.table());
    conn.execute_batch(&format!(
        "CREATE TABLE {table} (
            ogc_fid BIGINT NOT NULL,
            geom TEXT NOT NULL,
            properties TEXT NOT NULL,
            address_primary_norm TEXT,
            address_full TEXT,
            address_full_norm TEXT,
            is_known_address BOOLEAN NOT NULL,
            distance_to_known_address DOUBLE
        );"
    ))?;

    let mut total = 0u64;
    for chunk in rows.chunks(CHUNK_SIZE) {
        let mut stmt = conn.prepare(&insert_sql(&table, 8, chunk.len()))?;
        let mut idx = 1usize;
        for row in chunk {
            stmt.raw_bind_parameter(idx, row.fid)?;
            stmt.raw_bind_parameter(idx + 1, &row.geometry)?;
            stmt.raw_bind_parameter(idx + 2, serde_json::to_string(&row.properties)?)?;
            stmt.raw_bind_parameter(idx + 3, row.address_primary_norm.as_deref())?;
            stmt.raw_bind_parameter(idx + 4, row.address_full.as_deref())?;
            stmt.raw_bind_parameter(idx + 5, row.address_full_norm.as_deref())?;
            stmt.raw_bind_parameter(idx + 6, row.is_known_address)?;
            stmt.raw_bind_parameter(idx + 7, row.distance_to_known_address)?;
            idx += 8;
        }
        total += u64::try_from(stmt.raw_execute()?).unwrap_or(0);
    }

    log::debug!("Wrote {total} rows to bsls_analyzed");
    Ok(total)
}

/// Creates `bsls_address_match_lines` and fills it. Rows are numbered
/// 1-based in input order as `ogc_fid`.
///
/// # Errors
///
/// Returns [`DbError`] if the table already exists or an INSERT fails.
pub fn create_match_lines(conn: &Connection, rows: &[MatchLineRow]) -> Result<u64, DbError> {
    let table = quote_ident(Layer::BslsAddressMatchLines.table());
    conn.execute_batch(&format!(
        "CREATE TABLE {table} (
            ogc_fid BIGINT NOT NULL,
            bsl_fid BIGINT NOT NULL,
            address_fid BIGINT NOT NULL,
            location_id TEXT,
            bsl_address TEXT NOT NULL,
            match_address TEXT NOT NULL,
            geom TEXT NOT NULL,
            distance_ft DOUBLE NOT NULL
        );"
    ))?;

    let mut total = 0u64;
    let mut fid = 1i64;
    for chunk in rows.chunks(CHUNK_SIZE) {
        let mut stmt = conn.prepare(&insert_sql(&table, 8, chunk.len()))?;
        let mut idx = 1usize;
        for row in chunk {
            stmt.raw_bind_parameter(idx, fid)?;
            stmt.raw_bind_parameter(idx + 1, row.bsl_fid)?;
            stmt.raw_bind_parameter(idx + 2, row.address_fid)?;
            stmt.raw_bind_parameter(idx + 3, row.location_id.as_deref())?;
            stmt.raw_bind_parameter(idx + 4, &row.bsl_address)?;
            stmt.raw_bind_parameter(idx + 5, &row.match_address)?;
            stmt.raw_bind_parameter(idx + 6, &row.geometry)?;
            stmt.raw_bind_parameter(idx + 7, row.distance_ft)?;
            idx += 8;
            fid += 1;
        }
        total += u64::try_from(stmt.raw_execute()?).unwrap_or(0);
    }

    log::debug!("Wrote {total} rows to bsls_address_match_lines");
    Ok(total)
}

/// Reads `(ogc_fid, has_building, has_bsl)` from `parcels_analyzed`
/// ordered by `ogc_fid`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn read_parcel_flags(conn: &Connection) -> Result<Vec<(i64, bool, bool)>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT ogc_fid, has_building, has_bsl FROM {} ORDER BY ogc_fid",
        quote_ident(Layer::ParcelsAnalyzed.table()),
    ))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Reads `(ogc_fid, is_known_address, distance_to_known_address)` from
/// `bsls_analyzed` ordered by `ogc_fid`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn read_bsl_matches(conn: &Connection) -> Result<Vec<(i64, bool, Option<f64>)>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT ogc_fid, is_known_address, distance_to_known_address FROM {} ORDER BY ogc_fid",
        quote_ident(Layer::BslsAnalyzed.table()),
    ))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Reads `(bsl_fid, address_fid, distance_ft)` from
/// `bsls_address_match_lines` ordered by `bsl_fid`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn read_match_lines(conn: &Connection) -> Result<Vec<(i64, i64, f64)>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT bsl_fid, address_fid, distance_ft FROM {} ORDER BY bsl_fid",
        quote_ident(Layer::BslsAddressMatchLines.table()),
    ))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn insert_sql(table: &str, columns: usize, rows: usize) -> String {
    let tuple = format!("({})", vec!["?"; columns].join(", "));
    format!("INSERT INTO {table} VALUES {}", vec![tuple; rows].join(", "))
}
