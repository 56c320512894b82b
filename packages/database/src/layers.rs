//! Layer tables.
//!
//! Every input layer has the same shape:
//!
//! ```sql
//! ogc_fid    BIGINT NOT NULL   -- feature id, 1-based in source order
//! geom       TEXT   NOT NULL   -- GeoJSON geometry, EPSG:4326
//! properties TEXT   NOT NULL   -- JSON object of source attributes
//! ```
//!
//! Load post-steps add derived TEXT columns (normalized addresses, the
//! address comparison column) with [`add_text_column`] and fill them with
//! [`set_text_values`]. Indexes are created last since `DuckDB` refuses to
//! alter a table that indexes depend on.

use duckdb::Connection;
use serde_json::{Map, Value};
use tailor_models::{GEOMETRY_COLUMN, Layer};

use crate::{DbError, quote_ident, to_count};

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 1_000;

/// A feature as stored in a layer table.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Feature identifier (`ogc_fid`).
    pub fid: i64,
    /// `GeoJSON` geometry text.
    pub geometry: String,
    /// Source attributes.
    pub properties: Map<String, Value>,
}

/// Returns whether a table for `layer` exists.
///
/// # Errors
///
/// Returns [`DbError`] if the catalog query fails.
pub fn table_exists(conn: &Connection, layer: Layer) -> Result<bool, DbError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM information_schema.tables
         WHERE table_schema = 'main' AND table_name = ?",
        [layer.table()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Returns the subset of `layers` that currently exist, in input order.
///
/// # Errors
///
/// Returns [`DbError`] if a catalog query fails.
pub fn existing_layers(conn: &Connection, layers: &[Layer]) -> Result<Vec<Layer>, DbError> {
    let mut existing = Vec::new();
    for layer in layers {
        if table_exists(conn, *layer)? {
            existing.push(*layer);
        }
    }
    Ok(existing)
}

/// Returns the column names of a layer table in definition order.
///
/// # Errors
///
/// Returns [`DbError`] if the catalog query fails.
pub fn columns(conn: &Connection, layer: Layer) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT column_name FROM information_schema.columns
         WHERE table_schema = 'main' AND table_name = ?
         ORDER BY ordinal_position",
    )?;
    let names = stmt
        .query_map([layer.table()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Creates an empty table for an input layer.
///
/// With `overwrite`, an existing table is dropped first.
///
/// # Errors
///
/// Returns [`DbError::LayerExists`] if the table exists and `overwrite` is
/// false, or [`DbError`] if the DDL fails.
pub fn create_layer_table(conn: &Connection, layer: Layer, overwrite: bool) -> Result<(), DbError> {
    let table = quote_ident(layer.table());

    if table_exists(conn, layer)? {
        if !overwrite {
            return Err(DbError::LayerExists {
                table: layer.table().to_string(),
            });
        }
        log::debug!("Dropping existing {layer} table");
        conn.execute_batch(&format!("DROP TABLE {table};"))?;
    }

    conn.execute_batch(&format!(
        "CREATE TABLE {table} (
            ogc_fid BIGINT NOT NULL,
            {geom} TEXT NOT NULL,
            properties TEXT NOT NULL
        );",
        geom = quote_ident(GEOMETRY_COLUMN),
    ))?;

    Ok(())
}

/// Drops the tables for `layers` if they exist.
///
/// # Errors
///
/// Returns [`DbError`] if a DROP fails.
pub fn drop_layers(conn: &Connection, layers: &[Layer]) -> Result<(), DbError> {
    for layer in layers {
        log::debug!("Dropping {layer} if present");
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {};",
            quote_ident(layer.table())
        ))?;
    }
    Ok(())
}

/// Inserts features into a layer table using multi-row INSERTs.
///
/// Returns the number of rows inserted.
///
/// # Errors
///
/// Returns [`DbError`] if serialization or any INSERT fails.
pub fn insert_features(
    conn: &Connection,
    layer: Layer,
    features: &[FeatureRow],
) -> Result<u64, DbError> {
    if features.is_empty() {
        return Ok(0);
    }

    let mut total = 0u64;

    for chunk in features.chunks(CHUNK_SIZE) {
        let mut sql = format!(
            "INSERT INTO {} (ogc_fid, {}, properties) VALUES ",
            quote_ident(layer.table()),
            quote_ident(GEOMETRY_COLUMN),
        );
        for i in 0..chunk.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str("(?, ?, ?)");
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut param_idx = 1usize;

        for feature in chunk {
            let properties = serde_json::to_string(&feature.properties)?;
            stmt.raw_bind_parameter(param_idx, feature.fid)?;
            stmt.raw_bind_parameter(param_idx + 1, &feature.geometry)?;
            stmt.raw_bind_parameter(param_idx + 2, properties)?;
            param_idx += 3;
        }

        let rows = stmt.raw_execute()?;
        total += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total)
}

/// Reads `(ogc_fid, geometry)` pairs of a layer ordered by `ogc_fid`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn read_geometries(conn: &Connection, layer: Layer) -> Result<Vec<(i64, String)>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT ogc_fid, {} FROM {} ORDER BY ogc_fid",
        quote_ident(GEOMETRY_COLUMN),
        quote_ident(layer.table()),
    ))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Reads every feature of a layer ordered by `ogc_fid`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or stored attributes are not a
/// JSON object.
pub fn read_features(conn: &Connection, layer: Layer) -> Result<Vec<FeatureRow>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT ogc_fid, {}, properties FROM {} ORDER BY ogc_fid",
        quote_ident(GEOMETRY_COLUMN),
        quote_ident(layer.table()),
    ))?;
    let raw = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(fid, geometry, properties)| {
            Ok(FeatureRow {
                fid,
                geometry,
                properties: serde_json::from_str(&properties)?,
            })
        })
        .collect()
}

/// Reads every feature of a layer together with derived TEXT columns,
/// ordered by `ogc_fid`. The values follow the order of `text_columns`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or stored attributes are not a
/// JSON object.
pub fn read_features_with_text(
    conn: &Connection,
    layer: Layer,
    text_columns: &[&str],
) -> Result<Vec<(FeatureRow, Vec<Option<String>>)>, DbError> {
    let extra: String = text_columns
        .iter()
        .map(|column| format!(", {}", quote_ident(column)))
        .collect();
    let mut stmt = conn.prepare(&format!(
        "SELECT ogc_fid, {}, properties{extra} FROM {} ORDER BY ogc_fid",
        quote_ident(GEOMETRY_COLUMN),
        quote_ident(layer.table()),
    ))?;
    let raw = stmt
        .query_map([], |row| {
            let mut values = Vec::with_capacity(text_columns.len());
            for idx in 0..text_columns.len() {
                values.push(row.get::<_, Option<String>>(idx + 3)?);
            }
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                values,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(fid, geometry, properties, values)| {
            Ok((
                FeatureRow {
                    fid,
                    geometry,
                    properties: serde_json::from_str(&properties)?,
                },
                values,
            ))
        })
        .collect()
}

/// Replaces the geometry of the given features.
///
/// Returns the number of rows updated.
///
/// # Errors
///
/// Returns [`DbError`] if an UPDATE fails.
pub fn update_geometries(
    conn: &Connection,
    layer: Layer,
    updates: &[(i64, String)],
) -> Result<u64, DbError> {
    if updates.is_empty() {
        return Ok(0);
    }

    let mut stmt = conn.prepare(&format!(
        "UPDATE {} SET {} = ? WHERE ogc_fid = ?",
        quote_ident(layer.table()),
        quote_ident(GEOMETRY_COLUMN),
    ))?;

    let mut total = 0u64;
    for (fid, geometry) in updates {
        let rows = stmt.execute(duckdb::params![geometry, fid])?;
        total += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total)
}

/// Deletes features by `ogc_fid`.
///
/// Returns the number of rows deleted.
///
/// # Errors
///
/// Returns [`DbError`] if a DELETE fails.
pub fn delete_features(conn: &Connection, layer: Layer, fids: &[i64]) -> Result<u64, DbError> {
    if fids.is_empty() {
        return Ok(0);
    }

    let mut total = 0u64;

    for chunk in fids.chunks(CHUNK_SIZE) {
        let placeholders = chunk.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "DELETE FROM {} WHERE ogc_fid IN ({placeholders})",
            quote_ident(layer.table()),
        );
        let mut stmt = conn.prepare(&sql)?;

        for (i, fid) in chunk.iter().enumerate() {
            stmt.raw_bind_parameter(i + 1, fid)?;
        }

        let rows = stmt.raw_execute()?;
        total += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total)
}

/// Returns the number of features in a layer.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn count_features(conn: &Connection, layer: Layer) -> Result<u64, DbError> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(layer.table())),
        [],
        |row| row.get(0),
    )?;
    to_count(count)
}

/// Adds a nullable TEXT column to a layer table.
///
/// # Errors
///
/// Returns [`DbError`] if the ALTER fails.
pub fn add_text_column(conn: &Connection, layer: Layer, column: &str) -> Result<(), DbError> {
    conn.execute_batch(&format!(
        "ALTER TABLE {} ADD COLUMN {} TEXT;",
        quote_ident(layer.table()),
        quote_ident(column),
    ))?;
    Ok(())
}

/// Sets a TEXT column per feature. `None` stores NULL.
///
/// Returns the number of rows updated.
///
/// # Errors
///
/// Returns [`DbError`] if an UPDATE fails.
pub fn set_text_values(
    conn: &Connection,
    layer: Layer,
    column: &str,
    values: &[(i64, Option<String>)],
) -> Result<u64, DbError> {
    if values.is_empty() {
        return Ok(0);
    }

    let mut stmt = conn.prepare(&format!(
        "UPDATE {} SET {} = ? WHERE ogc_fid = ?",
        quote_ident(layer.table()),
        quote_ident(column),
    ))?;

    let mut total = 0u64;
    for (fid, value) in values {
        let rows = stmt.execute(duckdb::params![value.as_deref(), fid])?;
        total += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total)
}

/// Reads `(ogc_fid, value)` pairs of a TEXT column ordered by `ogc_fid`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn read_text_column(
    conn: &Connection,
    layer: Layer,
    column: &str,
) -> Result<Vec<(i64, Option<String>)>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT ogc_fid, {} FROM {} ORDER BY ogc_fid",
        quote_ident(column),
        quote_ident(layer.table()),
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Creates an index on one column of a layer table.
///
/// # Errors
///
/// Returns [`DbError`] if the DDL fails.
pub fn create_index(conn: &Connection, layer: Layer, column: &str) -> Result<(), DbError> {
    let name = format!("idx_{}_{column}", layer.table());
    log::debug!("Creating index {name}");
    conn.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({});",
        quote_ident(&name),
        quote_ident(layer.table()),
        quote_ident(column),
    ))?;
    Ok(())
}
