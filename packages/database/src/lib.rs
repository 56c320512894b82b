#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `DuckDB` project store for tailor.
//!
//! One `DuckDB` file holds every layer of a project. Each layer table stores
//! its geometry as `GeoJSON` TEXT in `geom` (no spatial extension required),
//! its feature identifier in `ogc_fid`, and the source attributes as a JSON
//! object in `properties`. Spatial predicates and measures are evaluated in
//! Rust by `tailor_spatial`.

pub mod analysis;
pub mod layers;
pub mod paths;
pub mod store;

pub use store::ProjectStore;

/// Errors that can occur during project store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// Stored attributes could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A layer table already exists and overwrite was not requested.
    #[error("Layer {table} already exists")]
    LayerExists {
        /// Table name.
        table: String,
    },

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

/// Quotes an SQL identifier.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Converts a `DuckDB` row count into `u64`.
fn to_count(value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|e| DbError::Conversion {
        message: format!("negative row count {value}: {e}"),
    })
}
