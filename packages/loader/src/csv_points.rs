//! CSV point source reader.
//!
//! Point geometry comes from a longitude and a latitude column, located by
//! case-insensitive name. All other columns are kept as text attributes.

use std::path::Path;

use geo::{Geometry, Point};
use serde_json::{Map, Value};
use tailor_models::LoadOptions;

use crate::{LoadError, SourceFeature};

/// Reads a CSV of points.
///
/// Rows whose coordinate cells are both empty have no geometry.
///
/// # Errors
///
/// Returns [`LoadError`] if the file cannot be read, a coordinate column
/// is missing, or a coordinate cell is not a number.
pub fn read(path: &Path, options: &LoadOptions) -> Result<Vec<SourceFeature>, LoadError> {
    let csv_error = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;

    let headers = reader.headers().map_err(csv_error)?.clone();
    let x_idx = find_column(path, &headers, &options.x_column_names)?;
    let y_idx = find_column(path, &headers, &options.y_column_names)?;

    let mut features = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        let line = record.position().map_or(0, csv::Position::line);

        let x = record.get(x_idx).unwrap_or_default().trim();
        let y = record.get(y_idx).unwrap_or_default().trim();

        let geometry = if x.is_empty() && y.is_empty() {
            None
        } else {
            let lon = parse_coordinate(path, &headers[x_idx], line, x)?;
            let lat = parse_coordinate(path, &headers[y_idx], line, y)?;
            Some(Geometry::Point(Point::new(lon, lat)))
        };

        let mut properties = Map::new();
        for (idx, (name, value)) in headers.iter().zip(record.iter()).enumerate() {
            if !options.keep_geometry_columns && (idx == x_idx || idx == y_idx) {
                continue;
            }
            properties.insert(name.to_string(), Value::String(value.to_string()));
        }

        features.push(SourceFeature {
            geometry,
            properties,
        });
    }

    log::debug!("Read {} rows from {}", features.len(), path.display());

    Ok(features)
}

fn find_column(
    path: &Path,
    headers: &csv::StringRecord,
    candidates: &[String],
) -> Result<usize, LoadError> {
    candidates
        .iter()
        .find_map(|candidate| {
            headers
                .iter()
                .position(|header| header.trim().eq_ignore_ascii_case(candidate))
        })
        .ok_or_else(|| LoadError::MissingColumn {
            path: path.to_path_buf(),
            candidates: candidates.to_vec(),
        })
}

fn parse_coordinate(path: &Path, column: &str, line: u64, value: &str) -> Result<f64, LoadError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| LoadError::InvalidCoordinate {
            path: path.to_path_buf(),
            column: column.to_string(),
            line,
            value: value.to_string(),
        })
}
