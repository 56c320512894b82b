#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The tailor conflation pipeline.
//!
//! Every load command runs the geometry repair workflow and then clips the
//! new layer to the boundary. Analysis classifies parcels by their
//! building and bsl evidence and, when an address layer exists, matches
//! bsls to known addresses. Steps that need an operator answer go through
//! a [`Decider`].

pub mod analyze;
pub mod classify;
pub mod clip;
pub mod decision;
pub mod load;
pub mod matching;
pub mod normalize;
pub mod validate;

use std::path::PathBuf;

use tailor_database::DbError;
use tailor_loader::LoadError;
use tailor_models::{Decision, Layer, UnrecognizedAddressColumn};
use tailor_spatial::SpatialError;

pub use analyze::analyze;
pub use classify::classify_parcels;
pub use clip::{boundary_extent, clip_to_boundary};
pub use decision::{Decider, Policy};
pub use matching::match_addresses;
pub use normalize::{NormalizedAddress, normalize};
pub use validate::repair;

/// Errors that can occur while running a pipeline step.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Project store error.
    #[error(transparent)]
    Database(#[from] DbError),

    /// Source loading error.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Stored geometry could not be parsed or serialized.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// The source file extension is not accepted for the layer.
    #[error("{layer} must be loaded from a {} file, got {path}", format_extensions(.allowed))]
    UnsupportedExtension {
        layer: Layer,
        path: PathBuf,
        allowed: &'static [&'static str],
    },

    /// The addresses layer carries a `tailor_address_*` column naming no
    /// known comparison mode.
    #[error(transparent)]
    UnrecognizedAddressColumn(#[from] UnrecognizedAddressColumn),

    /// The addresses layer has no `tailor_address_*` column.
    #[error(
        "The addresses layer has no tailor_address_street or tailor_address_full column. \
         Reload it with `load-addresses`."
    )]
    MissingAddressColumn,

    /// The addresses layer has more than one `tailor_address_*` column.
    #[error("The addresses layer has several address match columns: {}", .columns.join(", "))]
    AmbiguousAddressColumns { columns: Vec<String> },

    /// The named address attribute does not exist in the source.
    #[error("Address column {column:?} not found in {path}. Available columns: {}", .available.join(", "))]
    UnknownAddressSourceColumn {
        column: String,
        path: PathBuf,
        available: Vec<String>,
    },

    /// A layer required by the step has not been loaded.
    #[error("The {layer} layer has not been loaded. Run `{command}` first.")]
    MissingLayer {
        layer: Layer,
        command: &'static str,
    },

    /// A decider answered with a decision the request does not accept.
    #[error("Decision {decision} does not answer {request}")]
    UnexpectedDecision {
        request: &'static str,
        decision: Decision,
    },

    /// The decider could not obtain an answer.
    #[error("Could not get an operator decision: {message}")]
    Decider { message: String },
}

fn format_extensions(allowed: &[&str]) -> String {
    allowed
        .iter()
        .map(|ext| format!(".{ext}"))
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Fails with [`PipelineError::MissingLayer`] unless every layer exists.
///
/// # Errors
///
/// Returns [`PipelineError`] naming the first missing layer, or if the
/// catalog query fails.
pub fn require_layers(conn: &duckdb::Connection, layers: &[Layer]) -> Result<(), PipelineError> {
    for layer in layers {
        if !tailor_database::layers::table_exists(conn, *layer)? {
            return Err(PipelineError::MissingLayer {
                layer: *layer,
                command: layer.load_command(),
            });
        }
    }
    Ok(())
}
