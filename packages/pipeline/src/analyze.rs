//! Analysis orchestration.
//!
//! Analysis output is always rebuilt from the input layers. Existing output
//! is only dropped after the operator agrees; declining ends the run
//! successfully with nothing changed.

use tailor_database::{ProjectStore, layers};
use tailor_models::{AnalysisOutcome, Decision, DecisionRequest, Layer, OverlapThreshold};

use crate::classify::classify_parcels;
use crate::decision::{Decider, ask};
use crate::matching::{detect_mode, match_addresses};
use crate::{PipelineError, require_layers};

/// Runs parcel classification and, when an address layer is loaded,
/// address matching.
///
/// # Errors
///
/// Returns [`PipelineError::MissingLayer`] if parcels, buildings or bsls
/// are not loaded, an address configuration error if the address layer has
/// no usable comparison column, or [`PipelineError`] if a step fails.
pub fn analyze(
    store: &ProjectStore,
    threshold: OverlapThreshold,
    decider: &mut dyn Decider,
) -> Result<AnalysisOutcome, PipelineError> {
    let conn = store.connect()?;
    require_layers(&conn, &[Layer::Parcels, Layer::Buildings, Layer::Bsls])?;

    let has_addresses = layers::table_exists(&conn, Layer::Addresses)?;
    if has_addresses {
        // Configuration errors surface before anything is dropped.
        let mode = detect_mode(&conn)?;
        log::debug!("Address comparison mode: {mode}");
    }

    let existing = layers::existing_layers(&conn, Layer::ANALYSIS_OUTPUTS)?;
    if !existing.is_empty() {
        let request = DecisionRequest::OverwriteAnalysis { existing };
        match ask(decider, &request)? {
            Decision::Overwrite => {
                log::info!("Dropping existing analysis output...");
                layers::drop_layers(&conn, Layer::ANALYSIS_OUTPUTS)?;
            }
            _ => {
                log::info!("Keeping existing analysis output; nothing to do");
                return Ok(AnalysisOutcome::KeptExisting);
            }
        }
    }
    drop(conn);

    let parcels = classify_parcels(store, threshold)?;

    let addresses = if has_addresses {
        Some(match_addresses(store)?)
    } else {
        log::info!(
            "No addresses layer loaded; skipping address matching. Run `{}` to enable it.",
            Layer::Addresses.load_command()
        );
        None
    };

    log::info!("Analysis complete");

    Ok(AnalysisOutcome::Completed { parcels, addresses })
}
