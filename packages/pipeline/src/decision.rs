//! Operator decisions.
//!
//! Pipeline steps never prompt directly. They hand a [`DecisionRequest`] to
//! a [`Decider`]: the CLI answers through interactive prompts, tests and
//! unattended runs through a preset [`Policy`].

use tailor_models::{Decision, DecisionRequest, InvalidGeometryPolicy};

use crate::PipelineError;

/// Answers operator decision requests.
pub trait Decider {
    /// Returns the decision for `request`. Blocks until one is available.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if no answer can be obtained.
    fn decide(&mut self, request: &DecisionRequest) -> Result<Decision, PipelineError>;
}

/// Preset answers for unattended runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Overwrite existing analysis output.
    pub overwrite_analysis: bool,
    /// What to do with geometries the repair pass could not fix.
    pub invalid_geometries: InvalidGeometryPolicy,
}

impl Default for Policy {
    /// Keeps existing analysis and aborts on unrepairable geometries.
    fn default() -> Self {
        Self {
            overwrite_analysis: false,
            invalid_geometries: InvalidGeometryPolicy::Abort,
        }
    }
}

impl Policy {
    /// Overwrites analysis output and excludes unrepairable geometries.
    #[must_use]
    pub const fn permissive() -> Self {
        Self {
            overwrite_analysis: true,
            invalid_geometries: InvalidGeometryPolicy::Exclude,
        }
    }
}

impl Decider for Policy {
    fn decide(&mut self, request: &DecisionRequest) -> Result<Decision, PipelineError> {
        Ok(match request {
            DecisionRequest::OverwriteAnalysis { .. } => {
                if self.overwrite_analysis {
                    Decision::Overwrite
                } else {
                    Decision::KeepExisting
                }
            }
            DecisionRequest::InvalidGeometries { .. } => self.invalid_geometries.into(),
        })
    }
}

/// Asks `decider` and checks the answer fits the request.
///
/// # Errors
///
/// Returns [`PipelineError::UnexpectedDecision`] for an answer the request
/// does not accept, or the decider's own error.
pub fn ask(decider: &mut dyn Decider, request: &DecisionRequest) -> Result<Decision, PipelineError> {
    let decision = decider.decide(request)?;
    log::debug!("Decision for {request:?}: {decision}");

    if request.accepted().contains(&decision) {
        Ok(decision)
    } else {
        Err(PipelineError::UnexpectedDecision {
            request: request_name(request),
            decision,
        })
    }
}

const fn request_name(request: &DecisionRequest) -> &'static str {
    match request {
        DecisionRequest::OverwriteAnalysis { .. } => "OVERWRITE_ANALYSIS",
        DecisionRequest::InvalidGeometries { .. } => "INVALID_GEOMETRIES",
    }
}
