//! Interactive answers to pipeline decision requests.
//!
//! Prompts are drawn with the spinners suspended. Answers preset on the
//! command line skip the prompt.

use dialoguer::{Confirm, Select};
use tailor_cli_utils::MultiProgress;
use tailor_models::{Decision, DecisionRequest, InvalidGeometryPolicy};
use tailor_pipeline::{Decider, PipelineError};

/// How unrepairable geometries are handled, from `--invalid-geometries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InvalidGeometriesArg {
    /// Prompt for each layer.
    Ask,
    /// Delete them and continue.
    Exclude,
    /// Keep them and stop the load.
    Abort,
}

impl InvalidGeometriesArg {
    const fn preset(self) -> Option<InvalidGeometryPolicy> {
        match self {
            Self::Ask => None,
            Self::Exclude => Some(InvalidGeometryPolicy::Exclude),
            Self::Abort => Some(InvalidGeometryPolicy::Abort),
        }
    }
}

/// Choices offered for geometries the automatic repair could not fix.
const INVALID_CHOICES: &[(&str, Decision)] = &[
    ("Exclude them from analysis and continue", Decision::ExcludeInvalid),
    ("Exit and fix manually", Decision::Abort),
];

/// Answers decision requests through terminal prompts.
pub struct PromptDecider {
    multi: MultiProgress,
    overwrite_analysis: bool,
    invalid_geometries: Option<InvalidGeometryPolicy>,
}

impl PromptDecider {
    #[must_use]
    pub const fn new(
        multi: MultiProgress,
        overwrite_analysis: bool,
        invalid_geometries: InvalidGeometriesArg,
    ) -> Self {
        Self {
            multi,
            overwrite_analysis,
            invalid_geometries: invalid_geometries.preset(),
        }
    }

    fn confirm_overwrite(&self) -> Result<bool, PipelineError> {
        self.multi
            .suspend(|| {
                Confirm::new()
                    .with_prompt("We found an existing analysis. Are you sure you want to overwrite it?")
                    .default(false)
                    .interact()
            })
            .map_err(prompt_error)
    }

    fn choose_invalid(&self, remaining: u64) -> Result<Decision, PipelineError> {
        let labels: Vec<&str> = INVALID_CHOICES.iter().map(|(label, _)| *label).collect();
        let idx = self
            .multi
            .suspend(|| {
                Select::new()
                    .with_prompt(format!(
                        "There are {remaining} invalid geometries that couldn't be fixed. Would you like to..."
                    ))
                    .items(&labels)
                    .default(0)
                    .interact()
            })
            .map_err(prompt_error)?;

        INVALID_CHOICES
            .get(idx)
            .map(|(_, decision)| *decision)
            .ok_or_else(|| PipelineError::Decider {
                message: format!("no choice at index {idx}"),
            })
    }
}

impl Decider for PromptDecider {
    fn decide(&mut self, request: &DecisionRequest) -> Result<Decision, PipelineError> {
        match request {
            DecisionRequest::OverwriteAnalysis { .. } => {
                if self.overwrite_analysis || self.confirm_overwrite()? {
                    Ok(Decision::Overwrite)
                } else {
                    Ok(Decision::KeepExisting)
                }
            }
            DecisionRequest::InvalidGeometries { layer, remaining } => {
                if let Some(policy) = self.invalid_geometries {
                    log::info!("{layer}: applying --invalid-geometries {policy}");
                    return Ok(policy.into());
                }
                self.choose_invalid(*remaining)
            }
        }
    }
}

fn prompt_error(err: dialoguer::Error) -> PipelineError {
    PipelineError::Decider {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use tailor_cli_utils::ProgressDrawTarget;
    use tailor_models::Layer;

    use super::*;

    fn hidden() -> MultiProgress {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn presets_answer_without_prompting() {
        let mut decider = PromptDecider::new(hidden(), true, InvalidGeometriesArg::Exclude);
        let overwrite = DecisionRequest::OverwriteAnalysis {
            existing: vec![Layer::ParcelsAnalyzed],
        };
        assert_eq!(decider.decide(&overwrite).unwrap(), Decision::Overwrite);

        let invalid = DecisionRequest::InvalidGeometries {
            layer: Layer::Parcels,
            remaining: 3,
        };
        assert_eq!(decider.decide(&invalid).unwrap(), Decision::ExcludeInvalid);

        let mut decider = PromptDecider::new(hidden(), true, InvalidGeometriesArg::Abort);
        assert_eq!(decider.decide(&invalid).unwrap(), Decision::Abort);
    }

    #[test]
    fn choices_cover_invalid_geometry_answers() {
        let request = DecisionRequest::InvalidGeometries {
            layer: Layer::Buildings,
            remaining: 1,
        };
        for (_, decision) in INVALID_CHOICES {
            assert!(request.accepted().contains(decision));
        }
    }
}
