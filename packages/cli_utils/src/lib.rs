#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared CLI utilities for tailor.
//!
//! [`init_logger`] sets up `indicatif-log-bridge` so that `log::info!` and
//! friends are suspended while spinners redraw, and [`StepSpinner`] shows a
//! spinner for one pipeline step.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;

pub use indicatif::{MultiProgress, ProgressDrawTarget};

/// Level used when `RUST_LOG` is not set.
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// A spinner for a single pipeline step.
pub struct StepSpinner {
    bar: ProgressBar,
}

impl StepSpinner {
    /// Adds a ticking spinner labelled `message` to `multi`.
    #[must_use]
    pub fn start(multi: &MultiProgress, message: &str) -> Self {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(message.to_string());
        Self { bar }
    }

    /// Replaces the label.
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Stops the spinner and leaves `message` on screen.
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Stops the spinner and removes it.
    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }

    /// Whether the spinner has been stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.bar.is_finished()
    }
}

impl Drop for StepSpinner {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge`.
///
/// `RUST_LOG` controls verbosity and defaults to [`DEFAULT_LEVEL`].
/// Returns the [`MultiProgress`] that all spinners must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .filter_level(DEFAULT_LEVEL)
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // Ignore error if logger was already set (e.g., in tests)

    log::set_max_level(level);

    multi
}
