#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the tailor conflation toolchain.
//!
//! Each load command reads one source file into the project store, repairs
//! invalid geometries, and clips the layer to the boundary. `analyze`
//! classifies parcels and matches bsls to addresses.
//!
//! Uses `indicatif-log-bridge` (via [`tailor_cli_utils::init_logger`]) so
//! that log lines and step spinners never fight for the terminal.

mod decider;
mod report;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tailor_cli_utils::{MultiProgress, StepSpinner};
use tailor_database::ProjectStore;
use tailor_database::paths::DEFAULT_PROJECT;
use tailor_models::{
    AddressMatchMode, DEFAULT_BUILDING_PARCEL_OVERLAP_SQ_FT, Layer, LoadReport, OverlapThreshold,
};
use tailor_pipeline::PipelineError;
use tailor_pipeline::load;

use crate::decider::{InvalidGeometriesArg, PromptDecider};

#[derive(Parser)]
#[command(name = "tailor", about = "Conflate parcels, buildings, and addresses with a location fabric")]
struct Cli {
    /// Project store file. Overrides the `TAILOR_DATABASE` environment
    /// variable.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Project name; the default store is `<project>.duckdb`.
    #[arg(long, global = true, default_value = DEFAULT_PROJECT)]
    project: String,

    /// Overwrite existing analysis output without asking.
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    /// What to do with geometries the automatic repair cannot fix.
    #[arg(long, global = true, value_enum, default_value = "ask")]
    invalid_geometries: InvalidGeometriesArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the area-of-interest boundary (.geojson or .shp)
    LoadBoundary {
        /// Source file
        path: PathBuf,
    },
    /// Load parcels (.geojson or .shp)
    LoadParcels {
        /// Source file
        path: PathBuf,
    },
    /// Load building footprints (.geojson or .shp)
    LoadBuildings {
        /// Source file
        path: PathBuf,
    },
    /// Load bsls from a fabric CSV with `Longitude`/`Latitude` columns
    LoadBsls {
        /// Source file
        path: PathBuf,
    },
    /// Load address points (.geojson or .shp)
    LoadAddresses {
        /// Source file
        path: PathBuf,
        /// Attribute holding the address text
        address_column: String,
        /// `street` to compare street lines, `full` to compare full
        /// addresses with city, state and ZIP
        #[arg(value_parser = parse_address_type)]
        address_type: AddressMatchMode,
    },
    /// Classify parcels and match bsls to addresses
    Analyze {
        /// Minimum building/parcel overlap in square feet
        #[arg(long, default_value_t = DEFAULT_BUILDING_PARCEL_OVERLAP_SQ_FT, value_parser = parse_overlap)]
        building_parcel_overlap: f64,
    },
}

fn parse_address_type(value: &str) -> Result<AddressMatchMode, String> {
    AddressMatchMode::from_str(value).map_err(|_| {
        "Address type must be either `street` or `full`. Hint: if you have ZIP codes, use `full`."
            .to_string()
    })
}

fn parse_overlap(value: &str) -> Result<f64, String> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| format!("Overlap must be a non-negative number of square feet, got {value}"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = tailor_cli_utils::init_logger();
    let cli = Cli::parse();

    let store = ProjectStore::resolve(cli.database.as_deref(), &cli.project);
    log::debug!("Using project store {}", store.path().display());

    let mut decider = PromptDecider::new(multi.clone(), cli.yes, cli.invalid_geometries);
    let start = Instant::now();

    match cli.command {
        Commands::LoadBoundary { path } => {
            run_load(&multi, Layer::Boundary, &path, |source| {
                load::load_boundary(&store, source, &mut decider)
            })?;
        }
        Commands::LoadParcels { path } => {
            run_load(&multi, Layer::Parcels, &path, |source| {
                load::load_parcels(&store, source, &mut decider)
            })?;
        }
        Commands::LoadBuildings { path } => {
            run_load(&multi, Layer::Buildings, &path, |source| {
                load::load_buildings(&store, source, &mut decider)
            })?;
        }
        Commands::LoadBsls { path } => {
            run_load(&multi, Layer::Bsls, &path, |source| {
                load::load_bsls(&store, source, &mut decider)
            })?;
        }
        Commands::LoadAddresses {
            path,
            address_column,
            address_type,
        } => {
            run_load(&multi, Layer::Addresses, &path, |source| {
                load::load_addresses(&store, source, &address_column, address_type, &mut decider)
            })?;
        }
        Commands::Analyze {
            building_parcel_overlap,
        } => {
            let threshold = OverlapThreshold::from_square_feet(building_parcel_overlap);
            let spinner = StepSpinner::start(
                &multi,
                "Comparing bsls, parcels, and buildings. This may take a few minutes...",
            );
            let outcome = tailor_pipeline::analyze(&store, threshold, &mut decider);
            spinner.clear();
            report::print_analysis(&outcome?);
        }
    }

    log::info!("Finished in {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

fn run_load(
    multi: &MultiProgress,
    layer: Layer,
    path: &Path,
    load: impl FnOnce(&Path) -> Result<LoadReport, PipelineError>,
) -> Result<(), PipelineError> {
    let spinner = StepSpinner::start(multi, &format!("Loading {layer}..."));
    let result = load(path);
    spinner.clear();

    let report = result?;
    report::print_load(&report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn address_type_accepts_street_and_full() {
        assert_eq!(parse_address_type("street").unwrap(), AddressMatchMode::Street);
        assert_eq!(parse_address_type("full").unwrap(), AddressMatchMode::Full);
    }

    #[test]
    fn address_type_rejects_other_values_with_hint() {
        let err = parse_address_type("zip").unwrap_err();
        assert_eq!(
            err,
            "Address type must be either `street` or `full`. Hint: if you have ZIP codes, use `full`."
        );
    }

    #[test]
    fn parses_load_addresses() {
        let cli = Cli::try_parse_from([
            "tailor",
            "--yes",
            "load-addresses",
            "addresses.geojson",
            "ADDRESS",
            "full",
        ])
        .unwrap();
        assert!(cli.yes);
        assert_eq!(cli.project, "tailor");
        match cli.command {
            Commands::LoadAddresses {
                path,
                address_column,
                address_type,
            } => {
                assert_eq!(path, PathBuf::from("addresses.geojson"));
                assert_eq!(address_column, "ADDRESS");
                assert_eq!(address_type, AddressMatchMode::Full);
            }
            _ => panic!("expected load-addresses"),
        }
    }

    #[test]
    fn analyze_overlap_defaults_and_validates() {
        let cli = Cli::try_parse_from(["tailor", "analyze"]).unwrap();
        match cli.command {
            Commands::Analyze {
                building_parcel_overlap,
            } => assert!((building_parcel_overlap - 500.0).abs() < f64::EPSILON),
            _ => panic!("expected analyze"),
        }

        assert!(
            Cli::try_parse_from(["tailor", "analyze", "--building-parcel-overlap", "-5"]).is_err()
        );
        assert!(
            Cli::try_parse_from([
                "tailor",
                "--invalid-geometries",
                "exclude",
                "analyze",
                "--building-parcel-overlap",
                "250"
            ])
            .is_ok()
        );
    }
}
