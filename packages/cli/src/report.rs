//! Console summaries for finished commands.

use tailor_models::{AnalysisOutcome, ClipOutcome, LoadReport, RepairOutcome};

pub fn print_load(report: &LoadReport) {
    println!();
    println!("Loaded {} from {}", report.layer, report.source.display());
    println!("  {:<24} {}", "Features loaded", report.features_loaded);
    if report.features_filtered > 0 {
        println!(
            "  {:<24} {}",
            "Outside boundary extent", report.features_filtered
        );
    }
    println!("  {:<24} {}", "Geometry check", repair_line(report.repair));
    if let Some(clip) = report.clip {
        println!("  {:<24} {}", "Boundary clip", clip_line(clip));
    }

    if !report.repair.is_valid() {
        println!();
        println!(
            "{} still has invalid geometries. Fix them and run `{}` again.",
            report.layer,
            report.layer.load_command()
        );
    }
}

pub fn print_analysis(outcome: &AnalysisOutcome) {
    let AnalysisOutcome::Completed { parcels, addresses } = outcome else {
        println!("Finished.");
        return;
    };

    println!();
    println!("Parcels");
    println!("  {:<24} {}", "Analyzed", parcels.parcels);
    println!("  {:<24} {}", "With a building", parcels.with_building);
    println!("  {:<24} {}", "With a bsl", parcels.with_bsl);
    println!("  {:<24} {}", "Qualifying buildings", parcels.qualifying_buildings);

    match addresses {
        Some(summary) => {
            println!();
            println!("Bsls ({} address match)", summary.mode);
            println!("  {:<24} {}", "Analyzed", summary.bsls);
            println!("  {:<24} {}", "Known addresses", summary.known_addresses);
            println!("  {:<24} {}", "Match lines", summary.match_lines);
        }
        None => {
            println!();
            println!("No addresses loaded; address matching was skipped.");
        }
    }
}

fn repair_line(repair: RepairOutcome) -> String {
    match repair {
        RepairOutcome::AlreadyValid => "all valid".to_string(),
        RepairOutcome::Repaired { repaired } => format!("{repaired} repaired"),
        RepairOutcome::Excluded { repaired, excluded } => {
            format!("{repaired} repaired, {excluded} excluded")
        }
        RepairOutcome::Aborted { remaining } => format!("{remaining} still invalid"),
    }
}

fn clip_line(clip: ClipOutcome) -> String {
    match clip {
        ClipOutcome::NoBoundary => "no boundary loaded".to_string(),
        ClipOutcome::Clipped { removed } => format!("{removed} removed"),
    }
}
