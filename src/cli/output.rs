//! CLI output formatting.
//!
//! Rendering of sweep reports, help, and version banners, extracted so
//! that output generation is testable.

use crate::scenarios::ScenarioReport;

/// Print version information.
pub fn print_version() {
    println!("swerve {}", env!("CARGO_PKG_VERSION"));
}

/// Print help message.
pub fn print_help() {
    println!(
        r"swerve - Statistical Robustness Evaluation of Driving Scenarios

USAGE:
    swerve <COMMAND> [OPTIONS]

COMMANDS:
    run [config.yaml]           Run the configured perturbation sweep
        --seed <N>              Override the configured seed
        --scenario <NAME>       Override the configured scenario
        -v, --verbose           Print full distance series

    list                        List available scenarios

    help                        Show this help message
    version                     Show version information

EXAMPLES:
    swerve run
    swerve run sweep.yaml --seed 12345
    swerve run --scenario single-lane-two-cars -v
    swerve list

The sweep pairs the configured sensor-offset and invisibility-chance
arrays by index and runs the selected scenario once per pair. Each run
reports the distance between nominal and perturbed behaviour per step,
together with the robustness formula verdicts.
"
    );
}

/// Print the reports of a sweep run.
///
/// # Arguments
///
/// * `reports` - One report per sweep pair
/// * `verbose` - Whether to print every distance value
pub fn print_sweep_reports(reports: &[ScenarioReport], verbose: bool) {
    for (i, report) in reports.iter().enumerate() {
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!("Run {}: {}", i + 1, report.scenario);
        println!(
            "Sensor offset: {}  Invisibility chance: {}",
            report.params.sensor_offset, report.params.invisibility_chance
        );
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

        if !report.series.is_empty() {
            println!("Distance series:");
            for series in &report.series {
                println!("  {:<28} peak {:.6}", series.label, series.peak());
                if verbose {
                    for (step, value) in series.values.iter().enumerate() {
                        println!("      step {step:>3}: {value:.6}");
                    }
                }
            }
        }

        if !report.verdicts.is_empty() {
            println!("\nRobustness formulas:");
            for verdict in &report.verdicts {
                let sym = if verdict.satisfied { "✓" } else { "✗" };
                println!("  {sym} {}", verdict.label);
            }
        }
        println!();
    }

    let satisfied = reports
        .iter()
        .flat_map(|r| &r.verdicts)
        .filter(|v| v.satisfied)
        .count();
    let total = reports.iter().map(|r| r.verdicts.len()).sum::<usize>();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Formulas satisfied: {satisfied}/{total}");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}
