//! CLI command handlers.
//!
//! Execution logic for each CLI command, extracted from main.rs so that
//! command behavior is testable.

use std::path::Path;
use std::process::ExitCode;

use crate::config::SimConfig;
use crate::scenarios::{run_sweep, ScenarioRegistry};

use super::output::{print_help, print_sweep_reports, print_version};
use super::{Args, Command};

/// Main CLI entry point.
///
/// Dispatches to the appropriate command handler based on parsed arguments.
#[must_use]
pub fn run_cli(args: Args) -> ExitCode {
    match args.command {
        Command::Run {
            config_path,
            seed_override,
            scenario_override,
            verbose,
        } => run_scenarios(
            config_path.as_deref(),
            seed_override,
            scenario_override.as_deref(),
            verbose,
        ),
        Command::List => list_scenarios(),
        Command::Help => {
            print_help();
            ExitCode::SUCCESS
        }
        Command::Version => {
            print_version();
            ExitCode::SUCCESS
        }
    }
}

/// Run the configured sweep, optionally from a YAML file.
///
/// # Arguments
///
/// * `path` - Optional path to a configuration YAML file
/// * `seed_override` - Optional seed replacing the configured one
/// * `scenario_override` - Optional scenario replacing the configured one
/// * `verbose` - Whether to print full distance series
#[must_use]
pub fn run_scenarios(
    path: Option<&Path>,
    seed_override: Option<u64>,
    scenario_override: Option<&str>,
    verbose: bool,
) -> ExitCode {
    println!("╔═══════════════════════════════════════════════════════════════╗");
    println!("║           swerve - Scenario Robustness Evaluation             ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    let mut config = match path {
        Some(path) => match SimConfig::load(path) {
            Ok(config) => {
                println!("Configuration: {}\n", path.display());
                config
            }
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::from(1);
            }
        },
        None => SimConfig::default(),
    };

    if let Some(seed) = seed_override {
        config.reproducibility.seed = seed;
    }
    if let Some(scenario) = scenario_override {
        config.scenario = scenario.to_string();
    }

    println!("Scenario: {}", config.scenario);
    println!("Seed:     {}", config.reproducibility.seed);
    println!(
        "Sweep:    {} pair(s)\n",
        config.sweep.sensor_perturbation_offsets.len()
    );

    let registry = ScenarioRegistry::with_builtins();
    match run_sweep(&config, &registry) {
        Ok(reports) => {
            print_sweep_reports(&reports, verbose);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// List every registered scenario.
#[must_use]
pub fn list_scenarios() -> ExitCode {
    let registry = ScenarioRegistry::with_builtins();
    println!("Available scenarios:\n");
    for name in registry.names() {
        println!("  - {name}");
    }
    println!("\nUsage: swerve run [config.yaml] --scenario <name>");
    ExitCode::SUCCESS
}
