//! swerve CLI - Scenario Robustness Evaluation
//!
//! Command-line interface for running perturbation sweeps over driving
//! scenarios.

use std::process::ExitCode;

use swerve::cli::{run_cli, Args};

fn main() -> ExitCode {
    run_cli(Args::parse())
}
