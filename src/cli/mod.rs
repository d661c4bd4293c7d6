//! CLI module for swerve.
//!
//! All CLI logic lives here rather than in main.rs so it can be covered
//! by tests. The entry point `run_cli` takes parsed arguments.

mod args;
mod commands;
mod output;

pub use args::{Args, Command};
pub use commands::run_cli;
pub use output::{print_help, print_sweep_reports, print_version};
