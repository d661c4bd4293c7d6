//! CLI argument parsing.
//!
//! Hand-rolled parser over `std::env::args`, extracted so that parsing
//! can be tested against arbitrary argument vectors.

use std::path::PathBuf;

/// CLI arguments container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Args {
    /// The command to execute.
    pub command: Command,
}

/// Available CLI commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the configured sweep
    Run {
        /// Optional path to a configuration YAML file; defaults apply
        /// when absent.
        config_path: Option<PathBuf>,
        /// Optional seed override.
        seed_override: Option<u64>,
        /// Optional scenario override.
        scenario_override: Option<String>,
        /// Enable verbose output.
        verbose: bool,
    },
    /// List the registered scenarios
    List,
    /// Show help
    Help,
    /// Show version
    Version,
}

impl Args {
    /// Parse command-line arguments from an iterator.
    ///
    /// Accepts any iterator of strings rather than only
    /// `std::env::args()`, which keeps the parser testable.
    #[must_use]
    pub fn parse_from<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self::parse_from_vec(&args)
    }

    /// Parse command-line arguments from the environment.
    #[must_use]
    pub fn parse() -> Self {
        Self::parse_from(std::env::args())
    }

    /// Internal parsing from a vector of strings.
    fn parse_from_vec(args: &[String]) -> Self {
        if args.len() < 2 {
            return Self {
                command: Command::Help,
            };
        }

        let command = match args[1].as_str() {
            "run" => Self::parse_run_command(args),
            "list" => Command::List,
            "-h" | "--help" | "help" => Command::Help,
            "-V" | "--version" | "version" => Command::Version,
            unknown => {
                eprintln!("Unknown command: {unknown}");
                Command::Help
            }
        };

        Self { command }
    }

    /// Parse the 'run' command arguments.
    ///
    /// The configuration path is the first non-flag argument after the
    /// command; everything else is flags.
    fn parse_run_command(args: &[String]) -> Command {
        let mut config_path = None;
        let mut seed_override = None;
        let mut scenario_override = None;
        let mut verbose = false;

        let mut i = 2;
        while i < args.len() {
            match args[i].as_str() {
                "--seed" => {
                    if i + 1 < args.len() {
                        if let Ok(seed) = args[i + 1].parse() {
                            seed_override = Some(seed);
                        }
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                "--scenario" => {
                    if i + 1 < args.len() {
                        scenario_override = Some(args[i + 1].clone());
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                "-v" | "--verbose" => {
                    verbose = true;
                    i += 1;
                }
                other => {
                    if config_path.is_none() && !other.starts_with('-') {
                        config_path = Some(PathBuf::from(other));
                    }
                    i += 1;
                }
            }
        }

        Command::Run {
            config_path,
            seed_override,
            scenario_override,
            verbose,
        }
    }
}
