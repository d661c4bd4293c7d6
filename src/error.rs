//! Error types for swerve.
//!
//! All library functions return `Result<T, SimError>` instead of panicking.
//! A sweep failure propagates to `main`, which prints the diagnostic and
//! exits with a non-zero status.

use thiserror::Error;

/// Result type alias for swerve operations.
pub type SimResult<T> = Result<T, SimError>;

/// Unified error type for all swerve operations.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid configuration parameter.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested scenario is not registered.
    #[error("Unknown scenario '{name}' (available: {available})")]
    UnknownScenario {
        /// Requested scenario name.
        name: String,
        /// Comma-separated list of registered scenarios.
        available: String,
    },

    /// The invisibility-chance array is shorter than the offsets array.
    ///
    /// The sweep pairs the two arrays by index; a missing chance at some
    /// index is reported instead of being silently skipped.
    #[error("Sweep parameter mismatch: no invisibility chance at index {index} (array has {len} entries)")]
    SweepIndexOutOfBounds {
        /// Offset index for which no chance exists.
        index: usize,
        /// Length of the chances array.
        len: usize,
    },

    /// Sample-set cardinalities do not admit a Wasserstein coupling.
    #[error("Incompatible sample sets: perturbed size {perturbed} is not a multiple of nominal size {nominal}")]
    IncompatibleSampleSets {
        /// Number of samples in the nominal set.
        nominal: usize,
        /// Number of samples in the perturbed set.
        perturbed: usize,
    },

    /// A distance was requested over an empty sample set.
    #[error("Empty sample set at step {step}")]
    EmptySampleSet {
        /// Evolution-sequence step.
        step: usize,
    },

    /// A controller referenced a name missing from its registry.
    #[error("Unknown controller '{name}'")]
    UnknownController {
        /// Referenced controller name.
        name: String,
    },

    /// A distance-expression window is degenerate.
    #[error("Invalid step interval [{from}, {to})")]
    InvalidInterval {
        /// First step of the window.
        from: usize,
        /// One past the last step of the window.
        to: usize,
    },
}

impl SimError {
    /// Create a configuration error with a message.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an unknown-scenario error from the requested name and the
    /// registered names.
    #[must_use]
    pub fn unknown_scenario(name: impl Into<String>, names: &[&str]) -> Self {
        Self::UnknownScenario {
            name: name.into(),
            available: names.join(", "),
        }
    }
}
