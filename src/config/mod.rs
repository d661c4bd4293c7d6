//! Configuration system with YAML schema and validation.
//!
//! Type-safe configuration structs with compile-time validation via serde
//! and runtime semantic validation for the cross-field constraints the
//! schema cannot express.

use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

use crate::error::{SimError, SimResult};

/// Top-level simulation configuration.
///
/// Loaded from YAML files with full schema validation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Schema version for forward compatibility.
    #[validate(length(min = 1))]
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Scenario selected for the run.
    #[validate(length(min = 1))]
    #[serde(default = "default_scenario")]
    pub scenario: String,

    /// Perturbation parameter sweep.
    #[validate(nested)]
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Reproducibility settings.
    #[serde(default)]
    pub reproducibility: ReproducibilityConfig,

    /// Engine sizing.
    #[validate(nested)]
    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_scenario() -> String {
    "multiple-lanes".to_string()
}

impl SimConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - YAML parsing fails
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> SimResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails.
    pub fn from_yaml(yaml: &str) -> SimResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;

        config.validate()?;
        config.validate_semantic()?;

        Ok(config)
    }

    /// Create a builder for configuration.
    #[must_use]
    pub fn builder() -> SimConfigBuilder {
        SimConfigBuilder::default()
    }

    /// Validate semantic constraints beyond schema.
    ///
    /// The sweep arrays are deliberately not required to have equal
    /// lengths here: a chances array shorter than the offsets fails at
    /// sweep time with the index that had no partner.
    fn validate_semantic(&self) -> SimResult<()> {
        if self.sweep.sensor_perturbation_offsets.is_empty() {
            return Err(SimError::config(
                "sweep.sensor_perturbation_offsets must not be empty",
            ));
        }
        for &offset in &self.sweep.sensor_perturbation_offsets {
            if !offset.is_finite() {
                return Err(SimError::config(format!(
                    "sensor perturbation offset must be finite, got {offset}"
                )));
            }
        }
        for &chance in &self.sweep.invisibility_chances {
            if !(0.0..=1.0).contains(&chance) {
                return Err(SimError::config(format!(
                    "invisibility chance must be a probability in [0, 1], got {chance}"
                )));
            }
        }
        if self.simulation.evolution_sequence_size == 0 {
            return Err(SimError::config(
                "simulation.evolution_sequence_size must be at least 1",
            ));
        }
        if self.simulation.perturbation_scale == 0 {
            return Err(SimError::config(
                "simulation.perturbation_scale must be at least 1",
            ));
        }
        if self.simulation.steps_to_sample == 0 {
            return Err(SimError::config(
                "simulation.steps_to_sample must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            scenario: default_scenario(),
            sweep: SweepConfig::default(),
            reproducibility: ReproducibilityConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Configuration builder for programmatic construction.
#[derive(Debug, Default)]
pub struct SimConfigBuilder {
    seed: Option<u64>,
    scenario: Option<String>,
    offsets: Option<Vec<f64>>,
    chances: Option<Vec<f64>>,
}

impl SimConfigBuilder {
    /// Set the random seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the scenario name.
    #[must_use]
    pub fn scenario(mut self, name: impl Into<String>) -> Self {
        self.scenario = Some(name.into());
        self
    }

    /// Set the sensor perturbation offsets to sweep.
    #[must_use]
    pub fn sensor_perturbation_offsets(mut self, offsets: Vec<f64>) -> Self {
        self.offsets = Some(offsets);
        self
    }

    /// Set the invisibility chances to sweep.
    #[must_use]
    pub fn invisibility_chances(mut self, chances: Vec<f64>) -> Self {
        self.chances = Some(chances);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> SimConfig {
        let mut config = SimConfig::default();

        if let Some(seed) = self.seed {
            config.reproducibility.seed = seed;
        }
        if let Some(scenario) = self.scenario {
            config.scenario = scenario;
        }
        if let Some(offsets) = self.offsets {
            config.sweep.sensor_perturbation_offsets = offsets;
        }
        if let Some(chances) = self.chances {
            config.sweep.invisibility_chances = chances;
        }

        config
    }
}

/// Perturbation parameter sweep.
///
/// The two arrays are paired by index at sweep time.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    /// Relative sensor offsets, one scenario run per entry.
    #[serde(default = "default_offsets")]
    pub sensor_perturbation_offsets: Vec<f64>,
    /// Invisibility chances, paired with the offsets by index.
    #[serde(default = "default_chances")]
    pub invisibility_chances: Vec<f64>,
}

fn default_offsets() -> Vec<f64> {
    vec![0.25]
}

fn default_chances() -> Vec<f64> {
    vec![0.25]
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            sensor_perturbation_offsets: default_offsets(),
            invisibility_chances: default_chances(),
        }
    }
}

/// Reproducibility settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReproducibilityConfig {
    /// Master seed for all RNG.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

const fn default_seed() -> u64 {
    42
}

impl Default for ReproducibilityConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
        }
    }
}

/// Engine sizing.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SimulationConfig {
    /// Samples in the nominal evolution sequence.
    #[serde(default = "default_sequence_size")]
    pub evolution_sequence_size: usize,
    /// Perturbed samples per nominal sample.
    #[serde(default = "default_perturbation_scale")]
    pub perturbation_scale: usize,
    /// Steps over which distance series are reported.
    #[serde(default = "default_steps_to_sample")]
    pub steps_to_sample: usize,
}

const fn default_sequence_size() -> usize {
    20
}

const fn default_perturbation_scale() -> usize {
    20
}

const fn default_steps_to_sample() -> usize {
    30
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            evolution_sequence_size: default_sequence_size(),
            perturbation_scale: default_perturbation_scale(),
            steps_to_sample: default_steps_to_sample(),
        }
    }
}
