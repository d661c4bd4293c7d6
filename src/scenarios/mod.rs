//! Driving scenarios and the parameter sweep.
//!
//! Each scenario wires a population of vehicles, a controller for one of
//! them, and a set of perturbations into the engine, then reports how far
//! the perturbed behaviour drifts from the nominal one. Scenarios are
//! registered by name and selected through the configuration; the sweep
//! pairs the sensor-offset and invisibility-chance arrays by index and
//! runs one scenario instance per pair.

use indexmap::IndexMap;

use crate::config::SimConfig;
use crate::engine::rng::SimRng;
use crate::error::{SimError, SimResult};

pub mod multi_lane;
pub mod single_lane;
pub mod three_cars;
pub mod two_lanes;

pub use multi_lane::MultipleLanes;
pub use single_lane::SingleLaneTwoCars;
pub use three_cars::OneLaneThreeCars;
pub use two_lanes::TwoLanesTwoCars;

/// Controller intention: accelerate.
pub const FASTER: f64 = 1.0;
/// Controller intention: brake.
pub const SLOWER: f64 = -1.0;
/// Controller intention: hold speed.
pub const IDLE: f64 = 0.0;

/// Physical limits shared by the vehicles of a scenario.
#[derive(Debug, Clone, Copy)]
pub struct VehicleLimits {
    /// Reaction time of the rear vehicle, in steps.
    pub response_time: f64,
    /// Vehicle length, in meters.
    pub vehicle_length: f64,
    /// Speed ceiling.
    pub max_speed: f64,
    /// Largest forward acceleration.
    pub max_acceleration: f64,
    /// Largest braking deceleration.
    pub max_brake: f64,
    /// Guaranteed braking deceleration.
    pub min_brake: f64,
}

impl VehicleLimits {
    /// Limits used by all built-in scenarios.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            response_time: 1.0,
            vehicle_length: 5.0,
            max_speed: 40.0,
            max_acceleration: 5.0,
            max_brake: 5.0,
            min_brake: 3.0,
        }
    }

    /// Safety distance of the Responsibility-Sensitive Safety model.
    ///
    /// Shalev-Shwartz, Shammah, Shashua: "On a formal model of safe and
    /// scalable self-driving cars", arXiv:1708.06374. The vehicle length
    /// is added so that a zero gap means touching bumpers.
    #[must_use]
    pub fn rss_safety_distance(&self, rear_speed: f64, front_speed: f64) -> f64 {
        let d1 = self.response_time * rear_speed;
        let d2 = 0.5 * self.max_acceleration * self.response_time * self.response_time;
        let d3 = (rear_speed + self.response_time * self.max_acceleration).powi(2)
            / (2.0 * self.min_brake);
        let d4 = -(front_speed * front_speed) / (2.0 * self.max_brake);
        (d1 + d2 + d3 + d4).max(0.0) + self.vehicle_length
    }

    /// Clamp a speed into `[0, max_speed]`.
    #[must_use]
    pub fn clamp_speed(&self, speed: f64) -> f64 {
        speed.clamp(0.0, self.max_speed)
    }
}

/// Perturbation intensities swept over by the entry point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioParams {
    /// Relative offset applied to perceived positions and speeds.
    pub sensor_offset: f64,
    /// Probability that an observed car vanishes from the sensors.
    pub invisibility_chance: f64,
}

/// Engine sizing shared by all scenarios of a run.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    /// Samples in the nominal evolution sequence.
    pub evolution_sequence_size: usize,
    /// Perturbed samples per nominal sample.
    pub perturbation_scale: usize,
    /// Steps over which distance series are reported.
    pub steps_to_sample: usize,
}

impl From<&SimConfig> for RunSettings {
    fn from(config: &SimConfig) -> Self {
        Self {
            evolution_sequence_size: config.simulation.evolution_sequence_size,
            perturbation_scale: config.simulation.perturbation_scale,
            steps_to_sample: config.simulation.steps_to_sample,
        }
    }
}

/// Distances between the nominal and one perturbed sequence, one value
/// per step.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceSeries {
    /// What the series measures, e.g. `"crash / sensor"`.
    pub label: String,
    /// Distance at each sampled step.
    pub values: Vec<f64>,
}

impl DistanceSeries {
    /// Largest distance of the series.
    #[must_use]
    pub fn peak(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }
}

/// Verdict of a robustness formula.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaVerdict {
    /// Formula description.
    pub label: String,
    /// Whether the formula holds.
    pub satisfied: bool,
}

/// Outcome of one scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    /// Scenario name.
    pub scenario: String,
    /// Parameters the scenario ran with.
    pub params: ScenarioParams,
    /// Distance series per perturbation and penalty.
    pub series: Vec<DistanceSeries>,
    /// Robustness verdicts.
    pub verdicts: Vec<FormulaVerdict>,
}

/// A runnable driving scenario.
pub trait Scenario {
    /// Registered name of the scenario.
    fn name(&self) -> &'static str;

    /// Run the scenario and report distances and verdicts.
    ///
    /// # Errors
    ///
    /// Propagates engine failures.
    fn run(&mut self, settings: &RunSettings, rng: SimRng) -> SimResult<ScenarioReport>;
}

impl std::fmt::Debug for dyn Scenario + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario").field("name", &self.name()).finish()
    }
}

type ScenarioBuilder = Box<dyn Fn(ScenarioParams) -> Box<dyn Scenario> + Send + Sync>;

/// Named scenario constructors.
///
/// Insertion order is preserved so listings are stable.
pub struct ScenarioRegistry {
    builders: IndexMap<String, ScenarioBuilder>,
}

impl ScenarioRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builders: IndexMap::new(),
        }
    }

    /// Registry holding every built-in scenario.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("single-lane-two-cars", |params| {
            Box::new(SingleLaneTwoCars::new(params))
        });
        registry.register("one-lane-three-cars", |params| {
            Box::new(OneLaneThreeCars::new(params))
        });
        registry.register("two-lanes-two-cars", |params| {
            Box::new(TwoLanesTwoCars::new(params))
        });
        registry.register("multiple-lanes", |params| {
            Box::new(MultipleLanes::new(params))
        });
        registry
    }

    /// Register a scenario constructor under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        builder: impl Fn(ScenarioParams) -> Box<dyn Scenario> + Send + Sync + 'static,
    ) {
        self.builders.insert(name.into(), Box::new(builder));
    }

    /// Registered names in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    /// Build the scenario registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownScenario`] listing the registered
    /// names.
    pub fn build(&self, name: &str, params: ScenarioParams) -> SimResult<Box<dyn Scenario>> {
        self.builders.get(name).map_or_else(
            || Err(SimError::unknown_scenario(name, &self.names())),
            |builder| Ok(builder(params)),
        )
    }
}

impl Default for ScenarioRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Run the configured scenario once per sweep pair.
///
/// The offset and chance arrays are paired by index: entry `i` of the
/// offsets is matched with entry `i` of the chances. A chances array
/// longer than the offsets is permitted (the excess is ignored); a
/// shorter one fails with [`SimError::SweepIndexOutOfBounds`] at the
/// first missing index. Each iteration draws an independent RNG stream
/// from the master seed, so reports do not depend on how many pairs ran
/// before them.
///
/// # Errors
///
/// Fails on unknown scenario names, mismatched sweep arrays, and engine
/// failures; the first error aborts the remaining iterations.
pub fn run_sweep(
    config: &SimConfig,
    registry: &ScenarioRegistry,
) -> SimResult<Vec<ScenarioReport>> {
    let settings = RunSettings::from(config);
    let mut master = SimRng::new(config.reproducibility.seed);
    let offsets = &config.sweep.sensor_perturbation_offsets;
    let chances = &config.sweep.invisibility_chances;

    let mut reports = Vec::with_capacity(offsets.len());
    for (i, &sensor_offset) in offsets.iter().enumerate() {
        let invisibility_chance =
            *chances
                .get(i)
                .ok_or_else(|| SimError::SweepIndexOutOfBounds {
                    index: i,
                    len: chances.len(),
                })?;
        let params = ScenarioParams {
            sensor_offset,
            invisibility_chance,
        };
        let mut scenario = registry.build(&config.scenario, params)?;
        let rng = master.fork();
        reports.push(scenario.run(&settings, rng)?);
    }
    Ok(reports)
}
