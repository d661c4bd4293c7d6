//! Two cars on a single lane.
//!
//! Car 1 follows car 2 and is the only controlled vehicle: its controller
//! compares the current distance with the RSS safety gap and requests
//! FASTER, SLOWER, or IDLE. Two erratic front-driver perturbations are
//! evaluated: a drunk driver with random acceleration and a brake checker
//! slamming the brakes.

use std::sync::Arc;

use crate::engine::controller::{Controller, ControllerRegistry};
use crate::engine::distance::{AtomicDistance, DistanceExpression, MaxIntervalDistance};
use crate::engine::ds::{penalty, DataState, DataStateFn, DataStateUpdate};
use crate::engine::perturbation::Perturbation;
use crate::engine::rng::SimRng;
use crate::engine::robustness::{AtomicRobustnessFormula, RelationOperator};
use crate::engine::sequence::EvolutionSequence;
use crate::engine::system::ControlledSystem;
use crate::error::SimResult;
use crate::scenarios::{
    DistanceSeries, FormulaVerdict, RunSettings, Scenario, ScenarioParams, ScenarioReport,
    VehicleLimits, FASTER, IDLE, SLOWER,
};

const SPEED_V1: usize = 0;
const SAFETY_GAP: usize = 1;
const ACCEL_V1: usize = 2;
const DISTANCE: usize = 3;
const SPEED_V2: usize = 4;
const ACCEL_V2: usize = 5;
const INTENTION: usize = 6;
const PERTURBATION_APPLIED: usize = 7;
const NUMBER_OF_VARIABLES: usize = 8;

const MAX_ACCEL_OFFSET: f64 = 5.0;
const IDLE_DELTA: f64 = 1.0;
const INIT_SPEED_V1: f64 = 0.0;
const INIT_ACCEL_V1: f64 = 0.0;
const INIT_SPEED_V2: f64 = 0.0;
const INIT_ACCEL_V2: f64 = 1.0;
const INIT_DISTANCE_V1_V2: f64 = 100.0;

const STARTING_STEP: usize = 4;
const FREQUENCY: usize = 2;
const TIMES_TO_APPLY: usize = 20;
const BRAKE_CHECK_CHANCE: f64 = 0.8;
const ETA_CRASH: f64 = 0.3;
const ETA_SAFETY_GAP_VIOLATION: f64 = 0.2;

const LIMITS: VehicleLimits = VehicleLimits::standard();

/// The single-lane follower scenario.
///
/// The sweep parameters do not enter this scenario; its perturbations
/// model erratic front drivers rather than sensor faults.
pub struct SingleLaneTwoCars {
    params: ScenarioParams,
}

impl SingleLaneTwoCars {
    /// Build the scenario.
    #[must_use]
    pub const fn new(params: ScenarioParams) -> Self {
        Self { params }
    }

    fn initial_state() -> DataState {
        let initial_gap = LIMITS.rss_safety_distance(INIT_SPEED_V1, INIT_SPEED_V2);
        DataState::with_init(NUMBER_OF_VARIABLES, |i| match i {
            SPEED_V1 => INIT_SPEED_V1,
            SAFETY_GAP => initial_gap,
            ACCEL_V1 => INIT_ACCEL_V1,
            DISTANCE => INIT_DISTANCE_V1_V2,
            SPEED_V2 => INIT_SPEED_V2,
            ACCEL_V2 => INIT_ACCEL_V2,
            INTENTION | PERTURBATION_APPLIED => 0.0,
            _ => f64::NAN,
        })
    }

    fn controller() -> (ControllerRegistry, Controller) {
        let mut registry = ControllerRegistry::new();
        let intend = |value: f64| {
            Controller::do_action(
                move |_rng, _ds: &DataState| vec![DataStateUpdate::new(INTENTION, value)],
                Controller::exec("Control"),
            )
        };
        registry.set(
            "Control",
            Controller::if_then_else(
                |_rng, ds: &DataState| (ds.get(DISTANCE) - ds.get(SAFETY_GAP)).abs() < f64::EPSILON,
                intend(IDLE),
                Controller::if_then_else(
                    |_rng, ds: &DataState| ds.get(DISTANCE) > ds.get(SAFETY_GAP),
                    intend(FASTER),
                    intend(SLOWER),
                ),
            ),
        );
        (registry, Controller::exec("Control"))
    }

    fn environment_updates(rng: &mut SimRng, state: &DataState) -> Vec<DataStateUpdate> {
        let mut updates = Vec::new();
        let intent = state.get(INTENTION);
        let new_accel_v1 = if (intent - FASTER).abs() < f64::EPSILON {
            rng.gen_range_f64(
                LIMITS.max_acceleration - MAX_ACCEL_OFFSET,
                LIMITS.max_acceleration,
            )
        } else if (intent - SLOWER).abs() < f64::EPSILON {
            -rng.gen_range_f64(LIMITS.min_brake, LIMITS.max_brake)
        } else {
            rng.gen_range_f64(-IDLE_DELTA, IDLE_DELTA)
        };
        updates.push(DataStateUpdate::new(ACCEL_V1, new_accel_v1));
        updates.push(DataStateUpdate::new(ACCEL_V2, INIT_ACCEL_V2));
        include_physics_updates(state, &mut updates);
        updates.push(DataStateUpdate::new(PERTURBATION_APPLIED, 0.0));
        updates
    }

    fn system() -> ControlledSystem {
        let (registry, controller) = Self::controller();
        let env: Arc<DataStateFn> = Arc::new(|rng: &mut SimRng, ds: &DataState| {
            ds.apply(&Self::environment_updates(rng, ds))
        });
        ControlledSystem::new(Arc::new(registry), controller, env, Self::initial_state())
    }

    fn drunk_driver_perturbation() -> Perturbation {
        Perturbation::iterative(
            TIMES_TO_APPLY,
            Perturbation::atomic(
                FREQUENCY,
                Arc::new(|rng: &mut SimRng, state: &DataState| {
                    let mut updates = vec![DataStateUpdate::new(PERTURBATION_APPLIED, 1.0)];
                    let perturbed_accel =
                        rng.gen_range_f64(-LIMITS.max_brake, LIMITS.max_acceleration);
                    updates.push(DataStateUpdate::new(ACCEL_V2, perturbed_accel));
                    include_physics_updates(state, &mut updates);
                    state.apply(&updates)
                }),
            ),
        )
    }

    fn brake_check_perturbation() -> Perturbation {
        Perturbation::iterative(
            TIMES_TO_APPLY,
            Perturbation::atomic(
                FREQUENCY,
                Arc::new(|rng: &mut SimRng, state: &DataState| {
                    if !rng.gen_bool(BRAKE_CHECK_CHANCE) {
                        return state.clone();
                    }
                    let mut updates = vec![
                        DataStateUpdate::new(PERTURBATION_APPLIED, 1.0),
                        DataStateUpdate::new(ACCEL_V2, -LIMITS.max_brake),
                    ];
                    include_physics_updates(state, &mut updates);
                    state.apply(&updates)
                }),
            ),
        )
    }

    fn crash_formula(perturbation: Perturbation) -> SimResult<AtomicRobustnessFormula> {
        let inner = AtomicDistance::leq(penalty(|ds| if ds.get(DISTANCE) > 0.0 { 0.0 } else { 1.0 }));
        let window = MaxIntervalDistance::new(
            inner,
            STARTING_STEP,
            STARTING_STEP + TIMES_TO_APPLY * FREQUENCY,
        )?;
        Ok(AtomicRobustnessFormula::new(
            perturbation,
            window,
            RelationOperator::LessOrEqual,
            ETA_CRASH,
        ))
    }

    fn safety_gap_formula(perturbation: Perturbation) -> SimResult<AtomicRobustnessFormula> {
        let inner = AtomicDistance::leq(penalty(|ds| {
            if ds.get(DISTANCE) > ds.get(SAFETY_GAP) {
                0.0
            } else {
                1.0
            }
        }));
        let window = MaxIntervalDistance::new(
            inner,
            STARTING_STEP,
            STARTING_STEP + TIMES_TO_APPLY * FREQUENCY,
        )?;
        Ok(AtomicRobustnessFormula::new(
            perturbation,
            window,
            RelationOperator::LessOrEqual,
            ETA_SAFETY_GAP_VIOLATION,
        ))
    }
}

fn include_physics_updates(state: &DataState, updates: &mut Vec<DataStateUpdate>) {
    let a_v1 = state.get(ACCEL_V1);
    let s_v1 = state.get(SPEED_V1);
    let travel_v1 = a_v1 / 2.0 + s_v1;
    updates.push(DataStateUpdate::new(
        SPEED_V1,
        LIMITS.clamp_speed(s_v1 + a_v1),
    ));

    let a_v2 = state.get(ACCEL_V2);
    let s_v2 = state.get(SPEED_V2);
    let travel_v2 = a_v2 / 2.0 + s_v2;
    updates.push(DataStateUpdate::new(
        SPEED_V2,
        LIMITS.clamp_speed(s_v2 + a_v2),
    ));

    updates.push(DataStateUpdate::new(
        DISTANCE,
        state.get(DISTANCE) - travel_v1 + travel_v2,
    ));
    updates.push(DataStateUpdate::new(
        SAFETY_GAP,
        LIMITS.rss_safety_distance(s_v1, s_v2),
    ));
}

impl Scenario for SingleLaneTwoCars {
    fn name(&self) -> &'static str {
        "single-lane-two-cars"
    }

    fn run(&mut self, settings: &RunSettings, rng: SimRng) -> SimResult<ScenarioReport> {
        let system = Self::system();
        let mut sequence = EvolutionSequence::new(rng, &system, settings.evolution_sequence_size);

        let crash_penalty = penalty(|ds| if ds.get(DISTANCE) > 0.0 { 0.0 } else { 1.0 });
        let gap_penalty = penalty(|ds| {
            if ds.get(DISTANCE) > ds.get(SAFETY_GAP) {
                0.0
            } else {
                1.0
            }
        });

        let mut series = Vec::new();
        for (tag, perturbation) in [
            ("drunk-driver", Self::drunk_driver_perturbation()),
            ("brake-check", Self::brake_check_perturbation()),
        ] {
            let mut perturbed = sequence.apply(
                perturbation,
                STARTING_STEP,
                settings.perturbation_scale,
            )?;
            let crash_expr = AtomicDistance::leq(Arc::clone(&crash_penalty));
            let gap_expr = AtomicDistance::leq(Arc::clone(&gap_penalty));
            series.push(DistanceSeries {
                label: format!("crash / {tag}"),
                values: crash_expr.compute_range(
                    0,
                    settings.steps_to_sample,
                    &mut sequence,
                    &mut perturbed,
                )?,
            });
            series.push(DistanceSeries {
                label: format!("safety-gap / {tag}"),
                values: gap_expr.compute_range(
                    0,
                    settings.steps_to_sample,
                    &mut sequence,
                    &mut perturbed,
                )?,
            });
        }

        let mut verdicts = Vec::new();
        for (tag, perturbation) in [
            ("drunk-driver", Self::drunk_driver_perturbation()),
            ("brake-check", Self::brake_check_perturbation()),
        ] {
            let crash = Self::crash_formula(perturbation.clone())?;
            let gap = Self::safety_gap_formula(perturbation)?;
            verdicts.push(FormulaVerdict {
                label: format!("crash risk <= {ETA_CRASH} / {tag}"),
                satisfied: crash.eval(settings.perturbation_scale, 0, &mut sequence)?,
            });
            verdicts.push(FormulaVerdict {
                label: format!("safety-gap risk <= {ETA_SAFETY_GAP_VIOLATION} / {tag}"),
                satisfied: gap.eval(settings.perturbation_scale, 0, &mut sequence)?,
            });
        }

        Ok(ScenarioReport {
            scenario: self.name().to_string(),
            params: self.params,
            series,
            verdicts,
        })
    }
}
