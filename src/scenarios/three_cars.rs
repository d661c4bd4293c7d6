//! Three cars on a single lane.
//!
//! The middle car is controlled and must keep the RSS safety gap towards
//! both neighbours; the outer cars accelerate on their own. The
//! perturbations make an uncontrolled driver erratic (drunk driver) or
//! let the front car brake-check.

use std::sync::Arc;

use crate::engine::controller::{Controller, ControllerRegistry};
use crate::engine::distance::{AtomicDistance, DistanceExpression, GroundDistance, MaxIntervalDistance};
use crate::engine::ds::{penalty, DataState, DataStateFn, DataStateUpdate, PenaltyFn};
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

const NUMBER_OF_VEHICLES: usize = 3;
const CONTROLLED_VEHICLE: usize = 1;

// Variable layout: intention, then per-vehicle speeds and accelerations,
// then the gaps between consecutive vehicles.
const INTENTION: usize = 0;
const SPEED: [usize; 3] = [1, 2, 3];
const SAFETY_GAP: [usize; 2] = [4, 5];
const ACCEL: [usize; 3] = [6, 7, 8];
const DISTANCE: [usize; 2] = [9, 10];
const NUMBER_OF_VARIABLES: usize = 11;

const MAX_ACCEL_OFFSET: f64 = 1.0;
const IDLE_DELTA: f64 = 1.0;
const INIT_SPEED: [f64; 3] = [0.0, 0.0, 0.0];
const INIT_ACCEL: [f64; 3] = [1.0, 1.0, 1.0];
const INIT_DISTANCE_BETWEEN: [f64; 2] = [300.0, 300.0];

const STARTING_STEP: usize = 0;
const FREQUENCY: usize = 2;
const TIMES_TO_APPLY: usize = 100;
const DRUNK_DRIVER_CHANCE: f64 = 0.2;
const BRAKE_CHECK_CHANCE: f64 = 0.2;
const ETA_CRASH: f64 = 0.01;
const ETA_SAFETY_GAP_VIOLATION: f64 = 0.5;

const LIMITS: VehicleLimits = VehicleLimits::standard();

/// The three-car platoon scenario.
///
/// The sweep parameters do not enter this scenario; its perturbations are
/// driver faults with fixed probabilities.
pub struct OneLaneThreeCars {
    params: ScenarioParams,
}

impl OneLaneThreeCars {
    /// Build the scenario.
    #[must_use]
    pub const fn new(params: ScenarioParams) -> Self {
        Self { params }
    }

    fn initial_state() -> DataState {
        DataState::with_init(NUMBER_OF_VARIABLES, |i| {
            if i == INTENTION {
                return IDLE;
            }
            for v in 0..NUMBER_OF_VEHICLES {
                if i == SPEED[v] {
                    return INIT_SPEED[v];
                }
                if i == ACCEL[v] {
                    return INIT_ACCEL[v];
                }
            }
            for g in 0..NUMBER_OF_VEHICLES - 1 {
                if i == DISTANCE[g] {
                    return INIT_DISTANCE_BETWEEN[g];
                }
                if i == SAFETY_GAP[g] {
                    return LIMITS.rss_safety_distance(INIT_SPEED[g], INIT_SPEED[g + 1]);
                }
            }
            f64::NAN
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

        let front_violated = |ds: &DataState| {
            ds.get(DISTANCE[CONTROLLED_VEHICLE]) < ds.get(SAFETY_GAP[CONTROLLED_VEHICLE])
        };
        let back_violated = |ds: &DataState| {
            ds.get(DISTANCE[CONTROLLED_VEHICLE - 1]) < ds.get(SAFETY_GAP[CONTROLLED_VEHICLE - 1])
        };

        registry.set(
            "Control",
            Controller::if_then_else(
                |_rng, ds: &DataState| {
                    (ds.get(DISTANCE[CONTROLLED_VEHICLE - 1])
                        - ds.get(SAFETY_GAP[CONTROLLED_VEHICLE - 1]))
                    .abs()
                        < f64::EPSILON
                        && (ds.get(DISTANCE[CONTROLLED_VEHICLE])
                            - ds.get(SAFETY_GAP[CONTROLLED_VEHICLE]))
                        .abs()
                            < f64::EPSILON
                },
                intend(IDLE),
                Controller::if_then_else(
                    move |_rng, ds: &DataState| front_violated(ds) && back_violated(ds),
                    // Both gaps violated: yield towards the larger one.
                    Controller::if_then_else(
                        |_rng, ds: &DataState| {
                            ds.get(DISTANCE[CONTROLLED_VEHICLE])
                                > ds.get(DISTANCE[CONTROLLED_VEHICLE - 1])
                        },
                        intend(SLOWER),
                        intend(FASTER),
                    ),
                    Controller::if_then_else(
                        move |_rng, ds: &DataState| front_violated(ds),
                        intend(SLOWER),
                        intend(FASTER),
                    ),
                ),
            ),
        );
        (registry, Controller::exec("Control"))
    }

    fn environment_updates(rng: &mut SimRng, state: &DataState) -> Vec<DataStateUpdate> {
        let mut updates = Vec::new();
        let intent = state.get(INTENTION);
        let new_accel = if (intent - FASTER).abs() < f64::EPSILON {
            rng.gen_range_f64(
                LIMITS.max_acceleration - MAX_ACCEL_OFFSET,
                LIMITS.max_acceleration,
            )
        } else if (intent - SLOWER).abs() < f64::EPSILON {
            -rng.gen_range_f64(LIMITS.min_brake, LIMITS.max_brake)
        } else {
            rng.gen_range_f64(-IDLE_DELTA, IDLE_DELTA)
        };
        updates.push(DataStateUpdate::new(ACCEL[CONTROLLED_VEHICLE], new_accel));
        for i in 0..NUMBER_OF_VEHICLES {
            if i != CONTROLLED_VEHICLE {
                let accel = rng.gen_range_f64(
                    LIMITS.max_acceleration - MAX_ACCEL_OFFSET,
                    LIMITS.max_acceleration,
                );
                updates.push(DataStateUpdate::new(ACCEL[i], accel));
            }
        }
        include_physics_updates(state, &mut updates);
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
                    let mut updates = Vec::new();
                    for i in 0..NUMBER_OF_VEHICLES {
                        if i != CONTROLLED_VEHICLE && rng.gen_bool(DRUNK_DRIVER_CHANCE) {
                            let accel =
                                rng.gen_range_f64(-LIMITS.max_brake, LIMITS.max_acceleration);
                            updates.push(DataStateUpdate::new(ACCEL[i], accel));
                        }
                    }
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
                    let mut updates = Vec::new();
                    if rng.gen_bool(BRAKE_CHECK_CHANCE) {
                        updates.push(DataStateUpdate::new(ACCEL[2], -LIMITS.max_brake));
                    }
                    include_physics_updates(state, &mut updates);
                    state.apply(&updates)
                }),
            ),
        )
    }

    fn crash_penalty() -> Arc<PenaltyFn> {
        penalty(|ds| {
            if ds.get(DISTANCE[CONTROLLED_VEHICLE]) > 0.0
                || ds.get(DISTANCE[CONTROLLED_VEHICLE - 1]) > 0.0
            {
                0.0
            } else {
                1.0
            }
        })
    }

    /// Penalty in `[0, 1]` proportional to how deeply a gap is violated.
    fn safety_gap_entity_penalty() -> Arc<PenaltyFn> {
        penalty(|ds| {
            let front_ok =
                ds.get(DISTANCE[CONTROLLED_VEHICLE]) > ds.get(SAFETY_GAP[CONTROLLED_VEHICLE]);
            let back_ok = ds.get(DISTANCE[CONTROLLED_VEHICLE - 1])
                > ds.get(SAFETY_GAP[CONTROLLED_VEHICLE - 1]);
            if front_ok && back_ok {
                return 0.0;
            }
            let front_ratio = (ds.get(SAFETY_GAP[CONTROLLED_VEHICLE])
                - ds.get(DISTANCE[CONTROLLED_VEHICLE]))
                / ds.get(SAFETY_GAP[CONTROLLED_VEHICLE]);
            let back_ratio = (ds.get(SAFETY_GAP[CONTROLLED_VEHICLE - 1])
                - ds.get(DISTANCE[CONTROLLED_VEHICLE - 1]))
                / ds.get(SAFETY_GAP[CONTROLLED_VEHICLE - 1]);
            front_ratio.max(back_ratio).clamp(0.0, 1.0)
        })
    }

    fn crash_formula(perturbation: Perturbation) -> SimResult<AtomicRobustnessFormula> {
        let inner = AtomicDistance::new(Self::crash_penalty(), GroundDistance::Abs);
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
}

fn include_physics_updates(state: &DataState, updates: &mut Vec<DataStateUpdate>) {
    let mut accel_back = state.get(ACCEL[0]);
    let mut speed_back = state.get(SPEED[0]);
    updates.push(DataStateUpdate::new(
        SPEED[0],
        LIMITS.clamp_speed(speed_back + accel_back),
    ));
    for i in 0..NUMBER_OF_VEHICLES - 1 {
        let accel_front = state.get(ACCEL[i + 1]);
        let speed_front = state.get(SPEED[i + 1]);
        let new_speed_back = LIMITS.clamp_speed(speed_back + accel_back);
        let new_speed_front = LIMITS.clamp_speed(speed_front + accel_front);
        updates.push(DataStateUpdate::new(SPEED[i + 1], new_speed_front));

        let travel_back = accel_back / 2.0 + speed_back;
        let travel_front = accel_front / 2.0 + speed_front;
        updates.push(DataStateUpdate::new(
            DISTANCE[i],
            state.get(DISTANCE[i]) + travel_front - travel_back,
        ));
        updates.push(DataStateUpdate::new(
            SAFETY_GAP[i],
            LIMITS.rss_safety_distance(new_speed_back, new_speed_front),
        ));

        accel_back = accel_front;
        speed_back = speed_front;
    }
}

impl Scenario for OneLaneThreeCars {
    fn name(&self) -> &'static str {
        "one-lane-three-cars"
    }

    fn run(&mut self, settings: &RunSettings, rng: SimRng) -> SimResult<ScenarioReport> {
        let system = Self::system();
        let mut sequence = EvolutionSequence::new(rng, &system, settings.evolution_sequence_size);

        let mut series = Vec::new();
        let mut verdicts = Vec::new();
        for (tag, perturbation) in [
            ("drunk-driver", Self::drunk_driver_perturbation()),
            ("brake-check", Self::brake_check_perturbation()),
        ] {
            let mut perturbed = sequence.apply(
                perturbation.clone(),
                STARTING_STEP,
                settings.perturbation_scale,
            )?;
            let gap_expr = AtomicDistance::leq(Self::safety_gap_entity_penalty());
            series.push(DistanceSeries {
                label: format!("safety-gap / {tag}"),
                values: gap_expr.compute_range(
                    0,
                    settings.steps_to_sample,
                    &mut sequence,
                    &mut perturbed,
                )?,
            });
            let crash_expr = AtomicDistance::leq(Self::crash_penalty());
            series.push(DistanceSeries {
                label: format!("crash / {tag}"),
                values: crash_expr.compute_range(
                    0,
                    settings.steps_to_sample,
                    &mut sequence,
                    &mut perturbed,
                )?,
            });

            let crash = Self::crash_formula(perturbation)?;
            verdicts.push(FormulaVerdict {
                label: format!("crash risk <= {ETA_CRASH} / {tag}"),
                satisfied: crash.eval(settings.perturbation_scale, 0, &mut sequence)?,
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
