//! Multiple lanes with noisy sensors.
//!
//! Three cars on two lanes. The controlled car steers by what its sensors
//! report, not by ground truth: the data state carries a real block and a
//! perceived block per car (presence, longitudinal and lateral position,
//! longitudinal and lateral speed). The environment refreshes the
//! perceived block from the real one each step, so a perturbation that
//! corrupts the perceived block misleads exactly one control decision.
//!
//! Three sensor faults are studied, driven by the sweep parameters: a
//! position offset and a speed offset scaled by `sensor_offset`, and an
//! invisibility fault hiding a car with probability `invisibility_chance`.

use std::sync::Arc;

use crate::engine::controller::{Controller, ControllerRegistry};
use crate::engine::distance::{AtomicDistance, DistanceExpression, MaxIntervalDistance};
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

const CAR_COUNT: usize = 3;
const CONTROLLED_VEHICLE: usize = 0;
const FIELDS_PER_CAR: usize = 5;

// Layout: crash counter and intention, then the real car blocks, then the
// perceived car blocks. Positions are relative to the controlled car
// (positive x is ahead of it).
const CRASHES: usize = 0;
const INTENTION: usize = 1;
const NON_CAR_VALUES: usize = 2;

const PRESENCE: usize = 0;
const X_POSITION: usize = 1;
const Y_POSITION: usize = 2;
const X_SPEED: usize = 3;
const Y_SPEED: usize = 4;

const NUMBER_OF_VARIABLES: usize = NON_CAR_VALUES + 2 * CAR_COUNT * FIELDS_PER_CAR;

const fn real(car: usize, field: usize) -> usize {
    NON_CAR_VALUES + car * FIELDS_PER_CAR + field
}

const fn perceived(car: usize, field: usize) -> usize {
    NON_CAR_VALUES + (CAR_COUNT + car) * FIELDS_PER_CAR + field
}

const LANE_WIDTH: f64 = 4.0;
const IDLE_DELTA: f64 = 1.0;
const MAX_ACCEL_OFFSET: f64 = 1.0;

// Initial formation: one car well ahead on the same lane, one behind on
// the neighbouring lane.
const INIT_X: [f64; 3] = [0.0, 100.0, -50.0];
const INIT_LANE: [f64; 3] = [0.0, 0.0, 1.0];
const INIT_X_SPEED: [f64; 3] = [0.0, 0.0, 5.0];

const STARTING_STEP: usize = 1;
const FREQUENCY: usize = 2;
const TIMES_TO_APPLY: usize = 14;
const ETA_CRASH: f64 = 0.01;
const ETA_SAFETY_GAP_VIOLATION: f64 = 0.01;

const LIMITS: VehicleLimits = VehicleLimits::standard();

/// The multi-lane scenario with sensor perturbations.
pub struct MultipleLanes {
    params: ScenarioParams,
}

impl MultipleLanes {
    /// Build the scenario from the swept sensor parameters.
    #[must_use]
    pub const fn new(params: ScenarioParams) -> Self {
        Self { params }
    }

    fn initial_state() -> DataState {
        let mut state = DataState::with_init(NUMBER_OF_VARIABLES, |_| 0.0);
        let mut updates = Vec::new();
        for car in 0..CAR_COUNT {
            for (field, value) in [
                (PRESENCE, 1.0),
                (X_POSITION, INIT_X[car]),
                (Y_POSITION, INIT_LANE[car] * LANE_WIDTH),
                (X_SPEED, INIT_X_SPEED[car]),
                (Y_SPEED, 0.0),
            ] {
                updates.push(DataStateUpdate::new(real(car, field), value));
                updates.push(DataStateUpdate::new(perceived(car, field), value));
            }
        }
        state = state.apply(&updates);
        state
    }

    /// Whether `car` shares the controlled car's lane, as perceived.
    fn same_lane_perceived(ds: &DataState, car: usize) -> bool {
        (ds.get(perceived(car, Y_POSITION)) - ds.get(real(CONTROLLED_VEHICLE, Y_POSITION))).abs()
            < LANE_WIDTH / 2.0
    }

    /// Perceived distance and speed of the nearest visible car ahead on
    /// the controlled car's lane.
    fn nearest_ahead_perceived(ds: &DataState) -> Option<(f64, f64)> {
        let mut nearest: Option<(f64, f64)> = None;
        for car in 0..CAR_COUNT {
            if car == CONTROLLED_VEHICLE {
                continue;
            }
            if ds.get(perceived(car, PRESENCE)) <= 0.0 || !Self::same_lane_perceived(ds, car) {
                continue;
            }
            let x = ds.get(perceived(car, X_POSITION));
            if x > 0.0 && nearest.map_or(true, |(d, _)| x < d) {
                nearest = Some((x, ds.get(perceived(car, X_SPEED))));
            }
        }
        nearest
    }

    fn controller() -> (ControllerRegistry, Controller) {
        let mut registry = ControllerRegistry::new();
        let intend = |value: f64| {
            Controller::do_action(
                move |_rng, _ds: &DataState| vec![DataStateUpdate::new(INTENTION, value)],
                Controller::exec("Control"),
            )
        };
        // The decision is taken on perceived data: an invisible or
        // misplaced front car yields FASTER where SLOWER was due.
        registry.set(
            "Control",
            Controller::if_then_else(
                |_rng, ds: &DataState| {
                    Self::nearest_ahead_perceived(ds).is_some_and(|(gap, front_speed)| {
                        gap < LIMITS
                            .rss_safety_distance(ds.get(real(CONTROLLED_VEHICLE, X_SPEED)), front_speed)
                    })
                },
                intend(SLOWER),
                Controller::if_then_else(
                    |_rng, ds: &DataState| {
                        Self::nearest_ahead_perceived(ds).is_some_and(|(gap, front_speed)| {
                            gap < 2.0
                                * LIMITS.rss_safety_distance(
                                    ds.get(real(CONTROLLED_VEHICLE, X_SPEED)),
                                    front_speed,
                                )
                        })
                    },
                    intend(IDLE),
                    intend(FASTER),
                ),
            ),
        );
        (registry, Controller::exec("Control"))
    }

    fn environment_updates(rng: &mut SimRng, state: &DataState) -> Vec<DataStateUpdate> {
        let mut updates = Vec::new();

        // Controlled car acceleration follows the intention.
        let intent = state.get(INTENTION);
        let accel0 = if (intent - FASTER).abs() < f64::EPSILON {
            rng.gen_range_f64(
                LIMITS.max_acceleration - MAX_ACCEL_OFFSET,
                LIMITS.max_acceleration,
            )
        } else if (intent - SLOWER).abs() < f64::EPSILON {
            -rng.gen_range_f64(LIMITS.min_brake, LIMITS.max_brake)
        } else {
            rng.gen_range_f64(-IDLE_DELTA, IDLE_DELTA)
        };

        let speed0 = state.get(real(CONTROLLED_VEHICLE, X_SPEED));
        let new_speed0 = LIMITS.clamp_speed(speed0 + accel0);
        let travel0 = accel0 / 2.0 + speed0;
        updates.push(DataStateUpdate::new(
            real(CONTROLLED_VEHICLE, X_SPEED),
            new_speed0,
        ));

        // Other cars cruise with small random accelerations; positions
        // stay relative to the controlled car.
        let mut crashes = state.get(CRASHES);
        for car in 0..CAR_COUNT {
            if car == CONTROLLED_VEHICLE {
                continue;
            }
            let accel = rng.gen_range_f64(-IDLE_DELTA, IDLE_DELTA);
            let speed = state.get(real(car, X_SPEED));
            let new_speed = LIMITS.clamp_speed(speed + accel);
            let travel = accel / 2.0 + speed;
            let new_x = state.get(real(car, X_POSITION)) + travel - travel0;
            updates.push(DataStateUpdate::new(real(car, X_SPEED), new_speed));
            updates.push(DataStateUpdate::new(real(car, X_POSITION), new_x));

            let same_lane = (state.get(real(car, Y_POSITION))
                - state.get(real(CONTROLLED_VEHICLE, Y_POSITION)))
            .abs()
                < LANE_WIDTH / 2.0;
            if same_lane && new_x.abs() < LIMITS.vehicle_length {
                crashes += 1.0;
            }
        }
        updates.push(DataStateUpdate::new(CRASHES, crashes));

        // Sensors refresh: the perceived block mirrors the real one until
        // a perturbation overwrites it.
        for car in 0..CAR_COUNT {
            updates.push(DataStateUpdate::new(perceived(car, PRESENCE), 1.0));
            for field in [X_POSITION, Y_POSITION, X_SPEED, Y_SPEED] {
                // Positions written above land in the same batch, so read
                // the recomputed values where they exist.
                let value = updates
                    .iter()
                    .rev()
                    .find(|u| u.index == real(car, field))
                    .map_or_else(|| state.get(real(car, field)), |u| u.value);
                updates.push(DataStateUpdate::new(perceived(car, field), value));
            }
        }
        updates
    }

    fn system() -> ControlledSystem {
        let (registry, controller) = Self::controller();
        let env: Arc<DataStateFn> = Arc::new(|rng: &mut SimRng, ds: &DataState| {
            ds.apply(&Self::environment_updates(rng, ds))
        });
        ControlledSystem::new(Arc::new(registry), controller, env, Self::initial_state())
    }

    fn repeated(effect: Arc<DataStateFn>) -> Perturbation {
        Perturbation::iterative(TIMES_TO_APPLY, Perturbation::atomic(FREQUENCY, effect))
    }

    /// Scale perceived positions of the other cars by a random factor in
    /// `[1 - offset, 1 + offset]`.
    fn sensor_perturbation(&self) -> Perturbation {
        let offset = self.params.sensor_offset;
        Self::repeated(Arc::new(move |rng: &mut SimRng, state: &DataState| {
            let mut updates = Vec::new();
            for car in 0..CAR_COUNT {
                if car == CONTROLLED_VEHICLE {
                    continue;
                }
                let fx = rng.gen_range_f64(1.0 - offset, 1.0 + offset);
                let fy = rng.gen_range_f64(1.0 - offset, 1.0 + offset);
                updates.push(DataStateUpdate::new(
                    perceived(car, X_POSITION),
                    fx * state.get(real(car, X_POSITION)),
                ));
                updates.push(DataStateUpdate::new(
                    perceived(car, Y_POSITION),
                    fy * state.get(real(car, Y_POSITION)),
                ));
            }
            state.apply(&updates)
        }))
    }

    /// Hide each other car from the sensors with the configured chance.
    fn invisibility_perturbation(&self) -> Perturbation {
        let chance = self.params.invisibility_chance;
        Self::repeated(Arc::new(move |rng: &mut SimRng, state: &DataState| {
            let mut updates = Vec::new();
            for car in 0..CAR_COUNT {
                if car != CONTROLLED_VEHICLE && rng.gen_bool(chance) {
                    updates.push(DataStateUpdate::new(perceived(car, PRESENCE), 0.0));
                }
            }
            state.apply(&updates)
        }))
    }

    /// Scale perceived longitudinal speeds of the other cars.
    fn speed_perturbation(&self) -> Perturbation {
        let offset = self.params.sensor_offset;
        Self::repeated(Arc::new(move |rng: &mut SimRng, state: &DataState| {
            let mut updates = Vec::new();
            for car in 0..CAR_COUNT {
                if car == CONTROLLED_VEHICLE {
                    continue;
                }
                let f = rng.gen_range_f64(1.0 - offset, 1.0 + offset);
                updates.push(DataStateUpdate::new(
                    perceived(car, X_SPEED),
                    f * state.get(real(car, X_SPEED)),
                ));
            }
            state.apply(&updates)
        }))
    }

    fn crash_penalty() -> Arc<PenaltyFn> {
        penalty(|ds| if ds.get(CRASHES) > 0.0 { 1.0 } else { 0.0 })
    }

    /// Flags states where some real car sits within the RSS gap of the
    /// controlled one.
    fn safety_gap_violation_penalty() -> Arc<PenaltyFn> {
        penalty(|ds| {
            for car in 0..CAR_COUNT {
                if car == CONTROLLED_VEHICLE {
                    continue;
                }
                let x = ds.get(real(car, X_POSITION));
                let gap = if x > 0.0 {
                    // Controlled car is the rear vehicle.
                    LIMITS.rss_safety_distance(
                        ds.get(real(CONTROLLED_VEHICLE, X_SPEED)),
                        ds.get(real(car, X_SPEED)),
                    )
                } else {
                    LIMITS.rss_safety_distance(
                        ds.get(real(car, X_SPEED)),
                        ds.get(real(CONTROLLED_VEHICLE, X_SPEED)),
                    )
                };
                if x.abs() <= LIMITS.vehicle_length + gap {
                    return 1.0;
                }
            }
            0.0
        })
    }

    fn crash_formula(perturbation: Perturbation) -> SimResult<AtomicRobustnessFormula> {
        let inner = AtomicDistance::leq(Self::crash_penalty());
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
        let inner = AtomicDistance::leq(Self::safety_gap_violation_penalty());
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

impl Scenario for MultipleLanes {
    fn name(&self) -> &'static str {
        "multiple-lanes"
    }

    fn run(&mut self, settings: &RunSettings, rng: SimRng) -> SimResult<ScenarioReport> {
        let system = Self::system();
        let mut sequence = EvolutionSequence::new(rng, &system, settings.evolution_sequence_size);

        let mut series = Vec::new();
        let mut verdicts = Vec::new();
        for (tag, perturbation) in [
            ("sensor", self.sensor_perturbation()),
            ("invisibility", self.invisibility_perturbation()),
            ("speed", self.speed_perturbation()),
        ] {
            let mut perturbed = sequence.apply(
                perturbation.clone(),
                STARTING_STEP,
                settings.perturbation_scale,
            )?;
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
            let gap_expr = AtomicDistance::leq(Self::safety_gap_violation_penalty());
            series.push(DistanceSeries {
                label: format!("safety-gap / {tag}"),
                values: gap_expr.compute_range(
                    0,
                    settings.steps_to_sample,
                    &mut sequence,
                    &mut perturbed,
                )?,
            });

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

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ScenarioParams {
        ScenarioParams {
            sensor_offset: 0.25,
            invisibility_chance: 0.25,
        }
    }

    fn small_settings() -> RunSettings {
        RunSettings {
            evolution_sequence_size: 3,
            perturbation_scale: 2,
            steps_to_sample: 6,
        }
    }

    #[test]
    fn test_layout_has_no_overlaps() {
        let mut seen = std::collections::HashSet::new();
        seen.insert(CRASHES);
        seen.insert(INTENTION);
        for car in 0..CAR_COUNT {
            for field in 0..FIELDS_PER_CAR {
                assert!(seen.insert(real(car, field)), "real index collision");
                assert!(seen.insert(perceived(car, field)), "perceived index collision");
            }
        }
        assert_eq!(seen.len(), NUMBER_OF_VARIABLES);
    }

    #[test]
    fn test_initial_state_mirrors_real_into_perceived() {
        let state = MultipleLanes::initial_state();
        for car in 0..CAR_COUNT {
            for field in 0..FIELDS_PER_CAR {
                assert!(
                    (state.get(real(car, field)) - state.get(perceived(car, field))).abs()
                        < f64::EPSILON
                );
            }
        }
        assert!((state.get(real(1, X_POSITION)) - 100.0).abs() < f64::EPSILON);
        assert!((state.get(CRASHES) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_nearest_ahead_ignores_other_lane() {
        let state = MultipleLanes::initial_state();
        // Car 1 is ahead on the same lane; car 2 is behind on lane 1.
        let nearest = MultipleLanes::nearest_ahead_perceived(&state);
        assert!(nearest.is_some());
        if let Some((gap, _)) = nearest {
            assert!((gap - 100.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_nearest_ahead_ignores_invisible_car() {
        let state = MultipleLanes::initial_state()
            .apply(&[DataStateUpdate::new(perceived(1, PRESENCE), 0.0)]);
        assert!(MultipleLanes::nearest_ahead_perceived(&state).is_none());
    }

    #[test]
    fn test_controller_brakes_inside_perceived_gap() {
        let (registry, controller) = MultipleLanes::controller();
        let mut rng = SimRng::new(42);
        let state = MultipleLanes::initial_state().apply(&[
            DataStateUpdate::new(real(CONTROLLED_VEHICLE, X_SPEED), 30.0),
            DataStateUpdate::new(perceived(1, X_POSITION), 20.0),
        ]);

        let step = controller.next(&registry, &mut rng, &state).unwrap();
        assert!((step.updates[0].value - SLOWER).abs() < f64::EPSILON);
    }

    #[test]
    fn test_controller_speeds_up_when_front_car_invisible() {
        let (registry, controller) = MultipleLanes::controller();
        let mut rng = SimRng::new(42);
        // Dangerously close, but the sensors lost the car.
        let state = MultipleLanes::initial_state().apply(&[
            DataStateUpdate::new(real(CONTROLLED_VEHICLE, X_SPEED), 30.0),
            DataStateUpdate::new(perceived(1, X_POSITION), 20.0),
            DataStateUpdate::new(perceived(1, PRESENCE), 0.0),
        ]);

        let step = controller.next(&registry, &mut rng, &state).unwrap();
        assert!((step.updates[0].value - FASTER).abs() < f64::EPSILON);
    }

    #[test]
    fn test_environment_refreshes_perceived_block() {
        let mut rng = SimRng::new(42);
        let corrupted = MultipleLanes::initial_state().apply(&[
            DataStateUpdate::new(perceived(1, PRESENCE), 0.0),
            DataStateUpdate::new(perceived(1, X_POSITION), -500.0),
        ]);
        let updated =
            corrupted.apply(&MultipleLanes::environment_updates(&mut rng, &corrupted));

        assert!((updated.get(perceived(1, PRESENCE)) - 1.0).abs() < f64::EPSILON);
        assert!(
            (updated.get(perceived(1, X_POSITION)) - updated.get(real(1, X_POSITION))).abs()
                < f64::EPSILON
        );
    }

    #[test]
    fn test_environment_counts_crash() {
        let mut rng = SimRng::new(42);
        // Same lane, bumper distance, similar speeds: stays overlapping.
        let state = MultipleLanes::initial_state().apply(&[
            DataStateUpdate::new(real(1, X_POSITION), 2.0),
            DataStateUpdate::new(real(1, X_SPEED), 0.0),
            DataStateUpdate::new(real(CONTROLLED_VEHICLE, X_SPEED), 0.0),
        ]);
        let updated = state.apply(&MultipleLanes::environment_updates(&mut rng, &state));
        assert!(updated.get(CRASHES) >= 1.0);
    }

    #[test]
    fn test_invisibility_perturbation_hides_cars() {
        let scenario = MultipleLanes::new(ScenarioParams {
            sensor_offset: 0.0,
            invisibility_chance: 1.0,
        });
        let mut p = scenario.invisibility_perturbation();
        while p.effect().is_none() {
            p = p.step();
        }
        let effect = p.effect().unwrap();
        let mut rng = SimRng::new(42);
        let state = MultipleLanes::initial_state();
        let perturbed = effect(&mut rng, &state);

        for car in 1..CAR_COUNT {
            assert!((perturbed.get(perceived(car, PRESENCE)) - 0.0).abs() < f64::EPSILON);
            assert!((perturbed.get(real(car, PRESENCE)) - 1.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_sensor_perturbation_bounded_by_offset() {
        let scenario = MultipleLanes::new(ScenarioParams {
            sensor_offset: 0.25,
            invisibility_chance: 0.0,
        });
        let mut p = scenario.sensor_perturbation();
        while p.effect().is_none() {
            p = p.step();
        }
        let effect = p.effect().unwrap();
        let mut rng = SimRng::new(42);
        let state = MultipleLanes::initial_state();
        let perturbed = effect(&mut rng, &state);

        let x = perturbed.get(perceived(1, X_POSITION));
        assert!(x >= 75.0 && x <= 125.0, "perturbed position {x} outside bound");
    }

    #[test]
    fn test_zero_offset_sensor_perturbation_is_identity() {
        let scenario = MultipleLanes::new(ScenarioParams {
            sensor_offset: 0.0,
            invisibility_chance: 0.0,
        });
        let mut p = scenario.speed_perturbation();
        while p.effect().is_none() {
            p = p.step();
        }
        let effect = p.effect().unwrap();
        let mut rng = SimRng::new(42);
        let state = MultipleLanes::initial_state();
        let perturbed = effect(&mut rng, &state);

        for car in 1..CAR_COUNT {
            assert!(
                (perturbed.get(perceived(car, X_SPEED)) - state.get(real(car, X_SPEED))).abs()
                    < f64::EPSILON
            );
        }
    }

    #[test]
    fn test_safety_gap_penalty_flags_close_car() {
        let p = MultipleLanes::safety_gap_violation_penalty();
        let safe = MultipleLanes::initial_state();
        assert!((p(&safe) - 0.0).abs() < f64::EPSILON);

        let close = safe.apply(&[DataStateUpdate::new(real(1, X_POSITION), 8.0)]);
        assert!((p(&close) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_run_produces_report() {
        let mut scenario = MultipleLanes::new(params());
        let report = scenario.run(&small_settings(), SimRng::new(42)).unwrap();

        assert_eq!(report.scenario, "multiple-lanes");
        assert_eq!(report.series.len(), 6);
        assert_eq!(report.verdicts.len(), 6);
        for series in &report.series {
            assert_eq!(series.values.len(), 6);
            for &v in &series.values {
                assert!((0.0..=1.0).contains(&v));
            }
        }
    }

    #[test]
    fn test_run_is_deterministic() {
        let mut a = MultipleLanes::new(params());
        let mut b = MultipleLanes::new(params());
        let ra = a.run(&small_settings(), SimRng::new(9)).unwrap();
        let rb = b.run(&small_settings(), SimRng::new(9)).unwrap();
        assert_eq!(ra.series, rb.series);
    }
}
