//! Two cars on a two-lane highway.
//!
//! Only `my` car is controlled; it overtakes through the left lane when
//! the RSS gap ahead closes and returns right once past. The other car
//! drives itself with a small decision timer and may change lanes too.
//! The studied perturbation is a reckless driver that swerves across
//! lanes or drifts out of its reported position.
//!
//! Lateral geometry: the road spans `[0, 8]` with two lanes split at 4;
//! lane centers sit at 2 and 6. A lane change shifts the car laterally
//! over the response time, and forward travel shrinks by the steering
//! angle while it lasts.

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

const MY_X: usize = 0;
const MY_Y: usize = 1;
const MY_SPEED: usize = 2;
const INTENTION: usize = 3;
const MY_ACCEL: usize = 4;
const MY_LANE: usize = 5;
const MY_MOVE: usize = 6;
const MY_TIMER: usize = 7;
const MY_POSITION: usize = 8;
const OTHER_X: usize = 9;
const OTHER_Y: usize = 10;
const OTHER_SPEED: usize = 11;
const OTHER_ACCEL: usize = 12;
const OTHER_LANE: usize = 13;
const OTHER_MOVE: usize = 14;
const OTHER_TIMER: usize = 15;
const DISTANCE: usize = 16;
const SAFETY_GAP: usize = 17;
const CRASH: usize = 18;
const NUMBER_OF_VARIABLES: usize = 19;

/// Lateral move requests.
const LANE_LEFT: f64 = 1.0;
const LANE_RIGHT: f64 = -1.0;

const VEHICLE_WIDTH: f64 = 2.0;
const ROAD_WIDTH: f64 = 8.0;
const LANE_BOUNDARY: f64 = 4.0;
const LATERAL_STEP: f64 = 2.0;
const SWERVE_LATERAL_STEP: f64 = 3.0;
const STEERING_ANGLE: f64 = std::f64::consts::PI / 9.0;

const FAST_OFFSET: f64 = 2.0;
const IDLE_OFFSET: f64 = 0.4;
const DIST_OFFSET: f64 = 10.0;
const OTHER_MAX_SPEED: f64 = 35.0;

const INIT_MY_X: f64 = 0.0;
const INIT_MY_Y: f64 = 2.0;
const INIT_OTHER_X: f64 = 150.0;
const INIT_OTHER_Y: f64 = 2.0;
const INIT_SPEED: f64 = 15.0;

const PERTURBATION_DELAY: usize = 5;
const FREQUENCY: usize = 2;
const TIMES_TO_APPLY: usize = 50;
const SWERVE_CHANCE: f64 = 0.6;
const ANALYSIS_HORIZON: usize = 300;
const ETA_IMPACT: f64 = 0.01;
const ETA_OVERTAKE: f64 = 0.1;

// Two full lanes need a longer reaction window than the single-lane
// scenarios use.
const LIMITS: VehicleLimits = VehicleLimits {
    response_time: 2.0,
    vehicle_length: 5.0,
    max_speed: 40.0,
    max_acceleration: 5.0,
    max_brake: 5.0,
    min_brake: 3.0,
};

fn lane_of(y: f64) -> f64 {
    if y >= LANE_BOUNDARY {
        1.0
    } else {
        0.0
    }
}

/// Forward travel over one step, shortened while steering sideways.
fn travel(accel: f64, speed: f64, lane_move: f64) -> f64 {
    (accel / 2.0 + speed) * (STEERING_ANGLE * lane_move).cos()
}

/// RSS gap with the rear vehicle picked by the relative position sign.
fn rss_gap(my_position: f64, my_speed: f64, other_speed: f64) -> f64 {
    if my_position < 0.0 {
        LIMITS.rss_safety_distance(my_speed, other_speed)
    } else {
        LIMITS.rss_safety_distance(other_speed, my_speed)
    }
}

fn faster_accel(rng: &mut SimRng) -> f64 {
    rng.gen_range_f64(LIMITS.max_acceleration - FAST_OFFSET, LIMITS.max_acceleration)
}

fn idle_accel(rng: &mut SimRng) -> f64 {
    rng.gen_range_f64(-IDLE_OFFSET, IDLE_OFFSET)
}

fn brake_accel(rng: &mut SimRng) -> f64 {
    -rng.gen_range_f64(LIMITS.min_brake, LIMITS.max_brake)
}

/// The two-lane overtaking scenario.
///
/// The sweep parameters do not enter this scenario; its perturbation is
/// a reckless uncontrolled driver.
pub struct TwoLanesTwoCars {
    params: ScenarioParams,
}

impl TwoLanesTwoCars {
    /// Build the scenario.
    #[must_use]
    pub const fn new(params: ScenarioParams) -> Self {
        Self { params }
    }

    fn initial_state() -> DataState {
        let initial_distance = (INIT_OTHER_X - INIT_MY_X).hypot(INIT_OTHER_Y - INIT_MY_Y);
        let my_position = if INIT_MY_X <= INIT_OTHER_X { -1.0 } else { 1.0 };
        DataState::with_init(NUMBER_OF_VARIABLES, |i| match i {
            MY_X => INIT_MY_X,
            MY_Y => INIT_MY_Y,
            OTHER_X => INIT_OTHER_X,
            OTHER_Y => INIT_OTHER_Y,
            MY_SPEED | OTHER_SPEED => INIT_SPEED,
            MY_LANE => lane_of(INIT_MY_Y),
            OTHER_LANE => lane_of(INIT_OTHER_Y),
            MY_POSITION => my_position,
            DISTANCE => initial_distance,
            SAFETY_GAP => rss_gap(my_position, INIT_SPEED, INIT_SPEED),
            OTHER_TIMER => LIMITS.response_time - 1.0,
            INTENTION | MY_ACCEL | OTHER_ACCEL | MY_MOVE | OTHER_MOVE | MY_TIMER | CRASH => 0.0,
            _ => f64::NAN,
        })
    }

    fn controller() -> (ControllerRegistry, Controller) {
        let mut registry = ControllerRegistry::new();
        let steer = |updates: Vec<DataStateUpdate>, next: &'static str| {
            Controller::do_action(
                move |_rng, _ds: &DataState| updates.clone(),
                Controller::exec(next),
            )
        };
        let reset = DataStateUpdate::new(MY_TIMER, LIMITS.response_time);
        let intend =
            |value: f64| steer(vec![DataStateUpdate::new(INTENTION, value), reset], "Idling");
        let change_lane = |direction: f64, next: &'static str| {
            steer(
                vec![
                    DataStateUpdate::new(INTENTION, IDLE),
                    DataStateUpdate::new(MY_MOVE, direction),
                    reset,
                ],
                next,
            )
        };
        let settle = |value: f64, lane: f64| {
            steer(
                vec![
                    DataStateUpdate::new(INTENTION, value),
                    DataStateUpdate::new(MY_MOVE, 0.0),
                    DataStateUpdate::new(MY_LANE, lane),
                    reset,
                ],
                "Idling",
            )
        };

        let gap_clear = |ds: &DataState| ds.get(DISTANCE) > ds.get(SAFETY_GAP);
        let gap_exact =
            |ds: &DataState| (ds.get(DISTANCE) - ds.get(SAFETY_GAP)).abs() < f64::EPSILON;
        let my_ahead = |ds: &DataState| ds.get(MY_POSITION) > 0.0;
        let other_on_left = |ds: &DataState| (ds.get(OTHER_LANE) - 1.0).abs() < f64::EPSILON;

        // On the left lane: come back right as soon as the gap allows or
        // the other car shares the lane; otherwise regulate speed.
        let on_left_lane = Controller::if_then_else(
            move |_rng, ds: &DataState| gap_clear(ds),
            change_lane(LANE_RIGHT, "Moving_right"),
            Controller::if_then_else(
                move |_rng, ds: &DataState| my_ahead(ds),
                Controller::if_then_else(
                    move |_rng, ds: &DataState| other_on_left(ds),
                    change_lane(LANE_RIGHT, "Moving_right"),
                    intend(FASTER),
                ),
                Controller::if_then_else(
                    move |_rng, ds: &DataState| other_on_left(ds),
                    Controller::if_then_else(
                        move |_rng, ds: &DataState| gap_exact(ds),
                        intend(IDLE),
                        intend(SLOWER),
                    ),
                    intend(FASTER),
                ),
            ),
        );

        // On the right lane: speed up when clear or already past;
        // otherwise overtake through the left lane if there is room.
        let on_right_lane = Controller::if_then_else(
            move |_rng, ds: &DataState| gap_clear(ds) || my_ahead(ds),
            intend(FASTER),
            Controller::if_then_else(
                move |_rng, ds: &DataState| !other_on_left(ds),
                Controller::if_then_else(
                    move |_rng, ds: &DataState| ds.get(DISTANCE) > ds.get(SAFETY_GAP) * 0.8,
                    change_lane(LANE_LEFT, "Moving_left"),
                    intend(SLOWER),
                ),
                intend(IDLE),
            ),
        );

        registry.set(
            "Control",
            Controller::if_then_else(
                |_rng, ds: &DataState| ds.get(MY_TIMER) > 0.0,
                Controller::do_tick(Controller::exec("Control")),
                Controller::if_then_else(
                    |_rng, ds: &DataState| (ds.get(MY_LANE) - 1.0).abs() < f64::EPSILON,
                    on_left_lane,
                    on_right_lane,
                ),
            ),
        );

        registry.set(
            "Idling",
            Controller::if_then_else(
                |_rng, ds: &DataState| ds.get(MY_TIMER) > 0.0,
                Controller::do_tick(Controller::exec("Idling")),
                Controller::exec("Control"),
            ),
        );

        registry.set(
            "Moving_right",
            Controller::if_then_else(
                |_rng, ds: &DataState| ds.get(MY_TIMER) > 0.0,
                Controller::do_tick(Controller::exec("Moving_right")),
                Controller::if_then_else(
                    move |_rng, ds: &DataState| my_ahead(ds) || gap_clear(ds),
                    settle(FASTER, 0.0),
                    Controller::if_then_else(
                        move |_rng, ds: &DataState| gap_exact(ds),
                        settle(IDLE, 0.0),
                        settle(SLOWER, 0.0),
                    ),
                ),
            ),
        );

        registry.set(
            "Moving_left",
            Controller::if_then_else(
                |_rng, ds: &DataState| ds.get(MY_TIMER) > 0.0,
                Controller::do_tick(Controller::exec("Moving_left")),
                Controller::if_then_else(
                    move |_rng, ds: &DataState| !other_on_left(ds) && !my_ahead(ds),
                    settle(FASTER, 1.0),
                    settle(SLOWER, 1.0),
                ),
            ),
        );

        (registry, Controller::exec("Control"))
    }

    fn environment_updates(rng: &mut SimRng, state: &DataState) -> Vec<DataStateUpdate> {
        let mut updates = Vec::new();

        // Controlled car: acceleration by intention, then kinematics.
        let intent = state.get(INTENTION);
        let my_new_accel = if (intent - FASTER).abs() < f64::EPSILON {
            faster_accel(rng)
        } else if (intent - SLOWER).abs() < f64::EPSILON {
            brake_accel(rng)
        } else {
            idle_accel(rng)
        };
        let my_move = state.get(MY_MOVE);
        let my_new_x = state.get(MY_X) + travel(my_new_accel, state.get(MY_SPEED), my_move);
        let my_new_y = (state.get(MY_Y) + LATERAL_STEP * my_move).clamp(0.0, ROAD_WIDTH);
        let my_new_speed = LIMITS.clamp_speed(state.get(MY_SPEED) + my_new_accel);
        updates.push(DataStateUpdate::new(MY_ACCEL, my_new_accel));
        updates.push(DataStateUpdate::new(MY_SPEED, my_new_speed));
        updates.push(DataStateUpdate::new(MY_X, my_new_x));
        updates.push(DataStateUpdate::new(MY_Y, my_new_y));
        updates.push(DataStateUpdate::new(MY_LANE, lane_of(my_new_y)));

        // Other driver: decides on its own timer, keeps its last choice
        // in between, and aborts a lane change at the road edge.
        let (other_new_timer, other_new_accel, other_new_move) =
            if state.get(OTHER_TIMER) <= 0.0 {
                let decision_timer = LIMITS.response_time - 1.0;
                let gap_clear = state.get(DISTANCE) > state.get(SAFETY_GAP);
                let my_ahead = state.get(MY_POSITION) > 0.0;
                if (state.get(OTHER_LANE) - 1.0).abs() < f64::EPSILON {
                    if gap_clear || !my_ahead {
                        (decision_timer, idle_accel(rng), LANE_RIGHT)
                    } else {
                        // Trapped behind on the left lane: fall back.
                        (decision_timer, brake_accel(rng), 0.0)
                    }
                } else if gap_clear {
                    let token = rng.gen_f64();
                    let accel = if token >= 0.5 {
                        faster_accel(rng)
                    } else if token >= 0.2 {
                        idle_accel(rng)
                    } else {
                        brake_accel(rng)
                    };
                    (decision_timer, accel, 0.0)
                } else if my_ahead {
                    (decision_timer, brake_accel(rng), 0.0)
                } else {
                    (decision_timer, faster_accel(rng), 0.0)
                }
            } else {
                let at_edge = (state.get(OTHER_Y) >= 6.0
                    && (state.get(OTHER_MOVE) - LANE_LEFT).abs() < f64::EPSILON)
                    || (state.get(OTHER_Y) <= 2.0
                        && (state.get(OTHER_MOVE) - LANE_RIGHT).abs() < f64::EPSILON);
                (
                    state.get(OTHER_TIMER) - 1.0,
                    state.get(OTHER_ACCEL),
                    if at_edge { 0.0 } else { state.get(OTHER_MOVE) },
                )
            };
        updates.push(DataStateUpdate::new(OTHER_ACCEL, other_new_accel));
        updates.push(DataStateUpdate::new(OTHER_TIMER, other_new_timer));
        updates.push(DataStateUpdate::new(OTHER_MOVE, other_new_move));

        let other_new_speed =
            (state.get(OTHER_SPEED) + other_new_accel).clamp(0.0, OTHER_MAX_SPEED);
        let other_new_x =
            state.get(OTHER_X) + travel(other_new_accel, other_new_speed, other_new_move);
        let other_new_y =
            (state.get(OTHER_Y) + LATERAL_STEP * other_new_move).clamp(0.0, ROAD_WIDTH);
        updates.push(DataStateUpdate::new(OTHER_SPEED, other_new_speed));
        updates.push(DataStateUpdate::new(OTHER_X, other_new_x));
        updates.push(DataStateUpdate::new(OTHER_Y, other_new_y));
        updates.push(DataStateUpdate::new(OTHER_LANE, lane_of(other_new_y)));

        // Derived quantities.
        let new_distance = (other_new_x - my_new_x).hypot(other_new_y - my_new_y);
        let my_new_position = if my_new_x >= other_new_x { 1.0 } else { -1.0 };
        updates.push(DataStateUpdate::new(DISTANCE, new_distance));
        updates.push(DataStateUpdate::new(MY_POSITION, my_new_position));
        updates.push(DataStateUpdate::new(
            SAFETY_GAP,
            rss_gap(my_new_position, my_new_speed, other_new_speed),
        ));
        updates.push(DataStateUpdate::new(MY_TIMER, state.get(MY_TIMER) - 1.0));

        let same_lane = (lane_of(my_new_y) - lane_of(other_new_y)).abs() < f64::EPSILON;
        let longitudinal_overlap = (my_new_x - other_new_x).abs() <= LIMITS.vehicle_length;
        let lateral_overlap = (my_new_y - other_new_y).abs() <= VEHICLE_WIDTH;
        if longitudinal_overlap && (same_lane || lateral_overlap) {
            updates.push(DataStateUpdate::new(CRASH, 1.0));
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

    fn reckless_driver_perturbation() -> Perturbation {
        Perturbation::after(
            PERTURBATION_DELAY,
            Perturbation::iterative(
                TIMES_TO_APPLY,
                Perturbation::atomic(
                    FREQUENCY,
                    Arc::new(|rng: &mut SimRng, state: &DataState| {
                        Self::swerve_or_drift(rng, state)
                    }),
                ),
            ),
        )
    }

    /// With room to manoeuvre the reckless driver usually swerves into
    /// the other lane; otherwise its reported distance drifts.
    fn swerve_or_drift(rng: &mut SimRng, state: &DataState) -> DataState {
        if state.get(DISTANCE) > state.get(SAFETY_GAP) * 0.25 && rng.gen_bool(SWERVE_CHANCE) {
            let other_new_move = if state.get(OTHER_LANE) < 0.5 {
                LANE_LEFT
            } else {
                LANE_RIGHT
            };
            let accel = idle_accel(rng);
            let other_new_speed = (state.get(OTHER_SPEED) + accel).clamp(0.0, OTHER_MAX_SPEED);
            let other_new_x =
                state.get(OTHER_X) + travel(accel, other_new_speed, other_new_move);
            let other_new_y =
                (state.get(OTHER_Y) + SWERVE_LATERAL_STEP * other_new_move).clamp(0.0, ROAD_WIDTH);
            let my_new_position = if state.get(MY_X) >= other_new_x { 1.0 } else { -1.0 };
            let updates = vec![
                DataStateUpdate::new(OTHER_MOVE, other_new_move),
                DataStateUpdate::new(OTHER_SPEED, other_new_speed),
                DataStateUpdate::new(OTHER_X, other_new_x),
                DataStateUpdate::new(OTHER_Y, other_new_y),
                DataStateUpdate::new(OTHER_LANE, lane_of(other_new_y)),
                DataStateUpdate::new(
                    DISTANCE,
                    (other_new_x - state.get(MY_X)).hypot(other_new_y - state.get(MY_Y)),
                ),
                DataStateUpdate::new(MY_POSITION, my_new_position),
                DataStateUpdate::new(
                    SAFETY_GAP,
                    rss_gap(my_new_position, state.get(MY_SPEED), other_new_speed),
                ),
            ];
            state.apply(&updates)
        } else {
            state.apply(&[DataStateUpdate::new(
                DISTANCE,
                state.get(DISTANCE) + rng.gen_range_f64(0.0, DIST_OFFSET),
            )])
        }
    }

    /// Relative collision speed on crashing states, normalized by the
    /// speed ceiling.
    fn impact_severity_penalty() -> Arc<PenaltyFn> {
        penalty(|ds| {
            if ds.get(CRASH) > 0.0 {
                0.5 * (ds.get(MY_SPEED) - ds.get(OTHER_SPEED)).abs() / LIMITS.max_speed
            } else {
                0.0
            }
        })
    }

    fn crash_penalty() -> Arc<PenaltyFn> {
        penalty(|ds| ds.get(CRASH))
    }

    /// Flags states where the controlled car left the lane centers.
    fn off_road_penalty() -> Arc<PenaltyFn> {
        penalty(|ds| {
            if ds.get(MY_Y) > 6.0 || ds.get(MY_Y) < 2.0 {
                1.0
            } else {
                0.0
            }
        })
    }

    /// Flags a move into the left lane while the other car occupies it.
    fn occupied_lane_change_penalty() -> Arc<PenaltyFn> {
        penalty(|ds| {
            if (ds.get(MY_MOVE) - LANE_LEFT).abs() < f64::EPSILON
                && (ds.get(OTHER_LANE) - 1.0).abs() < f64::EPSILON
            {
                1.0
            } else {
                0.0
            }
        })
    }

    /// Gap shortfall during a left lane change, in `[0, 1]`.
    fn overtake_gap_penalty() -> Arc<PenaltyFn> {
        penalty(|ds| {
            if (ds.get(MY_MOVE) - LANE_LEFT).abs() < f64::EPSILON
                && (ds.get(OTHER_LANE) - 1.0).abs() < f64::EPSILON
            {
                ((ds.get(SAFETY_GAP) - ds.get(DISTANCE)) / ds.get(SAFETY_GAP)).max(0.0)
            } else {
                0.0
            }
        })
    }

    fn formula(
        penalty_fn: Arc<PenaltyFn>,
        threshold: f64,
        perturbation: Perturbation,
    ) -> SimResult<AtomicRobustnessFormula> {
        let inner = AtomicDistance::new(penalty_fn, GroundDistance::Abs);
        let window = MaxIntervalDistance::new(inner, 0, ANALYSIS_HORIZON)?;
        Ok(AtomicRobustnessFormula::new(
            perturbation,
            window,
            RelationOperator::LessOrEqual,
            threshold,
        ))
    }
}

impl Scenario for TwoLanesTwoCars {
    fn name(&self) -> &'static str {
        "two-lanes-two-cars"
    }

    fn run(&mut self, settings: &RunSettings, rng: SimRng) -> SimResult<ScenarioReport> {
        let system = Self::system();
        let mut sequence = EvolutionSequence::new(rng, &system, settings.evolution_sequence_size);
        let perturbation = Self::reckless_driver_perturbation();
        let mut perturbed =
            sequence.apply(perturbation.clone(), 0, settings.perturbation_scale)?;

        let mut series = Vec::new();
        for (label, penalty_fn) in [
            ("impact-severity / reckless-driver", Self::impact_severity_penalty()),
            ("crash / reckless-driver", Self::crash_penalty()),
            ("off-road / reckless-driver", Self::off_road_penalty()),
            ("overtake-gap / reckless-driver", Self::overtake_gap_penalty()),
        ] {
            let expr = AtomicDistance::new(penalty_fn, GroundDistance::Abs);
            series.push(DistanceSeries {
                label: label.to_string(),
                values: expr.compute_range(
                    0,
                    settings.steps_to_sample,
                    &mut sequence,
                    &mut perturbed,
                )?,
            });
        }

        let mut verdicts = Vec::new();
        for (label, penalty_fn, eta) in [
            (
                format!("impact severity <= {ETA_IMPACT} / reckless-driver"),
                Self::impact_severity_penalty(),
                ETA_IMPACT,
            ),
            (
                format!("crash risk <= {ETA_IMPACT} / reckless-driver"),
                Self::crash_penalty(),
                ETA_IMPACT,
            ),
            (
                "stays on the road / reckless-driver".to_string(),
                Self::off_road_penalty(),
                0.0,
            ),
            (
                "keeps right when occupied / reckless-driver".to_string(),
                Self::occupied_lane_change_penalty(),
                0.0,
            ),
            (
                format!("overtake gap shortfall <= {ETA_OVERTAKE} / reckless-driver"),
                Self::overtake_gap_penalty(),
                ETA_OVERTAKE,
            ),
        ] {
            let formula = Self::formula(penalty_fn, eta, perturbation.clone())?;
            verdicts.push(FormulaVerdict {
                label,
                satisfied: formula.eval(settings.perturbation_scale, 0, &mut sequence)?,
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
