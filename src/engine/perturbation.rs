//! Perturbation algebra.
//!
//! A perturbation is a small program over time: at each evolution step it
//! may expose an effect (a randomized transformation of the data state) and
//! then evolves into its successor. Combinators delay, repeat, and chain
//! effects.
//!
//! The inert `None` perturbation is `is_done`; an `Atomic` perturbation
//! fires once its countdown reaches zero and then becomes inert.

use std::sync::Arc;

use crate::engine::ds::DataStateFn;

/// A time-indexed perturbation over data states.
#[derive(Clone)]
pub enum Perturbation {
    /// No effect at any step; already terminated.
    None,
    /// Applies `effect` once the countdown reaches zero, then terminates.
    ///
    /// The effect fires when `after_steps` is 0, so the timeout spans
    /// `after_steps + 1` evolution steps.
    Atomic {
        /// Remaining steps before the effect fires.
        after_steps: usize,
        /// Transformation to apply when the countdown expires.
        effect: Arc<DataStateFn>,
    },
    /// Delays `body` by a fixed timeout with no effect of its own.
    After {
        /// Remaining timeout steps.
        steps: usize,
        /// Perturbation applied once the timeout expires.
        body: Box<Perturbation>,
    },
    /// Repeats `body` a fixed number of times.
    Iterative {
        /// Remaining repetitions.
        replica: usize,
        /// Perturbation repeated at each iteration.
        body: Box<Perturbation>,
    },
    /// Runs `first` to completion, then `second`.
    Sequential {
        /// Perturbation applied first.
        first: Box<Perturbation>,
        /// Perturbation applied after `first` terminates.
        second: Box<Perturbation>,
    },
}

impl Perturbation {
    /// Atomic perturbation firing after `after_steps` steps.
    #[must_use]
    pub fn atomic(after_steps: usize, effect: Arc<DataStateFn>) -> Self {
        Self::Atomic {
            after_steps,
            effect,
        }
    }

    /// Delay `body` by `steps` steps.
    #[must_use]
    pub fn after(steps: usize, body: Self) -> Self {
        Self::After {
            steps,
            body: Box::new(body),
        }
    }

    /// Repeat `body` `replica` times.
    #[must_use]
    pub fn iterative(replica: usize, body: Self) -> Self {
        Self::Iterative {
            replica,
            body: Box::new(body),
        }
    }

    /// Run `first`, then `second`.
    #[must_use]
    pub fn sequential(first: Self, second: Self) -> Self {
        Self::Sequential {
            first: Box::new(first),
            second: Box::new(second),
        }
    }

    /// The effect exposed at the current step, if any.
    #[must_use]
    pub fn effect(&self) -> Option<Arc<DataStateFn>> {
        match self {
            Self::None | Self::After { .. } => None,
            Self::Atomic {
                after_steps,
                effect,
            } => (*after_steps == 0).then(|| Arc::clone(effect)),
            Self::Iterative { replica, body } => {
                if *replica > 0 {
                    body.effect()
                } else {
                    None
                }
            }
            Self::Sequential { first, second } => {
                if first.is_done() {
                    second.effect()
                } else {
                    first.effect()
                }
            }
        }
    }

    /// The perturbation governing the next step.
    #[must_use]
    pub fn step(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Atomic {
                after_steps,
                effect,
            } => {
                if *after_steps == 0 {
                    Self::None
                } else {
                    Self::Atomic {
                        after_steps: after_steps - 1,
                        effect: Arc::clone(effect),
                    }
                }
            }
            Self::After { steps, body } => {
                if *steps > 1 {
                    Self::After {
                        steps: steps - 1,
                        body: body.clone(),
                    }
                } else {
                    (**body).clone()
                }
            }
            Self::Iterative { replica, body } => {
                if *replica > 0 {
                    Self::sequential(body.step(), Self::iterative(replica - 1, (**body).clone()))
                } else {
                    Self::None
                }
            }
            Self::Sequential { first, second } => {
                if first.is_done() {
                    second.step()
                } else {
                    Self::Sequential {
                        first: Box::new(first.step()),
                        second: second.clone(),
                    }
                }
            }
        }
    }

    /// Whether no further effect can ever fire.
    #[must_use]
    pub fn is_done(&self) -> bool {
        match self {
            Self::None => true,
            Self::Atomic { .. } | Self::After { .. } => false,
            Self::Iterative { replica, .. } => *replica == 0,
            Self::Sequential { first, second } => first.is_done() && second.is_done(),
        }
    }
}

impl std::fmt::Debug for Perturbation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Atomic { after_steps, .. } => write!(f, "Atomic({after_steps})"),
            Self::After { steps, body } => write!(f, "After({steps}, {body:?})"),
            Self::Iterative { replica, body } => write!(f, "Iterative({replica}, {body:?})"),
            Self::Sequential { first, second } => write!(f, "Sequential({first:?}, {second:?})"),
        }
    }
}

impl Default for Perturbation {
    fn default() -> Self {
        Self::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ds::DataState;
    use crate::engine::rng::SimRng;

    fn set_first_to_one() -> Arc<DataStateFn> {
        Arc::new(|_rng: &mut SimRng, ds: &DataState| {
            ds.apply(&[crate::engine::ds::DataStateUpdate::new(0, 1.0)])
        })
    }

    #[test]
    fn test_none_is_inert() {
        let p = Perturbation::None;
        assert!(p.effect().is_none());
        assert!(p.is_done());
        assert!(matches!(p.step(), Perturbation::None));
    }

    #[test]
    fn test_atomic_fires_at_zero() {
        let p = Perturbation::atomic(0, set_first_to_one());
        assert!(p.effect().is_some());
        assert!(!p.is_done());
        assert!(matches!(p.step(), Perturbation::None));
    }

    #[test]
    fn test_atomic_counts_down() {
        let p = Perturbation::atomic(2, set_first_to_one());
        assert!(p.effect().is_none());

        let p = p.step();
        assert!(p.effect().is_none());

        let p = p.step();
        assert!(p.effect().is_some(), "Fires when countdown reaches zero");

        let p = p.step();
        assert!(p.is_done());
    }

    #[test]
    fn test_after_delays_body() {
        let p = Perturbation::after(2, Perturbation::atomic(0, set_first_to_one()));
        assert!(p.effect().is_none());
        assert!(!p.is_done());

        let p = p.step();
        assert!(p.effect().is_none(), "Timeout not yet expired");

        let p = p.step();
        assert!(p.effect().is_some(), "Body exposed after timeout");
    }

    #[test]
    fn test_iterative_repeats() {
        let p = Perturbation::iterative(2, Perturbation::atomic(0, set_first_to_one()));
        assert!(p.effect().is_some(), "First iteration fires immediately");

        // Each step consumes one iteration of the body.
        let p = p.step();
        assert!(p.effect().is_some());
        let p = p.step();
        assert!(p.effect().is_none());
        assert!(p.is_done());
    }

    #[test]
    fn test_iterative_zero_is_done() {
        let p = Perturbation::iterative(0, Perturbation::atomic(0, set_first_to_one()));
        assert!(p.is_done());
        assert!(p.effect().is_none());
        assert!(matches!(p.step(), Perturbation::None));
    }

    #[test]
    fn test_sequential_runs_first_then_second() {
        let p = Perturbation::sequential(
            Perturbation::atomic(0, set_first_to_one()),
            Perturbation::atomic(0, set_first_to_one()),
        );
        assert!(p.effect().is_some(), "First is active");
        assert!(!p.is_done());

        let p = p.step();
        assert!(p.effect().is_some(), "Second takes over once first is done");

        let p = p.step();
        assert!(p.is_done());
    }

    #[test]
    fn test_sequential_skips_done_first() {
        let p = Perturbation::sequential(
            Perturbation::None,
            Perturbation::atomic(0, set_first_to_one()),
        );
        assert!(p.effect().is_some());
    }

    #[test]
    fn test_effect_applies_to_state() {
        let p = Perturbation::atomic(0, set_first_to_one());
        let mut rng = SimRng::new(42);
        let ds = DataState::zeroed(2);
        let effect = p.effect();
        assert!(effect.is_some());
        if let Some(f) = effect {
            let out = f(&mut rng, &ds);
            assert!((out.get(0) - 1.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_default_is_none() {
        assert!(Perturbation::default().is_done());
    }

    #[test]
    fn test_debug_format() {
        let p = Perturbation::iterative(3, Perturbation::atomic(1, set_first_to_one()));
        assert_eq!(format!("{p:?}"), "Iterative(3, Atomic(1))");
    }
}
