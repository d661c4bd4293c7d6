//! Sample sets of controlled systems.
//!
//! A sample set is the empirical distribution of a system at one evolution
//! step. Distances between sample sets are Wasserstein liftings of a
//! ground distance over sorted penalty evaluations; the coupling requires
//! the larger set's size to be a multiple of the smaller's.

use crate::engine::ds::{DataStateFn, PenaltyFn};
use crate::engine::rng::SimRng;
use crate::engine::system::ControlledSystem;
use crate::error::{SimError, SimResult};

/// Empirical distribution of a controlled system at a single step.
#[derive(Debug, Clone)]
pub struct SampleSet {
    states: Vec<ControlledSystem>,
}

impl SampleSet {
    /// Generate `size` independent copies of `system` sampled zero steps
    /// forward (the initial distribution is `size` clones).
    #[must_use]
    pub fn generate(system: &ControlledSystem, size: usize) -> Self {
        Self {
            states: (0..size).map(|_| system.clone()).collect(),
        }
    }

    /// Wrap an existing collection of systems.
    #[must_use]
    pub const fn from_states(states: Vec<ControlledSystem>) -> Self {
        Self { states }
    }

    /// Number of samples.
    #[must_use]
    pub fn size(&self) -> usize {
        self.states.len()
    }

    /// Whether the set holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The sampled systems.
    #[must_use]
    pub fn states(&self) -> &[ControlledSystem] {
        &self.states
    }

    /// Sample every system one step forward.
    ///
    /// # Errors
    ///
    /// Propagates controller resolution failures.
    pub fn sample_next(&self, rng: &mut SimRng) -> SimResult<Self> {
        let states = self
            .states
            .iter()
            .map(|s| s.sample_next(rng))
            .collect::<SimResult<Vec<_>>>()?;
        Ok(Self { states })
    }

    /// Replicate every sample `scale` times, preserving order.
    ///
    /// Used to widen a nominal set before perturbing it, so that each
    /// nominal sample owns a block of perturbed descendants.
    #[must_use]
    pub fn replica(&self, scale: usize) -> Self {
        let mut states = Vec::with_capacity(self.states.len() * scale);
        for state in &self.states {
            for _ in 0..scale {
                states.push(state.clone());
            }
        }
        Self { states }
    }

    /// Apply a randomized transformation to every sampled data state.
    #[must_use]
    pub fn apply_effect(&self, rng: &mut SimRng, effect: &DataStateFn) -> Self {
        let states = self
            .states
            .iter()
            .map(|s| {
                let perturbed = effect(rng, s.data_state());
                s.with_data_state(perturbed)
            })
            .collect();
        Self { states }
    }

    /// Evaluate a penalty function on every sample, sorted ascending.
    ///
    /// Sorting realizes the optimal coupling for one-dimensional
    /// Wasserstein distances.
    #[must_use]
    pub fn eval_penalty(&self, penalty: &PenaltyFn) -> Vec<f64> {
        let mut values: Vec<f64> = self.states.iter().map(|s| penalty(s.data_state())).collect();
        values.sort_by(f64::total_cmp);
        values
    }

    /// Asymmetric distance penalizing `other` exceeding `self`.
    ///
    /// Ground distance `max(0, v_other - v_self)`, averaged over the
    /// block coupling of the sorted penalty values.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::IncompatibleSampleSets`] when either set is
    /// empty or `other.size()` is not a multiple of `self.size()`.
    pub fn distance_leq(&self, penalty: &PenaltyFn, other: &Self) -> SimResult<f64> {
        self.lifted_distance(penalty, other, |v1, v2| (v2 - v1).max(0.0))
    }

    /// Asymmetric distance penalizing `other` falling below `self`.
    ///
    /// # Errors
    ///
    /// Same compatibility requirements as [`Self::distance_leq`].
    pub fn distance_geq(&self, penalty: &PenaltyFn, other: &Self) -> SimResult<f64> {
        self.lifted_distance(penalty, other, |v1, v2| (v1 - v2).max(0.0))
    }

    /// Symmetric Wasserstein distance with ground distance `|v2 - v1|`.
    ///
    /// # Errors
    ///
    /// Same compatibility requirements as [`Self::distance_leq`].
    pub fn distance_abs(&self, penalty: &PenaltyFn, other: &Self) -> SimResult<f64> {
        self.lifted_distance(penalty, other, |v1, v2| (v2 - v1).abs())
    }

    fn lifted_distance(
        &self,
        penalty: &PenaltyFn,
        other: &Self,
        ground: impl Fn(f64, f64) -> f64,
    ) -> SimResult<f64> {
        if self.is_empty() || other.is_empty() || other.size() % self.size() != 0 {
            return Err(SimError::IncompatibleSampleSets {
                nominal: self.size(),
                perturbed: other.size(),
            });
        }
        let this_data = self.eval_penalty(penalty);
        let other_data = other.eval_penalty(penalty);
        let k = other_data.len() / this_data.len();
        let total: f64 = this_data
            .iter()
            .enumerate()
            .map(|(i, &v1)| {
                other_data[i * k..(i + 1) * k]
                    .iter()
                    .map(|&v2| ground(v1, v2))
                    .sum::<f64>()
            })
            .sum();
        Ok(total / other_data.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::controller::{Controller, ControllerRegistry};
    use crate::engine::ds::{penalty, DataState, DataStateUpdate};
    use std::sync::Arc;

    fn system_with_value(v: f64) -> ControlledSystem {
        let mut registry = ControllerRegistry::new();
        registry.set("Idle", Controller::do_tick(Controller::exec("Idle")));
        ControlledSystem::new(
            Arc::new(registry),
            Controller::exec("Idle"),
            Arc::new(|_rng: &mut SimRng, ds: &DataState| ds.clone()),
            DataState::zeroed(1).apply(&[DataStateUpdate::new(0, v)]),
        )
    }

    fn set_of(values: &[f64]) -> SampleSet {
        SampleSet::from_states(values.iter().map(|&v| system_with_value(v)).collect())
    }

    #[test]
    fn test_generate_clones() {
        let set = SampleSet::generate(&system_with_value(1.0), 5);
        assert_eq!(set.size(), 5);
        assert!(!set.is_empty());
    }

    #[test]
    fn test_eval_penalty_is_sorted() {
        let set = set_of(&[3.0, 1.0, 2.0]);
        let values = set.eval_penalty(&|ds: &DataState| ds.get(0));
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_replica_preserves_blocks() {
        let set = set_of(&[1.0, 2.0]);
        let wide = set.replica(3);
        assert_eq!(wide.size(), 6);
        let raw: Vec<f64> = wide.states().iter().map(|s| s.data_state().get(0)).collect();
        assert_eq!(raw, vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_distance_leq_equal_sets_is_zero() {
        let set = set_of(&[1.0, 2.0, 3.0]);
        let d = set.distance_leq(&|ds: &DataState| ds.get(0), &set).unwrap();
        assert!(d.abs() < f64::EPSILON);
    }

    #[test]
    fn test_distance_leq_one_sided() {
        let nominal = set_of(&[1.0]);
        let above = set_of(&[2.0]);

        let d = nominal
            .distance_leq(&|ds: &DataState| ds.get(0), &above)
            .unwrap();
        assert!((d - 1.0).abs() < f64::EPSILON);

        // Excess in the other direction does not count.
        let d = above
            .distance_leq(&|ds: &DataState| ds.get(0), &nominal)
            .unwrap();
        assert!(d.abs() < f64::EPSILON);
    }

    #[test]
    fn test_distance_geq_mirrors_leq() {
        let nominal = set_of(&[2.0]);
        let below = set_of(&[0.5]);

        let d = nominal
            .distance_geq(&|ds: &DataState| ds.get(0), &below)
            .unwrap();
        assert!((d - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_distance_abs_symmetric() {
        let a = set_of(&[1.0, 3.0]);
        let b = set_of(&[2.0, 5.0]);
        let f = |ds: &DataState| ds.get(0);

        let d1 = a.distance_abs(&f, &b).unwrap();
        let d2 = b.distance_abs(&f, &a).unwrap();
        assert!((d1 - d2).abs() < f64::EPSILON);
        assert!((d1 - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_distance_block_coupling() {
        // Two nominal samples against four perturbed ones: each nominal
        // value is matched with a block of two.
        let nominal = set_of(&[1.0, 2.0]);
        let perturbed = set_of(&[1.5, 1.5, 2.5, 2.5]);

        let d = nominal
            .distance_leq(&|ds: &DataState| ds.get(0), &perturbed)
            .unwrap();
        // Sorted blocks: 1.0 vs [1.5, 1.5], 2.0 vs [2.5, 2.5] -> 2.0 / 4.
        assert!((d - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_distance_incompatible_sizes() {
        let a = set_of(&[1.0, 2.0]);
        let b = set_of(&[1.0, 2.0, 3.0]);
        let err = a.distance_leq(&|ds: &DataState| ds.get(0), &b).unwrap_err();
        assert!(matches!(err, SimError::IncompatibleSampleSets { .. }));
    }

    #[test]
    fn test_distance_empty_sets() {
        let empty = SampleSet::from_states(Vec::new());
        let other = set_of(&[1.0]);
        assert!(empty
            .distance_leq(&|ds: &DataState| ds.get(0), &other)
            .is_err());
        assert!(other
            .distance_leq(&|ds: &DataState| ds.get(0), &empty)
            .is_err());
    }

    #[test]
    fn test_apply_effect() {
        let set = set_of(&[1.0, 2.0]);
        let mut rng = SimRng::new(42);
        let shifted = set.apply_effect(&mut rng, &|_rng: &mut SimRng, ds: &DataState| {
            ds.apply(&[DataStateUpdate::new(0, ds.get(0) + 10.0)])
        });
        let values = shifted.eval_penalty(&|ds: &DataState| ds.get(0));
        assert_eq!(values, vec![11.0, 12.0]);
    }

    #[test]
    fn test_sample_next_keeps_size() {
        let set = SampleSet::generate(&system_with_value(0.0), 4);
        let mut rng = SimRng::new(42);
        let next = set.sample_next(&mut rng).unwrap();
        assert_eq!(next.size(), 4);
        assert_eq!(next.states()[0].data_state().step(), 1);
    }

    // Mutation test: penalty helper produces a shareable closure.
    #[test]
    fn test_penalty_helper() {
        let set = set_of(&[4.0]);
        let p = penalty(|ds| ds.get(0) * 2.0);
        assert_eq!(set.eval_penalty(&*p), vec![8.0]);
    }
}
