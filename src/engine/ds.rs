//! Data states and batched updates.
//!
//! A data state is a fixed-size vector of `f64` environment variables plus
//! a step counter. States are immutable: applying a batch of updates
//! produces a new state, so samples of the same step can share history
//! freely.

use std::sync::Arc;

use crate::engine::rng::SimRng;

/// A penalty function mapping a data state to a non-negative score.
pub type PenaltyFn = dyn Fn(&DataState) -> f64 + Send + Sync;

/// A randomized transformation of a data state (perturbation effects,
/// environment dynamics).
pub type DataStateFn = dyn Fn(&mut SimRng, &DataState) -> DataState + Send + Sync;

/// Convenience constructor for shared penalty functions.
#[must_use]
pub fn penalty(f: impl Fn(&DataState) -> f64 + Send + Sync + 'static) -> Arc<PenaltyFn> {
    Arc::new(f)
}

/// Assignment of a value to one environment variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataStateUpdate {
    /// Index of the variable to update.
    pub index: usize,
    /// New value.
    pub value: f64,
}

impl DataStateUpdate {
    /// Create an update for variable `index`.
    #[must_use]
    pub const fn new(index: usize, value: f64) -> Self {
        Self { index, value }
    }
}

impl std::fmt::Display for DataStateUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}<-{}", self.index, self.value)
    }
}

/// Immutable vector of environment variables with a step counter.
#[derive(Debug, Clone, PartialEq)]
pub struct DataState {
    data: Vec<f64>,
    step: usize,
}

impl DataState {
    /// Create a state of `size` variables, all zero.
    #[must_use]
    pub fn zeroed(size: usize) -> Self {
        Self {
            data: vec![0.0; size],
            step: 0,
        }
    }

    /// Create a state of `size` variables initialized by `init`.
    ///
    /// Variables not covered by the scenario's layout are conventionally
    /// initialized to NaN so that reads of unset variables are visible.
    #[must_use]
    pub fn with_init(size: usize, init: impl Fn(usize) -> f64) -> Self {
        Self {
            data: (0..size).map(init).collect(),
            step: 0,
        }
    }

    /// Number of environment variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the state holds no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Value of variable `index`.
    ///
    /// Out-of-range reads return NaN, mirroring unset variables.
    #[must_use]
    pub fn get(&self, index: usize) -> f64 {
        self.data.get(index).copied().unwrap_or(f64::NAN)
    }

    /// Current step counter.
    #[must_use]
    pub const fn step(&self) -> usize {
        self.step
    }

    /// Return a copy with the step counter advanced by one.
    #[must_use]
    pub fn tick(&self) -> Self {
        let mut next = self.clone();
        next.step += 1;
        next
    }

    /// Return a copy with the step counter set to `step`.
    #[must_use]
    pub fn with_step(&self, step: usize) -> Self {
        let mut next = self.clone();
        next.step = step;
        next
    }

    /// Apply a batch of updates, producing a new state.
    ///
    /// Later updates to the same index win, matching sequential
    /// assignment. Updates to out-of-range indexes are ignored.
    #[must_use]
    pub fn apply(&self, updates: &[DataStateUpdate]) -> Self {
        let mut next = self.clone();
        for update in updates {
            if update.index < next.data.len() {
                next.data[update.index] = update.value;
            }
        }
        next
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Falsification test: apply never changes the vector length.
        #[test]
        fn prop_apply_preserves_len(size in 1usize..32, index in 0usize..64, value in -1e6f64..1e6) {
            let ds = DataState::zeroed(size);
            let updated = ds.apply(&[DataStateUpdate::new(index, value)]);
            prop_assert_eq!(updated.len(), size);
        }

        /// Falsification test: in-range updates are read back exactly.
        #[test]
        fn prop_apply_roundtrip(size in 1usize..32, value in -1e6f64..1e6) {
            let ds = DataState::zeroed(size);
            let index = size - 1;
            let updated = ds.apply(&[DataStateUpdate::new(index, value)]);
            prop_assert!((updated.get(index) - value).abs() < f64::EPSILON);
        }
    }
}
