//! Distance expressions over evolution sequences.
//!
//! A distance expression compares two sequences at a step (typically the
//! nominal sequence and one of its perturbed variants) and yields a
//! non-negative drift. Interval combinators fold pointwise distances over
//! a window relative to the evaluation step.

use std::sync::Arc;

use crate::engine::ds::PenaltyFn;
use crate::engine::sequence::EvolutionSequence;
use crate::error::{SimError, SimResult};

/// Ground distance used to lift penalty values to sample sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundDistance {
    /// Penalize the second sequence exceeding the first.
    Leq,
    /// Penalize the second sequence falling below the first.
    Geq,
    /// Symmetric absolute difference.
    Abs,
}

/// Pointwise comparison of two evolution sequences.
pub trait DistanceExpression {
    /// Distance between the sequences at `step`.
    ///
    /// # Errors
    ///
    /// Propagates generation failures and incompatible sample sets.
    fn compute(
        &self,
        step: usize,
        seq1: &mut EvolutionSequence,
        seq2: &mut EvolutionSequence,
    ) -> SimResult<f64>;

    /// Distances at each step of `from..to`.
    ///
    /// # Errors
    ///
    /// Propagates the first failing step.
    fn compute_range(
        &self,
        from: usize,
        to: usize,
        seq1: &mut EvolutionSequence,
        seq2: &mut EvolutionSequence,
    ) -> SimResult<Vec<f64>> {
        (from..to).map(|i| self.compute(i, seq1, seq2)).collect()
    }
}

/// Wasserstein lifting of a penalty function at a single step.
pub struct AtomicDistance {
    penalty: Arc<PenaltyFn>,
    ground: GroundDistance,
}

impl AtomicDistance {
    /// Atomic distance over `penalty` with the given ground distance.
    #[must_use]
    pub fn new(penalty: Arc<PenaltyFn>, ground: GroundDistance) -> Self {
        Self { penalty, ground }
    }

    /// Shorthand for the `Leq` ground distance.
    #[must_use]
    pub fn leq(penalty: Arc<PenaltyFn>) -> Self {
        Self::new(penalty, GroundDistance::Leq)
    }

    /// Shorthand for the `Geq` ground distance.
    #[must_use]
    pub fn geq(penalty: Arc<PenaltyFn>) -> Self {
        Self::new(penalty, GroundDistance::Geq)
    }
}

impl DistanceExpression for AtomicDistance {
    fn compute(
        &self,
        step: usize,
        seq1: &mut EvolutionSequence,
        seq2: &mut EvolutionSequence,
    ) -> SimResult<f64> {
        let other = seq2.get(step)?.clone();
        let this = seq1.get(step)?;
        match self.ground {
            GroundDistance::Leq => this.distance_leq(&*self.penalty, &other),
            GroundDistance::Geq => this.distance_geq(&*self.penalty, &other),
            GroundDistance::Abs => this.distance_abs(&*self.penalty, &other),
        }
    }
}

/// Maximum of an inner distance over a step window.
///
/// Evaluating at step `s` takes the maximum over `[from + s, to + s)`.
pub struct MaxIntervalDistance {
    inner: Box<dyn DistanceExpression + Send + Sync>,
    from: usize,
    to: usize,
}

impl std::fmt::Debug for MaxIntervalDistance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaxIntervalDistance")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

impl MaxIntervalDistance {
    /// Maximum of `inner` over the relative window `[from, to)`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidInterval`] when the window is empty.
    pub fn new(
        inner: impl DistanceExpression + Send + Sync + 'static,
        from: usize,
        to: usize,
    ) -> SimResult<Self> {
        if from >= to {
            return Err(SimError::InvalidInterval { from, to });
        }
        Ok(Self {
            inner: Box::new(inner),
            from,
            to,
        })
    }
}

impl DistanceExpression for MaxIntervalDistance {
    fn compute(
        &self,
        step: usize,
        seq1: &mut EvolutionSequence,
        seq2: &mut EvolutionSequence,
    ) -> SimResult<f64> {
        let mut max = f64::NEG_INFINITY;
        for i in self.from + step..self.to + step {
            let d = self.inner.compute(i, seq1, seq2)?;
            max = max.max(d);
        }
        Ok(max)
    }
}
