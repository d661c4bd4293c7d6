//! Evolution sequences.
//!
//! An evolution sequence is the lazily generated list of sample sets a
//! system passes through, one per step. Applying a perturbation at a step
//! shares the prefix, widens the perturbed step by a replication factor,
//! and runs the perturbation program alongside every later step.

use crate::engine::perturbation::Perturbation;
use crate::engine::rng::SimRng;
use crate::engine::sample::SampleSet;
use crate::engine::system::ControlledSystem;
use crate::error::SimResult;

/// Lazily generated sequence of sample sets.
#[derive(Debug, Clone)]
pub struct EvolutionSequence {
    steps: Vec<SampleSet>,
    rng: SimRng,
    perturbation: Perturbation,
}

impl EvolutionSequence {
    /// Start a nominal sequence from `size` copies of `system`.
    #[must_use]
    pub fn new(rng: SimRng, system: &ControlledSystem, size: usize) -> Self {
        Self {
            steps: vec![SampleSet::generate(system, size)],
            rng,
            perturbation: Perturbation::None,
        }
    }

    /// Number of steps generated so far.
    #[must_use]
    pub fn length(&self) -> usize {
        self.steps.len()
    }

    /// Generate sample sets up to and including step `n`.
    ///
    /// Already-generated steps are never recomputed, so distances over
    /// overlapping windows see consistent samples.
    ///
    /// # Errors
    ///
    /// Propagates controller resolution failures.
    pub fn generate_up_to(&mut self, n: usize) -> SimResult<()> {
        while self.steps.len() <= n {
            self.generate_next()?;
        }
        Ok(())
    }

    /// The sample set at step `i`, generating it if needed.
    ///
    /// # Errors
    ///
    /// Propagates controller resolution failures.
    pub fn get(&mut self, i: usize) -> SimResult<&SampleSet> {
        self.generate_up_to(i)?;
        Ok(&self.steps[i])
    }

    /// Derive a perturbed sequence starting at `step`.
    ///
    /// The prefix before `step` is shared, the sample set at `step` is
    /// replicated `scale` times, and the perturbation's initial effect
    /// (if already active) is applied to it. Later steps evolve the
    /// perturbation program before sampling and apply its effect after.
    /// The perturbed sequence draws from an independent RNG stream, so
    /// deriving it does not disturb the nominal sequence.
    ///
    /// # Errors
    ///
    /// Propagates controller resolution failures while generating the
    /// prefix.
    pub fn apply(
        &mut self,
        perturbation: Perturbation,
        step: usize,
        scale: usize,
    ) -> SimResult<Self> {
        self.generate_up_to(step)?;
        let mut rng = self.rng.fork();

        let mut steps: Vec<SampleSet> = self.steps[..step].to_vec();
        let mut perturbed = self.steps[step].replica(scale);
        if let Some(effect) = perturbation.effect() {
            perturbed = perturbed.apply_effect(&mut rng, &*effect);
        }
        steps.push(perturbed);

        Ok(Self {
            steps,
            rng,
            perturbation,
        })
    }

    fn generate_next(&mut self) -> SimResult<()> {
        self.perturbation = self.perturbation.step();
        let last = self
            .steps
            .last()
            .cloned()
            .unwrap_or_else(|| SampleSet::from_states(Vec::new()));
        let mut next = last.sample_next(&mut self.rng)?;
        if let Some(effect) = self.perturbation.effect() {
            next = next.apply_effect(&mut self.rng, &*effect);
        }
        self.steps.push(next);
        Ok(())
    }
}
