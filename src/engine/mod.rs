//! Core simulation engine.
//!
//! Implements sampled evolution sequences of controlled systems:
//! - Deterministic RNG (PCG with partitioned seeds)
//! - Data states with batched updates
//! - Rule-based controllers with named recursion
//! - Perturbation algebra and perturbed sequences
//! - Wasserstein-style distances and robustness formulas

pub mod controller;
pub mod distance;
pub mod ds;
pub mod perturbation;
pub mod rng;
pub mod robustness;
pub mod sample;
pub mod sequence;
pub mod system;

pub use controller::{Controller, ControllerRegistry, EffectStep};
pub use distance::{AtomicDistance, DistanceExpression, GroundDistance, MaxIntervalDistance};
pub use ds::{DataState, DataStateUpdate};
pub use perturbation::Perturbation;
pub use rng::SimRng;
pub use robustness::{AtomicRobustnessFormula, RelationOperator};
pub use sample::SampleSet;
pub use sequence::EvolutionSequence;
pub use system::ControlledSystem;
