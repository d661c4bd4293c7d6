//! # swerve
//!
//! Statistical robustness evaluation of autonomous-driving scenarios under
//! sensor perturbations.
//!
//! A scenario describes a small population of vehicles, a rule-based
//! controller for one of them, and a set of perturbations (sensor offsets,
//! invisible cars, erratic drivers). The engine samples an evolution
//! sequence of the nominal system, applies perturbations to obtain
//! perturbed sequences, and measures how far the perturbed behaviour drifts
//! from the nominal one through Wasserstein-style distances over penalty
//! functions.
//!
//! ## Example
//!
//! ```rust
//! use swerve::prelude::*;
//!
//! let config = SimConfig::builder()
//!     .seed(42)
//!     .scenario("single-lane-two-cars")
//!     .build();
//! assert_eq!(config.reproducibility.seed, 42);
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::too_many_lines,
    clippy::missing_const_for_fn,  // Many functions can't be const in stable Rust
    clippy::needless_range_loop,   // Sometimes range loops are clearer
)]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod scenarios;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{SimConfig, SimConfigBuilder};
    pub use crate::engine::ds::{DataState, DataStateUpdate};
    pub use crate::engine::perturbation::Perturbation;
    pub use crate::engine::rng::SimRng;
    pub use crate::engine::sequence::EvolutionSequence;
    pub use crate::error::{SimError, SimResult};
    pub use crate::scenarios::{Scenario, ScenarioParams, ScenarioRegistry};
}

/// Re-export for public API
pub use error::{SimError, SimResult};
