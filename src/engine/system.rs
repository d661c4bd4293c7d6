//! Controlled systems.
//!
//! A controlled system couples a control program with an environment
//! function and a data state. Sampling a step runs one controller
//! decision, applies its updates, lets the environment evolve the result,
//! and advances the step counter.

use std::sync::Arc;

use crate::engine::controller::{Controller, ControllerRegistry};
use crate::engine::ds::{DataState, DataStateFn};
use crate::engine::rng::SimRng;
use crate::error::SimResult;

/// A data state governed by a controller and an environment.
#[derive(Clone)]
pub struct ControlledSystem {
    registry: Arc<ControllerRegistry>,
    controller: Arc<Controller>,
    environment: Arc<DataStateFn>,
    state: DataState,
}

impl ControlledSystem {
    /// Create a system from its controller, environment, and initial state.
    #[must_use]
    pub fn new(
        registry: Arc<ControllerRegistry>,
        controller: Controller,
        environment: Arc<DataStateFn>,
        state: DataState,
    ) -> Self {
        Self {
            registry,
            controller: Arc::new(controller),
            environment,
            state,
        }
    }

    /// Current data state.
    #[must_use]
    pub const fn data_state(&self) -> &DataState {
        &self.state
    }

    /// Same system with a replaced data state.
    #[must_use]
    pub fn with_data_state(&self, state: DataState) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            controller: Arc::clone(&self.controller),
            environment: Arc::clone(&self.environment),
            state,
        }
    }

    /// Sample the system one step forward.
    ///
    /// Controller updates are applied before the environment function, and
    /// the step counter advances by one regardless of either.
    ///
    /// # Errors
    ///
    /// Propagates controller resolution failures.
    pub fn sample_next(&self, rng: &mut SimRng) -> SimResult<Self> {
        let step = self.controller.next(&self.registry, rng, &self.state)?;
        let current_step = self.state.step();
        let evolved = (self.environment)(rng, &self.state.apply(&step.updates));
        let next_state = evolved.with_step(current_step + 1);
        Ok(Self {
            registry: Arc::clone(&self.registry),
            controller: step.next,
            environment: Arc::clone(&self.environment),
            state: next_state,
        })
    }
}

impl std::fmt::Debug for ControlledSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlledSystem")
            .field("controller", &self.controller)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ds::DataStateUpdate;

    fn identity_env() -> Arc<DataStateFn> {
        Arc::new(|_rng: &mut SimRng, ds: &DataState| ds.clone())
    }

    fn counting_system() -> ControlledSystem {
        let mut registry = ControllerRegistry::new();
        registry.set(
            "Count",
            Controller::do_action(
                |_rng, ds: &DataState| vec![DataStateUpdate::new(0, ds.get(0) + 1.0)],
                Controller::exec("Count"),
            ),
        );
        ControlledSystem::new(
            Arc::new(registry),
            Controller::exec("Count"),
            identity_env(),
            DataState::zeroed(1),
        )
    }

    #[test]
    fn test_sample_next_applies_controller() {
        let system = counting_system();
        let mut rng = SimRng::new(42);

        let next = system.sample_next(&mut rng).unwrap();
        assert!((next.data_state().get(0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sample_next_advances_step() {
        let system = counting_system();
        let mut rng = SimRng::new(42);

        let next = system.sample_next(&mut rng).unwrap();
        assert_eq!(next.data_state().step(), 1);
        let next = next.sample_next(&mut rng).unwrap();
        assert_eq!(next.data_state().step(), 2);
    }

    #[test]
    fn test_environment_runs_after_controller() {
        let mut registry = ControllerRegistry::new();
        registry.set(
            "Set",
            Controller::do_action(
                |_rng, _ds| vec![DataStateUpdate::new(0, 10.0)],
                Controller::exec("Set"),
            ),
        );
        // Environment doubles whatever the controller wrote.
        let env: Arc<DataStateFn> = Arc::new(|_rng: &mut SimRng, ds: &DataState| {
            ds.apply(&[DataStateUpdate::new(0, ds.get(0) * 2.0)])
        });
        let system = ControlledSystem::new(
            Arc::new(registry),
            Controller::exec("Set"),
            env,
            DataState::zeroed(1),
        );
        let mut rng = SimRng::new(42);

        let next = system.sample_next(&mut rng).unwrap();
        assert!((next.data_state().get(0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_with_data_state_keeps_controller() {
        let system = counting_system();
        let replaced = system.with_data_state(DataState::zeroed(1).apply(&[DataStateUpdate::new(
            0, 100.0,
        )]));
        let mut rng = SimRng::new(42);

        let next = replaced.sample_next(&mut rng).unwrap();
        assert!((next.data_state().get(0) - 101.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_controller_propagates() {
        let system = ControlledSystem::new(
            Arc::new(ControllerRegistry::new()),
            Controller::exec("Ghost"),
            identity_env(),
            DataState::zeroed(1),
        );
        let mut rng = SimRng::new(42);
        assert!(system.sample_next(&mut rng).is_err());
    }
}
