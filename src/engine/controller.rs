//! Process-algebra controllers.
//!
//! A controller decides, once per evolution step, a batch of data-state
//! updates and its own successor. Guards and branches resolve within the
//! same step; only `Tick` and `Action` consume the step. Recursion is
//! expressed by name through a [`ControllerRegistry`], so cyclic control
//! programs need no cyclic data structures.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::engine::ds::{DataState, DataStateUpdate};
use crate::engine::rng::SimRng;
use crate::error::{SimError, SimResult};

/// A randomized guard over data states.
pub type GuardFn = dyn Fn(&mut SimRng, &DataState) -> bool + Send + Sync;

/// A randomized action computing a batch of updates.
pub type ActionFn = dyn Fn(&mut SimRng, &DataState) -> Vec<DataStateUpdate> + Send + Sync;

/// One step executed by a controller: its effect on the data state and the
/// controller governing the next step.
#[derive(Clone)]
pub struct EffectStep {
    /// Updates to apply to the data state.
    pub updates: Vec<DataStateUpdate>,
    /// Controller enabled at the next step.
    pub next: Arc<Controller>,
}

impl fmt::Debug for EffectStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectStep")
            .field("updates", &self.updates)
            .field("next", &self.next)
            .finish()
    }
}

/// A control program over data states.
#[derive(Clone)]
pub enum Controller {
    /// Evaluates `guard` and continues with the matching branch in the
    /// same step.
    IfThenElse {
        /// Branch condition.
        guard: Arc<GuardFn>,
        /// Controller executed when the guard holds.
        then_branch: Arc<Controller>,
        /// Controller executed otherwise.
        else_branch: Arc<Controller>,
    },
    /// Emits the updates computed by `action` and moves to `next`.
    Action {
        /// Update computation.
        action: Arc<ActionFn>,
        /// Successor controller.
        next: Arc<Controller>,
    },
    /// Consumes one step with no effect.
    Tick {
        /// Successor controller.
        next: Arc<Controller>,
    },
    /// Delegates to the controller registered under `name`.
    Exec {
        /// Registry name of the referenced controller.
        name: String,
    },
}

impl Controller {
    /// Branching controller.
    #[must_use]
    pub fn if_then_else(
        guard: impl Fn(&mut SimRng, &DataState) -> bool + Send + Sync + 'static,
        then_branch: Self,
        else_branch: Self,
    ) -> Self {
        Self::IfThenElse {
            guard: Arc::new(guard),
            then_branch: Arc::new(then_branch),
            else_branch: Arc::new(else_branch),
        }
    }

    /// Controller executing `action` then behaving as `next`.
    #[must_use]
    pub fn do_action(
        action: impl Fn(&mut SimRng, &DataState) -> Vec<DataStateUpdate> + Send + Sync + 'static,
        next: Self,
    ) -> Self {
        Self::Action {
            action: Arc::new(action),
            next: Arc::new(next),
        }
    }

    /// Controller idling for one step then behaving as `next`.
    #[must_use]
    pub fn do_tick(next: Self) -> Self {
        Self::Tick {
            next: Arc::new(next),
        }
    }

    /// Reference to a registry entry, resolved lazily at execution time.
    #[must_use]
    pub fn exec(name: impl Into<String>) -> Self {
        Self::Exec { name: name.into() }
    }

    /// Execute one step of the controller.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownController`] when an `Exec` reference
    /// names a controller absent from `registry`.
    pub fn next(
        &self,
        registry: &ControllerRegistry,
        rng: &mut SimRng,
        state: &DataState,
    ) -> SimResult<EffectStep> {
        match self {
            Self::IfThenElse {
                guard,
                then_branch,
                else_branch,
            } => {
                if guard(rng, state) {
                    then_branch.next(registry, rng, state)
                } else {
                    else_branch.next(registry, rng, state)
                }
            }
            Self::Action { action, next } => Ok(EffectStep {
                updates: action(rng, state),
                next: Arc::clone(next),
            }),
            Self::Tick { next } => Ok(EffectStep {
                updates: Vec::new(),
                next: Arc::clone(next),
            }),
            Self::Exec { name } => registry.get(name)?.next(registry, rng, state),
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IfThenElse { .. } => write!(f, "IfThenElse"),
            Self::Action { .. } => write!(f, "Action"),
            Self::Tick { .. } => write!(f, "Tick"),
            Self::Exec { name } => write!(f, "Exec({name})"),
        }
    }
}

/// Named controllers supporting recursive references.
#[derive(Debug, Default)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Arc<Controller>>,
}

impl ControllerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `controller` under `name`, replacing any previous entry.
    pub fn set(&mut self, name: impl Into<String>, controller: Controller) {
        self.controllers.insert(name.into(), Arc::new(controller));
    }

    /// Look up the controller registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownController`] when no entry exists.
    pub fn get(&self, name: &str) -> SimResult<Arc<Controller>> {
        self.controllers
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| SimError::UnknownController {
                name: name.to_string(),
            })
    }

    /// Registered names, sorted for stable diagnostics.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.controllers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop() -> Controller {
        Controller::do_tick(Controller::exec("Stop"))
    }

    #[test]
    fn test_tick_has_no_effect() {
        let registry = ControllerRegistry::new();
        let mut rng = SimRng::new(42);
        let state = DataState::zeroed(2);

        let step = Controller::do_tick(stop())
            .next(&registry, &mut rng, &state)
            .unwrap();
        assert!(step.updates.is_empty());
    }

    #[test]
    fn test_action_emits_updates() {
        let registry = ControllerRegistry::new();
        let mut rng = SimRng::new(42);
        let state = DataState::zeroed(2);

        let ctrl = Controller::do_action(|_rng, _ds| vec![DataStateUpdate::new(1, 3.0)], stop());
        let step = ctrl.next(&registry, &mut rng, &state).unwrap();
        assert_eq!(step.updates.len(), 1);
        assert_eq!(step.updates[0].index, 1);
    }

    #[test]
    fn test_if_then_else_dispatch() {
        let registry = ControllerRegistry::new();
        let mut rng = SimRng::new(42);

        let ctrl = Controller::if_then_else(
            |_rng, ds: &DataState| ds.get(0) > 0.0,
            Controller::do_action(|_rng, _ds| vec![DataStateUpdate::new(1, 1.0)], stop()),
            Controller::do_action(|_rng, _ds| vec![DataStateUpdate::new(1, -1.0)], stop()),
        );

        let positive = DataState::zeroed(2).apply(&[DataStateUpdate::new(0, 5.0)]);
        let step = ctrl.next(&registry, &mut rng, &positive).unwrap();
        assert!((step.updates[0].value - 1.0).abs() < f64::EPSILON);

        let zero = DataState::zeroed(2);
        let step = ctrl.next(&registry, &mut rng, &zero).unwrap();
        assert!((step.updates[0].value + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_exec_resolves_through_registry() {
        let mut registry = ControllerRegistry::new();
        registry.set(
            "Control",
            Controller::do_action(|_rng, _ds| vec![DataStateUpdate::new(0, 9.0)], stop()),
        );
        let mut rng = SimRng::new(42);
        let state = DataState::zeroed(1);

        let step = Controller::exec("Control")
            .next(&registry, &mut rng, &state)
            .unwrap();
        assert!((step.updates[0].value - 9.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_exec_unknown_name_errors() {
        let registry = ControllerRegistry::new();
        let mut rng = SimRng::new(42);
        let state = DataState::zeroed(1);

        let err = Controller::exec("Missing")
            .next(&registry, &mut rng, &state)
            .unwrap_err();
        assert!(matches!(err, SimError::UnknownController { .. }));
    }

    #[test]
    fn test_named_recursion_loops() {
        let mut registry = ControllerRegistry::new();
        registry.set(
            "Count",
            Controller::do_action(
                |_rng, ds: &DataState| vec![DataStateUpdate::new(0, ds.get(0) + 1.0)],
                Controller::exec("Count"),
            ),
        );
        let mut rng = SimRng::new(42);
        let mut state = DataState::zeroed(1);
        let mut ctrl = registry.get("Count").unwrap();

        for _ in 0..5 {
            let step = ctrl.next(&registry, &mut rng, &state).unwrap();
            state = state.apply(&step.updates);
            ctrl = step.next;
        }
        assert!((state.get(0) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_registry_names_sorted() {
        let mut registry = ControllerRegistry::new();
        registry.set("Zulu", stop());
        registry.set("Alpha", stop());
        assert_eq!(registry.names(), vec!["Alpha", "Zulu"]);
    }

    #[test]
    fn test_registry_set_replaces() {
        let mut registry = ControllerRegistry::new();
        registry.set("C", Controller::do_tick(Controller::exec("C")));
        registry.set(
            "C",
            Controller::do_action(|_rng, _ds| vec![DataStateUpdate::new(0, 1.0)], stop()),
        );
        let mut rng = SimRng::new(42);
        let state = DataState::zeroed(1);
        let step = registry
            .get("C")
            .unwrap()
            .next(&registry, &mut rng, &state)
            .unwrap();
        assert_eq!(step.updates.len(), 1);
    }

    #[test]
    fn test_controller_debug() {
        assert_eq!(format!("{:?}", Controller::exec("Control")), "Exec(Control)");
        assert_eq!(format!("{:?}", stop()), "Tick");
    }
}
