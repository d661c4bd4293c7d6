//! Robustness formulas.
//!
//! An atomic robustness formula perturbs the nominal sequence at the
//! evaluation step, measures the drift through a distance expression, and
//! compares it against a threshold.

use std::str::FromStr;

use crate::engine::distance::DistanceExpression;
use crate::engine::perturbation::Perturbation;
use crate::engine::sequence::EvolutionSequence;
use crate::error::{SimError, SimResult};

/// Comparison operator over distance values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationOperator {
    /// `v1 < v2`
    LessThan,
    /// `v1 <= v2`
    LessOrEqual,
    /// `v1 == v2`
    Equal,
    /// `v1 >= v2`
    GreaterOrEqual,
    /// `v1 > v2`
    GreaterThan,
}

impl RelationOperator {
    /// Evaluate the relation on two values.
    #[must_use]
    pub fn eval(self, v1: f64, v2: f64) -> bool {
        match self {
            Self::LessThan => v1 < v2,
            Self::LessOrEqual => v1 <= v2,
            Self::Equal => (v1 - v2).abs() < f64::EPSILON,
            Self::GreaterOrEqual => v1 >= v2,
            Self::GreaterThan => v1 > v2,
        }
    }

    /// Symbolic form of the operator.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
            Self::Equal => "==",
            Self::GreaterOrEqual => ">=",
            Self::GreaterThan => ">",
        }
    }
}

impl FromStr for RelationOperator {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Self::LessThan),
            "<=" => Ok(Self::LessOrEqual),
            "==" | "=" => Ok(Self::Equal),
            ">=" => Ok(Self::GreaterOrEqual),
            ">" => Ok(Self::GreaterThan),
            other => Err(SimError::config(format!(
                "unknown relation operator '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for RelationOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// `distance(nominal, perturbed) relop threshold` at a step.
pub struct AtomicRobustnessFormula {
    perturbation: Perturbation,
    expression: Box<dyn DistanceExpression + Send + Sync>,
    relop: RelationOperator,
    threshold: f64,
}

impl AtomicRobustnessFormula {
    /// Build a formula from its four components.
    #[must_use]
    pub fn new(
        perturbation: Perturbation,
        expression: impl DistanceExpression + Send + Sync + 'static,
        relop: RelationOperator,
        threshold: f64,
    ) -> Self {
        Self {
            perturbation,
            expression: Box::new(expression),
            relop,
            threshold,
        }
    }

    /// Evaluate the formula at `step`.
    ///
    /// The nominal sequence is perturbed at `step` with a replication
    /// factor of `scale` samples per nominal sample, the distance
    /// expression is computed between the two sequences, and the result
    /// is compared against the threshold.
    ///
    /// # Errors
    ///
    /// Propagates generation and distance failures.
    pub fn eval(
        &self,
        scale: usize,
        step: usize,
        sequence: &mut EvolutionSequence,
    ) -> SimResult<bool> {
        let value = self.distance(scale, step, sequence)?;
        Ok(self.relop.eval(value, self.threshold))
    }

    /// The raw distance value the formula compares.
    ///
    /// # Errors
    ///
    /// Propagates generation and distance failures.
    pub fn distance(
        &self,
        scale: usize,
        step: usize,
        sequence: &mut EvolutionSequence,
    ) -> SimResult<f64> {
        let mut perturbed = sequence.apply(self.perturbation.clone(), step, scale)?;
        self.expression.compute(step, sequence, &mut perturbed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::controller::{Controller, ControllerRegistry};
    use crate::engine::distance::{AtomicDistance, MaxIntervalDistance};
    use crate::engine::ds::{penalty, DataState, DataStateFn, DataStateUpdate};
    use crate::engine::rng::SimRng;
    use crate::engine::system::ControlledSystem;
    use std::sync::Arc;

    fn counting_sequence() -> EvolutionSequence {
        let mut registry = ControllerRegistry::new();
        registry.set(
            "Count",
            Controller::do_action(
                |_rng, ds: &DataState| vec![DataStateUpdate::new(0, ds.get(0) + 1.0)],
                Controller::exec("Count"),
            ),
        );
        let env: Arc<DataStateFn> = Arc::new(|_rng: &mut SimRng, ds: &DataState| ds.clone());
        let system = ControlledSystem::new(
            Arc::new(registry),
            Controller::exec("Count"),
            env,
            DataState::zeroed(1),
        );
        EvolutionSequence::new(SimRng::new(42), &system, 2)
    }

    fn shift_perturbation(delta: f64) -> Perturbation {
        Perturbation::atomic(
            0,
            Arc::new(move |_rng: &mut SimRng, ds: &DataState| {
                ds.apply(&[DataStateUpdate::new(0, ds.get(0) + delta)])
            }),
        )
    }

    #[test]
    fn test_relation_operator_eval() {
        assert!(RelationOperator::LessThan.eval(1.0, 2.0));
        assert!(!RelationOperator::LessThan.eval(2.0, 2.0));
        assert!(RelationOperator::LessOrEqual.eval(2.0, 2.0));
        assert!(RelationOperator::Equal.eval(2.0, 2.0));
        assert!(RelationOperator::GreaterOrEqual.eval(2.0, 2.0));
        assert!(RelationOperator::GreaterThan.eval(3.0, 2.0));
    }

    #[test]
    fn test_relation_operator_parse() {
        assert_eq!(
            "<".parse::<RelationOperator>().unwrap(),
            RelationOperator::LessThan
        );
        assert_eq!(
            ">=".parse::<RelationOperator>().unwrap(),
            RelationOperator::GreaterOrEqual
        );
        assert_eq!(
            "=".parse::<RelationOperator>().unwrap(),
            RelationOperator::Equal
        );
        assert!("!=".parse::<RelationOperator>().is_err());
    }

    #[test]
    fn test_relation_operator_display() {
        assert_eq!(RelationOperator::LessOrEqual.to_string(), "<=");
        assert_eq!(RelationOperator::Equal.to_string(), "==");
    }

    #[test]
    fn test_formula_holds_under_small_drift() {
        let mut seq = counting_sequence();
        let formula = AtomicRobustnessFormula::new(
            shift_perturbation(0.5),
            AtomicDistance::leq(penalty(|ds| ds.get(0))),
            RelationOperator::LessOrEqual,
            1.0,
        );
        assert!(formula.eval(1, 2, &mut seq).unwrap());
    }

    #[test]
    fn test_formula_fails_under_large_drift() {
        let mut seq = counting_sequence();
        let formula = AtomicRobustnessFormula::new(
            shift_perturbation(5.0),
            AtomicDistance::leq(penalty(|ds| ds.get(0))),
            RelationOperator::LessOrEqual,
            1.0,
        );
        assert!(!formula.eval(1, 2, &mut seq).unwrap());
    }

    #[test]
    fn test_formula_distance_value() {
        let mut seq = counting_sequence();
        let formula = AtomicRobustnessFormula::new(
            shift_perturbation(3.0),
            AtomicDistance::leq(penalty(|ds| ds.get(0))),
            RelationOperator::LessOrEqual,
            1.0,
        );
        let d = formula.distance(1, 2, &mut seq).unwrap();
        assert!((d - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_formula_over_interval() {
        let mut seq = counting_sequence();
        let inner = AtomicDistance::leq(penalty(|ds| ds.get(0)));
        let formula = AtomicRobustnessFormula::new(
            shift_perturbation(2.0),
            MaxIntervalDistance::new(inner, 0, 4).unwrap(),
            RelationOperator::GreaterThan,
            1.0,
        );
        assert!(formula.eval(1, 0, &mut seq).unwrap());
    }
}
