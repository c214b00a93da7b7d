//! Model building and solving.
//!
//! [`ProductionSolver`] owns one backend instance and walks a strict state
//! machine: a model must be built before it can be solved, and a solution can
//! only be read after a solve that produced one. Backends implement
//! [`model::ModelBackend`] and are selected by [`model::BackendKind`].

use num_traits::ToPrimitive;
use thiserror::Error;

use crate::{
    constraints::{Constraint, ConstraintRegistry},
    data::{DataError, ProblemData},
};

pub mod manager;
pub mod model;

#[cfg(feature = "solver-highs")]
mod highs;
#[cfg(feature = "solver-microlp")]
mod microlp;

#[cfg(feature = "solver-highs")]
pub use highs::HighsBackend;
#[cfg(feature = "solver-microlp")]
pub use microlp::MicrolpBackend;

use crate::solution::{Allocation, DerivedTotals, Solution, SolveStatus};
use manager::ConfigError;
use model::{
    BackendKind, BackendOutcome, LinExpr, ModelBackend, ObjectiveSense, Relation, SolveSettings,
    VarKey, VariableMap,
};

/// Errors raised while building or solving a model.
#[derive(Debug, Error)]
pub enum SolverError {
    /// An operation was called out of order.
    #[error("cannot {operation}: requires {requires}")]
    ModelState {
        /// Operation that was attempted.
        operation: &'static str,

        /// State the operation requires.
        requires: &'static str,
    },

    /// A solution was requested but the solve produced none.
    #[error("no solution available: solve finished with status {status}")]
    NoSolution {
        /// Terminal status of the solve.
        status: SolveStatus,
    },

    /// A constraint's required fact tables are absent.
    #[error("constraint {constraint}: {source}")]
    ConstraintData {
        /// Name of the failing constraint.
        constraint: String,

        /// The underlying data validation failure.
        source: DataError,
    },

    /// The problem data itself is invalid.
    #[error(transparent)]
    Data(#[from] DataError),

    /// The backend reported values inconsistent with the recorded model.
    #[error("solver invariant violated: {message}")]
    InvariantViolation {
        /// What went wrong.
        message: String,
    },
}

/// Which linear objective to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveKind {
    /// Minimize total production cost.
    MinimizeCost,

    /// Maximize total output units.
    MaximizeOutput,
}

/// Instantiate the backend for an engine.
///
/// # Errors
///
/// Returns [`ConfigError::BackendUnavailable`] when the requested engine was
/// not compiled in.
pub fn create_backend(kind: BackendKind) -> Result<Box<dyn ModelBackend>, ConfigError> {
    match kind {
        #[cfg(feature = "solver-microlp")]
        BackendKind::Microlp => Ok(Box::new(MicrolpBackend::new())),

        #[cfg(not(feature = "solver-microlp"))]
        BackendKind::Microlp => Err(ConfigError::BackendUnavailable { kind }),

        #[cfg(feature = "solver-highs")]
        BackendKind::Highs => Ok(Box::new(HighsBackend::new())),

        #[cfg(not(feature = "solver-highs"))]
        BackendKind::Highs => Err(ConfigError::BackendUnavailable { kind }),
    }
}

/// Create one non-negative integer decision variable per allowed
/// `(product, resource, period)` triple.
pub(crate) fn create_decision_variables(
    backend: &mut dyn ModelBackend,
    data: &ProblemData,
) -> VariableMap {
    let mut variables = VariableMap::default();

    for product in data.products() {
        for resource in data.resources() {
            if !data.is_allowed(product, resource) {
                continue;
            }

            for period in data.periods() {
                let key = VarKey::new(product, resource, period);
                let var = backend.add_integer_var(key.to_string(), 0.0);
                variables.insert(key, var);
            }
        }
    }

    variables
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SolverState {
    Uninitialized,
    ModelBuilt,
    Solved,
}

/// Owns one model build and one solve against a single backend.
#[derive(Debug)]
pub struct ProductionSolver {
    backend: Box<dyn ModelBackend>,
    registry: ConstraintRegistry,
    settings: SolveSettings,
    variables: VariableMap,
    data: Option<ProblemData>,
    objective: Option<ObjectiveKind>,
    outcome: Option<BackendOutcome>,
    state: SolverState,
}

impl ProductionSolver {
    /// Wrap a backend with default engine settings and no constraints.
    pub fn new(backend: Box<dyn ModelBackend>) -> Self {
        Self::with_settings(backend, SolveSettings::default())
    }

    /// Wrap a backend with explicit engine settings.
    pub fn with_settings(backend: Box<dyn ModelBackend>, settings: SolveSettings) -> Self {
        Self {
            backend,
            registry: ConstraintRegistry::new(),
            settings,
            variables: VariableMap::default(),
            data: None,
            objective: None,
            outcome: None,
            state: SolverState::Uninitialized,
        }
    }

    /// Which engine this solver drives.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Register a constraint to be applied at model build time.
    pub fn register_constraint(&mut self, name: impl Into<String>, constraint: Box<dyn Constraint>) {
        self.registry.register(name, constraint);
    }

    /// The constraints registered on this solver.
    pub fn registry(&self) -> &ConstraintRegistry {
        &self.registry
    }

    /// Decision variables of the built model. Empty before a build.
    pub fn variables(&self) -> &VariableMap {
        &self.variables
    }

    /// Objective the built model optimizes, absent before a build.
    pub fn objective(&self) -> Option<ObjectiveKind> {
        self.objective
    }

    /// Status of the last solve.
    pub fn status(&self) -> SolveStatus {
        self.outcome
            .as_ref()
            .map_or(SolveStatus::NotSolved, |outcome| outcome.status)
    }

    /// Build a model minimizing total production cost.
    ///
    /// The objective is the sum of `cost · yield · x` over every decision
    /// variable.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::ModelState`] if a model was already built, or
    /// any constraint validation or application failure.
    pub fn build_minimize_cost_model(&mut self, data: &ProblemData) -> Result<(), SolverError> {
        self.begin_build("build the cost model", data)?;

        let mut objective = LinExpr::default();
        for (key, var) in self.variables.iter() {
            let weight = data.cost_of(&key.product, &key.resource) * data.yield_of(&key.product);
            objective.push(var, weight);
        }

        self.backend.set_objective(objective, ObjectiveSense::Minimize);
        self.registry
            .apply_constraints(self.backend.as_mut(), &self.variables, data)?;

        self.finish_build(ObjectiveKind::MinimizeCost, data);

        Ok(())
    }

    /// Build a model maximizing total output units.
    ///
    /// The objective is the sum of `yield · x` over every decision variable.
    /// With `limit_to_demand`, per `(product, period)` output caps are added
    /// on top of the registered constraints so the maximization cannot
    /// overshoot recorded demand.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::ModelState`] if a model was already built, or
    /// any constraint validation or application failure.
    pub fn build_maximize_output_model(
        &mut self,
        data: &ProblemData,
        limit_to_demand: bool,
    ) -> Result<(), SolverError> {
        self.begin_build("build the output model", data)?;

        let mut objective = LinExpr::default();
        for (key, var) in self.variables.iter() {
            objective.push(var, data.yield_of(&key.product));
        }

        self.backend.set_objective(objective, ObjectiveSense::Maximize);
        self.registry
            .apply_constraints(self.backend.as_mut(), &self.variables, data)?;

        if limit_to_demand {
            for ((product, period), &demand) in data.demand() {
                let mut usage = LinExpr::default();
                for resource in data.resources() {
                    if let Some(var) = self.variables.get(product, resource, period) {
                        usage.push(var, 1.0);
                    }
                }

                if !usage.is_empty() {
                    self.backend.add_constraint(usage, Relation::Leq, demand);
                }
            }
        }

        self.finish_build(ObjectiveKind::MaximizeOutput, data);

        Ok(())
    }

    /// Solve the built model.
    ///
    /// Terminal outcomes such as infeasibility are reported as the returned
    /// [`SolveStatus`], not as errors.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::ModelState`] before a model is built, or a
    /// backend failure.
    pub fn solve_model(&mut self) -> Result<SolveStatus, SolverError> {
        if self.state != SolverState::ModelBuilt {
            return Err(SolverError::ModelState {
                operation: "solve the model",
                requires: "a built model",
            });
        }

        tracing::info!(
            backend = %self.backend.kind(),
            variables = self.variables.len(),
            "starting solve"
        );

        let outcome = self.backend.solve(&self.settings)?;
        let status = outcome.status;

        tracing::info!(%status, objective = ?outcome.objective_value, "solve finished");

        self.outcome = Some(outcome);
        self.state = SolverState::Solved;

        Ok(status)
    }

    /// Extract the solved plan.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::ModelState`] before a solve, and
    /// [`SolverError::NoSolution`] when the solve finished without an
    /// incumbent, so stale or absent data is never returned as a plan.
    pub fn get_solution(&self) -> Result<Solution, SolverError> {
        if self.state != SolverState::Solved {
            return Err(SolverError::ModelState {
                operation: "extract the solution",
                requires: "a solved model",
            });
        }

        let (outcome, data) = match (&self.outcome, &self.data) {
            (Some(outcome), Some(data)) => (outcome, data),
            _ => {
                return Err(SolverError::ModelState {
                    operation: "extract the solution",
                    requires: "a solved model",
                });
            }
        };

        if !outcome.status.has_solution() {
            return Err(SolverError::NoSolution {
                status: outcome.status,
            });
        }

        let values = outcome
            .values
            .as_ref()
            .ok_or_else(|| SolverError::NoSolution {
                status: outcome.status,
            })?;

        let mut allocations = Vec::new();
        for (key, var) in self.variables.iter() {
            let raw = values
                .get(var.index())
                .copied()
                .ok_or_else(|| SolverError::InvariantViolation {
                    message: format!("backend returned no value for variable {key}"),
                })?;

            if raw > ACTIVITY_THRESHOLD {
                let quantity = integral_quantity(key, raw)?;

                allocations.push(Allocation {
                    product: key.product.clone(),
                    resource: key.resource.clone(),
                    period: key.period.clone(),
                    quantity,
                });
            }
        }

        allocations.sort_by(|a, b| {
            (&a.product, &a.resource, &a.period).cmp(&(&b.product, &b.resource, &b.period))
        });

        let totals = derive_totals(&allocations, data);

        Ok(Solution {
            status: outcome.status,
            objective_value: outcome.objective_value,
            values: allocations,
            totals,
        })
    }

    fn begin_build(
        &mut self,
        operation: &'static str,
        data: &ProblemData,
    ) -> Result<(), SolverError> {
        if self.state != SolverState::Uninitialized {
            return Err(SolverError::ModelState {
                operation,
                requires: "a fresh solver",
            });
        }

        self.variables = create_decision_variables(self.backend.as_mut(), data);

        Ok(())
    }

    fn finish_build(&mut self, objective: ObjectiveKind, data: &ProblemData) {
        tracing::debug!(
            variables = self.variables.len(),
            constraints = self.registry.len(),
            objective = ?objective,
            "model built"
        );

        self.data = Some(data.clone());
        self.objective = Some(objective);
        self.state = SolverState::ModelBuilt;
    }
}

/// Solved values below this are treated as zero and dropped.
const ACTIVITY_THRESHOLD: f64 = 1e-6;

/// Farther from the nearest integer than this and the value is not a valid
/// integer relaxation artifact.
const INTEGRALITY_TOLERANCE: f64 = 1e-6;

/// Convert a solved value to a quantity, rejecting anything that is not an
/// integer up to solver tolerance.
fn integral_quantity(key: &VarKey, raw: f64) -> Result<u64, SolverError> {
    let rounded = raw.round();

    if (raw - rounded).abs() > INTEGRALITY_TOLERANCE {
        return Err(SolverError::InvariantViolation {
            message: format!("variable {key} has non-integral value {raw}"),
        });
    }

    rounded
        .to_u64()
        .ok_or_else(|| SolverError::InvariantViolation {
            message: format!("variable {key} has out-of-range value {raw}"),
        })
}

fn derive_totals(allocations: &[Allocation], data: &ProblemData) -> DerivedTotals {
    let mut total_output = 0.0;
    let mut total_cost = 0.0;

    for allocation in allocations {
        #[expect(clippy::cast_precision_loss, reason = "quantities fit well below 2^53")]
        let quantity = allocation.quantity as f64;
        let output = data.yield_of(&allocation.product) * quantity;

        total_output += output;
        total_cost += data.cost_of(&allocation.product, &allocation.resource) * output;
    }

    let average_cost_per_unit = (total_output > 0.0).then(|| total_cost / total_output);

    DerivedTotals {
        total_output,
        total_cost,
        average_cost_per_unit,
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::fixtures;

    use super::*;

    #[test]
    fn solution_before_build_fails_loudly() {
        let solver = ProductionSolver::new(Box::new(fixtures::recording_backend()));

        assert!(matches!(
            solver.get_solution(),
            Err(SolverError::ModelState { .. })
        ));
    }

    #[test]
    fn solve_before_build_fails_loudly() {
        let mut solver = ProductionSolver::new(Box::new(fixtures::recording_backend()));

        assert!(matches!(
            solver.solve_model(),
            Err(SolverError::ModelState { .. })
        ));
    }

    #[test]
    fn building_twice_is_rejected() -> TestResult {
        let data = fixtures::two_period_problem([120.0, 80.0], [100.0, 100.0])?;
        let mut solver = ProductionSolver::new(Box::new(fixtures::recording_backend()));

        solver.build_minimize_cost_model(&data)?;

        assert!(matches!(
            solver.build_maximize_output_model(&data, false),
            Err(SolverError::ModelState { .. })
        ));

        Ok(())
    }

    #[test]
    fn fractional_solved_values_are_rejected_not_rounded() {
        let key = VarKey::new("Classic", "Standard", "Week 1");

        assert_eq!(integral_quantity(&key, 3.0000004).ok(), Some(3));
        assert!(matches!(
            integral_quantity(&key, 3.4),
            Err(SolverError::InvariantViolation { .. })
        ));
        assert!(matches!(
            integral_quantity(&key, -1.0),
            Err(SolverError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn variables_only_exist_for_allowed_pairs() -> TestResult {
        let data = crate::data::ProblemData::builder()
            .products(["Classic", "Premium"])
            .resources(["Standard"])
            .periods(["Week 1"])
            .supply("Standard", "Week 1", 50.0)
            .yield_per_unit("Classic", 10.0)
            .yield_per_unit("Premium", 8.0)
            .allow("Classic", "Standard")
            .build()?;

        let mut solver = ProductionSolver::new(Box::new(fixtures::recording_backend()));
        solver.build_minimize_cost_model(&data)?;

        assert_eq!(solver.variables().len(), 1);
        assert!(solver.variables().contains("Classic", "Standard", "Week 1"));

        Ok(())
    }

    #[test]
    fn derived_totals_weight_quantities_by_yield_and_cost() -> TestResult {
        let data = fixtures::two_period_problem([120.0, 80.0], [100.0, 100.0])?;
        let allocations = vec![
            Allocation {
                product: "Classic".to_owned(),
                resource: "Standard".to_owned(),
                period: "Week 1".to_owned(),
                quantity: 10,
            },
            Allocation {
                product: "Classic".to_owned(),
                resource: "Standard".to_owned(),
                period: "Week 2".to_owned(),
                quantity: 10,
            },
        ];

        let totals = derive_totals(&allocations, &data);

        assert_eq!(totals.total_output, 200.0);
        assert_eq!(totals.total_cost, 200.0 * data.cost_of("Classic", "Standard"));
        assert_eq!(
            totals.average_cost_per_unit,
            Some(data.cost_of("Classic", "Standard"))
        );

        Ok(())
    }
}
