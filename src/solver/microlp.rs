//! Backend driving the bundled microlp engine through `good_lp`.

use good_lp::{
    Expression, ProblemVariables, Solution, SolverModel, Variable, constraint,
    solvers::microlp::microlp, variable,
};

use crate::{
    solution::SolveStatus,
    solver::{
        SolverError,
        model::{
            BackendKind, BackendOutcome, LinExpr, ModelBackend, ObjectiveSense, Relation,
            SolveSettings, VarId,
        },
    },
};

#[derive(Debug, Clone)]
enum VarSpec {
    Integer { name: String, min: f64 },
    Binary { name: String },
}

/// Records the model and hands it to microlp at solve time.
///
/// microlp is pure Rust and always available, which makes it the default
/// engine, but it exposes no runtime controls: [`SolveSettings`] is advisory
/// here. Every outcome from a completed run is therefore either proven
/// optimal or a terminal status.
#[derive(Debug, Default)]
pub struct MicrolpBackend {
    vars: Vec<VarSpec>,
    constraints: Vec<(LinExpr, Relation, f64)>,
    objective: Option<(LinExpr, ObjectiveSense)>,
}

impl MicrolpBackend {
    /// Empty model.
    pub fn new() -> Self {
        Self::default()
    }

    fn to_expression(expr: &LinExpr, handles: &[Variable]) -> Expression {
        let mut out = Expression::default();
        for &(var, coefficient) in expr.terms() {
            if let Some(&handle) = handles.get(var.index()) {
                out += handle * coefficient;
            }
        }

        out
    }
}

impl ModelBackend for MicrolpBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Microlp
    }

    fn add_integer_var(&mut self, name: String, min: f64) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(VarSpec::Integer { name, min });

        id
    }

    fn add_binary_var(&mut self, name: String) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(VarSpec::Binary { name });

        id
    }

    fn add_constraint(&mut self, lhs: LinExpr, relation: Relation, rhs: f64) {
        self.constraints.push((lhs, relation, rhs));
    }

    fn set_objective(&mut self, objective: LinExpr, sense: ObjectiveSense) {
        self.objective = Some((objective, sense));
    }

    fn solve(&mut self, settings: &SolveSettings) -> Result<BackendOutcome, SolverError> {
        let Some((objective, sense)) = self.objective.clone() else {
            return Err(SolverError::ModelState {
                operation: "solve the model",
                requires: "an objective",
            });
        };

        tracing::debug!(
            time_limit = ?settings.time_limit,
            gap = settings.optimality_gap,
            "microlp has no runtime controls; settings are advisory"
        );

        let mut pb = ProblemVariables::new();
        let handles: Vec<Variable> = self
            .vars
            .iter()
            .map(|spec| match spec {
                VarSpec::Integer { name, min } => {
                    pb.add(variable().integer().min(*min).name(name.clone()))
                }
                VarSpec::Binary { name } => pb.add(variable().binary().name(name.clone())),
            })
            .collect();

        let objective_expr = Self::to_expression(&objective, &handles);
        let unsolved = match sense {
            ObjectiveSense::Minimize => pb.minimise(objective_expr),
            ObjectiveSense::Maximize => pb.maximise(objective_expr),
        };

        let mut model = unsolved.using(microlp);
        for (lhs, relation, rhs) in &self.constraints {
            let expr = Self::to_expression(lhs, &handles);
            model = model.with(match relation {
                Relation::Eq => constraint::eq(expr, *rhs),
                Relation::Leq => constraint::leq(expr, *rhs),
                Relation::Geq => constraint::geq(expr, *rhs),
            });
        }

        match model.solve() {
            Ok(solution) => {
                let values: Vec<f64> = handles.iter().map(|&handle| solution.value(handle)).collect();
                let objective_value = objective.eval(&values);

                Ok(BackendOutcome {
                    status: SolveStatus::Optimal,
                    objective_value: Some(objective_value),
                    values: Some(values),
                })
            }
            Err(good_lp::ResolutionError::Infeasible) => {
                Ok(BackendOutcome::without_solution(SolveStatus::Infeasible))
            }
            Err(good_lp::ResolutionError::Unbounded) => {
                Ok(BackendOutcome::without_solution(SolveStatus::Unbounded))
            }
            Err(error) => {
                tracing::warn!(%error, "microlp failed");

                Ok(BackendOutcome::without_solution(SolveStatus::Error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn minimizes_a_bounded_integer() -> TestResult {
        let mut backend = MicrolpBackend::new();
        let x = backend.add_integer_var("x".to_owned(), 0.0);
        backend.add_constraint(LinExpr::term(x, 1.0), Relation::Geq, 3.0);
        backend.set_objective(LinExpr::term(x, 1.0), ObjectiveSense::Minimize);

        let outcome = backend.solve(&SolveSettings::default())?;

        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_eq!(outcome.objective_value, Some(3.0));

        Ok(())
    }

    #[test]
    fn contradictory_bounds_report_infeasible() -> TestResult {
        let mut backend = MicrolpBackend::new();
        let x = backend.add_integer_var("x".to_owned(), 0.0);
        backend.add_constraint(LinExpr::term(x, 1.0), Relation::Leq, 1.0);
        backend.add_constraint(LinExpr::term(x, 1.0), Relation::Geq, 2.0);
        backend.set_objective(LinExpr::term(x, 1.0), ObjectiveSense::Minimize);

        let outcome = backend.solve(&SolveSettings::default())?;

        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.values.is_none());

        Ok(())
    }

    #[test]
    fn solving_without_an_objective_is_an_error() {
        let mut backend = MicrolpBackend::new();
        backend.add_integer_var("x".to_owned(), 0.0);

        assert!(matches!(
            backend.solve(&SolveSettings::default()),
            Err(SolverError::ModelState { .. })
        ));
    }
}
