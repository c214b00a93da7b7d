//! Backend driving the HiGHS engine through its native API.

use highs::{HighsModelStatus, RowProblem, Sense};
use rustc_hash::FxHashMap;

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
    Integer { min: f64 },
    Binary,
}

/// Records the model and hands it to HiGHS at solve time.
///
/// HiGHS wants objective coefficients at column creation, so the problem is
/// assembled in one pass once the full model is known. Unlike microlp, HiGHS
/// honors both the wall-clock limit and the relative gap target, and can
/// surface an incumbent when the limit expires.
#[derive(Debug, Default)]
pub struct HighsBackend {
    vars: Vec<VarSpec>,
    constraints: Vec<(LinExpr, Relation, f64)>,
    objective: Option<(LinExpr, ObjectiveSense)>,
}

impl HighsBackend {
    /// Empty model.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelBackend for HighsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Highs
    }

    fn add_integer_var(&mut self, _name: String, min: f64) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(VarSpec::Integer { min });

        id
    }

    fn add_binary_var(&mut self, _name: String) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(VarSpec::Binary);

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

        // Column objective coefficients, folded from the objective expression.
        let mut coefficients: FxHashMap<usize, f64> = FxHashMap::default();
        for &(var, coefficient) in objective.terms() {
            *coefficients.entry(var.index()).or_default() += coefficient;
        }

        let mut pb = RowProblem::default();
        let mut columns = Vec::with_capacity(self.vars.len());
        for (index, spec) in self.vars.iter().enumerate() {
            let obj_coeff = coefficients.get(&index).copied().unwrap_or(0.0);
            let col = match spec {
                VarSpec::Integer { min } => pb.add_integer_column(obj_coeff, *min..),
                VarSpec::Binary => pb.add_integer_column(obj_coeff, 0.0..=1.0),
            };
            columns.push(col);
        }

        for (lhs, relation, rhs) in &self.constraints {
            let terms: Vec<_> = lhs
                .terms()
                .iter()
                .filter_map(|&(var, coefficient)| {
                    columns.get(var.index()).map(|&col| (col, coefficient))
                })
                .collect();

            match relation {
                Relation::Eq => pb.add_row(*rhs..=*rhs, &terms),
                Relation::Leq => pb.add_row(..=*rhs, &terms),
                Relation::Geq => pb.add_row(*rhs.., &terms),
            };
        }

        let mut model = pb.optimise(match sense {
            ObjectiveSense::Minimize => Sense::Minimise,
            ObjectiveSense::Maximize => Sense::Maximise,
        });
        model.set_option("time_limit", settings.time_limit.as_secs_f64());
        model.set_option("mip_rel_gap", settings.optimality_gap);

        let solved = model.solve();

        match solved.status() {
            HighsModelStatus::Optimal => {
                let values = solved.get_solution().columns().to_vec();
                let objective_value = objective.eval(&values);

                Ok(BackendOutcome {
                    status: SolveStatus::Optimal,
                    objective_value: Some(objective_value),
                    values: Some(values),
                })
            }
            HighsModelStatus::Infeasible => {
                Ok(BackendOutcome::without_solution(SolveStatus::Infeasible))
            }
            HighsModelStatus::Unbounded | HighsModelStatus::UnboundedOrInfeasible => {
                Ok(BackendOutcome::without_solution(SolveStatus::Unbounded))
            }
            HighsModelStatus::ReachedTimeLimit => {
                // The limit expired; report whatever incumbent exists.
                let values = solved.get_solution().columns().to_vec();
                if values.is_empty() {
                    Ok(BackendOutcome::without_solution(SolveStatus::TimeLimit))
                } else {
                    let objective_value = objective.eval(&values);

                    Ok(BackendOutcome {
                        status: SolveStatus::TimeLimit,
                        objective_value: Some(objective_value),
                        values: Some(values),
                    })
                }
            }
            status => {
                tracing::warn!(?status, "HiGHS returned an unexpected status");

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
        let mut backend = HighsBackend::new();
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
        let mut backend = HighsBackend::new();
        let x = backend.add_integer_var("x".to_owned(), 0.0);
        backend.add_constraint(LinExpr::term(x, 1.0), Relation::Leq, 1.0);
        backend.add_constraint(LinExpr::term(x, 1.0), Relation::Geq, 2.0);
        backend.set_objective(LinExpr::term(x, 1.0), ObjectiveSense::Minimize);

        let outcome = backend.solve(&SolveSettings::default())?;

        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.values.is_none());

        Ok(())
    }
}
