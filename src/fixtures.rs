//! Fixtures
//!
//! Ready-made problem data and a recording backend for tests and examples.
//! The recording backend captures every variable, constraint, and objective
//! a constraint expresses without invoking any engine, so tests can assert
//! on the exact rows a constraint produced.

use std::{fs, path::Path};

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::{
    data::{DataError, ProblemData},
    solution::SolveStatus,
    solver::{
        SolverError, create_decision_variables,
        model::{
            BackendKind, BackendOutcome, LinExpr, ModelBackend, ObjectiveSense, Relation,
            SolveSettings, VarId, VariableMap,
        },
    },
};

/// Fixture Parsing Errors
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading fixture files
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// The parsed fixture failed data validation
    #[error(transparent)]
    Data(#[from] DataError),
}

#[derive(Debug, Deserialize)]
struct ProblemDataFixture {
    products: Vec<String>,
    resources: Vec<String>,
    periods: Vec<String>,

    /// Demand per product, then period.
    #[serde(default)]
    demand: BTreeMap<String, BTreeMap<String, f64>>,

    /// Supply per resource, then period.
    #[serde(default)]
    supply: BTreeMap<String, BTreeMap<String, f64>>,

    /// Cost per output unit, per product then resource.
    #[serde(default)]
    unit_cost: BTreeMap<String, BTreeMap<String, f64>>,

    /// Output units per resource unit, per product.
    #[serde(default, rename = "yield")]
    yield_per_unit: BTreeMap<String, f64>,

    /// Compatible resources per product.
    #[serde(default)]
    allowed: BTreeMap<String, Vec<String>>,
}

impl ProblemDataFixture {
    fn into_problem_data(self) -> Result<ProblemData, DataError> {
        let mut builder = ProblemData::builder()
            .products(self.products)
            .resources(self.resources)
            .periods(self.periods);

        for (product, by_period) in &self.demand {
            for (period, &quantity) in by_period {
                builder = builder.demand(product, period, quantity);
            }
        }

        for (resource, by_period) in &self.supply {
            for (period, &quantity) in by_period {
                builder = builder.supply(resource, period, quantity);
            }
        }

        for (product, by_resource) in &self.unit_cost {
            for (resource, &cost) in by_resource {
                builder = builder.unit_cost(product, resource, cost);
            }
        }

        for (product, &units) in &self.yield_per_unit {
            builder = builder.yield_per_unit(product, units);
        }

        for (product, resources) in &self.allowed {
            for resource in resources {
                builder = builder.allow(product, resource);
            }
        }

        builder.build()
    }
}

/// Load problem data from a YAML fixture file.
///
/// # Errors
///
/// Returns a [`FixtureError`] if the file cannot be read, parsed, or
/// validated.
pub fn load_problem_data(path: impl AsRef<Path>) -> Result<ProblemData, FixtureError> {
    let contents = fs::read_to_string(path)?;

    parse_problem_data(&contents)
}

/// Parse problem data from a YAML document.
///
/// # Errors
///
/// Returns a [`FixtureError`] if the document cannot be parsed or validated.
pub fn parse_problem_data(document: &str) -> Result<ProblemData, FixtureError> {
    let fixture: ProblemDataFixture = serde_norway::from_str(document)?;

    Ok(fixture.into_problem_data()?)
}

/// One product, one resource, two periods, with the given supply and demand.
///
/// Yield is 10 output units per resource unit and the unit cost is 0.25; the
/// single pair is allowed.
///
/// # Errors
///
/// Returns [`DataError::NegativeValue`] if a negative quantity is passed in.
pub fn two_period_problem(
    supply: [f64; 2],
    demand: [f64; 2],
) -> Result<ProblemData, DataError> {
    ProblemData::builder()
        .products(["Classic"])
        .resources(["Standard"])
        .periods(["Week 1", "Week 2"])
        .demand("Classic", "Week 1", demand[0])
        .demand("Classic", "Week 2", demand[1])
        .supply("Standard", "Week 1", supply[0])
        .supply("Standard", "Week 2", supply[1])
        .unit_cost("Classic", "Standard", 0.25)
        .yield_per_unit("Classic", 10.0)
        .allow("Classic", "Standard")
        .build()
}

/// A variable captured by the [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedVar {
    /// Non-negative integer variable.
    Integer {
        /// Variable name.
        name: String,

        /// Lower bound.
        min: f64,
    },

    /// Binary (0/1) variable.
    Binary {
        /// Variable name.
        name: String,
    },
}

/// A constraint row captured by the [`RecordingBackend`].
#[derive(Debug, Clone)]
pub struct RecordedConstraint {
    /// Left-hand side expression.
    pub lhs: LinExpr,

    /// Relation operator.
    pub relation: Relation,

    /// Right-hand side constant.
    pub rhs: f64,
}

/// Backend that records the model instead of solving it.
///
/// `solve` reports an all-zero optimal assignment so state-machine flows can
/// be exercised without an engine.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    vars: Vec<RecordedVar>,
    constraints: Vec<RecordedConstraint>,
    objective: Option<(LinExpr, ObjectiveSense)>,
}

impl RecordingBackend {
    /// The variables created so far.
    pub fn vars(&self) -> &[RecordedVar] {
        &self.vars
    }

    /// The constraint rows recorded so far.
    pub fn constraints(&self) -> &[RecordedConstraint] {
        &self.constraints
    }

    /// The recorded objective, if one was set.
    pub fn objective(&self) -> Option<&(LinExpr, ObjectiveSense)> {
        self.objective.as_ref()
    }
}

impl ModelBackend for RecordingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Microlp
    }

    fn add_integer_var(&mut self, name: String, min: f64) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(RecordedVar::Integer { name, min });

        id
    }

    fn add_binary_var(&mut self, name: String) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(RecordedVar::Binary { name });

        id
    }

    fn add_constraint(&mut self, lhs: LinExpr, relation: Relation, rhs: f64) {
        self.constraints.push(RecordedConstraint { lhs, relation, rhs });
    }

    fn set_objective(&mut self, objective: LinExpr, sense: ObjectiveSense) {
        self.objective = Some((objective, sense));
    }

    fn solve(&mut self, _settings: &SolveSettings) -> Result<BackendOutcome, SolverError> {
        if self.objective.is_none() {
            return Err(SolverError::ModelState {
                operation: "solve the model",
                requires: "an objective",
            });
        }

        Ok(BackendOutcome {
            status: SolveStatus::Optimal,
            objective_value: Some(0.0),
            values: Some(vec![0.0; self.vars.len()]),
        })
    }
}

/// Fresh recording backend.
pub fn recording_backend() -> RecordingBackend {
    RecordingBackend::default()
}

/// Create the decision variables for every allowed triple, as a model build
/// would.
pub fn build_variables(backend: &mut RecordingBackend, data: &ProblemData) -> VariableMap {
    create_decision_variables(backend, data)
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn two_period_problem_is_fully_populated() -> TestResult {
        let data = two_period_problem([120.0, 80.0], [100.0, 100.0])?;

        assert!(data.validate_fields(&crate::data::Field::ALL).is_ok());
        assert_eq!(data.total_supply(), 200.0);
        assert_eq!(data.total_demand(), 200.0);

        Ok(())
    }

    #[test]
    fn yaml_fixture_parses_into_problem_data() -> TestResult {
        let document = "\
products: [Classic]
resources: [Standard]
periods: [\"Week 1\"]
demand:
  Classic:
    Week 1: 100
supply:
  Standard:
    Week 1: 120
unit_cost:
  Classic:
    Standard: 0.25
yield:
  Classic: 10
allowed:
  Classic: [Standard]
";

        let data = parse_problem_data(document)?;

        assert_eq!(data.demand_at("Classic", "Week 1"), Some(100.0));
        assert!(data.is_allowed("Classic", "Standard"));

        Ok(())
    }

    #[test]
    fn recording_backend_captures_rows() {
        let mut backend = recording_backend();
        let x = backend.add_integer_var("x".to_owned(), 0.0);
        backend.add_constraint(LinExpr::term(x, 2.0), Relation::Leq, 10.0);

        assert_eq!(backend.vars().len(), 1);
        assert_eq!(backend.constraints().len(), 1);
        assert_eq!(backend.constraints()[0].relation, Relation::Leq);
    }
}
