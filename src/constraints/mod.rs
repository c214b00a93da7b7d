//! Constraint abstraction and registry.
//!
//! Each concrete constraint is a flat, parameter-only value type implementing
//! [`Constraint`]: it validates that the fact tables it needs are populated,
//! and expresses itself against any [`ModelBackend`] through recorded linear
//! constraints. Constraints never own variables or data; both are passed in at
//! application time.

use std::fmt;

use serde::Serialize;

use crate::{
    data::{DataError, Field, ProblemData},
    solver::{
        SolverError,
        model::{ModelBackend, VariableMap},
    },
};

mod allowed;
mod demand;
mod minimum_batch;
mod production_rate;
mod supply;

pub use allowed::AllowedCombinationsConstraint;
pub use demand::DemandConstraint;
pub use minimum_batch::{BatchSize, MinimumBatchConstraint};
pub use production_rate::ProductionRateConstraint;
pub use supply::SupplyConstraint;

/// Value kind of a tunable constraint parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Boolean flag.
    Boolean,

    /// Floating-point number.
    Number,

    /// Non-negative integer.
    Integer,

    /// Either a single integer or a per-combination mapping.
    IntegerOrMap,
}

/// Default value of a tunable parameter, for schema consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamDefault {
    /// Boolean default.
    Bool(bool),

    /// Numeric default.
    Number(f64),

    /// Integer default.
    Integer(u64),
}

/// Self-description of one tunable parameter.
///
/// Descriptive metadata only, consumed by configuration tooling; never used
/// in solving logic.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    /// Parameter name as it appears in configuration documents.
    pub name: &'static str,

    /// Value kind.
    pub kind: ParamKind,

    /// Human-readable description.
    pub description: &'static str,

    /// Inclusive lower bound, where one applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    /// Inclusive upper bound, where one applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    /// Built-in default value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamDefault>,
}

/// Self-description of a constraint's configuration surface.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSchema {
    /// Display title.
    pub title: &'static str,

    /// What the constraint enforces.
    pub description: &'static str,

    /// Tunable parameters, empty for parameterless constraints.
    pub params: Vec<ParamSpec>,
}

/// A named, independently configurable planning rule.
///
/// Implementations hold only their own parameters. They must not assume any
/// ordering relative to other constraints, except through the chronological
/// period order inside the fact tables themselves.
pub trait Constraint: fmt::Debug {
    /// Fact tables this constraint reads.
    fn required_fields(&self) -> &'static [Field];

    /// Express this constraint against a backend model.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError`] if the backend rejects the recorded model.
    fn apply(
        &self,
        backend: &mut dyn ModelBackend,
        variables: &VariableMap,
        data: &ProblemData,
    ) -> Result<(), SolverError>;

    /// Check that every required fact table is populated.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::MissingFields`] naming each absent table.
    fn validate_data(&self, data: &ProblemData) -> Result<(), DataError> {
        data.validate_fields(self.required_fields())
    }

    /// Configuration schema for this constraint.
    fn schema(&self) -> ConfigSchema;

    /// One-line description of what the constraint enforces.
    fn description(&self) -> &'static str;
}

/// Ordered collection of active constraints for one model build.
///
/// Constructed fresh for every build so no state leaks across solves.
/// Registering a name twice replaces the instance in place (last write wins).
#[derive(Debug, Default)]
pub struct ConstraintRegistry {
    entries: Vec<(String, Box<dyn Constraint>)>,
}

impl ConstraintRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constraint under a name, replacing any previous instance.
    pub fn register(&mut self, name: impl Into<String>, constraint: Box<dyn Constraint>) {
        let name = name.into();

        tracing::debug!(constraint = %name, "registering constraint");

        if let Some(entry) = self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            entry.1 = constraint;
        } else {
            self.entries.push((name, constraint));
        }
    }

    /// Remove a constraint by name. Unknown names are a no-op.
    pub fn unregister(&mut self, name: &str) {
        self.entries.retain(|(existing, _)| existing != name);
    }

    /// Look up a constraint by name.
    pub fn get(&self, name: &str) -> Option<&dyn Constraint> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, constraint)| constraint.as_ref())
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of registered constraints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no constraint is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate and apply every registered constraint to the backend.
    ///
    /// Data validation runs for each constraint before that constraint is
    /// applied, so a missing table is reported against the constraint that
    /// needs it rather than surfacing as a half-built model.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::ConstraintData`] naming the failing constraint
    /// when its required tables are absent, or any error the constraint
    /// itself raises while applying.
    pub fn apply_constraints(
        &self,
        backend: &mut dyn ModelBackend,
        variables: &VariableMap,
        data: &ProblemData,
    ) -> Result<(), SolverError> {
        for (name, constraint) in &self.entries {
            constraint
                .validate_data(data)
                .map_err(|source| SolverError::ConstraintData {
                    constraint: name.clone(),
                    source,
                })?;

            tracing::debug!(constraint = %name, "applying constraint");

            constraint.apply(backend, variables, data)?;
        }

        Ok(())
    }

    /// Configuration schemas for every registered constraint.
    pub fn schemas(&self) -> Vec<(&str, ConfigSchema)> {
        self.entries
            .iter()
            .map(|(name, constraint)| (name.as_str(), constraint.schema()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::fixtures;

    use super::*;

    #[test]
    fn register_replaces_in_place_keeping_order() {
        let mut registry = ConstraintRegistry::new();
        registry.register("demand", Box::new(DemandConstraint::new(true)));
        registry.register("supply", Box::new(SupplyConstraint::new(true)));
        registry.register("demand", Box::new(DemandConstraint::new(false)));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), ["demand", "supply"]);
    }

    #[test]
    fn unregister_unknown_name_is_noop() {
        let mut registry = ConstraintRegistry::new();
        registry.register("demand", Box::new(DemandConstraint::default()));
        registry.unregister("minimum_batch");

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn validation_error_names_the_failing_constraint() -> TestResult {
        let data = crate::data::ProblemData::builder()
            .products(["Classic"])
            .resources(["Standard"])
            .periods(["Week 1"])
            .allow("Classic", "Standard")
            .build()?;

        let mut registry = ConstraintRegistry::new();
        registry.register("demand", Box::new(DemandConstraint::default()));

        let mut backend = fixtures::recording_backend();
        let variables = VariableMap::default();

        let Err(SolverError::ConstraintData { constraint, .. }) =
            registry.apply_constraints(&mut backend, &variables, &data)
        else {
            panic!("expected a constraint data validation error");
        };

        assert_eq!(constraint, "demand");

        Ok(())
    }

    #[test]
    fn every_builtin_constraint_exposes_a_schema() {
        let constraints: Vec<Box<dyn Constraint>> = vec![
            Box::new(DemandConstraint::default()),
            Box::new(SupplyConstraint::default()),
            Box::new(AllowedCombinationsConstraint),
            Box::new(ProductionRateConstraint::default()),
            Box::new(MinimumBatchConstraint::default()),
        ];

        for constraint in &constraints {
            let schema = constraint.schema();
            assert!(!schema.title.is_empty());
            assert!(!constraint.description().is_empty());
        }
    }
}
