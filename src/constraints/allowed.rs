//! Allowed product and resource combinations.

use crate::{
    constraints::{ConfigSchema, Constraint},
    data::{Field, ProblemData},
    solver::{
        SolverError,
        model::{ModelBackend, VariableMap},
    },
};

/// Restricts allocation to compatible `(product, resource)` pairs.
///
/// The restriction is structural rather than algebraic: decision variables
/// only exist for allowed pairs, so disallowed pairs can never carry a
/// non-zero quantity. `apply` therefore records nothing. The constraint still
/// participates in the registry so that its data requirements are validated
/// and its configuration surfaces alongside the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllowedCombinationsConstraint;

impl AllowedCombinationsConstraint {
    /// Create the constraint.
    pub fn new() -> Self {
        Self
    }
}

impl Constraint for AllowedCombinationsConstraint {
    fn required_fields(&self) -> &'static [Field] {
        &[Field::ProductTypes, Field::ResourceTypes, Field::Allowed]
    }

    fn apply(
        &self,
        _backend: &mut dyn ModelBackend,
        _variables: &VariableMap,
        _data: &ProblemData,
    ) -> Result<(), SolverError> {
        Ok(())
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema {
            title: "Allowed combinations",
            description: self.description(),
            params: Vec::new(),
        }
    }

    fn description(&self) -> &'static str {
        "Only compatible product and resource combinations receive any allocation."
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::{data::ProblemData, fixtures};

    use super::*;

    #[test]
    fn apply_records_no_constraints() -> TestResult {
        let data = fixtures::two_period_problem([120.0, 80.0], [100.0, 100.0])?;
        let mut backend = fixtures::recording_backend();
        let variables = fixtures::build_variables(&mut backend, &data);

        AllowedCombinationsConstraint::new().apply(&mut backend, &variables, &data)?;

        assert!(backend.constraints().is_empty());

        Ok(())
    }

    #[test]
    fn disallowed_pairs_get_no_variables() -> TestResult {
        let data = ProblemData::builder()
            .products(["Classic", "Premium"])
            .resources(["Standard"])
            .periods(["Week 1"])
            .supply("Standard", "Week 1", 50.0)
            .yield_per_unit("Classic", 10.0)
            .yield_per_unit("Premium", 8.0)
            .allow("Classic", "Standard")
            .forbid("Premium", "Standard")
            .build()?;

        let mut backend = fixtures::recording_backend();
        let variables = fixtures::build_variables(&mut backend, &data);

        assert!(variables.get("Classic", "Standard", "Week 1").is_some());
        assert!(variables.get("Premium", "Standard", "Week 1").is_none());

        Ok(())
    }
}
