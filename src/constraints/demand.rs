//! Demand satisfaction constraint.

use crate::{
    constraints::{ConfigSchema, Constraint, ParamDefault, ParamKind, ParamSpec},
    data::{Field, ProblemData},
    solver::{
        SolverError,
        model::{LinExpr, ModelBackend, Relation, VariableMap},
    },
};

/// Requires production for each product in each period to meet recorded
/// demand.
///
/// With `equality` set, the summed production of a product in a period must
/// exactly equal its demand; otherwise demand is only a lower bound and
/// surplus production is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemandConstraint {
    equality: bool,
}

impl DemandConstraint {
    /// Create the constraint with the given equality mode.
    pub fn new(equality: bool) -> Self {
        Self { equality }
    }

    /// Whether demand must be met exactly.
    pub fn equality(&self) -> bool {
        self.equality
    }
}

impl Default for DemandConstraint {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Constraint for DemandConstraint {
    fn required_fields(&self) -> &'static [Field] {
        &[
            Field::ProductTypes,
            Field::ResourceTypes,
            Field::Periods,
            Field::Demand,
        ]
    }

    fn apply(
        &self,
        backend: &mut dyn ModelBackend,
        variables: &VariableMap,
        data: &ProblemData,
    ) -> Result<(), SolverError> {
        let relation = if self.equality {
            Relation::Eq
        } else {
            Relation::Geq
        };

        for product in data.products() {
            for period in data.periods() {
                let Some(demand) = data.demand_at(product, period) else {
                    continue;
                };

                let mut lhs = LinExpr::default();
                for resource in data.resources() {
                    if let Some(var) = variables.get(product, resource, period) {
                        lhs.push(var, 1.0);
                    }
                }

                // An empty sum still becomes a constraint: demand for a
                // product with no variables must render the model infeasible,
                // not silently vanish.
                backend.add_constraint(lhs, relation, demand);
            }
        }

        Ok(())
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema {
            title: "Demand",
            description: self.description(),
            params: vec![ParamSpec {
                name: "equality",
                kind: ParamKind::Boolean,
                description: "If true, demand must be exactly met. If false, production can exceed demand.",
                minimum: None,
                maximum: None,
                default: Some(ParamDefault::Bool(true)),
            }],
        }
    }

    fn description(&self) -> &'static str {
        "Ensures production for each product type in each period meets the recorded demand."
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::fixtures;

    use super::*;

    #[test]
    fn records_one_constraint_per_demand_entry() -> TestResult {
        let data = fixtures::two_period_problem([120.0, 80.0], [100.0, 100.0])?;
        let mut backend = fixtures::recording_backend();
        let variables = fixtures::build_variables(&mut backend, &data);

        DemandConstraint::default().apply(&mut backend, &variables, &data)?;

        assert_eq!(backend.constraints().len(), 2);
        assert!(
            backend
                .constraints()
                .iter()
                .all(|recorded| recorded.relation == Relation::Eq),
            "equality mode must record equality relations"
        );

        Ok(())
    }

    #[test]
    fn inequality_mode_lower_bounds_demand() -> TestResult {
        let data = fixtures::two_period_problem([120.0, 80.0], [100.0, 100.0])?;
        let mut backend = fixtures::recording_backend();
        let variables = fixtures::build_variables(&mut backend, &data);

        DemandConstraint::new(false).apply(&mut backend, &variables, &data)?;

        assert!(
            backend
                .constraints()
                .iter()
                .all(|recorded| recorded.relation == Relation::Geq),
            "surplus mode must record lower bounds"
        );

        Ok(())
    }

    #[test]
    fn periods_without_demand_record_nothing() -> TestResult {
        let data = crate::data::ProblemData::builder()
            .products(["Classic"])
            .resources(["Standard"])
            .periods(["Week 1", "Week 2"])
            .demand("Classic", "Week 2", 10.0)
            .yield_per_unit("Classic", 10.0)
            .allow("Classic", "Standard")
            .build()?;

        let mut backend = fixtures::recording_backend();
        let variables = fixtures::build_variables(&mut backend, &data);

        DemandConstraint::default().apply(&mut backend, &variables, &data)?;

        assert_eq!(backend.constraints().len(), 1);

        Ok(())
    }
}
