//! Resource supply constraint.

use crate::{
    constraints::{ConfigSchema, Constraint, ParamDefault, ParamKind, ParamSpec},
    data::{Field, ProblemData},
    solver::{
        SolverError,
        model::{LinExpr, ModelBackend, Relation, VariableMap},
    },
};

/// Caps resource usage by the available supply.
///
/// In weekly mode each period stands alone: usage in a period may not exceed
/// that period's supply. In cumulative mode unused supply carries forward:
/// usage summed over every period up to `t` may not exceed supply summed over
/// the same prefix. The prefix walks the chronological period order, so the
/// right-hand bound is non-decreasing as `t` advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupplyConstraint {
    cumulative: bool,
}

impl SupplyConstraint {
    /// Create the constraint with the given carry-over mode.
    pub fn new(cumulative: bool) -> Self {
        Self { cumulative }
    }

    /// Whether unused supply carries forward to later periods.
    pub fn cumulative(&self) -> bool {
        self.cumulative
    }

    fn apply_cumulative(
        &self,
        backend: &mut dyn ModelBackend,
        variables: &VariableMap,
        data: &ProblemData,
    ) {
        for resource in data.resources() {
            let mut cumulative_supply = 0.0;
            let mut prefix = LinExpr::default();

            for period in data.periods() {
                if let Some(supply) = data.supply_at(resource, period) {
                    cumulative_supply += supply;
                }

                for product in data.products() {
                    if let Some(var) = variables.get(product, resource, period) {
                        prefix.push(var, 1.0);
                    }
                }

                backend.add_constraint(prefix.clone(), Relation::Leq, cumulative_supply);
            }
        }
    }

    fn apply_weekly(
        &self,
        backend: &mut dyn ModelBackend,
        variables: &VariableMap,
        data: &ProblemData,
    ) {
        for resource in data.resources() {
            for period in data.periods() {
                let Some(supply) = data.supply_at(resource, period) else {
                    continue;
                };

                let mut usage = LinExpr::default();
                for product in data.products() {
                    if let Some(var) = variables.get(product, resource, period) {
                        usage.push(var, 1.0);
                    }
                }

                backend.add_constraint(usage, Relation::Leq, supply);
            }
        }
    }
}

impl Default for SupplyConstraint {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Constraint for SupplyConstraint {
    fn required_fields(&self) -> &'static [Field] {
        &[
            Field::ProductTypes,
            Field::ResourceTypes,
            Field::Periods,
            Field::Supply,
        ]
    }

    fn apply(
        &self,
        backend: &mut dyn ModelBackend,
        variables: &VariableMap,
        data: &ProblemData,
    ) -> Result<(), SolverError> {
        if self.cumulative {
            self.apply_cumulative(backend, variables, data);
        } else {
            self.apply_weekly(backend, variables, data);
        }

        Ok(())
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema {
            title: "Supply",
            description: self.description(),
            params: vec![ParamSpec {
                name: "cumulative",
                kind: ParamKind::Boolean,
                description: "If true, unused resource supply from earlier periods can be used in later periods.",
                minimum: None,
                maximum: None,
                default: Some(ParamDefault::Bool(true)),
            }],
        }
    }

    fn description(&self) -> &'static str {
        "Caps the total usage of each resource type by its available supply per period."
    }
}
