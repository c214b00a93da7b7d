//! Production rate change constraint.

use crate::{
    constraints::{ConfigSchema, Constraint, ParamDefault, ParamKind, ParamSpec},
    data::{Field, ProblemData},
    solver::{
        SolverError,
        model::{LinExpr, ModelBackend, Relation, VariableMap},
    },
};

/// Limits how fast a product's total output may change between consecutive
/// periods.
///
/// The proportional bound `±max_rate_change` cannot be expressed directly in
/// a linear model, so it is linearized per product and consecutive period
/// pair. An auxiliary integer `prev_dummy ≥ max(1, prev_total)` bounds the
/// increase, and a binary `has_prev` flag gates the decrease bound behind a
/// big-M term so a period with zero production does not force every later
/// period to zero as well.
///
/// The big-M is the sum of supply across every resource and period. That is
/// far looser than any single pair needs and can weaken the relaxation on
/// large instances; treat it as a tunable rather than a fixed choice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductionRateConstraint {
    max_rate_change: f64,
}

impl ProductionRateConstraint {
    /// Create the constraint with the given maximum proportional change.
    pub fn new(max_rate_change: f64) -> Self {
        Self { max_rate_change }
    }

    /// The maximum allowed proportional change between consecutive periods.
    pub fn max_rate_change(&self) -> f64 {
        self.max_rate_change
    }

    fn period_total(
        variables: &VariableMap,
        data: &ProblemData,
        product: &str,
        period: &str,
    ) -> LinExpr {
        let mut total = LinExpr::default();
        for resource in data.resources() {
            if let Some(var) = variables.get(product, resource, period) {
                total.push(var, 1.0);
            }
        }

        total
    }
}

impl Default for ProductionRateConstraint {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl Constraint for ProductionRateConstraint {
    fn required_fields(&self) -> &'static [Field] {
        &[Field::ProductTypes, Field::ResourceTypes, Field::Periods]
    }

    fn apply(
        &self,
        backend: &mut dyn ModelBackend,
        variables: &VariableMap,
        data: &ProblemData,
    ) -> Result<(), SolverError> {
        let periods = data.periods();
        if periods.len() < 2 {
            return Ok(());
        }

        let big_m = data.total_supply();

        for product in data.products() {
            for pair in periods.windows(2) {
                let [prev_period, curr_period] = pair else {
                    continue;
                };

                let prev = Self::period_total(variables, data, product, prev_period);
                let curr = Self::period_total(variables, data, product, curr_period);
                if prev.is_empty() || curr.is_empty() {
                    continue;
                }

                // prev_dummy >= max(1, prev_total), via the lower bound of 1
                // and an explicit inequality.
                let prev_dummy =
                    backend.add_integer_var(format!("prev_dummy_{product}_{prev_period}"), 1.0);
                let mut dummy_floor = LinExpr::term(prev_dummy, 1.0);
                for &(var, coeff) in prev.terms() {
                    dummy_floor.push(var, -coeff);
                }
                backend.add_constraint(dummy_floor, Relation::Geq, 0.0);

                // curr_total <= prev_dummy * (1 + max_rate_change)
                let mut increase = curr.clone();
                increase.push(prev_dummy, -(1.0 + self.max_rate_change));
                backend.add_constraint(increase, Relation::Leq, 0.0);

                // has_prev = 1 iff prev_total > 0.
                let has_prev =
                    backend.add_binary_var(format!("has_prev_{product}_{prev_period}"));
                let mut upper = prev.clone();
                upper.push(has_prev, -big_m);
                backend.add_constraint(upper, Relation::Leq, 0.0);
                let mut lower = prev.clone();
                lower.push(has_prev, -1.0);
                backend.add_constraint(lower, Relation::Geq, 0.0);

                // curr_total >= prev_total * (1 - max_rate_change), gated so
                // it is vacuous when has_prev = 0.
                let mut decrease = curr;
                for &(var, coeff) in prev.terms() {
                    decrease.push(var, -coeff * (1.0 - self.max_rate_change));
                }
                decrease.push(has_prev, -big_m);
                backend.add_constraint(decrease, Relation::Geq, -big_m);
            }
        }

        Ok(())
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema {
            title: "Production rate change",
            description: self.description(),
            params: vec![ParamSpec {
                name: "max_rate_change",
                kind: ParamKind::Number,
                description: "Maximum allowed proportional change in a product's total output between consecutive periods.",
                minimum: Some(0.0),
                maximum: Some(1.0),
                default: Some(ParamDefault::Number(0.2)),
            }],
        }
    }

    fn description(&self) -> &'static str {
        "Keeps each product's output between consecutive periods within a proportional band."
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::fixtures;

    use super::*;

    #[test]
    fn records_five_rows_per_product_and_pair() -> TestResult {
        let data = fixtures::two_period_problem([120.0, 80.0], [100.0, 100.0])?;
        let mut backend = fixtures::recording_backend();
        let variables = fixtures::build_variables(&mut backend, &data);

        ProductionRateConstraint::default().apply(&mut backend, &variables, &data)?;

        // One product, one consecutive pair: dummy floor, increase bound,
        // two has_prev gates, gated decrease bound.
        assert_eq!(backend.constraints().len(), 5);

        Ok(())
    }

    #[test]
    fn single_period_is_a_no_op() -> TestResult {
        let data = crate::data::ProblemData::builder()
            .products(["Classic"])
            .resources(["Standard"])
            .periods(["Week 1"])
            .supply("Standard", "Week 1", 50.0)
            .yield_per_unit("Classic", 10.0)
            .allow("Classic", "Standard")
            .build()?;

        let mut backend = fixtures::recording_backend();
        let variables = fixtures::build_variables(&mut backend, &data);

        ProductionRateConstraint::default().apply(&mut backend, &variables, &data)?;

        assert!(backend.constraints().is_empty());

        Ok(())
    }
}
