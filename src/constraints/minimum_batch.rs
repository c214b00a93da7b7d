//! Minimum batch size constraint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    constraints::{ConfigSchema, Constraint, ParamDefault, ParamKind, ParamSpec},
    data::{Field, ProblemData},
    solver::{
        SolverError,
        model::{LinExpr, ModelBackend, Relation, VariableMap},
    },
};

/// Fallback big-M when a `(resource, period)` pair has no supply entry.
const FALLBACK_BIG_M: f64 = 1000.0;

/// Minimum batch size, either uniform or per `(product, resource)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchSize {
    /// One batch size for every combination.
    Uniform(u64),

    /// Per-pair overrides with a shared fallback.
    PerPair {
        /// Fallback for pairs without an override.
        #[serde(default = "default_batch_size")]
        default: u64,

        /// Overrides keyed by product, then resource.
        #[serde(default)]
        overrides: BTreeMap<String, BTreeMap<String, u64>>,
    },
}

fn default_batch_size() -> u64 {
    10
}

impl BatchSize {
    /// Resolve the batch size for a `(product, resource)` pair.
    pub fn for_pair(&self, product: &str, resource: &str) -> u64 {
        match self {
            Self::Uniform(size) => *size,
            Self::PerPair { default, overrides } => overrides
                .get(product)
                .and_then(|by_resource| by_resource.get(resource))
                .copied()
                .unwrap_or(*default),
        }
    }

    /// The smallest batch size this configuration can resolve to.
    pub fn minimum(&self) -> u64 {
        match self {
            Self::Uniform(size) => *size,
            Self::PerPair { default, overrides } => overrides
                .values()
                .flat_map(BTreeMap::values)
                .copied()
                .chain(std::iter::once(*default))
                .min()
                .unwrap_or(*default),
        }
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        Self::Uniform(default_batch_size())
    }
}

impl From<u64> for BatchSize {
    fn from(size: u64) -> Self {
        Self::Uniform(size)
    }
}

/// Forces each allocation to be either zero or at least a minimum batch.
///
/// Every decision variable gets a binary `is_used` indicator and the big-M
/// pair `x ≤ big_M · is_used` and `x ≥ min_batch · is_used`. The big-M is the
/// supply of that `(resource, period)`, falling back to a large constant when
/// no supply entry exists; it is a tunable, not a magic number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinimumBatchConstraint {
    min_batch_size: BatchSize,
}

impl MinimumBatchConstraint {
    /// Create the constraint with the given batch size configuration.
    pub fn new(min_batch_size: impl Into<BatchSize>) -> Self {
        Self {
            min_batch_size: min_batch_size.into(),
        }
    }

    /// The configured batch sizes.
    pub fn min_batch_size(&self) -> &BatchSize {
        &self.min_batch_size
    }
}

impl Constraint for MinimumBatchConstraint {
    fn required_fields(&self) -> &'static [Field] {
        &[Field::ProductTypes, Field::ResourceTypes, Field::Periods]
    }

    fn apply(
        &self,
        backend: &mut dyn ModelBackend,
        variables: &VariableMap,
        data: &ProblemData,
    ) -> Result<(), SolverError> {
        for product in data.products() {
            for resource in data.resources() {
                let min_batch = self.min_batch_size.for_pair(product, resource);

                for period in data.periods() {
                    let Some(var) = variables.get(product, resource, period) else {
                        continue;
                    };

                    let big_m = data.supply_at(resource, period).unwrap_or(FALLBACK_BIG_M);
                    let is_used =
                        backend.add_binary_var(format!("is_used_{product}_{resource}_{period}"));

                    // x <= big_M * is_used
                    let mut upper = LinExpr::term(var, 1.0);
                    upper.push(is_used, -big_m);
                    backend.add_constraint(upper, Relation::Leq, 0.0);

                    // x >= min_batch * is_used
                    #[expect(clippy::cast_precision_loss, reason = "batch sizes are small")]
                    let min_batch = min_batch as f64;
                    let mut lower = LinExpr::term(var, 1.0);
                    lower.push(is_used, -min_batch);
                    backend.add_constraint(lower, Relation::Geq, 0.0);
                }
            }
        }

        Ok(())
    }

    fn schema(&self) -> ConfigSchema {
        ConfigSchema {
            title: "Minimum batch",
            description: self.description(),
            params: vec![ParamSpec {
                name: "min_batch_size",
                kind: ParamKind::IntegerOrMap,
                description: "Minimum allocation per combination, either a single value or per-pair overrides with a default.",
                minimum: Some(1.0),
                maximum: None,
                default: Some(ParamDefault::Integer(10)),
            }],
        }
    }

    fn description(&self) -> &'static str {
        "Each allocation is either zero or at least the configured minimum batch size."
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::fixtures;

    use super::*;

    #[test]
    fn per_pair_lookup_falls_back_to_default() {
        let sizes = BatchSize::PerPair {
            default: 10,
            overrides: BTreeMap::from([(
                "Classic".to_owned(),
                BTreeMap::from([("Standard".to_owned(), 25)]),
            )]),
        };

        assert_eq!(sizes.for_pair("Classic", "Standard"), 25);
        assert_eq!(sizes.for_pair("Classic", "Premium"), 10);
        assert_eq!(sizes.for_pair("Deluxe", "Standard"), 10);
        assert_eq!(sizes.minimum(), 10);
    }

    #[test]
    fn records_two_rows_per_variable() -> TestResult {
        let data = fixtures::two_period_problem([120.0, 80.0], [100.0, 100.0])?;
        let mut backend = fixtures::recording_backend();
        let variables = fixtures::build_variables(&mut backend, &data);

        MinimumBatchConstraint::new(10).apply(&mut backend, &variables, &data)?;

        assert_eq!(backend.constraints().len(), 2 * variables.len());

        Ok(())
    }

    #[test]
    fn big_m_uses_supply_for_the_pair() -> TestResult {
        let data = fixtures::two_period_problem([120.0, 80.0], [100.0, 100.0])?;
        let mut backend = fixtures::recording_backend();
        let variables = fixtures::build_variables(&mut backend, &data);

        MinimumBatchConstraint::new(10).apply(&mut backend, &variables, &data)?;

        let upper_coefficients: Vec<f64> = backend
            .constraints()
            .iter()
            .filter(|recorded| recorded.relation == Relation::Leq)
            .map(|recorded| recorded.lhs.terms()[1].1)
            .collect();

        assert_eq!(upper_coefficients, vec![-120.0, -80.0]);

        Ok(())
    }
}
