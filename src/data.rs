//! Fact tables describing a single planning problem.
//!
//! A [`ProblemData`] record holds the ordered dimension lists (product types,
//! resource types, periods) and the sparse fact maps (demand, supply, unit
//! cost, yield, allowed combinations) that every downstream component consumes:
//! the feasibility analyzer, the constraint registry, and the solver itself.
//!
//! The tables are read-only once built; each solve borrows them immutably.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Sparse map keyed by a `(product, period)` or `(resource, period)` or
/// `(product, resource)` pair.
pub type PairMap = FxHashMap<(String, String), f64>;

/// Identifies one of the fact tables in [`ProblemData`].
///
/// Used by constraints to declare which tables they need, and by
/// [`DataError`] to name offending tables in validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Ordered list of product types.
    ProductTypes,

    /// Ordered list of resource types.
    ResourceTypes,

    /// Ordered, chronological list of periods.
    Periods,

    /// Demand per `(product, period)`.
    Demand,

    /// Supply per `(resource, period)`.
    Supply,

    /// Cost per output unit per `(product, resource)`.
    UnitCost,

    /// Output units per resource unit, per product.
    Yield,

    /// Allowed `(product, resource)` combinations.
    Allowed,
}

impl Field {
    /// Every table, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::ProductTypes,
        Self::ResourceTypes,
        Self::Periods,
        Self::Demand,
        Self::Supply,
        Self::UnitCost,
        Self::Yield,
        Self::Allowed,
    ];

    /// Stable table name used in error messages and serialized documents.
    pub fn name(self) -> &'static str {
        match self {
            Self::ProductTypes => "product_types",
            Self::ResourceTypes => "resource_types",
            Self::Periods => "periods",
            Self::Demand => "demand",
            Self::Supply => "supply",
            Self::UnitCost => "unit_cost",
            Self::Yield => "yield",
            Self::Allowed => "allowed",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn join_fields(fields: &[Field]) -> String {
    let names: Vec<&str> = fields.iter().map(|field| field.name()).collect();

    names.join(", ")
}

/// Errors raised while building or validating fact tables.
#[derive(Debug, Error)]
pub enum DataError {
    /// One or more required tables are missing or empty.
    #[error("missing or empty data fields: {}", join_fields(.fields))]
    MissingFields {
        /// The absent tables, in declaration order.
        fields: Vec<Field>,
    },

    /// A fact value was negative where only non-negative quantities are valid.
    #[error("negative value {value} in table '{field}' for '{key}'")]
    NegativeValue {
        /// Table containing the offending entry.
        field: Field,

        /// Human-readable key of the offending entry.
        key: String,

        /// The rejected value.
        value: f64,
    },
}

/// Immutable fact tables for one planning problem.
///
/// Dimension lists are deduplicated preserving first occurrence. The period
/// list order is the canonical chronology: several constraints and feasibility
/// checks walk it front to back and rely on it being chronological.
#[derive(Debug, Clone, Default)]
pub struct ProblemData {
    products: Vec<String>,
    resources: Vec<String>,
    periods: Vec<String>,
    demand: PairMap,
    supply: PairMap,
    unit_cost: PairMap,
    yield_per_unit: FxHashMap<String, f64>,
    allowed: FxHashMap<(String, String), bool>,
}

impl ProblemData {
    /// Start building a problem record.
    pub fn builder() -> ProblemDataBuilder {
        ProblemDataBuilder::default()
    }

    /// Ordered product types.
    pub fn products(&self) -> &[String] {
        &self.products
    }

    /// Ordered resource types.
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    /// Periods in chronological order.
    pub fn periods(&self) -> &[String] {
        &self.periods
    }

    /// Demand map keyed by `(product, period)`.
    pub fn demand(&self) -> &PairMap {
        &self.demand
    }

    /// Supply map keyed by `(resource, period)`.
    pub fn supply(&self) -> &PairMap {
        &self.supply
    }

    /// Unit cost map keyed by `(product, resource)`.
    pub fn unit_cost(&self) -> &PairMap {
        &self.unit_cost
    }

    /// Yield map keyed by product.
    pub fn yields(&self) -> &FxHashMap<String, f64> {
        &self.yield_per_unit
    }

    /// Demand for a product in a period, if recorded.
    pub fn demand_at(&self, product: &str, period: &str) -> Option<f64> {
        self.demand
            .get(&(product.to_owned(), period.to_owned()))
            .copied()
    }

    /// Supply of a resource in a period, if recorded.
    pub fn supply_at(&self, resource: &str, period: &str) -> Option<f64> {
        self.supply
            .get(&(resource.to_owned(), period.to_owned()))
            .copied()
    }

    /// Cost per output unit for a `(product, resource)` pair, zero if absent.
    pub fn cost_of(&self, product: &str, resource: &str) -> f64 {
        self.unit_cost
            .get(&(product.to_owned(), resource.to_owned()))
            .copied()
            .unwrap_or(0.0)
    }

    /// Output units per resource unit for a product, zero if absent.
    pub fn yield_of(&self, product: &str) -> f64 {
        self.yield_per_unit.get(product).copied().unwrap_or(0.0)
    }

    /// Whether a `(product, resource)` combination may carry a decision variable.
    pub fn is_allowed(&self, product: &str, resource: &str) -> bool {
        self.allowed
            .get(&(product.to_owned(), resource.to_owned()))
            .copied()
            .unwrap_or(false)
    }

    /// Resource types compatible with the given product, in declaration order.
    pub fn compatible_resources(&self, product: &str) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|resource| self.is_allowed(product, resource))
            .map(String::as_str)
            .collect()
    }

    /// Sum of all recorded supply, across every resource and period.
    pub fn total_supply(&self) -> f64 {
        self.supply.values().sum()
    }

    /// Sum of all recorded demand, across every product and period.
    pub fn total_demand(&self) -> f64 {
        self.demand.values().sum()
    }

    /// Supply summed over all resources for one period.
    pub fn supply_in_period(&self, period: &str) -> f64 {
        self.resources
            .iter()
            .filter_map(|resource| self.supply_at(resource, period))
            .sum()
    }

    /// Demand summed over all products for one period.
    pub fn demand_in_period(&self, period: &str) -> f64 {
        self.products
            .iter()
            .filter_map(|product| self.demand_at(product, period))
            .sum()
    }

    /// Total demand for one product across all periods.
    pub fn demand_for_product(&self, product: &str) -> f64 {
        self.periods
            .iter()
            .filter_map(|period| self.demand_at(product, period))
            .sum()
    }

    /// Total supply for one resource across all periods.
    pub fn supply_for_resource(&self, resource: &str) -> f64 {
        self.periods
            .iter()
            .filter_map(|period| self.supply_at(resource, period))
            .sum()
    }

    /// Structural oddities that do not invalidate the tables.
    ///
    /// A product without a yield entry or a resource no product is allowed to
    /// use is legal but almost always a data-entry mistake; the feasibility
    /// analyzer surfaces these as warnings.
    pub fn structural_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for product in &self.products {
            if !self.yield_per_unit.contains_key(product) {
                issues.push(format!("Product type '{product}' has no yield entry."));
            }
        }

        for resource in &self.resources {
            let unused = !self
                .products
                .iter()
                .any(|product| self.is_allowed(product, resource));

            if unused {
                issues.push(format!(
                    "Resource type '{resource}' is not allowed for any product type."
                ));
            }
        }

        issues
    }

    /// Whether a table holds any entries.
    pub fn is_populated(&self, field: Field) -> bool {
        match field {
            Field::ProductTypes => !self.products.is_empty(),
            Field::ResourceTypes => !self.resources.is_empty(),
            Field::Periods => !self.periods.is_empty(),
            Field::Demand => !self.demand.is_empty(),
            Field::Supply => !self.supply.is_empty(),
            Field::UnitCost => !self.unit_cost.is_empty(),
            Field::Yield => !self.yield_per_unit.is_empty(),
            Field::Allowed => !self.allowed.is_empty(),
        }
    }

    /// Check that every listed table is populated.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::MissingFields`] naming each absent table.
    pub fn validate_fields(&self, required: &[Field]) -> Result<(), DataError> {
        let missing: Vec<Field> = required
            .iter()
            .copied()
            .filter(|&field| !self.is_populated(field))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DataError::MissingFields { fields: missing })
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.iter().any(|existing| *existing == value) {
        list.push(value);
    }
}

/// Builder for [`ProblemData`].
///
/// Collects dimension lists and fact entries, then validates non-negativity
/// on [`build`](Self::build).
#[derive(Debug, Default)]
pub struct ProblemDataBuilder {
    data: ProblemData,
}

impl ProblemDataBuilder {
    /// Append product types, skipping duplicates.
    pub fn products<I, S>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for product in products {
            push_unique(&mut self.data.products, product.into());
        }

        self
    }

    /// Append resource types, skipping duplicates.
    pub fn resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for resource in resources {
            push_unique(&mut self.data.resources, resource.into());
        }

        self
    }

    /// Append periods in chronological order, skipping duplicates.
    pub fn periods<I, S>(mut self, periods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for period in periods {
            push_unique(&mut self.data.periods, period.into());
        }

        self
    }

    /// Record demand for a product in a period.
    pub fn demand(mut self, product: &str, period: &str, quantity: f64) -> Self {
        self.data
            .demand
            .insert((product.to_owned(), period.to_owned()), quantity);

        self
    }

    /// Record supply of a resource in a period.
    pub fn supply(mut self, resource: &str, period: &str, quantity: f64) -> Self {
        self.data
            .supply
            .insert((resource.to_owned(), period.to_owned()), quantity);

        self
    }

    /// Record the cost per output unit for a `(product, resource)` pair.
    pub fn unit_cost(mut self, product: &str, resource: &str, cost: f64) -> Self {
        self.data
            .unit_cost
            .insert((product.to_owned(), resource.to_owned()), cost);

        self
    }

    /// Record the yield (output units per resource unit) for a product.
    pub fn yield_per_unit(mut self, product: &str, units: f64) -> Self {
        self.data.yield_per_unit.insert(product.to_owned(), units);

        self
    }

    /// Mark a `(product, resource)` combination as allowed.
    pub fn allow(mut self, product: &str, resource: &str) -> Self {
        self.data
            .allowed
            .insert((product.to_owned(), resource.to_owned()), true);

        self
    }

    /// Explicitly mark a `(product, resource)` combination as disallowed.
    pub fn forbid(mut self, product: &str, resource: &str) -> Self {
        self.data
            .allowed
            .insert((product.to_owned(), resource.to_owned()), false);

        self
    }

    /// Validate the collected facts and produce the immutable record.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NegativeValue`] for any negative demand, supply,
    /// cost, or yield entry. Zero values are accepted: the feasibility
    /// analyzer diagnoses them rather than the builder rejecting them.
    pub fn build(self) -> Result<ProblemData, DataError> {
        for ((a, b), &value) in &self.data.demand {
            if value < 0.0 {
                return Err(DataError::NegativeValue {
                    field: Field::Demand,
                    key: format!("{a}/{b}"),
                    value,
                });
            }
        }

        for ((a, b), &value) in &self.data.supply {
            if value < 0.0 {
                return Err(DataError::NegativeValue {
                    field: Field::Supply,
                    key: format!("{a}/{b}"),
                    value,
                });
            }
        }

        for ((a, b), &value) in &self.data.unit_cost {
            if value < 0.0 {
                return Err(DataError::NegativeValue {
                    field: Field::UnitCost,
                    key: format!("{a}/{b}"),
                    value,
                });
            }
        }

        for (product, &value) in &self.data.yield_per_unit {
            if value < 0.0 {
                return Err(DataError::NegativeValue {
                    field: Field::Yield,
                    key: product.clone(),
                    value,
                });
            }
        }

        Ok(self.data)
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn sample() -> Result<ProblemData, DataError> {
        ProblemData::builder()
            .products(["Classic", "Deluxe"])
            .resources(["Standard", "Large"])
            .periods(["Week 1", "Week 2"])
            .demand("Classic", "Week 1", 100.0)
            .supply("Standard", "Week 1", 120.0)
            .unit_cost("Classic", "Standard", 1.5)
            .yield_per_unit("Classic", 10.0)
            .allow("Classic", "Standard")
            .build()
    }

    #[test]
    fn builder_deduplicates_dimensions_preserving_order() -> TestResult {
        let data = ProblemData::builder()
            .products(["A", "B", "A"])
            .products(["C", "B"])
            .build()?;

        assert_eq!(data.products(), ["A", "B", "C"]);

        Ok(())
    }

    #[test]
    fn builder_rejects_negative_quantities() -> TestResult {
        let result = ProblemData::builder()
            .products(["A"])
            .demand("A", "Week 1", -5.0)
            .build();

        assert!(matches!(
            result,
            Err(DataError::NegativeValue {
                field: Field::Demand,
                ..
            })
        ));

        Ok(())
    }

    #[test]
    fn absent_entries_read_as_zero_or_disallowed() -> TestResult {
        let data = sample()?;

        assert_eq!(data.demand_at("Deluxe", "Week 1"), None);
        assert_eq!(data.cost_of("Deluxe", "Large"), 0.0);
        assert_eq!(data.yield_of("Deluxe"), 0.0);
        assert!(!data.is_allowed("Deluxe", "Large"));

        Ok(())
    }

    #[test]
    fn validate_fields_names_every_missing_table() -> TestResult {
        let data = sample()?;

        let error = data
            .validate_fields(&[Field::Demand, Field::UnitCost, Field::Allowed])
            .err();
        assert!(error.is_none(), "all listed tables are populated");

        let Err(DataError::MissingFields { fields }) =
            ProblemData::default().validate_fields(&[Field::ProductTypes, Field::Supply])
        else {
            panic!("expected missing fields error");
        };

        assert_eq!(fields, vec![Field::ProductTypes, Field::Supply]);

        Ok(())
    }

    #[test]
    fn structural_issues_flag_unused_dimensions() -> TestResult {
        let data = sample()?;

        let issues = data.structural_issues();
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("Deluxe"));
        assert!(issues[1].contains("Large"));

        Ok(())
    }

    #[test]
    fn totals_sum_sparse_entries() -> TestResult {
        let data = ProblemData::builder()
            .products(["A", "B"])
            .resources(["R"])
            .periods(["Week 1", "Week 2"])
            .demand("A", "Week 1", 10.0)
            .demand("B", "Week 2", 5.0)
            .supply("R", "Week 1", 8.0)
            .build()?;

        assert_eq!(data.total_demand(), 15.0);
        assert_eq!(data.total_supply(), 8.0);
        assert_eq!(data.demand_in_period("Week 1"), 10.0);
        assert_eq!(data.supply_in_period("Week 2"), 0.0);
        assert_eq!(data.demand_for_product("B"), 5.0);

        Ok(())
    }
}
