//! Solve outcomes and solution records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical status of a solve attempt.
///
/// Backends map their native status vocabulary onto this enum. The last three
/// variants are valid terminal outcomes surfaced to the caller, never errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// Proven optimal within the configured gap.
    Optimal,

    /// A feasible incumbent was found but optimality was not proven.
    Feasible,

    /// No assignment satisfies the constraints.
    Infeasible,

    /// The objective can be improved without bound.
    Unbounded,

    /// The wall-clock limit expired; an incumbent may or may not exist.
    TimeLimit,

    /// The backend failed in a way that is not a normal terminal status.
    Error,

    /// No solve has been attempted yet.
    NotSolved,
}

impl SolveStatus {
    /// Whether this status can carry variable values.
    pub fn has_solution(self) -> bool {
        matches!(self, Self::Optimal | Self::Feasible | Self::TimeLimit)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Optimal => "Optimal",
            Self::Feasible => "Feasible",
            Self::Infeasible => "Infeasible",
            Self::Unbounded => "Unbounded",
            Self::TimeLimit => "TimeLimit",
            Self::Error => "Error",
            Self::NotSolved => "NotSolved",
        };

        f.write_str(label)
    }
}

/// One solved decision variable: resource units consumed for a
/// `(product, resource, period)` triple.
///
/// Only strictly positive quantities are retained in a [`Solution`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Product type being produced.
    pub product: String,

    /// Resource type consumed.
    pub resource: String,

    /// Period of production.
    pub period: String,

    /// Resource units consumed. Always a positive integer.
    pub quantity: u64,
}

/// Totals derived from the solved allocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedTotals {
    /// Total output units across all allocations.
    pub total_output: f64,

    /// Total cost across all allocations.
    pub total_cost: f64,

    /// Cost per output unit, absent when nothing was produced.
    pub average_cost_per_unit: Option<f64>,
}

/// The solved plan extracted from a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// Terminal status of the solve.
    pub status: SolveStatus,

    /// Objective value reported by the backend, absent when no incumbent exists.
    pub objective_value: Option<f64>,

    /// Strictly positive allocations, sorted by product, resource, then period.
    pub values: Vec<Allocation>,

    /// Output and cost totals derived from the allocations.
    pub totals: DerivedTotals,
}

impl Solution {
    /// Solved quantity for a triple, zero when not part of the plan.
    pub fn quantity(&self, product: &str, resource: &str, period: &str) -> u64 {
        self.values
            .iter()
            .find(|allocation| {
                allocation.product == product
                    && allocation.resource == resource
                    && allocation.period == period
            })
            .map_or(0, |allocation| allocation.quantity)
    }

    /// Total resource units consumed in one period.
    pub fn resource_units_in_period(&self, period: &str) -> u64 {
        self.values
            .iter()
            .filter(|allocation| allocation.period == period)
            .map(|allocation| allocation.quantity)
            .sum()
    }
}
