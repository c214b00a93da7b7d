//! Backend-neutral model representation.
//!
//! Constraints express themselves against the [`ModelBackend`] trait using
//! [`LinExpr`] and [`Relation`]; each concrete backend translates the recorded
//! model into its native form at solve time. This keeps every constraint
//! mathematically identical across backends.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::{fmt, str::FromStr, time::Duration};

use rustc_hash::FxHashMap;

use crate::{
    solution::SolveStatus,
    solver::{SolverError, manager::ConfigError},
};

/// Handle to a variable inside a backend model.
///
/// Ids are dense and allocated in creation order; backends report solved
/// values as a vector indexed by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub(crate) usize);

impl VarId {
    /// Position of this variable in the backend's creation order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Key of a decision variable: one per allowed `(product, resource, period)`
/// triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarKey {
    /// Product type being produced.
    pub product: String,

    /// Resource type consumed.
    pub resource: String,

    /// Period of production.
    pub period: String,
}

impl VarKey {
    /// Build a key from borrowed parts.
    pub fn new(product: &str, resource: &str, period: &str) -> Self {
        Self {
            product: product.to_owned(),
            resource: resource.to_owned(),
            period: period.to_owned(),
        }
    }
}

impl fmt::Display for VarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x_{}_{}_{}", self.product, self.resource, self.period)
    }
}

/// Map from decision-variable keys to backend variable handles.
///
/// Owned by a single model build; a fresh map is created per solve.
#[derive(Debug, Default)]
pub struct VariableMap {
    vars: FxHashMap<VarKey, VarId>,
}

impl VariableMap {
    /// Register a decision variable.
    pub fn insert(&mut self, key: VarKey, var: VarId) {
        self.vars.insert(key, var);
    }

    /// Look up the variable for a triple, if one exists.
    pub fn get(&self, product: &str, resource: &str, period: &str) -> Option<VarId> {
        self.vars
            .get(&VarKey::new(product, resource, period))
            .copied()
    }

    /// Whether a triple carries a decision variable.
    pub fn contains(&self, product: &str, resource: &str, period: &str) -> bool {
        self.get(product, resource, period).is_some()
    }

    /// Iterate over all registered variables.
    pub fn iter(&self) -> impl Iterator<Item = (&VarKey, VarId)> {
        self.vars.iter().map(|(key, &var)| (key, var))
    }

    /// Number of decision variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether no decision variable exists.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Linear expression over backend variables.
#[derive(Debug, Clone, Default)]
pub struct LinExpr {
    terms: SmallVec<[(VarId, f64); 8]>,
}

impl LinExpr {
    /// Expression with a single term.
    pub fn term(var: VarId, coefficient: f64) -> Self {
        let mut expr = Self::default();
        expr.push(var, coefficient);

        expr
    }

    /// Sum of the given variables with unit coefficients.
    pub fn sum(vars: impl IntoIterator<Item = VarId>) -> Self {
        let mut expr = Self::default();
        for var in vars {
            expr.push(var, 1.0);
        }

        expr
    }

    /// Append a term.
    pub fn push(&mut self, var: VarId, coefficient: f64) {
        self.terms.push((var, coefficient));
    }

    /// The recorded terms, in insertion order.
    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    /// Whether the expression has no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Evaluate the expression against a dense value vector.
    pub fn eval(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|&(var, coefficient)| coefficient * values.get(var.0).copied().unwrap_or(0.0))
            .sum()
    }
}

/// Relation operator for a recorded linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Equality (`lhs == rhs`)
    Eq,

    /// Less than or equal (`lhs <= rhs`)
    Leq,

    /// Greater than or equal (`lhs >= rhs`)
    Geq,
}

/// Optimization direction for the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveSense {
    /// Minimize the objective expression.
    Minimize,

    /// Maximize the objective expression.
    Maximize,
}

/// Engine controls passed into a backend at solve time.
///
/// The microlp backend exposes no runtime controls and treats both settings as
/// advisory; the HiGHS backend honors both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveSettings {
    /// Wall-clock limit for the solve.
    pub time_limit: Duration,

    /// Relative optimality gap at which the engine may stop early.
    pub optimality_gap: f64,
}

impl Default for SolveSettings {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(60),
            optimality_gap: 0.005,
        }
    }
}

/// What a backend reports after solving.
#[derive(Debug, Clone)]
pub struct BackendOutcome {
    /// Canonical status mapped from the engine's native vocabulary.
    pub status: SolveStatus,

    /// Objective value of the incumbent, if one exists.
    pub objective_value: Option<f64>,

    /// Solved values indexed by [`VarId`], if an incumbent exists.
    pub values: Option<Vec<f64>>,
}

impl BackendOutcome {
    /// Outcome with a terminal status and no incumbent.
    pub fn without_solution(status: SolveStatus) -> Self {
        Self {
            status,
            objective_value: None,
            values: None,
        }
    }
}

/// Identifies a concrete solving backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// The bundled microlp engine, driven through `good_lp`.
    Microlp,

    /// The HiGHS engine, driven through its native API.
    Highs,
}

impl BackendKind {
    /// Stable name used in configuration and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Microlp => "microlp",
            Self::Highs => "highs",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "microlp" => Ok(Self::Microlp),
            "highs" => Ok(Self::Highs),
            _ => Err(ConfigError::UnknownBackend {
                name: name.to_owned(),
            }),
        }
    }
}

/// A solving engine behind a narrow contract: accept variables, linear
/// constraints, and an objective; return a status and per-variable values.
///
/// One backend instance backs exactly one model build and one solve.
pub trait ModelBackend: fmt::Debug {
    /// Which engine this backend drives.
    fn kind(&self) -> BackendKind;

    /// Create a non-negative integer variable with the given lower bound.
    fn add_integer_var(&mut self, name: String, min: f64) -> VarId;

    /// Create a binary (0/1) variable.
    fn add_binary_var(&mut self, name: String) -> VarId;

    /// Record a linear constraint `lhs <relation> rhs`.
    fn add_constraint(&mut self, lhs: LinExpr, relation: Relation, rhs: f64);

    /// Set the linear objective and its direction.
    fn set_objective(&mut self, objective: LinExpr, sense: ObjectiveSense);

    /// Translate the recorded model into the engine and solve it.
    ///
    /// Terminal outcomes (infeasible, unbounded, time limit) are statuses in
    /// the returned [`BackendOutcome`], not errors.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError`] if the model is structurally incomplete (no
    /// objective) or an internal invariant is violated.
    fn solve(&mut self, settings: &SolveSettings) -> Result<BackendOutcome, SolverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lin_expr_evaluates_against_dense_values() {
        let mut expr = LinExpr::term(VarId(0), 2.0);
        expr.push(VarId(2), 0.5);

        let values = [3.0, 100.0, 4.0];

        assert_eq!(expr.eval(&values), 8.0);
    }

    #[test]
    fn variable_map_lookup_roundtrips() {
        let mut map = VariableMap::default();
        map.insert(VarKey::new("Classic", "Standard", "Week 1"), VarId(7));

        assert_eq!(
            map.get("Classic", "Standard", "Week 1"),
            Some(VarId(7)),
            "inserted key must be retrievable"
        );
        assert!(!map.contains("Classic", "Standard", "Week 2"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn backend_kind_parses_case_insensitively() {
        assert_eq!("Microlp".parse::<BackendKind>().ok(), Some(BackendKind::Microlp));
        assert_eq!("HIGHS".parse::<BackendKind>().ok(), Some(BackendKind::Highs));
        assert!("cplex".parse::<BackendKind>().is_err());
    }
}
