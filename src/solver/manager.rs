//! Constraint configuration and solver construction.
//!
//! [`SolverManager`] owns the per-constraint enabled flags and custom
//! parameter overrides, merges them with built-in defaults, and instantiates
//! ready-to-use [`ProductionSolver`]s. The whole configuration serializes to
//! YAML for save and restore round-trips.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    constraints::{
        AllowedCombinationsConstraint, BatchSize, Constraint, DemandConstraint,
        MinimumBatchConstraint, ProductionRateConstraint, SupplyConstraint,
    },
    solver::{
        ProductionSolver, create_backend,
        model::{BackendKind, SolveSettings},
    },
};

/// Errors raised by configuration handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A constraint name that no known constraint carries.
    #[error("unknown constraint: {name}")]
    UnknownConstraint {
        /// The rejected name.
        name: String,
    },

    /// A parameter value outside its documented range.
    #[error("constraint {constraint}: parameter {param} {detail}")]
    ParamOutOfRange {
        /// Constraint the parameter belongs to.
        constraint: ConstraintKind,

        /// Parameter name.
        param: &'static str,

        /// What is wrong with the value.
        detail: String,
    },

    /// The requested engine was not compiled into this build.
    #[error("backend {kind} is not available in this build; enable its feature")]
    BackendUnavailable {
        /// The unavailable engine.
        kind: BackendKind,
    },

    /// A backend name that no known engine carries.
    #[error("unknown backend: {name}")]
    UnknownBackend {
        /// The rejected name.
        name: String,
    },

    /// A saved configuration document could not be parsed.
    #[error("malformed configuration document: {0}")]
    Malformed(#[from] serde_norway::Error),
}

/// The built-in constraints, by stable configuration name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Demand satisfaction per product and period.
    Demand,

    /// Resource supply caps per period.
    Supply,

    /// Structural restriction to compatible pairs.
    AllowedCombinations,

    /// Rate-of-change band between consecutive periods.
    ProductionRate,

    /// All-or-nothing minimum allocation sizes.
    MinimumBatch,
}

impl ConstraintKind {
    /// Every built-in constraint, in default registration order.
    pub const ALL: [Self; 5] = [
        Self::Demand,
        Self::Supply,
        Self::AllowedCombinations,
        Self::ProductionRate,
        Self::MinimumBatch,
    ];

    /// Stable name used in configuration documents and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Demand => "demand",
            Self::Supply => "supply",
            Self::AllowedCombinations => "allowed_combinations",
            Self::ProductionRate => "production_rate",
            Self::MinimumBatch => "minimum_batch",
        }
    }

    /// Whether the constraint is active in a fresh manager.
    pub fn enabled_by_default(self) -> bool {
        matches!(self, Self::Demand | Self::Supply | Self::AllowedCombinations)
    }

    fn default_params(self) -> ConstraintParams {
        let mut params = ConstraintParams::default();
        match self {
            Self::Demand => params.equality = Some(true),
            Self::Supply => params.cumulative = Some(true),
            Self::AllowedCombinations => {}
            Self::ProductionRate => params.max_rate_change = Some(0.2),
            Self::MinimumBatch => params.min_batch_size = Some(BatchSize::Uniform(10)),
        }

        params
    }

    fn instantiate(self, params: &ConstraintParams) -> Box<dyn Constraint> {
        match self {
            Self::Demand => Box::new(DemandConstraint::new(params.equality.unwrap_or(true))),
            Self::Supply => Box::new(SupplyConstraint::new(params.cumulative.unwrap_or(true))),
            Self::AllowedCombinations => Box::new(AllowedCombinationsConstraint::new()),
            Self::ProductionRate => Box::new(ProductionRateConstraint::new(
                params.max_rate_change.unwrap_or(0.2),
            )),
            Self::MinimumBatch => Box::new(MinimumBatchConstraint::new(
                params.min_batch_size.clone().unwrap_or_default(),
            )),
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConstraintKind {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| ConfigError::UnknownConstraint {
                name: name.to_owned(),
            })
    }
}

/// Parameter overrides for one constraint.
///
/// An option bag: absent fields fall through to the built-in default when
/// configurations are merged, so saved documents only carry what the user
/// actually changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintParams {
    /// Demand: require exact satisfaction instead of at-least.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equality: Option<bool>,

    /// Supply: carry unused supply forward to later periods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cumulative: Option<bool>,

    /// Production rate: maximum proportional change between periods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rate_change: Option<f64>,

    /// Minimum batch: uniform size or per-pair overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_batch_size: Option<BatchSize>,
}

impl ConstraintParams {
    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overlay `overrides` on top of `self`, field by field.
    fn merged(&self, overrides: &Self) -> Self {
        Self {
            equality: overrides.equality.or(self.equality),
            cumulative: overrides.cumulative.or(self.cumulative),
            max_rate_change: overrides.max_rate_change.or(self.max_rate_change),
            min_batch_size: overrides
                .min_batch_size
                .clone()
                .or_else(|| self.min_batch_size.clone()),
        }
    }
}

/// Serializable snapshot of a manager's constraint configuration.
///
/// Keys are plain strings so documents saved by newer builds with extra
/// constraints still load: unknown names are skipped, absent names keep
/// their current state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedConfiguration {
    /// Enabled flag per constraint name.
    pub enabled_constraints: BTreeMap<String, bool>,

    /// Custom parameter overrides per constraint name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_configs: BTreeMap<String, ConstraintParams>,
}

/// Holds constraint flags and overrides, and builds configured solvers.
#[derive(Debug, Clone)]
pub struct SolverManager {
    enabled: BTreeMap<ConstraintKind, bool>,
    custom: BTreeMap<ConstraintKind, ConstraintParams>,
    settings: SolveSettings,
}

impl SolverManager {
    /// Manager with the built-in defaults.
    pub fn new() -> Self {
        Self {
            enabled: ConstraintKind::ALL
                .into_iter()
                .map(|kind| (kind, kind.enabled_by_default()))
                .collect(),
            custom: BTreeMap::new(),
            settings: SolveSettings::default(),
        }
    }

    /// Engine settings used by solvers this manager creates.
    pub fn solve_settings(&self) -> &SolveSettings {
        &self.settings
    }

    /// Replace the engine settings.
    pub fn set_solve_settings(&mut self, settings: SolveSettings) {
        self.settings = settings;
    }

    /// Whether a constraint is currently enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownConstraint`] for a name no constraint
    /// carries.
    pub fn is_constraint_enabled(&self, name: &str) -> Result<bool, ConfigError> {
        let kind = name.parse::<ConstraintKind>()?;

        Ok(self.enabled.get(&kind).copied().unwrap_or(false))
    }

    /// Enable or disable a constraint by name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownConstraint`] for a name no constraint
    /// carries, rather than silently ignoring it.
    pub fn set_constraint_enabled(&mut self, name: &str, enabled: bool) -> Result<(), ConfigError> {
        let kind = name.parse::<ConstraintKind>()?;
        self.enabled.insert(kind, enabled);

        tracing::debug!(constraint = %kind, enabled, "constraint flag updated");

        Ok(())
    }

    /// Store custom parameter overrides for a constraint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownConstraint`] for an unknown name and
    /// [`ConfigError::ParamOutOfRange`] for values outside their documented
    /// range.
    pub fn set_constraint_configuration(
        &mut self,
        name: &str,
        params: ConstraintParams,
    ) -> Result<(), ConfigError> {
        let kind = name.parse::<ConstraintKind>()?;
        validate_params(kind, &params)?;

        tracing::info!(constraint = %kind, ?params, "constraint configuration updated");

        self.custom.insert(kind, params);

        Ok(())
    }

    /// The merged configuration a constraint would be built with.
    ///
    /// Disabled constraints report an empty configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownConstraint`] for a name no constraint
    /// carries.
    pub fn constraint_configuration(&self, name: &str) -> Result<ConstraintParams, ConfigError> {
        let kind = name.parse::<ConstraintKind>()?;

        if !self.enabled.get(&kind).copied().unwrap_or(false) {
            return Ok(ConstraintParams::default());
        }

        Ok(self.merged_params(kind))
    }

    /// Drop a constraint's custom overrides and disable it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownConstraint`] for a name no constraint
    /// carries.
    pub fn reset_constraint_configuration(&mut self, name: &str) -> Result<(), ConfigError> {
        let kind = name.parse::<ConstraintKind>()?;
        self.custom.remove(&kind);
        self.enabled.insert(kind, false);

        Ok(())
    }

    /// Build a solver for the given engine.
    ///
    /// With `with_constraints`, one constraint instance per enabled kind is
    /// built from the merged configuration and registered under its stable
    /// name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BackendUnavailable`] when the engine was not
    /// compiled in.
    pub fn create_solver(
        &self,
        backend: BackendKind,
        with_constraints: bool,
    ) -> Result<ProductionSolver, ConfigError> {
        tracing::debug!(%backend, with_constraints, "creating solver");

        let backend = create_backend(backend)?;
        let mut solver = ProductionSolver::with_settings(backend, self.settings.clone());

        if with_constraints {
            for kind in ConstraintKind::ALL {
                if !self.enabled.get(&kind).copied().unwrap_or(false) {
                    continue;
                }

                let params = self.merged_params(kind);
                solver.register_constraint(kind.name(), kind.instantiate(&params));
            }
        }

        Ok(solver)
    }

    /// Snapshot the current configuration.
    pub fn serializable_configuration(&self) -> SavedConfiguration {
        SavedConfiguration {
            enabled_constraints: self
                .enabled
                .iter()
                .map(|(kind, &enabled)| (kind.name().to_owned(), enabled))
                .collect(),
            custom_configs: self
                .custom
                .iter()
                .map(|(kind, params)| (kind.name().to_owned(), params.clone()))
                .collect(),
        }
    }

    /// Apply a saved configuration snapshot.
    ///
    /// Unknown constraint names are skipped with a warning; names absent
    /// from the snapshot keep their current state. Out-of-range parameter
    /// values are rejected the same way live updates are.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParamOutOfRange`] if the snapshot carries an
    /// invalid parameter value.
    pub fn load_configuration(&mut self, saved: &SavedConfiguration) -> Result<(), ConfigError> {
        for (name, &enabled) in &saved.enabled_constraints {
            match name.parse::<ConstraintKind>() {
                Ok(kind) => {
                    self.enabled.insert(kind, enabled);
                }
                Err(_) => tracing::warn!(constraint = %name, "skipping unknown constraint flag"),
            }
        }

        for (name, params) in &saved.custom_configs {
            match name.parse::<ConstraintKind>() {
                Ok(kind) => {
                    validate_params(kind, params)?;
                    self.custom.insert(kind, params.clone());
                }
                Err(_) => {
                    tracing::warn!(constraint = %name, "skipping unknown constraint configuration");
                }
            }
        }

        Ok(())
    }

    /// Serialize the current configuration to a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_norway::to_string(&self.serializable_configuration())?)
    }

    /// Apply a configuration from a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] for an unparsable document, or
    /// [`ConfigError::ParamOutOfRange`] for invalid values inside it.
    pub fn load_yaml(&mut self, document: &str) -> Result<(), ConfigError> {
        let saved: SavedConfiguration = serde_norway::from_str(document)?;

        self.load_configuration(&saved)
    }

    fn merged_params(&self, kind: ConstraintKind) -> ConstraintParams {
        let defaults = kind.default_params();

        match self.custom.get(&kind) {
            Some(custom) => defaults.merged(custom),
            None => defaults,
        }
    }
}

impl Default for SolverManager {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_params(kind: ConstraintKind, params: &ConstraintParams) -> Result<(), ConfigError> {
    if let Some(rate) = params.max_rate_change {
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::ParamOutOfRange {
                constraint: kind,
                param: "max_rate_change",
                detail: format!("must be between 0 and 1, got {rate}"),
            });
        }
    }

    if let Some(sizes) = &params.min_batch_size {
        if sizes.minimum() < 1 {
            return Err(ConfigError::ParamOutOfRange {
                constraint: kind,
                param: "min_batch_size",
                detail: "must be at least 1".to_owned(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn defaults_match_the_documented_flags() -> TestResult {
        let manager = SolverManager::new();

        assert!(manager.is_constraint_enabled("demand")?);
        assert!(manager.is_constraint_enabled("supply")?);
        assert!(manager.is_constraint_enabled("allowed_combinations")?);
        assert!(!manager.is_constraint_enabled("production_rate")?);
        assert!(!manager.is_constraint_enabled("minimum_batch")?);

        Ok(())
    }

    #[test]
    fn unknown_constraint_name_is_rejected() {
        let mut manager = SolverManager::new();

        assert!(matches!(
            manager.set_constraint_enabled("throughput", true),
            Err(ConfigError::UnknownConstraint { .. })
        ));
    }

    #[test]
    fn disabled_constraints_report_empty_configuration() -> TestResult {
        let manager = SolverManager::new();

        assert!(manager.constraint_configuration("minimum_batch")?.is_empty());
        assert_eq!(
            manager.constraint_configuration("supply")?.cumulative,
            Some(true)
        );

        Ok(())
    }

    #[test]
    fn custom_overrides_merge_over_defaults() -> TestResult {
        let mut manager = SolverManager::new();
        manager.set_constraint_enabled("production_rate", true)?;
        manager.set_constraint_configuration(
            "production_rate",
            ConstraintParams {
                max_rate_change: Some(0.5),
                ..ConstraintParams::default()
            },
        )?;

        let config = manager.constraint_configuration("production_rate")?;
        assert_eq!(config.max_rate_change, Some(0.5));

        Ok(())
    }

    #[test]
    fn out_of_range_rate_is_rejected() {
        let mut manager = SolverManager::new();

        assert!(matches!(
            manager.set_constraint_configuration(
                "production_rate",
                ConstraintParams {
                    max_rate_change: Some(1.5),
                    ..ConstraintParams::default()
                },
            ),
            Err(ConfigError::ParamOutOfRange { .. })
        ));
    }

    #[test]
    fn reset_drops_overrides_and_disables() -> TestResult {
        let mut manager = SolverManager::new();
        manager.set_constraint_enabled("minimum_batch", true)?;
        manager.set_constraint_configuration(
            "minimum_batch",
            ConstraintParams {
                min_batch_size: Some(BatchSize::Uniform(25)),
                ..ConstraintParams::default()
            },
        )?;

        manager.reset_constraint_configuration("minimum_batch")?;

        assert!(!manager.is_constraint_enabled("minimum_batch")?);
        assert!(manager.constraint_configuration("minimum_batch")?.is_empty());

        Ok(())
    }

    #[test]
    fn created_solver_registers_enabled_constraints() -> TestResult {
        let mut manager = SolverManager::new();
        manager.set_constraint_enabled("minimum_batch", true)?;

        let solver = manager.create_solver(BackendKind::Microlp, true)?;
        let names = solver.registry().names();

        assert_eq!(
            names,
            ["demand", "supply", "allowed_combinations", "minimum_batch"]
        );

        Ok(())
    }

    #[test]
    fn solver_without_constraints_is_bare() -> TestResult {
        let manager = SolverManager::new();
        let solver = manager.create_solver(BackendKind::Microlp, false)?;

        assert!(solver.registry().is_empty());

        Ok(())
    }

    #[test]
    fn snapshot_roundtrips_through_yaml() -> TestResult {
        let mut manager = SolverManager::new();
        manager.set_constraint_enabled("production_rate", true)?;
        manager.set_constraint_configuration(
            "production_rate",
            ConstraintParams {
                max_rate_change: Some(0.3),
                ..ConstraintParams::default()
            },
        )?;

        let document = manager.to_yaml()?;

        let mut restored = SolverManager::new();
        restored.load_yaml(&document)?;

        assert!(restored.is_constraint_enabled("production_rate")?);
        assert_eq!(
            restored.constraint_configuration("production_rate")?.max_rate_change,
            Some(0.3)
        );

        Ok(())
    }

    #[test]
    fn loading_skips_unknown_names() -> TestResult {
        let mut manager = SolverManager::new();
        manager.load_yaml("enabled_constraints:\n  throughput: true\n  minimum_batch: true\n")?;

        assert!(manager.is_constraint_enabled("minimum_batch")?);

        Ok(())
    }
}
