//! Batchplan prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    constraints::{
        AllowedCombinationsConstraint, BatchSize, Constraint, ConstraintRegistry,
        DemandConstraint, MinimumBatchConstraint, ProductionRateConstraint, SupplyConstraint,
    },
    data::{DataError, Field, ProblemData, ProblemDataBuilder},
    feasibility::{FeasibilityReport, analyze},
    runner::{CancelToken, NoopObserver, Phase, ProgressObserver, RunError, RunRequest, run},
    solution::{Allocation, DerivedTotals, Solution, SolveStatus},
    solver::{
        ObjectiveKind, ProductionSolver, SolverError,
        manager::{ConfigError, ConstraintKind, ConstraintParams, SavedConfiguration, SolverManager},
        model::{BackendKind, ModelBackend, SolveSettings},
    },
};
