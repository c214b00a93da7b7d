//! End-to-end solve orchestration.
//!
//! [`run`] drives one solve through its discrete phases, reporting progress
//! to an observer and honoring cooperative cancellation between phases. The
//! planning logic itself is single-threaded; callers that need a responsive
//! UI run [`run`] on a worker thread and receive progress through their own
//! [`ProgressObserver`] implementation. Once the external engine has the
//! model, cancellation waits for the engine's own time limit.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use thiserror::Error;

use crate::{
    data::ProblemData,
    feasibility::{self, FeasibilityReport},
    solution::Solution,
    solver::{
        ObjectiveKind, SolverError,
        manager::{ConfigError, SolverManager},
        model::BackendKind,
    },
};

/// Discrete phases of one solve, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Validating the fact tables.
    DataValidation,

    /// Running the pre-flight feasibility checks.
    FeasibilityCheck,

    /// Creating variables and applying constraints.
    ModelBuild,

    /// The external engine is solving.
    Solve,

    /// Extracting the solution record.
    SolutionExtraction,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DataValidation => "data validation",
            Self::FeasibilityCheck => "feasibility check",
            Self::ModelBuild => "model build",
            Self::Solve => "solve",
            Self::SolutionExtraction => "solution extraction",
        };

        f.write_str(label)
    }
}

/// Receives asynchronous progress notifications during a run.
pub trait ProgressObserver {
    /// A new phase has started.
    fn on_phase(&mut self, phase: Phase);

    /// Overall progress moved to `percent` with a short status text.
    fn on_progress(&mut self, percent: u8, status: &str);
}

/// Observer that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_phase(&mut self, _phase: Phase) {}

    fn on_progress(&mut self, _percent: u8, _status: &str) {}
}

/// Cooperative cancellation flag shared with a running solve.
///
/// Checked between phases only; a cancel request during the engine's own
/// solve takes effect at the next phase boundary or the engine's time limit,
/// whichever comes first.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Errors ending a run early.
#[derive(Debug, Error)]
pub enum RunError {
    /// The run was cancelled between phases.
    #[error("run cancelled during {phase}")]
    Cancelled {
        /// Phase that was about to start.
        phase: Phase,
    },

    /// The pre-flight analysis found critical issues.
    #[error("problem failed the feasibility pre-flight with {} critical issue(s)", report.critical_issues.len())]
    Preflight {
        /// The full analysis report.
        report: FeasibilityReport,
    },

    /// The manager's configuration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Model building or solving failed.
    #[error(transparent)]
    Solver(#[from] SolverError),
}

/// Everything one solve needs.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// The fact tables to plan against.
    pub data: ProblemData,

    /// Engine to solve with.
    pub backend: BackendKind,

    /// Objective to optimize.
    pub objective: ObjectiveKind,

    /// For output maximization, cap output at recorded demand.
    pub limit_to_demand: bool,
}

/// Execute one solve end to end.
///
/// Phases run in order: data validation, feasibility check, model build,
/// solve, solution extraction. The cancel token is consulted before each
/// phase.
///
/// # Errors
///
/// Returns [`RunError::Cancelled`] when the token fires between phases,
/// [`RunError::Preflight`] when the feasibility analysis finds critical
/// issues, and configuration or solver errors otherwise.
pub fn run(
    manager: &SolverManager,
    request: &RunRequest,
    observer: &mut dyn ProgressObserver,
    cancel: &CancelToken,
) -> Result<Solution, RunError> {
    enter_phase(Phase::DataValidation, 5, observer, cancel)?;
    request
        .data
        .validate_fields(&crate::data::Field::ALL)
        .map_err(SolverError::from)?;

    enter_phase(Phase::FeasibilityCheck, 25, observer, cancel)?;
    let report = feasibility::analyze(&request.data).map_err(SolverError::from)?;
    if !report.is_feasible() {
        return Err(RunError::Preflight { report });
    }

    enter_phase(Phase::ModelBuild, 55, observer, cancel)?;
    let mut solver = manager.create_solver(request.backend, true)?;
    match request.objective {
        ObjectiveKind::MinimizeCost => solver.build_minimize_cost_model(&request.data)?,
        ObjectiveKind::MaximizeOutput => {
            solver.build_maximize_output_model(&request.data, request.limit_to_demand)?;
        }
    }

    enter_phase(Phase::Solve, 90, observer, cancel)?;
    let status = solver.solve_model()?;

    enter_phase(Phase::SolutionExtraction, 100, observer, cancel)?;
    let solution = solver.get_solution()?;

    tracing::info!(%status, allocations = solution.values.len(), "run finished");

    Ok(solution)
}

fn enter_phase(
    phase: Phase,
    percent: u8,
    observer: &mut dyn ProgressObserver,
    cancel: &CancelToken,
) -> Result<(), RunError> {
    if cancel.is_cancelled() {
        return Err(RunError::Cancelled { phase });
    }

    tracing::debug!(%phase, percent, "entering phase");

    observer.on_phase(phase);
    observer.on_progress(percent, &phase.to_string());

    Ok(())
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::fixtures;

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingObserver {
        phases: Vec<Phase>,
        progress: Vec<u8>,
    }

    impl ProgressObserver for RecordingObserver {
        fn on_phase(&mut self, phase: Phase) {
            self.phases.push(phase);
        }

        fn on_progress(&mut self, percent: u8, _status: &str) {
            self.progress.push(percent);
        }
    }

    #[test]
    fn cancelled_token_stops_before_the_first_phase() -> TestResult {
        let manager = SolverManager::new();
        let request = RunRequest {
            data: fixtures::two_period_problem([120.0, 80.0], [100.0, 100.0])?,
            backend: BackendKind::Microlp,
            objective: ObjectiveKind::MinimizeCost,
            limit_to_demand: false,
        };

        let cancel = CancelToken::new();
        cancel.cancel();

        let result = run(&manager, &request, &mut NoopObserver, &cancel);

        assert!(matches!(
            result,
            Err(RunError::Cancelled {
                phase: Phase::DataValidation
            })
        ));

        Ok(())
    }

    #[test]
    fn full_run_reports_every_phase_in_order() -> TestResult {
        let manager = SolverManager::new();
        let request = RunRequest {
            data: fixtures::two_period_problem([120.0, 80.0], [100.0, 100.0])?,
            backend: BackendKind::Microlp,
            objective: ObjectiveKind::MinimizeCost,
            limit_to_demand: false,
        };

        let mut observer = RecordingObserver::default();
        let solution = run(&manager, &request, &mut observer, &CancelToken::new())?;

        assert_eq!(
            observer.phases,
            [
                Phase::DataValidation,
                Phase::FeasibilityCheck,
                Phase::ModelBuild,
                Phase::Solve,
                Phase::SolutionExtraction,
            ]
        );
        assert_eq!(observer.progress, [5, 25, 55, 90, 100]);
        assert!(solution.status.has_solution());

        Ok(())
    }

    #[test]
    fn infeasible_preflight_carries_the_report() -> TestResult {
        let manager = SolverManager::new();
        let request = RunRequest {
            data: fixtures::two_period_problem([50.0, 0.0], [100.0, 100.0])?,
            backend: BackendKind::Microlp,
            objective: ObjectiveKind::MinimizeCost,
            limit_to_demand: false,
        };

        let result = run(&manager, &request, &mut NoopObserver, &CancelToken::new());

        let Err(RunError::Preflight { report }) = result else {
            panic!("expected a pre-flight failure");
        };
        assert!(!report.is_feasible());

        Ok(())
    }
}
