//! Solver interface for pepcert.
//!
//! This module provides:
//! - Matrix stuffing to convert constraints and metrics to solver format
//! - Totsu solver integration (always available)
//! - Clarabel solver integration (`clarabel` feature)

#[cfg(feature = "clarabel")]
pub mod clarabel;
pub mod settings;
pub mod stuffing;
pub mod totsu;

pub use settings::{DimensionReduction, Settings, SolverKind, Verbosity};
pub use stuffing::{stuff_problem, ConeDims, Objective, StuffedProblem, VariableMap};

#[cfg(not(feature = "clarabel"))]
use crate::error::PepError;
use crate::error::Result;

/// Solution status from the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Optimal solution found.
    Optimal,
    /// Solution found to reduced accuracy.
    OptimalInaccurate,
    /// Problem is infeasible.
    Infeasible,
    /// Problem is unbounded.
    Unbounded,
    /// Iteration or time limit reached.
    MaxIterations,
    /// Backend failure.
    SolverError,
}

impl SolveStatus {
    /// Whether the backend returned a usable primal-dual pair.
    pub fn is_success(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::OptimalInaccurate)
    }
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::OptimalInaccurate => "optimal_inaccurate",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Unbounded => "unbounded",
            SolveStatus::MaxIterations => "max_iterations",
            SolveStatus::SolverError => "solver_error",
        };
        f.write_str(name)
    }
}

/// Backend output: primal `x` and one dual per row of `A`.
#[derive(Debug, Clone)]
pub struct RawSolution {
    pub status: SolveStatus,
    pub x: Option<Vec<f64>>,
    pub z: Option<Vec<f64>>,
    /// Iteration count, when the backend reports one.
    pub iterations: Option<usize>,
    /// Solve time in seconds.
    pub solve_time: f64,
}

/// Solve the stuffed problem with the configured backend.
pub fn solve(problem: &StuffedProblem, settings: &Settings) -> Result<RawSolution> {
    match settings.solver {
        SolverKind::Totsu => Ok(totsu::solve(problem, settings)),
        #[cfg(feature = "clarabel")]
        SolverKind::Clarabel => clarabel::solve(problem, settings),
        #[cfg(not(feature = "clarabel"))]
        SolverKind::Clarabel => Err(PepError::SolverUnavailable(
            "clarabel backend is not compiled in; enable the `clarabel` cargo feature".into(),
        )),
    }
}
