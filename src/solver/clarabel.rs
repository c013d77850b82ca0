//! Clarabel solver integration.
//!
//! Interior-point backend, compiled with the `clarabel` feature. The PSD cone
//! uses Clarabel's `PSDTriangleConeT`, whose layout matches `svec`.

use clarabel::algebra::CscMatrix as ClarabelCsc;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};

use super::settings::{Settings, Verbosity};
use super::stuffing::{ConeDims, StuffedProblem};
use super::{RawSolution, SolveStatus};
use crate::error::{PepError, Result};

/// Default iteration cap of the interior-point method.
const DEFAULT_MAX_ITER: u32 = 200;

impl From<SolverStatus> for SolveStatus {
    fn from(status: SolverStatus) -> Self {
        match status {
            SolverStatus::Solved => SolveStatus::Optimal,
            SolverStatus::AlmostSolved => SolveStatus::OptimalInaccurate,
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                SolveStatus::Infeasible
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                SolveStatus::Unbounded
            }
            SolverStatus::MaxIterations | SolverStatus::MaxTime => SolveStatus::MaxIterations,
            _ => SolveStatus::SolverError,
        }
    }
}

/// Solve the stuffed problem using Clarabel.
pub fn solve(problem: &StuffedProblem, settings: &Settings) -> Result<RawSolution> {
    let n = problem.a.ncols();
    let p = to_clarabel_csc(&nalgebra_sparse::CscMatrix::zeros(n, n));
    let a = to_clarabel_csc(&problem.a);
    let cones = to_clarabel_cones(&problem.cone_dims);

    let max_iter = settings
        .max_iter
        .map(|it| u32::try_from(it).unwrap_or(u32::MAX))
        .unwrap_or(DEFAULT_MAX_ITER);

    let clarabel_settings = DefaultSettingsBuilder::default()
        .verbose(settings.verbosity >= Verbosity::Solver)
        .max_iter(max_iter)
        .time_limit(settings.time_limit)
        .tol_gap_abs(settings.tolerance)
        .tol_gap_rel(settings.tolerance)
        .tol_feas(settings.tolerance)
        .build()
        .map_err(|e| PepError::SolverError(format!("invalid clarabel settings: {}", e)))?;

    let mut solver = DefaultSolver::new(&p, &problem.c, &a, &problem.b, &cones, clarabel_settings);
    solver.solve();

    let status: SolveStatus = solver.solution.status.into();
    let solve_time = solver.solution.solve_time;
    let iterations = Some(solver.info.iterations as usize);

    if status.is_success() {
        Ok(RawSolution {
            status,
            x: Some(solver.solution.x.clone()),
            z: Some(solver.solution.z.clone()),
            iterations,
            solve_time,
        })
    } else {
        Ok(RawSolution {
            status,
            x: None,
            z: None,
            iterations,
            solve_time,
        })
    }
}

/// Convert nalgebra CSC to Clarabel CSC.
fn to_clarabel_csc(m: &nalgebra_sparse::CscMatrix<f64>) -> ClarabelCsc<f64> {
    ClarabelCsc::new(
        m.nrows(),
        m.ncols(),
        m.col_offsets().to_vec(),
        m.row_indices().to_vec(),
        m.values().to_vec(),
    )
}

/// Convert cone dimensions to Clarabel cones.
fn to_clarabel_cones(dims: &ConeDims) -> Vec<SupportedConeT<f64>> {
    let mut cones = Vec::new();

    if dims.zero > 0 {
        cones.push(SupportedConeT::ZeroConeT(dims.zero));
    }

    if dims.nonneg > 0 {
        cones.push(SupportedConeT::NonnegativeConeT(dims.nonneg));
    }

    if dims.psd > 0 {
        cones.push(SupportedConeT::PSDTriangleConeT(dims.psd));
    }

    cones
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_clarabel_cones() {
        let dims = ConeDims {
            zero: 2,
            nonneg: 3,
            psd: 4,
        };
        let cones = to_clarabel_cones(&dims);
        assert_eq!(cones.len(), 3);

        let dims = ConeDims {
            zero: 0,
            nonneg: 3,
            psd: 0,
        };
        assert_eq!(to_clarabel_cones(&dims).len(), 1);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(SolveStatus::from(SolverStatus::Solved), SolveStatus::Optimal);
        assert_eq!(
            SolveStatus::from(SolverStatus::AlmostSolved),
            SolveStatus::OptimalInaccurate
        );
        assert_eq!(
            SolveStatus::from(SolverStatus::DualInfeasible),
            SolveStatus::Unbounded
        );
    }
}
