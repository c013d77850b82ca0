//! Totsu solver integration.
//!
//! `totsu_core` is a first-order (primal-dual splitting) conic solver written
//! in pure Rust. It solves `min c.x  s.t.  A x + s = b, s in K` through
//! operator and cone traits, which are implemented here for the stuffed
//! problem's CSC matrix and its zero x nonneg x PSD product cone.

use std::time::Instant;

use nalgebra_sparse::CscMatrix;
use totsu_core::solver::{Cone, Operator, Solver, SolverError};
use totsu_core::{ConePSD, ConeRPos, ConeZero, FloatGeneric};

use super::settings::{Settings, Verbosity};
use super::stuffing::{ConeDims, StuffedProblem};
use super::{RawSolution, SolveStatus};
use crate::sparse::csc_column;

type L = FloatGeneric<f64>;

/// Default iteration cap of the first-order method.
const DEFAULT_MAX_ITER: usize = 1_000_000;

impl From<SolverError> for SolveStatus {
    fn from(err: SolverError) -> Self {
        match err {
            SolverError::Infeasible => SolveStatus::Infeasible,
            SolverError::Unbounded => SolveStatus::Unbounded,
            SolverError::ExcessIter => SolveStatus::MaxIterations,
            SolverError::InvalidOp | SolverError::WorkShortage | SolverError::ConeFailure => {
                SolveStatus::SolverError
            }
        }
    }
}

/// A CSC matrix seen as a totsu linear operator.
struct CscOp<'a> {
    mat: &'a CscMatrix<f64>,
}

impl Operator<L> for CscOp<'_> {
    fn size(&self) -> (usize, usize) {
        (self.mat.nrows(), self.mat.ncols())
    }

    // y = alpha A x + beta y
    fn op(&self, alpha: f64, x: &[f64], beta: f64, y: &mut [f64]) {
        for v in y.iter_mut() {
            *v *= beta;
        }
        for (j, col) in self.mat.col_iter().enumerate() {
            let xj = alpha * x[j];
            if xj == 0.0 {
                continue;
            }
            for (i, v) in col.row_indices().iter().zip(col.values()) {
                y[*i] += v * xj;
            }
        }
    }

    // y = alpha A^T x + beta y
    fn trans_op(&self, alpha: f64, x: &[f64], beta: f64, y: &mut [f64]) {
        for (j, col) in self.mat.col_iter().enumerate() {
            let dot: f64 = col
                .row_indices()
                .iter()
                .zip(col.values())
                .map(|(i, v)| v * x[*i])
                .sum();
            y[j] = beta * y[j] + alpha * dot;
        }
    }

    fn absadd_cols(&self, tau: &mut [f64]) {
        for (j, col) in self.mat.col_iter().enumerate() {
            tau[j] += col.values().iter().map(|v| v.abs()).sum::<f64>();
        }
    }

    fn absadd_rows(&self, sigma: &mut [f64]) {
        for col in self.mat.col_iter() {
            for (i, v) in col.row_indices().iter().zip(col.values()) {
                sigma[*i] += v.abs();
            }
        }
    }
}

/// `{0}^zero x R+^nonneg x svec(S+^psd)`.
struct PepCone<'a> {
    dims: ConeDims,
    cone_zero: ConeZero<L>,
    cone_rpos: ConeRPos<L>,
    cone_psd: ConePSD<'a, L>,
}

impl PepCone<'_> {
    fn split<'s>(&self, x: &'s mut [f64]) -> (&'s mut [f64], &'s mut [f64], &'s mut [f64]) {
        let (x_zero, rest) = x.split_at_mut(self.dims.zero);
        let (x_nonneg, x_psd) = rest.split_at_mut(self.dims.nonneg);
        (x_zero, x_nonneg, x_psd)
    }
}

impl Cone<L> for PepCone<'_> {
    fn proj(&mut self, dual_cone: bool, x: &mut [f64]) -> Result<(), ()> {
        let dims = self.dims.clone();
        let (x_zero, rest) = x.split_at_mut(dims.zero);
        let (x_nonneg, x_psd) = rest.split_at_mut(dims.nonneg);

        if dims.zero > 0 {
            self.cone_zero.proj(dual_cone, x_zero)?;
        }
        if dims.nonneg > 0 {
            self.cone_rpos.proj(dual_cone, x_nonneg)?;
        }
        if dims.psd > 0 {
            self.cone_psd.proj(dual_cone, x_psd)?;
        }
        Ok(())
    }

    fn product_group<G: Fn(&mut [f64]) + Copy>(&self, dp_tau: &mut [f64], group: G) {
        let (t_zero, t_nonneg, t_psd) = self.split(dp_tau);

        self.cone_zero.product_group(t_zero, group);
        self.cone_rpos.product_group(t_nonneg, group);
        if self.dims.psd > 0 {
            self.cone_psd.product_group(t_psd, group);
        }
    }
}

/// Solve the stuffed problem using Totsu.
pub fn solve(problem: &StuffedProblem, settings: &Settings) -> RawSolution {
    let start = Instant::now();

    let mat_c = csc_column(&problem.c);
    let mat_b = csc_column(&problem.b);
    let op_c = CscOp { mat: &mat_c };
    let op_a = CscOp { mat: &problem.a };
    let op_b = CscOp { mat: &mat_b };

    let max_iter = settings.max_iter.unwrap_or(DEFAULT_MAX_ITER);
    let verbose = settings.verbosity >= Verbosity::Solver;
    let solver = Solver::<L>::new().par(|p| {
        p.max_iter = Some(max_iter);
        p.eps_acc = settings.tolerance;
        p.eps_inf = settings.tolerance;
        if verbose {
            p.log_period = 1_000;
        }
    });

    let psd_rows = problem.cone_dims.psd_rows();
    let mut psd_work = vec![0.0; ConePSD::<L>::query_worklen(psd_rows)];
    let cone = PepCone {
        dims: problem.cone_dims.clone(),
        cone_zero: ConeZero::new(),
        cone_rpos: ConeRPos::new(),
        cone_psd: ConePSD::new(&mut psd_work, solver.par.eps_zero),
    };
    let mut work = vec![0.0; Solver::<L>::query_worklen(op_a.size())];

    log::debug!(
        "totsu: {} rows x {} columns, {} nonzeros",
        problem.a.nrows(),
        problem.a.ncols(),
        problem.a.nnz()
    );

    match solver.solve((op_c, op_a, op_b, cone, &mut work)) {
        Ok((x, y)) => RawSolution {
            status: SolveStatus::Optimal,
            x: Some(x.to_vec()),
            z: Some(y.to_vec()),
            iterations: None,
            solve_time: start.elapsed().as_secs_f64(),
        },
        Err(err) => {
            log::warn!("totsu: {}", err);
            RawSolution {
                status: err.into(),
                x: None,
                z: None,
                iterations: (err == SolverError::ExcessIter).then_some(max_iter),
                solve_time: start.elapsed().as_secs_f64(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::{csc_from_triplets, csc_to_dense};
    use float_eq::assert_float_eq;
    use nalgebra::DVector;

    fn sample() -> CscMatrix<f64> {
        csc_from_triplets(
            3,
            2,
            vec![0, 2, 1, 2],
            vec![0, 0, 1, 1],
            vec![1.0, -2.0, 3.0, 4.0],
        )
    }

    #[test]
    fn test_csc_op_matches_dense() {
        let mat = sample();
        let dense = csc_to_dense(&mat);
        let op = CscOp { mat: &mat };
        assert_eq!(Operator::<L>::size(&op), (3, 2));

        let x = [0.5, -1.0];
        let mut y = [1.0, 1.0, 1.0];
        op.op(2.0, &x, 0.5, &mut y);
        let expect = dense.clone() * DVector::from_row_slice(&x) * 2.0 + DVector::from_element(3, 0.5);
        assert_float_eq!(y.as_ref(), expect.as_slice(), abs_all <= 1e-12);

        let x = [1.0, 2.0, 3.0];
        let mut y = [0.0, 0.0];
        op.trans_op(1.0, &x, 0.0, &mut y);
        let expect = dense.transpose() * DVector::from_row_slice(&x);
        assert_float_eq!(y.as_ref(), expect.as_slice(), abs_all <= 1e-12);
    }

    #[test]
    fn test_csc_op_abs_sums() {
        let mat = sample();
        let op = CscOp { mat: &mat };

        let mut tau = [0.0, 1.0];
        op.absadd_cols(&mut tau);
        assert_eq!(tau, [3.0, 8.0]);

        let mut sigma = [0.0; 3];
        op.absadd_rows(&mut sigma);
        assert_eq!(sigma, [1.0, 3.0, 6.0]);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(SolveStatus::from(SolverError::Infeasible), SolveStatus::Infeasible);
        assert_eq!(SolveStatus::from(SolverError::ExcessIter), SolveStatus::MaxIterations);
        assert_eq!(SolveStatus::from(SolverError::ConeFailure), SolveStatus::SolverError);
    }

    #[test]
    fn test_small_lp() {
        let _ = env_logger::builder().is_test(true).try_init();

        // min -x0 - x1  s.t.  x0 + x1 <= 1, x >= 0  (one x1 = 1 - x0 face, value -1)
        let a = csc_from_triplets(
            3,
            2,
            vec![0, 0, 1, 2],
            vec![0, 1, 0, 1],
            vec![1.0, 1.0, -1.0, -1.0],
        );
        let map = crate::solver::stuffing::VariableMap::new([], []);
        let problem = StuffedProblem {
            c: vec![-1.0, -1.0],
            a,
            b: vec![1.0, 0.0, 0.0],
            cone_dims: ConeDims {
                zero: 0,
                nonneg: 3,
                psd: 0,
            },
            var_map: map,
            constraint_rows: vec![0, 1, 2],
            metric_rows: vec![],
        };
        let settings = Settings {
            tolerance: 1e-6,
            ..Settings::default()
        };
        let sol = solve(&problem, &settings);
        assert_eq!(sol.status, SolveStatus::Optimal);
        let x = sol.x.unwrap();
        assert_float_eq!(x[0] + x[1], 1.0, abs <= 1e-4);
        // The binding row carries a unit multiplier.
        assert_float_eq!(sol.z.unwrap()[0], 1.0, abs <= 1e-4);
    }
}
