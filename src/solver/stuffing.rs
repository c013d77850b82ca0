//! Matrix stuffing: lowers constraints and metrics to solver format.
//!
//! The decision vector is `x = [tau, F, svec(G)]` and every row reads
//! `A x + s = b` with `s` in `{0}^zero x R+^nonneg x svec(S+^m)`.
//! `svec` stacks the upper triangle of `G` column by column and scales the
//! off-diagonal entries by `sqrt(2)`, the layout both backends expect.

use std::collections::HashMap;

use nalgebra::DMatrix;
use nalgebra_sparse::CscMatrix;

use crate::constraints::{Constraint, Relation};
use crate::context::{AtomId, LeafId};
use crate::error::{PepError, Result};
use crate::expr::Expression;
use crate::sparse::csc_from_triplets;

/// Cone dimensions, in row order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConeDims {
    /// Number of zero cone (equality) rows.
    pub zero: usize,
    /// Number of nonnegative cone rows.
    pub nonneg: usize,
    /// Order of the PSD matrix.
    pub psd: usize,
}

impl ConeDims {
    /// Length of `svec` of the PSD block.
    pub fn psd_rows(&self) -> usize {
        self.psd * (self.psd + 1) / 2
    }

    /// Total number of constraint rows.
    pub fn total(&self) -> usize {
        self.zero + self.nonneg + self.psd_rows()
    }
}

/// Mapping from leaves and atoms to columns of the decision vector.
#[derive(Debug, Clone)]
pub struct VariableMap {
    leaves: Vec<LeafId>,
    atoms: Vec<AtomId>,
    leaf_pos: HashMap<LeafId, usize>,
    atom_pos: HashMap<AtomId, usize>,
}

impl VariableMap {
    /// Build from the basis leaves and atoms; both are sorted by creation index.
    pub fn new(leaves: impl IntoIterator<Item = LeafId>, atoms: impl IntoIterator<Item = AtomId>) -> Self {
        let mut leaves: Vec<_> = leaves.into_iter().collect();
        leaves.sort();
        leaves.dedup();
        let mut atoms: Vec<_> = atoms.into_iter().collect();
        atoms.sort();
        atoms.dedup();

        let leaf_pos = leaves.iter().enumerate().map(|(k, l)| (*l, k)).collect();
        let atom_pos = atoms.iter().enumerate().map(|(k, a)| (*a, k)).collect();

        VariableMap {
            leaves,
            atoms,
            leaf_pos,
            atom_pos,
        }
    }

    pub fn leaves(&self) -> &[LeafId] {
        &self.leaves
    }

    pub fn atoms(&self) -> &[AtomId] {
        &self.atoms
    }

    /// Order of the Gram matrix.
    pub fn gram_size(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaf_index(&self, leaf: LeafId) -> Option<usize> {
        self.leaf_pos.get(&leaf).copied()
    }

    pub fn atom_index(&self, atom: AtomId) -> Option<usize> {
        self.atom_pos.get(&atom).copied()
    }

    pub fn tau_col(&self) -> usize {
        0
    }

    pub fn atom_col(&self, atom: AtomId) -> Option<usize> {
        self.atom_index(atom).map(|k| 1 + k)
    }

    /// Column of the Gram entry `(i, j)` given by basis positions.
    pub fn gram_col(&self, i: usize, j: usize) -> usize {
        let (r, c) = if i <= j { (i, j) } else { (j, i) };
        1 + self.atoms.len() + c * (c + 1) / 2 + r
    }

    /// Total number of optimization variables.
    pub fn total_vars(&self) -> usize {
        let m = self.gram_size();
        1 + self.atoms.len() + m * (m + 1) / 2
    }

    /// Split a primal vector into `(tau, F, G)`.
    pub fn unpack(&self, x: &[f64]) -> (f64, Vec<f64>, DMatrix<f64>) {
        let m = self.gram_size();
        let f = x[1..1 + self.atoms.len()].to_vec();
        let mut gram = DMatrix::zeros(m, m);
        for c in 0..m {
            for r in 0..=c {
                let v = x[self.gram_col(r, c)];
                if r == c {
                    gram[(r, c)] = v;
                } else {
                    gram[(r, c)] = v / std::f64::consts::SQRT_2;
                    gram[(c, r)] = gram[(r, c)];
                }
            }
        }
        (x[self.tau_col()], f, gram)
    }
}

/// One affine row `sum coeffs . x + constant`.
#[derive(Debug, Clone, Default)]
struct LinearRow {
    coeffs: Vec<(usize, f64)>,
    constant: f64,
}

/// Lower an Expression onto the columns of `var_map`.
fn lower(expr: &Expression, var_map: &VariableMap) -> Result<LinearRow> {
    let mut coeffs = Vec::with_capacity(expr.linear().len() + expr.quadratic().len());

    for (atom, c) in expr.linear() {
        let col = var_map.atom_col(*atom).ok_or_else(|| {
            PepError::InvalidProblem(format!("function value {} is not in the basis", atom))
        })?;
        coeffs.push((col, *c));
    }

    for (&(li, lj), c) in expr.quadratic() {
        let missing = |l: LeafId| PepError::InvalidProblem(format!("point {} is not in the basis", l));
        let i = var_map.leaf_index(li).ok_or_else(|| missing(li))?;
        let j = var_map.leaf_index(lj).ok_or_else(|| missing(lj))?;
        let coeff = if i == j {
            *c
        } else {
            *c / std::f64::consts::SQRT_2
        };
        coeffs.push((var_map.gram_col(i, j), coeff));
    }

    Ok(LinearRow {
        coeffs,
        constant: expr.constant_term(),
    })
}

/// What the stuffed problem optimizes.
#[derive(Debug, Clone)]
pub enum Objective {
    /// Maximize `tau`, the worst-case value of the performance metrics.
    MaximizeTau,
    /// Minimize `<weights, G>` while keeping `tau >= tau_floor`.
    MinimizeGram {
        weights: DMatrix<f64>,
        tau_floor: f64,
    },
}

/// Stuffed problem ready for a backend: minimize `c . x` s.t. `A x + s = b`, `s` in K.
#[derive(Debug)]
pub struct StuffedProblem {
    /// Linear cost vector c (n).
    pub c: Vec<f64>,
    /// Constraint matrix A (rows x n).
    pub a: CscMatrix<f64>,
    /// Constraint vector b (rows).
    pub b: Vec<f64>,
    /// Cone dimensions.
    pub cone_dims: ConeDims,
    /// Variable mapping for solution recovery.
    pub var_map: VariableMap,
    /// Row of each input constraint, in input order.
    pub constraint_rows: Vec<usize>,
    /// Row of each performance metric, in input order.
    pub metric_rows: Vec<usize>,
}

/// Build the stuffed problem.
///
/// Equalities go to the zero cone; inequalities, metric rows
/// (`tau - metric <= 0`) and the optional tau floor go to the nonnegative cone.
pub fn stuff_problem(
    constraints: &[Constraint],
    metrics: &[Expression],
    var_map: VariableMap,
    objective: &Objective,
) -> Result<StuffedProblem> {
    let n = var_map.total_vars();
    let tau = var_map.tau_col();

    let mut zeros: Vec<(usize, LinearRow)> = Vec::new();
    let mut nonnegs: Vec<(Option<usize>, LinearRow)> = Vec::new();

    for (k, constraint) in constraints.iter().enumerate() {
        let row = lower(constraint.expression(), &var_map)?;
        match constraint.relation() {
            Relation::Equality => zeros.push((k, row)),
            Relation::Inequality => nonnegs.push((Some(k), row)),
        }
    }

    let mut metric_rows = Vec::with_capacity(metrics.len());
    let first_metric = zeros.len() + nonnegs.len();
    for (k, metric) in metrics.iter().enumerate() {
        // tau - metric <= 0
        let mut row = lower(metric, &var_map)?;
        for entry in row.coeffs.iter_mut() {
            entry.1 = -entry.1;
        }
        row.coeffs.push((tau, 1.0));
        row.constant = -row.constant;
        nonnegs.push((None, row));
        metric_rows.push(first_metric + k);
    }

    let mut c = vec![0.0; n];
    match objective {
        Objective::MaximizeTau => c[tau] = -1.0,
        Objective::MinimizeGram { weights, tau_floor } => {
            let m = var_map.gram_size();
            for j in 0..m {
                for i in 0..=j {
                    let w = if i == j {
                        weights[(i, j)]
                    } else {
                        std::f64::consts::SQRT_2 * weights[(i, j)]
                    };
                    c[var_map.gram_col(i, j)] = w;
                }
            }
            // tau_floor - tau <= 0
            nonnegs.push((
                None,
                LinearRow {
                    coeffs: vec![(tau, -1.0)],
                    constant: *tau_floor,
                },
            ));
        }
    }

    let cone_dims = ConeDims {
        zero: zeros.len(),
        nonneg: nonnegs.len(),
        psd: var_map.gram_size(),
    };
    let total_rows = cone_dims.total();

    let mut a_rows = Vec::new();
    let mut a_cols = Vec::new();
    let mut a_vals = Vec::new();
    let mut b = vec![0.0; total_rows];
    let mut constraint_rows = vec![0; constraints.len()];

    // expr <= 0 (or == 0) reads A x + s = b with A = coeffs and b = -constant.
    let ordered = zeros
        .into_iter()
        .map(|(k, row)| (Some(k), row))
        .chain(nonnegs);
    for (r, (source, row)) in ordered.enumerate() {
        for (col, val) in row.coeffs {
            a_rows.push(r);
            a_cols.push(col);
            a_vals.push(val);
        }
        b[r] = -row.constant;
        if let Some(k) = source {
            constraint_rows[k] = r;
        }
    }

    // s = svec(G) in the PSD cone.
    let psd_start = cone_dims.zero + cone_dims.nonneg;
    let gram_start = var_map.gram_col(0, 0);
    for k in 0..cone_dims.psd_rows() {
        a_rows.push(psd_start + k);
        a_cols.push(gram_start + k);
        a_vals.push(-1.0);
    }

    let a = csc_from_triplets(total_rows, n, a_rows, a_cols, a_vals);

    Ok(StuffedProblem {
        c,
        a,
        b,
        cone_dims,
        var_map,
        constraint_rows,
        metric_rows,
    })
}
