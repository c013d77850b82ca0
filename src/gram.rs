//! Spectral utilities on solved Gram matrices.
//!
//! A Gram matrix `G` of `m` leaves is factored as `G ~ X^T X` with `X` of
//! shape `d x m`, keeping only the `d` significant eigenvalues. Columns of
//! `X` are concrete coordinates of the leaves.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

/// Eigenvalues of a Gram matrix, sorted in decreasing order.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub eigenvalues: Vec<f64>,
    /// Number of eigenvalues above `eig_tolerance * max eigenvalue`.
    pub rank: usize,
}

fn symmetric_eigen(gram: &DMatrix<f64>) -> SymmetricEigen<f64, nalgebra::Dyn> {
    let sym = (gram + gram.transpose()) * 0.5;
    sym.symmetric_eigen()
}

/// Indices of eigenvalues sorted in decreasing order.
fn decreasing_order(eigenvalues: &DVector<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));
    order
}

fn threshold(largest: f64, eig_tolerance: f64) -> Option<f64> {
    (largest > 0.0).then(|| eig_tolerance * largest)
}

/// Spectrum of `gram` with its numerical rank.
pub fn spectrum(gram: &DMatrix<f64>, eig_tolerance: f64) -> Spectrum {
    if gram.is_empty() {
        return Spectrum {
            eigenvalues: Vec::new(),
            rank: 0,
        };
    }

    let eig = symmetric_eigen(gram);
    let eigenvalues: Vec<f64> = decreasing_order(&eig.eigenvalues)
        .into_iter()
        .map(|k| eig.eigenvalues[k])
        .collect();
    let rank = match threshold(eigenvalues[0], eig_tolerance) {
        Some(t) => eigenvalues.iter().filter(|&&l| l > t).count(),
        None => 0,
    };

    Spectrum { eigenvalues, rank }
}

/// Low-rank coordinates of the Gram leaves.
#[derive(Debug, Clone)]
pub struct Realization {
    coords: DMatrix<f64>,
}

impl Realization {
    /// Factor `gram`, keeping the significant eigenvalues (at least one dimension).
    pub fn new(gram: &DMatrix<f64>, eig_tolerance: f64) -> Self {
        let m = gram.nrows();
        if m == 0 {
            return Realization {
                coords: DMatrix::zeros(1, 0),
            };
        }

        let eig = symmetric_eigen(gram);
        let order = decreasing_order(&eig.eigenvalues);
        let kept: Vec<usize> = match threshold(eig.eigenvalues[order[0]], eig_tolerance) {
            Some(t) => order
                .into_iter()
                .filter(|&k| eig.eigenvalues[k] > t)
                .collect(),
            None => Vec::new(),
        };

        let dim = kept.len().max(1);
        let mut coords = DMatrix::zeros(dim, m);
        for (row, &k) in kept.iter().enumerate() {
            let scale = eig.eigenvalues[k].sqrt();
            for i in 0..m {
                coords[(row, i)] = scale * eig.eigenvectors[(i, k)];
            }
        }

        Realization { coords }
    }

    /// Dimension of the realization.
    pub fn dimension(&self) -> usize {
        self.coords.nrows()
    }

    /// Coordinates of the leaf at basis position `index`.
    pub fn leaf(&self, index: usize) -> DVector<f64> {
        self.coords.column(index).into_owned()
    }

    /// `d x m` coordinate matrix.
    pub fn coords(&self) -> &DMatrix<f64> {
        &self.coords
    }
}

/// Log-det reweighting `W = U diag(1 / (lambda + delta)) U^T`.
pub fn logdet_weights(gram: &DMatrix<f64>, delta: f64) -> DMatrix<f64> {
    let eig = symmetric_eigen(gram);
    let inv = eig.eigenvalues.map(|l| 1.0 / (l.max(0.0) + delta));
    &eig.eigenvectors * DMatrix::from_diagonal(&inv) * eig.eigenvectors.transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    fn rank_one() -> DMatrix<f64> {
        // v v^T with v = (1, 2, 2)
        let v = DVector::from_vec(vec![1.0, 2.0, 2.0]);
        &v * v.transpose()
    }

    #[test]
    fn test_spectrum_rank() {
        let s = spectrum(&rank_one(), 1e-6);
        assert_eq!(s.rank, 1);
        assert_float_eq!(s.eigenvalues[0], 9.0, abs <= 1e-9);
        assert!(s.eigenvalues[0] >= s.eigenvalues[1]);

        let s = spectrum(&DMatrix::identity(4, 4), 1e-3);
        assert_eq!(s.rank, 4);

        let s = spectrum(&DMatrix::zeros(2, 2), 1e-3);
        assert_eq!(s.rank, 0);
    }

    #[test]
    fn test_realization_reproduces_gram() {
        let g = rank_one();
        let r = Realization::new(&g, 1e-6);
        assert_eq!(r.dimension(), 1);
        let back = r.coords().transpose() * r.coords();
        for i in 0..3 {
            for j in 0..3 {
                assert_float_eq!(back[(i, j)], g[(i, j)], abs <= 1e-9);
            }
        }
        assert_float_eq!(r.leaf(1).norm(), 2.0, abs <= 1e-9);
    }

    #[test]
    fn test_realization_of_zero_matrix() {
        let r = Realization::new(&DMatrix::zeros(3, 3), 1e-3);
        assert_eq!(r.dimension(), 1);
        assert_eq!(r.leaf(2)[0], 0.0);
    }

    #[test]
    fn test_logdet_weights() {
        let g = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 0.0]));
        let w = logdet_weights(&g, 0.5);
        assert_float_eq!(w[(0, 0)], 1.0 / 1.5, abs <= 1e-12);
        assert_float_eq!(w[(1, 1)], 2.0, abs <= 1e-12);
        assert_float_eq!(w[(0, 1)], 0.0, abs <= 1e-12);
    }
}
