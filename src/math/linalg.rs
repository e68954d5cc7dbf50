//! Small dense linear algebra on top of nalgebra.
//!
//! Matrices here are item × item (tens of rows), so we favour clarity over
//! blocking or in-place tricks.

use std::cmp::Ordering;

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::domain::ResponseMatrix;

/// Eigenvalues below this are treated as zero.
pub const EIGEN_EPS: f64 = 1e-10;

/// Pearson correlation matrix of the items (phi coefficients for 0/1 items).
///
/// A zero-variance item gets zero off-diagonal correlations; callers screen
/// constant items before getting here.
pub fn correlation_matrix(matrix: &ResponseMatrix) -> DMatrix<f64> {
    let n = matrix.n_respondents() as f64;
    let k = matrix.n_items();

    let means: Vec<f64> = (0..k).map(|j| matrix.item_mean(j)).collect();
    let mut cov = DMatrix::<f64>::zeros(k, k);
    for row in matrix.rows() {
        for a in 0..k {
            let da = f64::from(row[a]) - means[a];
            for b in a..k {
                cov[(a, b)] += da * (f64::from(row[b]) - means[b]);
            }
        }
    }

    let sd: Vec<f64> = (0..k).map(|j| (cov[(j, j)] / n).sqrt()).collect();
    let mut r = DMatrix::<f64>::identity(k, k);
    for a in 0..k {
        for b in (a + 1)..k {
            let denom = sd[a] * sd[b];
            let value = if denom > 0.0 {
                (cov[(a, b)] / n / denom).clamp(-1.0, 1.0)
            } else {
                0.0
            };
            r[(a, b)] = value;
            r[(b, a)] = value;
        }
    }
    r
}

/// Eigen-decomposition of a symmetric matrix, sorted by descending eigenvalue.
///
/// Ties keep nalgebra's original column order, so the result is deterministic.
pub fn sorted_eigen(m: &DMatrix<f64>) -> (Vec<f64>, DMatrix<f64>) {
    let eig = SymmetricEigen::new(m.clone());
    let mut order: Vec<usize> = (0..eig.eigenvalues.len()).collect();
    order.sort_by(|&i, &j| {
        eig.eigenvalues[j]
            .partial_cmp(&eig.eigenvalues[i])
            .unwrap_or(Ordering::Equal)
            .then(i.cmp(&j))
    });

    let values = order.iter().map(|&i| eig.eigenvalues[i]).collect();
    let columns: Vec<DVector<f64>> = order
        .iter()
        .map(|&i| eig.eigenvectors.column(i).into_owned())
        .collect();
    (values, DMatrix::from_columns(&columns))
}

/// Sum of squared off-diagonal entries.
pub fn off_diagonal_sum_sq(m: &DMatrix<f64>) -> f64 {
    let mut total = 0.0;
    for a in 0..m.nrows() {
        for b in 0..m.ncols() {
            if a != b {
                total += m[(a, b)] * m[(a, b)];
            }
        }
    }
    total
}

/// Partial correlations (each pair controlling for all other items).
///
/// Returns `None` if the correlation matrix cannot be inverted.
pub fn partial_correlations(r: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let inv = r.clone().try_inverse()?;
    let k = r.nrows();
    let mut out = DMatrix::<f64>::identity(k, k);
    for a in 0..k {
        for b in 0..k {
            if a == b {
                continue;
            }
            let denom = (inv[(a, a)] * inv[(b, b)]).sqrt();
            if !(denom.is_finite() && denom > 0.0) {
                return None;
            }
            out[(a, b)] = -inv[(a, b)] / denom;
        }
    }
    Some(out)
}

/// Invert a symmetric positive-definite matrix via Cholesky.
pub fn spd_inverse(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let inv = m.clone().cholesky()?.inverse();
    inv.iter().all(|v| v.is_finite()).then_some(inv)
}
