//! Standard errors at convergence.
//!
//! The information matrix is the cross-product of per-pattern score vectors
//! (the empirical information of the marginal likelihood). For item `j` and
//! pattern `x` the score with respect to `(a_j, c_j)` is
//!
//! `Σ_q post(q | x) (x_j - P_j(θ_q)) [θ_q, 1]`
//!
//! Rasch items contribute only the intercept entry. Difficulty errors follow
//! from `b = -c / a` by the delta method.

use nalgebra::DMatrix;

use crate::domain::ModelKind;
use crate::fit::{ItemParams, PatternTable, Posterior};
use crate::math::{QuadratureGrid, sigmoid, spd_inverse};

/// Standard errors of one item; `None` when the information is singular.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ItemErrors {
    pub difficulty: Option<f64>,
    pub discrimination: Option<f64>,
}

pub fn standard_errors(
    kind: ModelKind,
    table: &PatternTable,
    posterior: &Posterior,
    params: &[ItemParams],
    grid: &QuadratureGrid,
) -> Vec<ItemErrors> {
    let per_item = if kind == ModelKind::Rasch { 1 } else { 2 };
    let dim = per_item * params.len();

    let probs: Vec<Vec<f64>> = params
        .iter()
        .map(|p| grid.nodes.iter().map(|&t| sigmoid(p.linear(t))).collect())
        .collect();

    let mut info = DMatrix::<f64>::zeros(dim, dim);
    let mut score = vec![0.0; dim];
    for ((pattern, post), &count) in table.patterns.iter().zip(&posterior.weights).zip(&table.counts) {
        score.iter_mut().for_each(|s| *s = 0.0);
        for (j, &x) in pattern.iter().enumerate() {
            let x = f64::from(x);
            let mut s_a = 0.0;
            let mut s_c = 0.0;
            for ((&w, &theta), &p) in post.iter().zip(&grid.nodes).zip(&probs[j]) {
                let r = w * (x - p);
                s_a += r * theta;
                s_c += r;
            }
            if per_item == 1 {
                score[j] = s_c;
            } else {
                score[2 * j] = s_a;
                score[2 * j + 1] = s_c;
            }
        }
        for a in 0..dim {
            if score[a] == 0.0 {
                continue;
            }
            for b in a..dim {
                info[(a, b)] += count * score[a] * score[b];
            }
        }
    }
    for a in 0..dim {
        for b in 0..a {
            info[(a, b)] = info[(b, a)];
        }
    }

    let Some(cov) = spd_inverse(&info) else {
        return vec![ItemErrors::default(); params.len()];
    };

    params
        .iter()
        .enumerate()
        .map(|(j, p)| {
            if per_item == 1 {
                ItemErrors {
                    difficulty: sd(cov[(j, j)]),
                    discrimination: None,
                }
            } else {
                let (ia, ic) = (2 * j, 2 * j + 1);
                let (var_a, var_c, cov_ac) = (cov[(ia, ia)], cov[(ic, ic)], cov[(ia, ic)]);
                // b = -c/a: db/da = c/a², db/dc = -1/a.
                let da = p.intercept / (p.slope * p.slope);
                let dc = -1.0 / p.slope;
                let var_b = da * da * var_a + dc * dc * var_c + 2.0 * da * dc * cov_ac;
                ItemErrors {
                    difficulty: sd(var_b),
                    discrimination: sd(var_a),
                }
            }
        })
        .collect()
}

fn sd(variance: f64) -> Option<f64> {
    (variance.is_finite() && variance >= 0.0).then(|| variance.sqrt())
}
