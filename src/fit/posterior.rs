//! E-step: posterior over the quadrature grid for every response pattern.
//!
//! For pattern `x` and node `θ_q`:
//!
//! `ln f(x, θ_q) = ln w_q + Σ_j [x_j ln P_j(θ_q) + (1 - x_j) ln(1 - P_j(θ_q))]`
//!
//! The marginal likelihood of the pattern is the log-sum-exp over nodes and the
//! posterior is `f(x, θ_q)` normalized by it. Patterns are processed on the
//! rayon pool; the log-likelihood is reduced sequentially in pattern order so
//! repeated runs agree to the last bit.

use rayon::prelude::*;

use crate::domain::{AbilityEstimate, IrtModel, ResponseMatrix};
use crate::error::{AnalysisError, AnalysisResult};
use crate::fit::{ItemParams, PatternTable};
use crate::math::{QuadratureGrid, log_sigmoid, logsumexp};

/// Posterior weights per pattern plus the marginal log-likelihood.
#[derive(Debug, Clone)]
pub struct Posterior {
    /// `weights[p][q]`: posterior mass of node `q` for pattern `p` (sums to 1).
    pub weights: Vec<Vec<f64>>,
    /// `Σ_p n_p ln P(x_p)`.
    pub log_likelihood: f64,
}

/// Pseudo-counts for the M-step.
#[derive(Debug, Clone)]
pub struct ExpectedCounts {
    /// Expected respondents at each node.
    pub at_node: Vec<f64>,
    /// `correct[j][q]`: expected correct answers to item `j` at node `q`.
    pub correct: Vec<Vec<f64>>,
}

/// Run the E-step for the current parameters.
pub fn e_step(table: &PatternTable, params: &[ItemParams], grid: &QuadratureGrid) -> Posterior {
    let log_w = grid.log_weights();
    // ln P and ln(1 - P) per item and node.
    let log_p: Vec<Vec<(f64, f64)>> = params
        .iter()
        .map(|it| {
            grid.nodes
                .iter()
                .map(|&theta| {
                    let z = it.linear(theta);
                    (log_sigmoid(z), log_sigmoid(-z))
                })
                .collect()
        })
        .collect();

    let per_pattern: Vec<(Vec<f64>, f64)> = table
        .patterns
        .par_iter()
        .map(|pattern| {
            let mut joint = log_w.clone();
            for (j, &x) in pattern.iter().enumerate() {
                for (q, slot) in joint.iter_mut().enumerate() {
                    let (lp, lq) = log_p[j][q];
                    *slot += if x == 1 { lp } else { lq };
                }
            }
            let marginal = logsumexp(&joint);
            let post = joint.iter().map(|l| (l - marginal).exp()).collect();
            (post, marginal)
        })
        .collect();

    let mut weights = Vec::with_capacity(per_pattern.len());
    let mut log_likelihood = 0.0;
    for ((post, marginal), count) in per_pattern.into_iter().zip(&table.counts) {
        log_likelihood += count * marginal;
        weights.push(post);
    }

    Posterior {
        weights,
        log_likelihood,
    }
}

impl Posterior {
    /// Aggregate posterior mass into per-node and per-item pseudo-counts.
    pub fn expected_counts(&self, table: &PatternTable) -> ExpectedCounts {
        let n_nodes = self.weights.first().map_or(0, Vec::len);
        let mut at_node = vec![0.0; n_nodes];
        for (post, count) in self.weights.iter().zip(&table.counts) {
            for (slot, w) in at_node.iter_mut().zip(post) {
                *slot += count * w;
            }
        }

        let correct = (0..table.n_items())
            .into_par_iter()
            .map(|j| {
                let mut r = vec![0.0; n_nodes];
                for ((pattern, post), count) in
                    table.patterns.iter().zip(&self.weights).zip(&table.counts)
                {
                    if pattern[j] == 1 {
                        for (slot, w) in r.iter_mut().zip(post) {
                            *slot += count * w;
                        }
                    }
                }
                r
            })
            .collect();

        ExpectedCounts { at_node, correct }
    }

    /// Posterior mean and standard deviation of θ for each pattern.
    pub fn eap(&self, grid: &QuadratureGrid) -> Vec<(f64, f64)> {
        self.weights
            .iter()
            .map(|post| {
                let mean: f64 = post.iter().zip(&grid.nodes).map(|(w, t)| w * t).sum();
                let var: f64 = post
                    .iter()
                    .zip(&grid.nodes)
                    .map(|(w, t)| w * (t - mean) * (t - mean))
                    .sum();
                (mean, var.max(0.0).sqrt())
            })
            .collect()
    }
}

/// EAP abilities for every respondent of `matrix` under a fitted model.
///
/// The matrix must contain every item of the model (extra columns, such as
/// items excluded as constant, are ignored).
pub fn score_eap(model: &IrtModel, matrix: &ResponseMatrix) -> AnalysisResult<Vec<AbilityEstimate>> {
    let columns = model_columns(model, matrix)?;
    let scored = matrix.select_items(&columns)?;
    let table = PatternTable::from_matrix(&scored);
    let grid = QuadratureGrid::standard_normal(
        model.quadrature.points,
        model.quadrature.theta_min,
        model.quadrature.theta_max,
    )?;
    let params = ItemParams::from_model(model);
    let eap = e_step(&table, &params, &grid).eap(&grid);

    Ok(scored
        .respondent_ids()
        .iter()
        .zip(&table.respondent_pattern)
        .map(|(id, &p)| AbilityEstimate {
            respondent_id: id.clone(),
            theta: eap[p].0,
            sd: eap[p].1,
        })
        .collect())
}

/// Matrix column index of every model item, in model order.
pub(crate) fn model_columns(model: &IrtModel, matrix: &ResponseMatrix) -> AnalysisResult<Vec<usize>> {
    model
        .items
        .iter()
        .map(|item| {
            matrix
                .item_ids()
                .iter()
                .position(|id| *id == item.id)
                .ok_or_else(|| {
                    AnalysisError::invalid_input(format!(
                        "response matrix has no column for model item {}",
                        item.id
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> QuadratureGrid {
        QuadratureGrid::standard_normal(41, -4.0, 4.0).unwrap()
    }

    fn table(rows: &[Vec<u32>]) -> PatternTable {
        let ids = (1..=rows[0].len()).map(|i| format!("q{i}")).collect();
        PatternTable::from_matrix(&ResponseMatrix::from_rows(ids, rows).unwrap())
    }

    #[test]
    fn posteriors_are_normalized() {
        let t = table(&[vec![1, 0, 1], vec![0, 0, 0], vec![1, 1, 1]]);
        let params = vec![ItemParams::from_difficulty(1.0, 0.0); 3];
        let post = e_step(&t, &params, &grid());
        for w in &post.weights {
            let total: f64 = w.iter().sum();
            assert!((total - 1.0).abs() < 1e-12);
        }
        assert!(post.log_likelihood < 0.0);
    }

    #[test]
    fn more_correct_answers_raise_the_eap() {
        let t = table(&[vec![0, 0, 0], vec![1, 0, 0], vec![1, 1, 1]]);
        let params = vec![ItemParams::from_difficulty(1.5, 0.0); 3];
        let g = grid();
        let eap = e_step(&t, &params, &g).eap(&g);
        assert!(eap[0].0 < eap[1].0);
        assert!(eap[1].0 < eap[2].0);
        // Symmetric items: all-wrong mirrors all-right.
        assert!((eap[0].0 + eap[2].0).abs() < 1e-10);
        assert!(eap.iter().all(|(_, sd)| *sd > 0.0 && *sd < 1.0));
    }

    #[test]
    fn expected_counts_add_up_to_the_sample() {
        let t = table(&[vec![1, 0], vec![1, 0], vec![0, 1], vec![1, 1]]);
        let params = vec![ItemParams::from_difficulty(1.0, 0.5); 2];
        let post = e_step(&t, &params, &grid());
        let counts = post.expected_counts(&t);

        let total: f64 = counts.at_node.iter().sum();
        assert!((total - 4.0).abs() < 1e-10);
        let first: f64 = counts.correct[0].iter().sum();
        let second: f64 = counts.correct[1].iter().sum();
        assert!((first - 3.0).abs() < 1e-10);
        assert!((second - 2.0).abs() < 1e-10);
    }
}
