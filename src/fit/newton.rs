//! M-step: per-item Newton-Raphson on the expected complete-data likelihood.
//!
//! Items are handled in slope-intercept form `z = aθ + c`. With pseudo-counts
//! `n_q` (respondents at node q) and `r_q` (correct answers at node q):
//!
//! - objective: `Σ_q r_q ln P_q + (n_q - r_q) ln(1 - P_q)`
//! - gradient: `Σ_q (r_q - n_q P_q) [θ_q, 1]`
//! - information: `Σ_q n_q P_q (1 - P_q) [θ_q, 1][θ_q, 1]ᵀ`
//!
//! Rasch items keep `a = 1` and only move the intercept. Each Newton step is
//! halved until the objective does not decrease.

use rayon::prelude::*;

use crate::domain::ModelKind;
use crate::fit::{ExpectedCounts, ItemParams};
use crate::math::{log_sigmoid, sigmoid};

pub const MAX_SLOPE: f64 = 10.0;
pub const MAX_INTERCEPT: f64 = 30.0;

const MAX_HALVINGS: usize = 20;
const STEP_EPS: f64 = 1e-9;

/// Update every item; items are independent given the pseudo-counts.
pub fn m_step(
    kind: ModelKind,
    params: &[ItemParams],
    counts: &ExpectedCounts,
    nodes: &[f64],
    newton_iterations: usize,
) -> Vec<ItemParams> {
    params
        .par_iter()
        .zip(counts.correct.par_iter())
        .map(|(start, correct)| {
            let problem = ItemProblem {
                nodes,
                at_node: &counts.at_node,
                correct,
            };
            problem.maximize(kind, *start, newton_iterations)
        })
        .collect()
}

struct ItemProblem<'a> {
    nodes: &'a [f64],
    at_node: &'a [f64],
    correct: &'a [f64],
}

impl ItemProblem<'_> {
    fn objective(&self, p: ItemParams) -> f64 {
        let mut total = 0.0;
        for ((&theta, &n), &r) in self.nodes.iter().zip(self.at_node).zip(self.correct) {
            let z = p.linear(theta);
            total += r * log_sigmoid(z) + (n - r) * log_sigmoid(-z);
        }
        total
    }

    /// Gradient `(g_a, g_c)` and information entries `(i_aa, i_ac, i_cc)`.
    fn derivatives(&self, p: ItemParams) -> ([f64; 2], [f64; 3]) {
        let mut g = [0.0; 2];
        let mut info = [0.0; 3];
        for ((&theta, &n), &r) in self.nodes.iter().zip(self.at_node).zip(self.correct) {
            let prob = sigmoid(p.linear(theta));
            let resid = r - n * prob;
            let w = n * prob * (1.0 - prob);
            g[0] += resid * theta;
            g[1] += resid;
            info[0] += w * theta * theta;
            info[1] += w * theta;
            info[2] += w;
        }
        (g, info)
    }

    fn newton_direction(&self, kind: ModelKind, p: ItemParams) -> Option<(f64, f64)> {
        let (g, info) = self.derivatives(p);
        match kind {
            ModelKind::Rasch => (info[2] > 0.0).then(|| (0.0, g[1] / info[2])),
            _ => {
                let det = info[0] * info[2] - info[1] * info[1];
                if !(det.is_finite() && det > 1e-12) {
                    return None;
                }
                let da = (info[2] * g[0] - info[1] * g[1]) / det;
                let dc = (info[0] * g[1] - info[1] * g[0]) / det;
                Some((da, dc))
            }
        }
    }

    fn maximize(&self, kind: ModelKind, start: ItemParams, iterations: usize) -> ItemParams {
        let mut current = start;
        let mut value = self.objective(current);

        for _ in 0..iterations {
            let Some((da, dc)) = self.newton_direction(kind, current) else {
                break;
            };
            if !(da.is_finite() && dc.is_finite()) {
                break;
            }

            let mut scale = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_HALVINGS {
                let candidate = ItemParams {
                    slope: (current.slope + scale * da).clamp(-MAX_SLOPE, MAX_SLOPE),
                    intercept: (current.intercept + scale * dc).clamp(-MAX_INTERCEPT, MAX_INTERCEPT),
                };
                let candidate_value = self.objective(candidate);
                if candidate_value >= value {
                    accepted = Some((candidate, candidate_value));
                    break;
                }
                scale *= 0.5;
            }

            let Some((next, next_value)) = accepted else {
                break;
            };
            let moved = (next.slope - current.slope).abs() + (next.intercept - current.intercept).abs();
            current = next;
            value = next_value;
            if moved < STEP_EPS {
                break;
            }
        }
        current
    }
}
