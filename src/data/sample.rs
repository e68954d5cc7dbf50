//! Seeded synthetic responses for known item parameters.
//!
//! Abilities are drawn from N(0, 1) and each response is a Bernoulli draw with
//! the logistic success probability of the chosen model. The same seed always
//! produces the same matrix.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{ModelKind, ResponseMatrix};
use crate::error::{AnalysisError, AnalysisResult};
use crate::math::sigmoid;

/// True parameters of a generated item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemSpec {
    pub discrimination: f64,
    pub difficulty: f64,
}

impl ItemSpec {
    pub fn new(discrimination: f64, difficulty: f64) -> Self {
        Self {
            discrimination,
            difficulty,
        }
    }

    pub fn rasch(difficulty: f64) -> Self {
        Self::new(1.0, difficulty)
    }

    /// P(correct | θ) under `kind`.
    pub fn probability(&self, kind: ModelKind, theta: f64) -> f64 {
        let a = match kind {
            ModelKind::Rasch => 1.0,
            _ => self.discrimination,
        };
        sigmoid(a * (theta - self.difficulty))
    }
}

/// Generated responses together with the abilities that produced them.
#[derive(Debug, Clone)]
pub struct SampleData {
    pub matrix: ResponseMatrix,
    pub abilities: Vec<f64>,
}

/// Simulate `respondents` response vectors; items are named `item_01`, `item_02`, …
pub fn simulate_responses(
    kind: ModelKind,
    items: &[ItemSpec],
    respondents: usize,
    seed: u64,
) -> AnalysisResult<ResponseMatrix> {
    Ok(generate_sample(kind, items, respondents, seed)?.matrix)
}

pub fn generate_sample(
    kind: ModelKind,
    items: &[ItemSpec],
    respondents: usize,
    seed: u64,
) -> AnalysisResult<SampleData> {
    if kind == ModelKind::ThreePl {
        return Err(AnalysisError::unimplemented(
            "3PL response generation (no guessing parameter support)",
        ));
    }
    if items.is_empty() || respondents == 0 {
        return Err(AnalysisError::invalid_input(
            "sample generation needs at least one item and one respondent",
        ));
    }
    if let Some(bad) = items
        .iter()
        .find(|it| !(it.discrimination.is_finite() && it.difficulty.is_finite()))
    {
        return Err(AnalysisError::invalid_input(format!(
            "non-finite item parameters: {bad:?}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AnalysisError::invalid_input(format!("ability distribution: {e}")))?;

    let mut abilities = Vec::with_capacity(respondents);
    let mut rows = Vec::with_capacity(respondents);
    for _ in 0..respondents {
        let theta: f64 = normal.sample(&mut rng);
        let row: Vec<u32> = items
            .iter()
            .map(|it| u32::from(rng.gen_bool(it.probability(kind, theta))))
            .collect();
        abilities.push(theta);
        rows.push(row);
    }

    let item_ids = (1..=items.len()).map(|j| format!("item_{j:02}")).collect();
    let matrix = ResponseMatrix::from_rows(item_ids, &rows)?;
    Ok(SampleData { matrix, abilities })
}
