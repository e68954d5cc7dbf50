//! Dimensionality screening.
//!
//! Responsibilities:
//!
//! - validate that the response matrix supports a factor analysis
//!   (N >= 3 items, >= 2N respondents, constant items handled per policy)
//! - extract a single-factor solution with one of two methods
//! - turn the solution into a unidimensionality verdict plus a list of
//!   poorly-loading items
//!
//! Both methods implement [`DimensionalityMethod`]; callers pick one by name.

pub mod eigen;
pub mod residual;

use nalgebra::DMatrix;
use tracing::{debug, info};

use crate::domain::{
    AnalysisConfig, DimensionalityResult, FactorSolution, MethodKind, ResponseMatrix,
    ScreenedMatrix,
};
use crate::error::{AnalysisError, AnalysisResult};
use crate::math::{
    EIGEN_EPS, correlation_matrix, off_diagonal_sum_sq, partial_correlations, sorted_eigen,
};

pub use eigen::EigenMethod;
pub use residual::ResidualMethod;

/// Minimum number of items for a factor analysis.
pub const MIN_ITEMS: usize = 3;

/// Required respondents per item.
pub const RESPONDENTS_PER_ITEM: usize = 2;

/// A single-factor extraction strategy.
pub trait DimensionalityMethod: Send + Sync {
    fn kind(&self) -> MethodKind;

    /// Fit one factor to an already screened matrix.
    fn extract(
        &self,
        matrix: &ResponseMatrix,
        correlations: &CorrelationSummary,
        config: &AnalysisConfig,
    ) -> AnalysisResult<FactorSolution>;

    /// Unidimensionality verdict for a solution produced by this method.
    fn is_unidimensional(&self, solution: &FactorSolution, config: &AnalysisConfig) -> bool;

    /// Screen the matrix, extract the factor and apply the verdict.
    fn analyze(
        &self,
        matrix: &ResponseMatrix,
        config: &AnalysisConfig,
    ) -> AnalysisResult<DimensionalityResult> {
        config.validate()?;
        let screened = prepare(matrix, config)?;
        let correlations = CorrelationSummary::from_matrix(&screened.matrix);

        let mut solution = self.extract(&screened.matrix, &correlations, config)?;
        solution.excluded_items = screened.excluded;

        let unidimensional = self.is_unidimensional(&solution, config);
        let problematic_items = problematic_items(
            &solution.item_ids,
            &solution.loadings,
            config.dimensionality.loading_threshold,
        );

        info!(
            method = ?self.kind(),
            items = solution.item_ids.len(),
            variance_explained = solution.variance_explained,
            unidimensional,
            problematic = problematic_items.len(),
            "dimensionality check finished"
        );

        Ok(DimensionalityResult {
            solution,
            unidimensional,
            problematic_items,
        })
    }
}

/// Look a method up by kind.
pub fn method_for(kind: MethodKind) -> Box<dyn DimensionalityMethod> {
    match kind {
        MethodKind::Eigen => Box::new(EigenMethod),
        MethodKind::Residual => Box::new(ResidualMethod),
    }
}

/// Look a method up by name (`eigen`/`efa` or `residual`/`noharm`).
pub fn method_by_name(name: &str) -> AnalysisResult<Box<dyn DimensionalityMethod>> {
    Ok(method_for(name.parse()?))
}

/// "Check dimensionality" entry point.
pub fn check_dimensionality(
    matrix: &ResponseMatrix,
    kind: MethodKind,
    config: &AnalysisConfig,
) -> AnalysisResult<DimensionalityResult> {
    method_for(kind).analyze(matrix, config)
}

/// Apply the data-quality gate shared by both methods.
pub fn prepare<'a>(
    matrix: &'a ResponseMatrix,
    config: &AnalysisConfig,
) -> AnalysisResult<ScreenedMatrix<'a>> {
    if matrix.n_items() < MIN_ITEMS {
        return Err(AnalysisError::insufficient(format!(
            "dimensionality analysis needs at least {MIN_ITEMS} items, got {}",
            matrix.n_items()
        )));
    }

    let screened = matrix.screen_constant_items(config.constant_items)?;
    if !screened.excluded.is_empty() {
        debug!(excluded = ?screened.excluded, "excluded constant items");
    }

    let n_items = screened.matrix.n_items();
    if n_items < MIN_ITEMS {
        return Err(AnalysisError::insufficient(format!(
            "only {n_items} non-constant items remain, need at least {MIN_ITEMS}"
        )));
    }

    let required = RESPONDENTS_PER_ITEM * n_items;
    if screened.matrix.n_respondents() < required {
        return Err(AnalysisError::insufficient(format!(
            "{} respondents for {n_items} items, need at least {required}",
            screened.matrix.n_respondents()
        )));
    }

    Ok(screened)
}

/// Correlation matrix with its sorted eigen-decomposition and KMO.
#[derive(Debug, Clone)]
pub struct CorrelationSummary {
    pub correlations: DMatrix<f64>,
    /// Descending.
    pub eigenvalues: Vec<f64>,
    /// Columns match `eigenvalues`.
    pub eigenvectors: DMatrix<f64>,
    pub kmo: Option<f64>,
}

impl CorrelationSummary {
    pub fn from_matrix(matrix: &ResponseMatrix) -> Self {
        let correlations = correlation_matrix(matrix);
        let (eigenvalues, eigenvectors) = sorted_eigen(&correlations);
        let kmo = kaiser_meyer_olkin(&correlations, &eigenvalues);
        Self {
            correlations,
            eigenvalues,
            eigenvectors,
            kmo,
        }
    }

    /// `λ1 / λ2`, infinite when the second eigenvalue is (numerically) zero.
    pub fn eigenvalue_ratio(&self) -> f64 {
        match self.eigenvalues.as_slice() {
            [first, second, ..] if *second > EIGEN_EPS => first / second,
            _ => f64::INFINITY,
        }
    }
}

/// Kaiser-Meyer-Olkin sampling adequacy.
///
/// `Σ r² / (Σ r² + Σ partial²)` over off-diagonal pairs. Undefined when the
/// correlation matrix is singular or has no off-diagonal mass.
pub fn kaiser_meyer_olkin(r: &DMatrix<f64>, eigenvalues: &[f64]) -> Option<f64> {
    let smallest = eigenvalues.last().copied().unwrap_or(0.0);
    if smallest < EIGEN_EPS {
        return None;
    }
    let partial = partial_correlations(r)?;
    let r2 = off_diagonal_sum_sq(r);
    let p2 = off_diagonal_sum_sq(&partial);
    let denom = r2 + p2;
    (denom > 0.0).then(|| r2 / denom)
}

/// Items whose absolute loading is below `threshold`, sorted by id.
pub fn problematic_items(item_ids: &[String], loadings: &[f64], threshold: f64) -> Vec<String> {
    let mut out: Vec<String> = item_ids
        .iter()
        .zip(loadings)
        .filter(|(_, l)| l.abs() < threshold)
        .map(|(id, _)| id.clone())
        .collect();
    out.sort();
    out
}

/// Flip a loading vector so it sums to a non-negative value.
pub(crate) fn orient(loadings: &mut [f64]) {
    let total: f64 = loadings.iter().sum();
    if total < 0.0 {
        for l in loadings.iter_mut() {
            *l = -*l;
        }
    }
}
