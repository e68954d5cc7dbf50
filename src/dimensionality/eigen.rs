//! Eigenvalue-based single-factor extraction (principal component of the
//! inter-item correlation matrix).
//!
//! - loadings: first eigenvector scaled by `sqrt(λ1)`, clamped into `[-1, 1]`
//! - variance explained: `λ1 / N`
//! - verdict: variance explained and `λ1 / λ2` both clear their thresholds

use crate::dimensionality::{CorrelationSummary, DimensionalityMethod, orient};
use crate::domain::{AnalysisConfig, FactorSolution, MethodKind, ResponseMatrix};
use crate::error::AnalysisResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct EigenMethod;

impl DimensionalityMethod for EigenMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::Eigen
    }

    fn extract(
        &self,
        matrix: &ResponseMatrix,
        correlations: &CorrelationSummary,
        _config: &AnalysisConfig,
    ) -> AnalysisResult<FactorSolution> {
        let n_items = matrix.n_items();
        let first = correlations.eigenvalues[0].max(0.0);
        let scale = first.sqrt();

        let mut loadings: Vec<f64> = correlations
            .eigenvectors
            .column(0)
            .iter()
            .map(|v| (v * scale).clamp(-1.0, 1.0))
            .collect();
        orient(&mut loadings);

        Ok(FactorSolution {
            method: MethodKind::Eigen,
            item_ids: matrix.item_ids().to_vec(),
            loadings,
            eigenvalues: correlations.eigenvalues.clone(),
            variance_explained: first / n_items as f64,
            eigenvalue_ratio: correlations.eigenvalue_ratio(),
            kmo: correlations.kmo,
            rmsr: None,
            fit_index: None,
            excluded_items: Vec::new(),
        })
    }

    fn is_unidimensional(&self, solution: &FactorSolution, config: &AnalysisConfig) -> bool {
        let d = &config.dimensionality;
        solution.variance_explained >= d.min_variance_explained
            && solution.eigenvalue_ratio >= d.min_eigenvalue_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::StdRng;

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("q{i}")).collect()
    }

    #[test]
    fn small_scenario_yields_three_loadings() {
        let rows = vec![
            vec![1, 1, 0],
            vec![1, 0, 0],
            vec![1, 1, 1],
            vec![0, 0, 0],
            vec![0, 1, 0],
            vec![1, 1, 1],
        ];
        let m = ResponseMatrix::from_rows(ids(3), &rows).unwrap();
        let config = AnalysisConfig::default();
        let result = EigenMethod.analyze(&m, &config).unwrap();

        // r12 = 0.25, r13 = r23 = 0.5 => λ = 1.8431, 0.75, 0.4069.
        let s = &result.solution;
        assert_eq!(s.loadings.len(), 3);
        assert!((s.eigenvalues[0] - 1.843_07).abs() < 1e-3);
        assert!((s.eigenvalues[1] - 0.75).abs() < 1e-9);
        assert!((s.variance_explained - 0.614_36).abs() < 1e-3);
        assert!((s.loadings[0] - 0.7355).abs() < 1e-3);
        assert!((s.loadings[2] - 0.8724).abs() < 1e-3);
        assert!(result.problematic_items.is_empty());
        // Σr² = 1.125, Σpartial² = 0.8.
        assert!((s.kmo.unwrap() - 1.125 / 1.925).abs() < 1e-4);
        // Ratio 2.46 is below the default 3.0.
        assert!(!result.unidimensional);

        let mut strict = config.clone();
        strict.dimensionality.loading_threshold = 0.8;
        let again = EigenMethod.analyze(&m, &strict).unwrap();
        assert_eq!(again.problematic_items, vec!["q1".to_string(), "q2".to_string()]);
    }

    #[test]
    fn copies_of_one_signal_are_unidimensional() {
        let mut rng = StdRng::seed_from_u64(7);
        let rows: Vec<Vec<u32>> = (0..60)
            .map(|_| {
                let x = u32::from(rng.gen_bool(0.5));
                vec![x; 5]
            })
            .collect();
        let m = ResponseMatrix::from_rows(ids(5), &rows).unwrap();
        let result = EigenMethod.analyze(&m, &AnalysisConfig::default()).unwrap();

        assert!((result.solution.variance_explained - 1.0).abs() < 1e-9);
        assert!(result.solution.eigenvalue_ratio.is_infinite());
        assert_eq!(result.solution.kmo, None);
        assert!(result.unidimensional);
        for l in &result.solution.loadings {
            assert!((l - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn independent_noise_is_not_unidimensional() {
        for seed in 0..40 {
            let mut rng = StdRng::seed_from_u64(seed);
            let rows: Vec<Vec<u32>> = (0..1000)
                .map(|_| (0..10).map(|_| u32::from(rng.gen_bool(0.5))).collect())
                .collect();
            let m = ResponseMatrix::from_rows(ids(10), &rows).unwrap();
            let result = EigenMethod.analyze(&m, &AnalysisConfig::default()).unwrap();
            assert!(
                result.solution.variance_explained < 0.20,
                "seed {seed}: variance explained {}",
                result.solution.variance_explained
            );
            assert!(!result.unidimensional);
            let kmo = result.solution.kmo.unwrap();
            assert!((0.0..=1.0).contains(&kmo));
        }
    }

    #[test]
    fn loadings_are_oriented_positive() {
        let rows = vec![
            vec![1, 0, 1],
            vec![0, 1, 0],
            vec![1, 0, 1],
            vec![0, 1, 1],
            vec![1, 0, 0],
            vec![0, 1, 0],
        ];
        let m = ResponseMatrix::from_rows(ids(3), &rows).unwrap();
        let result = EigenMethod.analyze(&m, &AnalysisConfig::default()).unwrap();
        let total: f64 = result.solution.loadings.iter().sum();
        assert!(total >= 0.0);
        assert!(result.solution.loadings.iter().all(|l| l.abs() <= 1.0));
    }
}
