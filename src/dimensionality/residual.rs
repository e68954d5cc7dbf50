//! Residual-based single-factor fit (NOHARM-style).
//!
//! Instead of decomposing correlations, this method fits the unidimensional
//! normal-ogive model to the raw product moments of dichotomous items: the
//! observed proportion `p_ij` of respondents answering both item `i` and item
//! `j` correctly.
//!
//! The model-implied joint proportion uses McDonald's harmonic approximation
//! (the tetrachoric series truncated after four terms):
//!
//! ```text
//! π_ij = p_i p_j + φ(τ_i) φ(τ_j) Σ_{k=1..4} (λ_i λ_j)^k / k! · He_{k-1}(τ_i) He_{k-1}(τ_j)
//! τ_i  = Φ⁻¹(1 - p_i)
//! ```
//!
//! Loadings minimize the unweighted sum of squared residuals `p_ij - π_ij`
//! over item pairs, using damped Gauss-Newton (Levenberg-Marquardt) started
//! from the eigen loadings. The verdict is `RMSR <= max_rmsr`.

use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::debug;

use crate::dimensionality::{CorrelationSummary, DimensionalityMethod, orient};
use crate::domain::{AnalysisConfig, FactorSolution, MethodKind, ResponseMatrix};
use crate::error::{AnalysisError, AnalysisResult};
use crate::math::normal_pdf;

/// Terms kept in the tetrachoric series.
const SERIES_TERMS: usize = 4;

/// Loadings are kept strictly inside the unit interval.
const MAX_LOADING: f64 = 0.995;

/// Marginal proportions are clamped away from 0/1 before taking quantiles.
const P_CLAMP: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default)]
pub struct ResidualMethod;

impl DimensionalityMethod for ResidualMethod {
    fn kind(&self) -> MethodKind {
        MethodKind::Residual
    }

    fn extract(
        &self,
        matrix: &ResponseMatrix,
        correlations: &CorrelationSummary,
        config: &AnalysisConfig,
    ) -> AnalysisResult<FactorSolution> {
        if !matrix.is_dichotomous() {
            return Err(AnalysisError::unimplemented(
                "residual dimensionality fit for polytomous items",
            ));
        }

        let moments = ProductMoments::from_matrix(matrix)?;
        let start: Vec<f64> = correlations
            .eigenvectors
            .column(0)
            .iter()
            .map(|v| (v * correlations.eigenvalues[0].max(0.0).sqrt()).clamp(-0.9, 0.9))
            .collect();

        let d = &config.dimensionality;
        let mut loadings =
            fit_loadings(&moments, start, d.residual_max_iterations, d.residual_tolerance);
        orient(&mut loadings);

        let sse = moments.residual_sum_sq(&loadings);
        let pairs = moments.pairs.len() as f64;
        let rmsr = (sse / pairs).sqrt();
        let centered = moments.centered_sum_sq();
        let fit_index = (centered > f64::EPSILON).then(|| (1.0 - sse / centered).min(1.0));

        let n_items = matrix.n_items() as f64;
        let variance_explained = loadings.iter().map(|l| l * l).sum::<f64>() / n_items;

        Ok(FactorSolution {
            method: MethodKind::Residual,
            item_ids: matrix.item_ids().to_vec(),
            loadings,
            eigenvalues: correlations.eigenvalues.clone(),
            variance_explained,
            eigenvalue_ratio: correlations.eigenvalue_ratio(),
            kmo: correlations.kmo,
            rmsr: Some(rmsr),
            fit_index,
            excluded_items: Vec::new(),
        })
    }

    fn is_unidimensional(&self, solution: &FactorSolution, config: &AnalysisConfig) -> bool {
        solution
            .rmsr
            .is_some_and(|r| r <= config.dimensionality.max_rmsr)
    }
}

/// One unordered item pair with its observed joint proportion.
#[derive(Debug, Clone)]
struct Pair {
    i: usize,
    j: usize,
    observed: f64,
    /// `p_i p_j`.
    independent: f64,
    /// `φ(τ_i) φ(τ_j)`.
    density: f64,
    /// `He_{k-1}(τ_i) He_{k-1}(τ_j) / k!` for `k = 1..=4`.
    series: [f64; SERIES_TERMS],
}

impl Pair {
    /// Tetrachoric series `S(ρ)` and its derivative `S'(ρ)`.
    fn series_at(&self, rho: f64) -> (f64, f64) {
        let mut value = 0.0;
        let mut slope = 0.0;
        let mut power = 1.0; // ρ^{k-1}
        for (k, coef) in self.series.iter().enumerate() {
            slope += (k + 1) as f64 * power * coef;
            power *= rho;
            value += power * coef;
        }
        (value, slope)
    }

    fn fitted(&self, loadings: &[f64]) -> f64 {
        let rho = loadings[self.i] * loadings[self.j];
        self.independent + self.density * self.series_at(rho).0
    }
}

#[derive(Debug, Clone)]
struct ProductMoments {
    n_items: usize,
    pairs: Vec<Pair>,
}

impl ProductMoments {
    fn from_matrix(matrix: &ResponseMatrix) -> AnalysisResult<Self> {
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| AnalysisError::invalid_input(format!("normal distribution: {e}")))?;
        let n = matrix.n_respondents() as f64;
        let k = matrix.n_items();

        let p: Vec<f64> = (0..k).map(|j| matrix.item_mean(j)).collect();
        let tau: Vec<f64> = p
            .iter()
            .map(|&pi| normal.inverse_cdf(1.0 - pi.clamp(P_CLAMP, 1.0 - P_CLAMP)))
            .collect();

        let mut joint = vec![0.0; k * k];
        for row in matrix.rows() {
            for a in 0..k {
                if row[a] == 0 {
                    continue;
                }
                for b in (a + 1)..k {
                    if row[b] != 0 {
                        joint[a * k + b] += 1.0;
                    }
                }
            }
        }

        let mut pairs = Vec::with_capacity(k * (k - 1) / 2);
        for i in 0..k {
            for j in (i + 1)..k {
                let he_i = hermite(tau[i]);
                let he_j = hermite(tau[j]);
                let mut series = [0.0; SERIES_TERMS];
                let mut factorial = 1.0;
                for (t, slot) in series.iter_mut().enumerate() {
                    factorial *= (t + 1) as f64;
                    *slot = he_i[t] * he_j[t] / factorial;
                }
                pairs.push(Pair {
                    i,
                    j,
                    observed: joint[i * k + j] / n,
                    independent: p[i] * p[j],
                    density: normal_pdf(tau[i]) * normal_pdf(tau[j]),
                    series,
                });
            }
        }

        Ok(Self { n_items: k, pairs })
    }

    fn residual_sum_sq(&self, loadings: &[f64]) -> f64 {
        self.pairs
            .iter()
            .map(|p| {
                let r = p.observed - p.fitted(loadings);
                r * r
            })
            .sum()
    }

    /// `Σ (p_ij - p_i p_j)²`: the residual mass of the zero-factor model.
    fn centered_sum_sq(&self) -> f64 {
        self.pairs
            .iter()
            .map(|p| {
                let r = p.observed - p.independent;
                r * r
            })
            .sum()
    }

    /// Residual vector and Jacobian of the fitted moments w.r.t. the loadings.
    fn linearize(&self, loadings: &[f64]) -> (DVector<f64>, DMatrix<f64>) {
        let mut residuals = DVector::<f64>::zeros(self.pairs.len());
        let mut jacobian = DMatrix::<f64>::zeros(self.pairs.len(), self.n_items);
        for (row, p) in self.pairs.iter().enumerate() {
            let (li, lj) = (loadings[p.i], loadings[p.j]);
            let (value, slope) = p.series_at(li * lj);
            residuals[row] = p.observed - (p.independent + p.density * value);
            jacobian[(row, p.i)] = p.density * slope * lj;
            jacobian[(row, p.j)] = p.density * slope * li;
        }
        (residuals, jacobian)
    }
}

/// Probabilists' Hermite polynomials `He_0..He_3` at `x`.
fn hermite(x: f64) -> [f64; SERIES_TERMS] {
    [1.0, x, x * x - 1.0, x * x * x - 3.0 * x]
}

/// Levenberg-Marquardt on the product-moment residuals.
fn fit_loadings(
    moments: &ProductMoments,
    start: Vec<f64>,
    max_iterations: usize,
    tolerance: f64,
) -> Vec<f64> {
    let mut loadings = start;
    let mut sse = moments.residual_sum_sq(&loadings);
    let mut damping = 1e-3;

    for iter in 0..max_iterations {
        let (residuals, jacobian) = moments.linearize(&loadings);
        let jt = jacobian.transpose();
        let jtj = &jt * &jacobian;
        let gradient = &jt * &residuals;

        let mut improved = false;
        while damping < 1e10 {
            let mut system = jtj.clone();
            for d in 0..system.nrows() {
                system[(d, d)] += damping * (1.0 + jtj[(d, d)]);
            }
            let Some(chol) = system.cholesky() else {
                damping *= 10.0;
                continue;
            };
            let step = chol.solve(&gradient);
            let candidate: Vec<f64> = loadings
                .iter()
                .zip(step.iter())
                .map(|(l, s)| (l + s).clamp(-MAX_LOADING, MAX_LOADING))
                .collect();
            let candidate_sse = moments.residual_sum_sq(&candidate);
            if candidate_sse.is_finite() && candidate_sse <= sse {
                let change = sse - candidate_sse;
                loadings = candidate;
                sse = candidate_sse;
                damping = (damping / 10.0).max(1e-12);
                improved = change > tolerance;
                break;
            }
            damping *= 10.0;
        }

        if !improved {
            debug!(iterations = iter + 1, sse, "residual factor fit settled");
            break;
        }
    }

    loadings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ItemSpec, simulate_responses};
    use crate::domain::ModelKind;

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("q{i}")).collect()
    }

    #[test]
    fn hermite_polynomials_match_closed_forms() {
        let h = hermite(2.0);
        assert_eq!(h, [1.0, 2.0, 3.0, 2.0]);
    }

    #[test]
    fn zero_loadings_reproduce_independence() {
        let rows = vec![vec![1, 0, 1], vec![0, 1, 1], vec![1, 1, 0], vec![0, 0, 0]];
        let m = ResponseMatrix::from_rows(ids(3), &rows).unwrap();
        let moments = ProductMoments::from_matrix(&m).unwrap();
        for p in &moments.pairs {
            assert!((p.fitted(&[0.0, 0.0, 0.0]) - p.independent).abs() < 1e-15);
        }
    }

    #[test]
    fn jacobian_matches_finite_differences() {
        let spec: Vec<ItemSpec> = [-0.5, 0.0, 0.7, 1.2]
            .iter()
            .map(|&b| ItemSpec::new(1.2, b))
            .collect();
        let m = simulate_responses(ModelKind::TwoPl, &spec, 300, 3).unwrap();
        let moments = ProductMoments::from_matrix(&m).unwrap();
        let loadings = vec![0.4, 0.5, 0.6, 0.3];
        let (_, jac) = moments.linearize(&loadings);

        let h = 1e-6;
        for item in 0..4 {
            let mut up = loadings.clone();
            up[item] += h;
            let mut down = loadings.clone();
            down[item] -= h;
            for (row, p) in moments.pairs.iter().enumerate() {
                let numeric = (p.fitted(&up) - p.fitted(&down)) / (2.0 * h);
                assert!((numeric - jac[(row, item)]).abs() < 1e-7);
            }
        }
    }

    #[test]
    fn one_factor_data_fits_with_small_rmsr() {
        let spec: Vec<ItemSpec> = [-1.0, -0.5, 0.0, 0.5, 1.0, 0.2]
            .iter()
            .map(|&b| ItemSpec::new(1.5, b))
            .collect();
        let m = simulate_responses(ModelKind::TwoPl, &spec, 2000, 11).unwrap();
        let result = ResidualMethod.analyze(&m, &AnalysisConfig::default()).unwrap();

        let rmsr = result.solution.rmsr.unwrap();
        assert!(rmsr < 0.02, "rmsr {rmsr}");
        assert!(result.unidimensional);
        assert!(result.problematic_items.is_empty());
        assert!(result.solution.loadings.iter().all(|l| *l > 0.4 && *l < 1.0));
        assert!(result.solution.fit_index.unwrap() > 0.9);
    }

    #[test]
    fn two_factor_data_is_not_unidimensional() {
        // Two blocks of five items, each driven by its own ability.
        let block: Vec<ItemSpec> = [-0.6, -0.3, 0.0, 0.3, 0.6]
            .iter()
            .map(|&b| ItemSpec::new(4.0, b))
            .collect();
        let first = simulate_responses(ModelKind::TwoPl, &block, 2000, 3).unwrap();
        let second = simulate_responses(ModelKind::TwoPl, &block, 2000, 4).unwrap();
        let rows: Vec<Vec<u32>> = first
            .rows()
            .zip(second.rows())
            .map(|(a, b)| a.iter().chain(b).copied().collect())
            .collect();
        let m = ResponseMatrix::from_rows(ids(10), &rows).unwrap();

        let result = ResidualMethod.analyze(&m, &AnalysisConfig::default()).unwrap();
        let rmsr = result.solution.rmsr.unwrap();
        assert!(rmsr > 0.05, "rmsr {rmsr}");
        assert!(!result.unidimensional);

        // The factor follows one block; the other barely loads.
        let loadings = &result.solution.loadings;
        let mean = |range: std::ops::Range<usize>| loadings[range].iter().sum::<f64>() / 5.0;
        let (a, b) = (mean(0..5), mean(5..10));
        assert!((a - b).abs() > 0.3, "block means {a} and {b}");
    }

    #[test]
    fn polytomous_items_are_unimplemented() {
        let rows = vec![
            vec![0, 1, 2],
            vec![1, 0, 1],
            vec![1, 1, 0],
            vec![0, 0, 2],
            vec![1, 1, 1],
            vec![0, 1, 0],
        ];
        let m = ResponseMatrix::from_rows(ids(3), &rows).unwrap();
        let err = ResidualMethod.analyze(&m, &AnalysisConfig::default()).unwrap_err();
        assert_eq!(err.code(), "unimplemented");
    }
}
