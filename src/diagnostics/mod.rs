//! Model fit: information criteria and per-item chi-square (Yen's Q1).
//!
//! Respondents are sorted by EAP ability and cut into roughly equal strata.
//! Within stratum `g` the observed proportion correct `O_g` is compared with
//! the mean model probability `E_g`:
//!
//! `Q1 = Σ_g n_g (O_g - E_g)² / (E_g (1 - E_g))`, `df = G - parameters per item`.

use statrs::distribution::{ChiSquared, ContinuousCDF};
use tracing::debug;

use crate::domain::{AnalysisConfig, FitDiagnostics, IrtModel, ItemFit, ResponseMatrix};
use crate::error::AnalysisResult;
use crate::fit::posterior::model_columns;
use crate::fit::{ItemParams, PatternTable, e_step};
use crate::math::{PROB_EPS, QuadratureGrid};

/// EAP values closer than this count as tied.
const TIE_EPS: f64 = 1e-9;

/// Akaike information criterion, `-2 logL + 2k`.
pub fn aic(log_likelihood: f64, n_parameters: usize) -> f64 {
    -2.0 * log_likelihood + 2.0 * n_parameters as f64
}

/// Bayesian information criterion, `-2 logL + k ln n`.
pub fn bic(log_likelihood: f64, n_parameters: usize, n_respondents: usize) -> f64 {
    -2.0 * log_likelihood + n_parameters as f64 * (n_respondents as f64).ln()
}

/// Information criteria plus item fit for `model` against the data it was
/// calibrated on.
pub fn fit_diagnostics(
    model: &IrtModel,
    matrix: &ResponseMatrix,
    config: &AnalysisConfig,
) -> AnalysisResult<FitDiagnostics> {
    config.validate()?;
    let columns = model_columns(model, matrix)?;
    let data = matrix.select_items(&columns)?;

    let table = PatternTable::from_matrix(&data);
    let grid = QuadratureGrid::standard_normal(
        model.quadrature.points,
        model.quadrature.theta_min,
        model.quadrature.theta_max,
    )?;
    let params = ItemParams::from_model(model);
    let eap = e_step(&table, &params, &grid).eap(&grid);

    // Respondents in ascending ability; row index breaks ties.
    let mut order: Vec<usize> = (0..data.n_respondents()).collect();
    let ability = |i: usize| eap[table.respondent_pattern[i]].0;
    order.sort_by(|&x, &y| ability(x).total_cmp(&ability(y)).then(x.cmp(&y)));
    let sorted: Vec<f64> = order.iter().map(|&i| ability(i)).collect();
    let strata = ability_strata(&sorted, config.diagnostics.strata);
    debug!(
        requested = config.diagnostics.strata,
        realised = strata.len(),
        "ability strata"
    );

    let per_item = model.kind.params_per_item();
    let items = model
        .items
        .iter()
        .zip(&params)
        .enumerate()
        .map(|(j, (item, p))| {
            let mut chi_square = 0.0;
            for range in &strata {
                let n_g = range.len() as f64;
                let mut observed = 0.0;
                let mut expected = 0.0;
                for k in range.clone() {
                    observed += f64::from(data.response(order[k], j));
                    expected += p.probability(sorted[k]);
                }
                let o = observed / n_g;
                let e = (expected / n_g).clamp(PROB_EPS, 1.0 - PROB_EPS);
                chi_square += n_g * (o - e) * (o - e) / (e * (1.0 - e));
            }
            let df = strata.len().saturating_sub(per_item);
            ItemFit {
                item_id: item.id.clone(),
                chi_square,
                df,
                p_value: p_value(chi_square, df),
                strata: strata.len(),
            }
        })
        .collect();

    Ok(FitDiagnostics {
        log_likelihood: model.log_likelihood,
        n_parameters: model.n_parameters,
        n_respondents: model.n_respondents,
        aic: aic(model.log_likelihood, model.n_parameters),
        bic: bic(model.log_likelihood, model.n_parameters, model.n_respondents),
        items,
    })
}

/// Cut ascending `values` into at most `groups` contiguous ranges of similar
/// size. A range never ends inside a run of tied values, so fewer than
/// `groups` ranges may come back.
pub fn ability_strata(values: &[f64], groups: usize) -> Vec<std::ops::Range<usize>> {
    let n = values.len();
    let mut out = Vec::new();
    if n == 0 || groups == 0 {
        return out;
    }

    let mut start = 0;
    for g in 1..=groups {
        let mut end = (n * g).div_ceil(groups).min(n);
        if end <= start {
            continue;
        }
        while end < n && (values[end] - values[end - 1]).abs() <= TIE_EPS {
            end += 1;
        }
        out.push(start..end);
        start = end;
        if start == n {
            break;
        }
    }
    out
}

/// Upper-tail chi-square probability; `None` without degrees of freedom.
pub fn p_value(chi_square: f64, df: usize) -> Option<f64> {
    if df == 0 {
        return None;
    }
    let dist = ChiSquared::new(df as f64).ok()?;
    Some((1.0 - dist.cdf(chi_square)).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ItemSpec, simulate_responses};
    use crate::domain::ModelKind;
    use crate::fit::fit_irt;
    use approx::assert_relative_eq;

    #[test]
    fn information_criteria_match_definitions() {
        assert_relative_eq!(aic(-100.0, 3), 206.0);
        assert_relative_eq!(bic(-100.0, 3, 100), 200.0 + 3.0 * 100f64.ln());
    }

    #[test]
    fn strata_never_split_ties() {
        let values = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0, 3.0];
        let strata = ability_strata(&values, 5);
        assert_eq!(strata, vec![0..4, 4..6, 6..8, 8..10]);

        let distinct: Vec<f64> = (0..20).map(f64::from).collect();
        let strata = ability_strata(&distinct, 10);
        assert_eq!(strata.len(), 10);
        assert!(strata.iter().all(|r| r.len() == 2));
    }

    #[test]
    fn p_value_needs_degrees_of_freedom() {
        assert_eq!(p_value(3.0, 0), None);
        let p = p_value(3.841_458_820_694_124, 1).unwrap();
        assert_relative_eq!(p, 0.05, epsilon = 1e-6);
    }

    #[test]
    fn steep_item_misfits_a_rasch_model() {
        let mut spec: Vec<ItemSpec> = (0..9)
            .map(|j| ItemSpec::new(1.0, -1.0 + 0.25 * f64::from(j)))
            .collect();
        spec.push(ItemSpec::new(3.5, 0.0));
        let m = simulate_responses(ModelKind::TwoPl, &spec, 3000, 21).unwrap();

        let config = AnalysisConfig::default();
        let model = fit_irt(&m, ModelKind::Rasch, &config).unwrap();
        let diag = fit_diagnostics(&model, &m, &config).unwrap();

        assert_eq!(diag.items.len(), 10);
        assert_relative_eq!(diag.aic, model.aic);
        let steep = diag.items[9].chi_square;
        for item in &diag.items[..9] {
            assert!(item.chi_square < steep, "{} >= {steep}", item.chi_square);
        }
        assert!(diag.items[9].p_value.unwrap() < 0.01);

        // Rasch abilities depend on the sum score only: at most 11 distinct values.
        for item in &diag.items {
            assert!(item.strata <= 10);
            assert_eq!(item.df, item.strata - 1);
        }
    }

    #[test]
    fn two_strata_leave_no_degrees_of_freedom_for_2pl() {
        let spec = [ItemSpec::new(1.0, -0.5), ItemSpec::new(1.2, 0.0), ItemSpec::new(0.8, 0.5)];
        let m = simulate_responses(ModelKind::TwoPl, &spec, 600, 2).unwrap();
        let mut config = AnalysisConfig::default();
        config.diagnostics.strata = 2;

        let model = fit_irt(&m, ModelKind::TwoPl, &config).unwrap();
        let diag = fit_diagnostics(&model, &m, &config).unwrap();
        for item in &diag.items {
            assert_eq!(item.df, 0);
            assert_eq!(item.p_value, None);
            assert!(item.chi_square >= 0.0);
        }
    }
}
