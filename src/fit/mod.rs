//! IRT calibration by marginal maximum likelihood (EM over a quadrature grid).
//!
//! Responsibilities:
//!
//! - gate the response matrix (dichotomous items, >= 2N respondents,
//!   constant items handled per policy)
//! - run EM: E-step posteriors per response pattern, per-item Newton M-step
//! - stop on `|ΔlogL| < tolerance`, the iteration cap, or cancellation
//! - attach standard errors and information criteria to the result
//!
//! A fit that hits the iteration cap is still returned, flagged as not
//! converged. Strict callers use [`IrtModel::require_converged`].

pub mod newton;
pub mod patterns;
pub mod posterior;
pub mod standard_errors;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::diagnostics::{aic, bic};
use crate::dimensionality::RESPONDENTS_PER_ITEM;
use crate::domain::{
    AnalysisConfig, IrtModel, Item, ModelKind, ResponseMatrix, ResponseType, ScreenedMatrix,
    StopReason,
};
use crate::error::{AnalysisError, AnalysisResult};
use crate::math::{QuadratureGrid, logit, sigmoid};

pub use newton::{MAX_INTERCEPT, MAX_SLOPE, m_step};
pub use patterns::PatternTable;
pub use posterior::{ExpectedCounts, Posterior, e_step, score_eap};
pub use standard_errors::{ItemErrors, standard_errors};

/// Caller-driven cancellation, checked between EM iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Item parameters in slope-intercept form: `P(θ) = σ(aθ + c)`, `b = -c / a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemParams {
    pub slope: f64,
    pub intercept: f64,
}

impl ItemParams {
    pub fn from_difficulty(discrimination: f64, difficulty: f64) -> Self {
        Self {
            slope: discrimination,
            intercept: -discrimination * difficulty,
        }
    }

    pub fn from_model(model: &IrtModel) -> Vec<Self> {
        model
            .items
            .iter()
            .map(|it| Self::from_difficulty(it.discrimination, it.difficulty))
            .collect()
    }

    #[inline]
    pub fn linear(&self, theta: f64) -> f64 {
        self.slope * theta + self.intercept
    }

    pub fn probability(&self, theta: f64) -> f64 {
        sigmoid(self.linear(theta))
    }

    /// Location of the item; undefined (non-finite) for a zero slope.
    pub fn difficulty(&self) -> f64 {
        -self.intercept / self.slope
    }
}

/// "Fit IRT model" entry point.
pub fn fit_irt(
    matrix: &ResponseMatrix,
    kind: ModelKind,
    config: &AnalysisConfig,
) -> AnalysisResult<IrtModel> {
    fit_irt_with_cancel(matrix, kind, config, &CancelToken::new())
}

pub fn fit_irt_with_cancel(
    matrix: &ResponseMatrix,
    kind: ModelKind,
    config: &AnalysisConfig,
    cancel: &CancelToken,
) -> AnalysisResult<IrtModel> {
    fit_irt_with_progress(matrix, kind, config, cancel, |_, _| {})
}

/// Like [`fit_irt_with_cancel`], calling `on_iteration(iteration, log_likelihood)`
/// after every completed EM iteration. Cancelling from the callback stops the
/// loop before the next iteration, keeping the estimates just reported.
pub fn fit_irt_with_progress(
    matrix: &ResponseMatrix,
    kind: ModelKind,
    config: &AnalysisConfig,
    cancel: &CancelToken,
    mut on_iteration: impl FnMut(usize, f64),
) -> AnalysisResult<IrtModel> {
    if kind == ModelKind::ThreePl {
        return Err(AnalysisError::unimplemented(
            "3PL estimation (guessing parameter)",
        ));
    }
    config.validate()?;
    let screened = prepare(matrix, config)?;
    let data = &screened.matrix;
    let est = &config.estimation;

    let table = PatternTable::from_matrix(data);
    let grid = QuadratureGrid::standard_normal(est.quadrature_points, est.theta_min, est.theta_max)?;
    let mut params = starting_values(data);
    let mut posterior = e_step(&table, &params, &grid);
    let mut log_likelihood = posterior.log_likelihood;

    debug!(
        model = %kind,
        items = data.n_items(),
        respondents = data.n_respondents(),
        patterns = table.len(),
        log_likelihood,
        "starting EM"
    );

    let mut iterations = 0;
    let mut last_change = f64::INFINITY;
    let stop_reason = loop {
        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }
        if iterations >= est.max_iterations {
            break StopReason::IterationCap;
        }

        let counts = posterior.expected_counts(&table);
        params = m_step(kind, &params, &counts, &grid.nodes, est.newton_iterations);
        posterior = e_step(&table, &params, &grid);
        iterations += 1;

        let change = posterior.log_likelihood - log_likelihood;
        log_likelihood = posterior.log_likelihood;
        last_change = change.abs();
        debug!(iteration = iterations, log_likelihood, change, "EM iteration");
        on_iteration(iterations, log_likelihood);

        if last_change < est.tolerance {
            break StopReason::Converged;
        }
    };

    let converged = stop_reason == StopReason::Converged;
    if !converged {
        warn!(
            ?stop_reason,
            iterations, last_change, "EM stopped before reaching the tolerance"
        );
    }

    let bounded = items_at_bound(data.item_ids(), &params);
    if !bounded.is_empty() {
        warn!(
            items = ?bounded,
            max_slope = MAX_SLOPE,
            max_intercept = MAX_INTERCEPT,
            "estimates stopped at a parameter bound"
        );
    }

    check_slopes(kind, &params, est.max_nonpositive_slope_fraction)?;

    let errors = standard_errors(kind, &table, &posterior, &params, &grid);
    let items: Vec<Item> = data
        .item_ids()
        .iter()
        .zip(&params)
        .zip(&errors)
        .map(|((id, p), se)| Item {
            id: id.clone(),
            response_type: ResponseType::Dichotomous,
            difficulty: p.difficulty(),
            discrimination: p.slope,
            guessing: None,
            difficulty_se: se.difficulty,
            discrimination_se: se.discrimination,
            fit: None,
        })
        .collect();

    let n_respondents = data.n_respondents();
    let n_parameters = kind.params_per_item() * items.len();
    info!(
        model = %kind,
        log_likelihood,
        iterations,
        converged,
        "IRT calibration finished"
    );

    Ok(IrtModel {
        kind,
        items,
        log_likelihood,
        aic: aic(log_likelihood, n_parameters),
        bic: bic(log_likelihood, n_parameters, n_respondents),
        converged,
        iterations,
        stop_reason,
        last_change,
        n_respondents,
        n_parameters,
        quadrature: grid.spec(),
        excluded_items: screened.excluded,
    })
}

/// Data-quality gate for calibration.
pub fn prepare<'a>(
    matrix: &'a ResponseMatrix,
    config: &AnalysisConfig,
) -> AnalysisResult<ScreenedMatrix<'a>> {
    if matrix.n_items() == 0 {
        return Err(AnalysisError::insufficient("no items to calibrate"));
    }
    if let Some(j) = (0..matrix.n_items())
        .find(|&j| matrix.response_type(j) != ResponseType::Dichotomous)
    {
        return Err(AnalysisError::unimplemented(format!(
            "polytomous item {} (graded response models)",
            matrix.item_ids()[j]
        )));
    }

    let screened = matrix.screen_constant_items(config.constant_items)?;
    if !screened.excluded.is_empty() {
        debug!(excluded = ?screened.excluded, "excluded constant items");
    }

    let n_items = screened.matrix.n_items();
    let required = RESPONDENTS_PER_ITEM * n_items;
    if screened.matrix.n_respondents() < required {
        return Err(AnalysisError::insufficient(format!(
            "{} respondents for {n_items} items, need at least {required}",
            screened.matrix.n_respondents()
        )));
    }
    Ok(screened)
}

/// `b = -logit(p)` from the proportion correct, `a = 1`.
fn starting_values(matrix: &ResponseMatrix) -> Vec<ItemParams> {
    (0..matrix.n_items())
        .map(|j| {
            let p = matrix.item_mean(j).clamp(0.01, 0.99);
            ItemParams::from_difficulty(1.0, -logit(p))
        })
        .collect()
}

/// Ids of items whose slope or intercept sits on the Newton bounds.
pub fn items_at_bound<'a>(item_ids: &'a [String], params: &[ItemParams]) -> Vec<&'a str> {
    const EDGE: f64 = 1e-9;
    item_ids
        .iter()
        .zip(params)
        .filter(|(_, p)| {
            p.slope.abs() >= MAX_SLOPE - EDGE || p.intercept.abs() >= MAX_INTERCEPT - EDGE
        })
        .map(|(id, _)| id.as_str())
        .collect()
}

fn check_slopes(kind: ModelKind, params: &[ItemParams], max_fraction: f64) -> AnalysisResult<()> {
    if kind != ModelKind::TwoPl || params.is_empty() {
        return Ok(());
    }
    let bad = params.iter().filter(|p| p.slope <= 0.0).count();
    let fraction = bad as f64 / params.len() as f64;
    if fraction > max_fraction {
        return Err(AnalysisError::DegenerateModel {
            reason: format!(
                "{bad} of {} items have a non-positive discrimination (limit {:.0}%)",
                params.len(),
                max_fraction * 100.0
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ItemSpec, simulate_responses};
    use crate::domain::ConstantItemPolicy;

    fn rasch_sample(n: usize, seed: u64) -> ResponseMatrix {
        let spec = [ItemSpec::rasch(-1.0), ItemSpec::rasch(0.0), ItemSpec::rasch(1.0)];
        simulate_responses(ModelKind::Rasch, &spec, n, seed).unwrap()
    }

    #[test]
    fn rasch_round_trip_recovers_difficulties() {
        let m = rasch_sample(3000, 42);
        let model = fit_irt(&m, ModelKind::Rasch, &AnalysisConfig::default()).unwrap();

        assert!(model.converged);
        assert_eq!(model.stop_reason, StopReason::Converged);
        let truth = [-1.0, 0.0, 1.0];
        for (item, b) in model.items.iter().zip(truth) {
            assert!(
                (item.difficulty - b).abs() < 0.15,
                "{}: {} vs {b}",
                item.id,
                item.difficulty
            );
            assert_eq!(item.discrimination, 1.0);
            assert!(item.difficulty_se.unwrap() < 0.1);
        }
        assert_eq!(model.n_parameters, 3);
    }

    #[test]
    fn two_pl_orders_discriminations() {
        let spec = [
            ItemSpec::new(0.6, -0.5),
            ItemSpec::new(1.0, 0.0),
            ItemSpec::new(1.8, 0.5),
            ItemSpec::new(1.2, -1.0),
            ItemSpec::new(0.9, 1.0),
        ];
        let m = simulate_responses(ModelKind::TwoPl, &spec, 4000, 9).unwrap();
        let model = fit_irt(&m, ModelKind::TwoPl, &AnalysisConfig::default()).unwrap();

        let a = model.discriminations();
        assert!(a[0] < a[1] && a[1] < a[2], "{a:?}");
        for (item, s) in model.items.iter().zip(&spec) {
            assert!((item.discrimination - s.discrimination).abs() < 0.35);
            assert!((item.difficulty - s.difficulty).abs() < 0.3);
            assert!(item.discrimination_se.is_some());
        }
        assert_eq!(model.n_parameters, 10);
    }

    #[test]
    fn fits_are_bit_identical() {
        let m = rasch_sample(500, 1);
        let config = AnalysisConfig::default();
        let first = fit_irt(&m, ModelKind::TwoPl, &config).unwrap();
        let second = fit_irt(&m, ModelKind::TwoPl, &config).unwrap();
        assert_eq!(first, second);
        for (x, y) in first.items.iter().zip(&second.items) {
            assert_eq!(x.difficulty.to_bits(), y.difficulty.to_bits());
        }
    }

    #[test]
    fn three_pl_is_unimplemented() {
        let m = rasch_sample(100, 2);
        let err = fit_irt(&m, ModelKind::ThreePl, &AnalysisConfig::default()).unwrap_err();
        assert_eq!(err.code(), "unimplemented");
    }

    #[test]
    fn respondent_boundary_is_two_per_item() {
        let ids: Vec<String> = (1..=3).map(|i| format!("q{i}")).collect();
        let rows: Vec<Vec<u32>> = (0..6u32).map(|i| vec![i % 2, (i / 2) % 2, u32::from(i < 3)]).collect();
        let config = AnalysisConfig::default();

        let m = ResponseMatrix::from_rows(ids.clone(), &rows).unwrap();
        assert!(fit_irt(&m, ModelKind::Rasch, &config).is_ok());

        let m = ResponseMatrix::from_rows(ids, &rows[..5]).unwrap();
        let err = fit_irt(&m, ModelKind::Rasch, &config).unwrap_err();
        assert_eq!(err.code(), "insufficient_data");
    }

    #[test]
    fn iteration_cap_is_flagged_not_fatal() {
        let m = rasch_sample(800, 3);
        let mut config = AnalysisConfig::default();
        config.estimation.max_iterations = 1;
        config.estimation.tolerance = 1e-12;

        let model = fit_irt(&m, ModelKind::TwoPl, &config).unwrap();
        assert!(!model.converged);
        assert_eq!(model.iterations, 1);
        assert_eq!(model.stop_reason, StopReason::IterationCap);

        let err = model.require_converged().unwrap_err();
        assert_eq!(err.code(), "non_convergence");
    }

    #[test]
    fn cancelled_fit_returns_starting_estimate() {
        let m = rasch_sample(300, 4);
        let token = CancelToken::new();
        token.cancel();
        let model =
            fit_irt_with_cancel(&m, ModelKind::Rasch, &AnalysisConfig::default(), &token).unwrap();
        assert_eq!(model.stop_reason, StopReason::Cancelled);
        assert_eq!(model.iterations, 0);
        assert!(!model.converged);
    }

    #[test]
    fn cancelling_mid_fit_keeps_the_last_iteration() {
        let m = rasch_sample(300, 4);
        let mut config = AnalysisConfig::default();
        config.estimation.tolerance = 1e-12;

        let token = CancelToken::new();
        let mut trace = Vec::new();
        let model = fit_irt_with_progress(&m, ModelKind::Rasch, &config, &token, |it, ll| {
            trace.push(ll);
            if it == 2 {
                token.cancel();
            }
        })
        .unwrap();

        assert_eq!(model.stop_reason, StopReason::Cancelled);
        assert_eq!(model.iterations, 2);
        assert_eq!(trace.len(), 2);
        assert_eq!(model.log_likelihood, trace[1]);

        // Same state as a fit capped after two iterations.
        config.estimation.max_iterations = 2;
        let capped = fit_irt(&m, ModelKind::Rasch, &config).unwrap();
        assert_eq!(capped.stop_reason, StopReason::IterationCap);
        assert_eq!(model.difficulties(), capped.difficulties());
    }

    #[test]
    fn boundary_estimates_are_reported() {
        let ids: Vec<String> = ["q1", "q2", "q3"].iter().map(|s| s.to_string()).collect();
        let params = [
            ItemParams::from_difficulty(1.2, 0.0),
            ItemParams {
                slope: MAX_SLOPE,
                intercept: 2.0,
            },
            ItemParams {
                slope: 0.8,
                intercept: -MAX_INTERCEPT,
            },
        ];
        assert_eq!(items_at_bound(&ids, &params), vec!["q2", "q3"]);
    }

    #[test]
    fn tiny_scenario_pushes_a_slope_to_the_bound() {
        let rows = vec![
            vec![1, 1, 0],
            vec![1, 0, 0],
            vec![1, 1, 1],
            vec![0, 0, 0],
            vec![0, 1, 0],
            vec![1, 1, 1],
        ];
        let ids: Vec<String> = ["q1", "q2", "q3"].iter().map(|s| s.to_string()).collect();
        let m = ResponseMatrix::from_rows(ids, &rows).unwrap();
        let model = fit_irt(&m, ModelKind::TwoPl, &AnalysisConfig::default()).unwrap();

        let q3 = &model.items[2];
        assert_eq!(q3.id, "q3");
        assert!((q3.discrimination - MAX_SLOPE).abs() < 1e-9);
        let params = ItemParams::from_model(&model);
        let item_ids: Vec<String> = model.items.iter().map(|it| it.id.clone()).collect();
        assert!(items_at_bound(&item_ids, &params).contains(&"q3"));
    }

    #[test]
    fn reversed_items_are_a_degenerate_model() {
        // Two of five items are answered correctly mostly by low scorers.
        let spec = [
            ItemSpec::new(2.0, 0.0),
            ItemSpec::new(2.0, -0.5),
            ItemSpec::new(2.0, 0.5),
            ItemSpec::new(-1.5, 0.0),
            ItemSpec::new(-1.5, 0.5),
        ];
        let m = simulate_responses(ModelKind::TwoPl, &spec, 2000, 6).unwrap();
        let err = fit_irt(&m, ModelKind::TwoPl, &AnalysisConfig::default()).unwrap_err();
        assert_eq!(err.code(), "degenerate_model");

        let mut lenient = AnalysisConfig::default();
        lenient.estimation.max_nonpositive_slope_fraction = 0.5;
        assert!(fit_irt(&m, ModelKind::TwoPl, &lenient).is_ok());
    }

    #[test]
    fn constant_items_follow_policy() {
        let mut rows: Vec<Vec<u32>> = (0..20u32).map(|i| vec![i % 2, (i / 2) % 2, 1]).collect();
        rows[0][0] = 1;
        let ids: Vec<String> = (1..=3).map(|i| format!("q{i}")).collect();
        let m = ResponseMatrix::from_rows(ids, &rows).unwrap();

        let mut config = AnalysisConfig::default();
        let err = fit_irt(&m, ModelKind::Rasch, &config).unwrap_err();
        assert_eq!(err.code(), "degenerate_item");

        config.constant_items = ConstantItemPolicy::Exclude;
        let model = fit_irt(&m, ModelKind::Rasch, &config).unwrap();
        assert_eq!(model.excluded_items, vec!["q3".to_string()]);
        assert_eq!(model.items.len(), 2);
    }

    #[test]
    fn polytomous_items_are_unimplemented() {
        let ids: Vec<String> = (1..=2).map(|i| format!("q{i}")).collect();
        let rows: Vec<Vec<u32>> = (0..10u32).map(|i| vec![i % 3, i % 2]).collect();
        let m = ResponseMatrix::from_rows(ids, &rows).unwrap();
        let err = fit_irt(&m, ModelKind::TwoPl, &AnalysisConfig::default()).unwrap_err();
        assert_eq!(err.code(), "unimplemented");
    }

    #[test]
    fn eap_scores_cover_every_respondent() {
        let m = rasch_sample(400, 8);
        let model = fit_irt(&m, ModelKind::Rasch, &AnalysisConfig::default()).unwrap();
        let scores = score_eap(&model, &m).unwrap();
        assert_eq!(scores.len(), 400);
        assert_eq!(scores[0].respondent_id, m.respondent_ids()[0]);
        assert!(scores.iter().all(|s| s.theta.abs() < 4.0 && s.sd > 0.0));
    }
}
