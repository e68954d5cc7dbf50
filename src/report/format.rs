//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the estimation code stays clean and testable
//! - output changes are localized

use crate::domain::{
    AnalysisConfig, DimensionalityResult, FitDiagnostics, IrtModel, ItemFit, MethodKind,
    TestInformation,
};

/// Dimensionality verdict, solution statistics and the loading table.
pub fn format_dimensionality(result: &DimensionalityResult, config: &AnalysisConfig) -> String {
    let s = &result.solution;
    let d = &config.dimensionality;
    let mut out = String::new();

    out.push_str(&format!(
        "=== Dimensionality ({}) ===\n",
        s.method.display_name()
    ));
    out.push_str(&format!(
        "Items: {} | Eigenvalues (top 3): {}\n",
        s.item_ids.len(),
        fmt_vec(&s.eigenvalues[..s.eigenvalues.len().min(3)])
    ));
    out.push_str(&format!(
        "Variance explained: {:.3} (min {:.2})\n",
        s.variance_explained, d.min_variance_explained
    ));
    out.push_str(&format!(
        "Eigenvalue ratio: {} (min {:.1})\n",
        fmt_ratio(s.eigenvalue_ratio),
        d.min_eigenvalue_ratio
    ));
    out.push_str(&format!("KMO: {}\n", fmt_opt(s.kmo, 3)));
    if s.method == MethodKind::Residual {
        out.push_str(&format!(
            "RMSR: {} (max {:.3}) | Fit index: {}\n",
            fmt_opt(s.rmsr, 4),
            d.max_rmsr,
            fmt_opt(s.fit_index, 3)
        ));
    }
    if !s.excluded_items.is_empty() {
        out.push_str(&format!("Excluded (constant): {}\n", s.excluded_items.join(", ")));
    }
    out.push_str(&format!(
        "Verdict: {}\n",
        if result.unidimensional {
            "unidimensional"
        } else {
            "NOT unidimensional"
        }
    ));

    out.push('\n');
    out.push_str(&format!("{:<16} {:>8}\n", "item", "loading"));
    out.push_str(&format!("{:-<16} {:-<8}\n", "", ""));
    for (id, loading) in s.item_ids.iter().zip(&s.loadings) {
        let flag = if loading.abs() < d.loading_threshold { "  *" } else { "" };
        out.push_str(&format!("{:<16} {:>8.3}{flag}\n", truncate(id, 16), loading));
    }
    if !result.problematic_items.is_empty() {
        out.push_str(&format!(
            "* |loading| < {:.2}: {}\n",
            d.loading_threshold,
            result.problematic_items.join(", ")
        ));
    }
    out
}

/// Model header: kind, likelihood, criteria and convergence.
pub fn format_model_summary(model: &IrtModel) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== IRT calibration ({}) ===\n", model.kind.display_name()));
    out.push_str(&format!(
        "Respondents: {} | Items: {} | Free parameters: {}\n",
        model.n_respondents,
        model.items.len(),
        model.n_parameters
    ));
    out.push_str(&format!(
        "logL: {:.3} | AIC: {:.3} | BIC: {:.3}\n",
        model.log_likelihood, model.aic, model.bic
    ));
    out.push_str(&format!(
        "EM: {} after {} iterations (last |ΔlogL| = {:.2e}, stop: {:?})\n",
        if model.converged { "converged" } else { "NOT converged" },
        model.iterations,
        model.last_change,
        model.stop_reason
    ));
    out.push_str(&format!(
        "Quadrature: {} points on [{}, {}]\n",
        model.quadrature.points, model.quadrature.theta_min, model.quadrature.theta_max
    ));
    if !model.excluded_items.is_empty() {
        out.push_str(&format!(
            "Excluded (constant): {}\n",
            model.excluded_items.join(", ")
        ));
    }
    out
}

/// Per-item estimates with standard errors and, if attached, fit.
pub fn format_item_table(model: &IrtModel) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<16} {:>8} {:>8} {:>8} {:>8} {:>9} {:>4} {:>8}\n",
            "item", "b", "se(b)", "a", "se(a)", "chi2", "df", "p"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<16} {:-<8} {:-<8} {:-<8} {:-<8} {:-<9} {:-<4} {:-<8}\n",
            "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for item in &model.items {
        let fit = item.fit.as_ref();
        out.push_str(
            format!(
                "{:<16} {:>8.3} {:>8} {:>8.3} {:>8} {:>9} {:>4} {:>8}\n",
                truncate(&item.id, 16),
                item.difficulty,
                fmt_opt(item.difficulty_se, 3),
                item.discrimination,
                fmt_opt(item.discrimination_se, 3),
                fmt_opt(fit.map(|f| f.chi_square), 2),
                fit.map(|f| f.df.to_string()).unwrap_or_default(),
                fmt_opt(fit.and_then(|f| f.p_value), 4),
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Worst-fitting items (already ranked by the caller).
pub fn format_misfit(diagnostics: &FitDiagnostics, ranked: &[ItemFit]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Item fit (Q1, {} strata):\n",
        ranked.first().map_or(0, |f| f.strata)
    ));
    for f in ranked {
        out.push_str(&format!(
            "  {:<16} chi2={:>9.3} df={:<3} p={}\n",
            truncate(&f.item_id, 16),
            f.chi_square,
            f.df,
            fmt_opt(f.p_value, 4)
        ));
    }
    let flagged = diagnostics
        .items
        .iter()
        .filter(|f| f.p_value.is_some_and(|p| p < 0.05))
        .count();
    out.push_str(&format!(
        "  {flagged} of {} items with p < 0.05\n",
        diagnostics.items.len()
    ));
    out
}

/// Reliability, peak and a SEM table every half unit of θ.
pub fn format_information_summary(info: &TestInformation) -> String {
    let mut out = String::new();
    out.push_str("=== Test information ===\n");
    out.push_str(&format!("Marginal reliability: {}\n", fmt_opt(info.reliability, 3)));
    if let Some(peak) = info.test.peak() {
        out.push_str(&format!(
            "Peak: I={:.3} at theta={:.2} (SEM {})\n",
            peak.information,
            peak.theta,
            fmt_opt(peak.standard_error, 3)
        ));
    }
    out.push_str(&format!("{:>7} {:>10} {:>8}\n", "theta", "info", "SEM"));
    for point in info
        .test
        .points
        .iter()
        .filter(|p| on_half_step(p.theta))
    {
        out.push_str(&format!(
            "{:>7.1} {:>10.3} {:>8}\n",
            point.theta,
            point.information,
            fmt_opt(point.standard_error, 3)
        ));
    }
    out
}

fn on_half_step(theta: f64) -> bool {
    let doubled = theta * 2.0;
    (doubled - doubled.round()).abs() < 1e-6
}

fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    match v {
        Some(x) if x.is_finite() => format!("{x:.decimals$}"),
        Some(_) => "inf".to_string(),
        None => "-".to_string(),
    }
}

fn fmt_ratio(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.3}")
    } else {
        "inf".to_string()
    }
}

fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.3}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
