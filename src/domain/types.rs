//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - handed between pipeline stages by value
//! - exported to JSON
//! - rendered by the terminal report

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::ResponseType;
use crate::error::AnalysisError;

/// Which IRT model to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
pub enum ModelKind {
    #[serde(rename = "rasch")]
    #[value(name = "rasch")]
    Rasch,
    #[serde(rename = "2pl")]
    #[value(name = "2pl")]
    TwoPl,
    /// Three-parameter logistic. Defined for completeness; fitting it fails with
    /// `Unimplemented`.
    #[serde(rename = "3pl")]
    #[value(name = "3pl")]
    ThreePl,
}

impl ModelKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::Rasch => "Rasch",
            ModelKind::TwoPl => "2PL",
            ModelKind::ThreePl => "3PL",
        }
    }

    /// Free parameters per item.
    pub fn params_per_item(self) -> usize {
        match self {
            ModelKind::Rasch => 1,
            ModelKind::TwoPl => 2,
            ModelKind::ThreePl => 3,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ModelKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rasch" | "1pl" => Ok(ModelKind::Rasch),
            "2pl" => Ok(ModelKind::TwoPl),
            "3pl" => Ok(ModelKind::ThreePl),
            other => Err(AnalysisError::invalid_config(
                "model",
                format!("unknown model kind '{other}' (expected rasch, 2pl or 3pl)"),
            )),
        }
    }
}

/// Dimensionality method selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    /// Eigen-decomposition of the inter-item correlation matrix.
    #[value(alias = "efa")]
    Eigen,
    /// Residual fit of joint proportions (NOHARM-style).
    #[value(alias = "noharm")]
    Residual,
}

impl MethodKind {
    pub fn display_name(self) -> &'static str {
        match self {
            MethodKind::Eigen => "eigenvalue (EFA)",
            MethodKind::Residual => "residual (NOHARM-style)",
        }
    }
}

impl FromStr for MethodKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eigen" | "efa" => Ok(MethodKind::Eigen),
            "residual" | "noharm" => Ok(MethodKind::Residual),
            other => Err(AnalysisError::invalid_config(
                "method",
                format!("unknown dimensionality method '{other}' (expected eigen or residual)"),
            )),
        }
    }
}

/// Single-factor solution for a response matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSolution {
    pub method: MethodKind,
    /// Item ids in loading order.
    pub item_ids: Vec<String>,
    /// One signed loading per item, each within `[-1, 1]`.
    pub loadings: Vec<f64>,
    /// Eigenvalues of the correlation matrix, descending.
    pub eigenvalues: Vec<f64>,
    pub variance_explained: f64,
    /// `λ1 / λ2`; infinite when the second eigenvalue vanishes.
    pub eigenvalue_ratio: f64,
    /// Kaiser-Meyer-Olkin adequacy; `None` for a singular correlation matrix.
    pub kmo: Option<f64>,
    /// Root mean square residual (residual method only).
    pub rmsr: Option<f64>,
    /// Tanaka-style goodness-of-fit index (residual method only).
    pub fit_index: Option<f64>,
    /// Constant items dropped before the analysis.
    pub excluded_items: Vec<String>,
}

/// Output of a dimensionality check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionalityResult {
    pub solution: FactorSolution,
    pub unidimensional: bool,
    /// Items with `|loading|` below the configured threshold, sorted by id.
    pub problematic_items: Vec<String>,
}

/// Per-item chi-square fit statistic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFit {
    pub item_id: String,
    pub chi_square: f64,
    pub df: usize,
    /// Upper-tail chi-square probability; `None` when `df == 0`.
    pub p_value: Option<f64>,
    /// Number of ability strata actually used.
    pub strata: usize,
}

/// A calibrated item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub response_type: ResponseType,
    pub difficulty: f64,
    /// Fixed at 1 for Rasch.
    pub discrimination: f64,
    /// Lower asymptote (3PL only, never estimated here).
    pub guessing: Option<f64>,
    pub difficulty_se: Option<f64>,
    /// `None` for Rasch (not a free parameter) or a singular information matrix.
    pub discrimination_se: Option<f64>,
    pub fit: Option<ItemFit>,
}

/// Why the EM loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Converged,
    IterationCap,
    Cancelled,
}

/// Quadrature grid used during estimation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadratureSpec {
    pub points: usize,
    pub theta_min: f64,
    pub theta_max: f64,
}

/// A fitted IRT model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrtModel {
    pub kind: ModelKind,
    pub items: Vec<Item>,
    pub log_likelihood: f64,
    pub aic: f64,
    pub bic: f64,
    pub converged: bool,
    pub iterations: usize,
    pub stop_reason: StopReason,
    /// Absolute log-likelihood change of the final iteration.
    pub last_change: f64,
    pub n_respondents: usize,
    pub n_parameters: usize,
    pub quadrature: QuadratureSpec,
    pub excluded_items: Vec<String>,
}

impl IrtModel {
    pub fn difficulties(&self) -> Vec<f64> {
        self.items.iter().map(|it| it.difficulty).collect()
    }

    pub fn discriminations(&self) -> Vec<f64> {
        self.items.iter().map(|it| it.discrimination).collect()
    }

    /// Turn a non-converged fit into a `NonConvergence` error.
    pub fn require_converged(self) -> Result<Self, AnalysisError> {
        if self.converged {
            Ok(self)
        } else {
            Err(AnalysisError::NonConvergence {
                iterations: self.iterations,
                last_change: self.last_change,
            })
        }
    }

    /// Copy of this model with per-item fit statistics attached.
    pub fn with_item_fit(&self, fits: &[ItemFit]) -> IrtModel {
        let mut out = self.clone();
        for item in &mut out.items {
            item.fit = fits.iter().find(|f| f.item_id == item.id).cloned();
        }
        out
    }
}

/// Expected a-posteriori ability of one respondent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityEstimate {
    pub respondent_id: String,
    pub theta: f64,
    /// Posterior standard deviation.
    pub sd: f64,
}

/// Model-level and item-level fit statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitDiagnostics {
    pub log_likelihood: f64,
    pub n_parameters: usize,
    pub n_respondents: usize,
    pub aic: f64,
    pub bic: f64,
    pub items: Vec<ItemFit>,
}

/// One point of an information curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InformationPoint {
    pub theta: f64,
    pub information: f64,
    /// `1 / sqrt(information)`; `None` where information is zero.
    pub standard_error: Option<f64>,
}

/// Information over the θ grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InformationCurve {
    pub points: Vec<InformationPoint>,
}

impl InformationCurve {
    pub fn thetas(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.theta).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.information).collect()
    }

    /// Grid point with the largest information (first one on ties).
    pub fn peak(&self) -> Option<InformationPoint> {
        let mut best: Option<InformationPoint> = None;
        for p in &self.points {
            match best {
                Some(b) if p.information <= b.information => {}
                _ => best = Some(*p),
            }
        }
        best
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInformation {
    pub item_id: String,
    pub curve: InformationCurve,
}

/// Test information, per-item curves and marginal reliability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestInformation {
    pub test: InformationCurve,
    pub items: Vec<ItemInformation>,
    /// `None` when test information vanishes somewhere on the grid.
    pub reliability: Option<f64>,
    pub peak_theta: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_kind_parses_by_name() {
        assert_eq!("Rasch".parse::<ModelKind>().unwrap(), ModelKind::Rasch);
        assert_eq!("2pl".parse::<ModelKind>().unwrap(), ModelKind::TwoPl);
        assert_eq!("3PL".parse::<ModelKind>().unwrap(), ModelKind::ThreePl);
        let err = "4pl".parse::<ModelKind>().unwrap_err();
        assert_eq!(err.code(), "invalid_configuration");
    }

    #[test]
    fn method_kind_accepts_legacy_names() {
        assert_eq!("efa".parse::<MethodKind>().unwrap(), MethodKind::Eigen);
        assert_eq!("NOHARM".parse::<MethodKind>().unwrap(), MethodKind::Residual);
        assert!("pca".parse::<MethodKind>().is_err());
    }

    #[test]
    fn model_kind_serializes_with_short_names() {
        let json = serde_json::to_string(&ModelKind::TwoPl).unwrap();
        assert_eq!(json, "\"2pl\"");
    }

    #[test]
    fn peak_prefers_first_maximum() {
        let curve = InformationCurve {
            points: vec![
                InformationPoint {
                    theta: -1.0,
                    information: 0.5,
                    standard_error: None,
                },
                InformationPoint {
                    theta: 0.0,
                    information: 0.8,
                    standard_error: None,
                },
                InformationPoint {
                    theta: 1.0,
                    information: 0.8,
                    standard_error: None,
                },
            ],
        };
        assert_eq!(curve.peak().unwrap().theta, 0.0);
    }
}
