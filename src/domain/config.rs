//! Analysis configuration.
//!
//! Every threshold the core uses lives here with its default. The struct is
//! deserializable with `#[serde(default)]`, so a JSON config file only needs to
//! name the values it overrides.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult};

/// What to do with items whose responses never vary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConstantItemPolicy {
    /// Fail with `DegenerateItem`.
    #[default]
    Reject,
    /// Drop the item and report it as excluded.
    Exclude,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub constant_items: ConstantItemPolicy,
    pub dimensionality: DimensionalityConfig,
    pub estimation: EstimationConfig,
    pub diagnostics: DiagnosticsConfig,
    pub information: InformationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionalityConfig {
    /// Minimum `λ1 / N` for a unidimensional verdict.
    pub min_variance_explained: f64,
    /// Minimum `λ1 / λ2` for a unidimensional verdict.
    pub min_eigenvalue_ratio: f64,
    /// Maximum RMSR for the residual method's verdict.
    pub max_rmsr: f64,
    /// Items with `|loading|` below this are problematic.
    pub loading_threshold: f64,
    pub residual_max_iterations: usize,
    pub residual_tolerance: f64,
}

impl Default for DimensionalityConfig {
    fn default() -> Self {
        Self {
            min_variance_explained: 0.20,
            min_eigenvalue_ratio: 3.0,
            max_rmsr: 0.05,
            loading_threshold: 0.30,
            residual_max_iterations: 200,
            residual_tolerance: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    /// EM stops once `|ΔlogL|` falls below this.
    pub tolerance: f64,
    pub max_iterations: usize,
    pub quadrature_points: usize,
    pub theta_min: f64,
    pub theta_max: f64,
    /// Newton-Raphson steps per item per M-step.
    pub newton_iterations: usize,
    /// Largest tolerated share of 2PL items with a non-positive slope.
    pub max_nonpositive_slope_fraction: f64,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-4,
            max_iterations: 100,
            quadrature_points: 41,
            theta_min: -4.0,
            theta_max: 4.0,
            newton_iterations: 20,
            max_nonpositive_slope_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Requested number of ability strata for item chi-square fit.
    pub strata: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self { strata: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InformationConfig {
    pub theta_min: f64,
    pub theta_max: f64,
    pub theta_step: f64,
}

impl Default for InformationConfig {
    fn default() -> Self {
        Self {
            theta_min: -4.0,
            theta_max: 4.0,
            theta_step: 0.1,
        }
    }
}

impl AnalysisConfig {
    /// Reject out-of-range settings before any stage runs.
    pub fn validate(&self) -> AnalysisResult<()> {
        let d = &self.dimensionality;
        unit_interval("dimensionality.min_variance_explained", d.min_variance_explained)?;
        unit_interval("dimensionality.loading_threshold", d.loading_threshold)?;
        positive("dimensionality.min_eigenvalue_ratio", d.min_eigenvalue_ratio)?;
        positive("dimensionality.max_rmsr", d.max_rmsr)?;
        positive("dimensionality.residual_tolerance", d.residual_tolerance)?;
        at_least("dimensionality.residual_max_iterations", d.residual_max_iterations, 1)?;

        let e = &self.estimation;
        positive("estimation.tolerance", e.tolerance)?;
        at_least("estimation.max_iterations", e.max_iterations, 1)?;
        at_least("estimation.quadrature_points", e.quadrature_points, 5)?;
        at_least("estimation.newton_iterations", e.newton_iterations, 1)?;
        range("estimation", e.theta_min, e.theta_max)?;
        unit_interval(
            "estimation.max_nonpositive_slope_fraction",
            e.max_nonpositive_slope_fraction,
        )?;

        at_least("diagnostics.strata", self.diagnostics.strata, 2)?;

        let i = &self.information;
        range("information", i.theta_min, i.theta_max)?;
        positive("information.theta_step", i.theta_step)?;
        if i.theta_step > i.theta_max - i.theta_min {
            return Err(AnalysisError::invalid_config(
                "information.theta_step",
                "step is wider than the theta range",
            ));
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> AnalysisResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AnalysisError::invalid_config(
            field,
            format!("must be finite and > 0, got {value}"),
        ))
    }
}

fn unit_interval(field: &'static str, value: f64) -> AnalysisResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(AnalysisError::invalid_config(
            field,
            format!("must lie in [0, 1], got {value}"),
        ))
    }
}

fn at_least(field: &'static str, value: usize, min: usize) -> AnalysisResult<()> {
    if value >= min {
        Ok(())
    } else {
        Err(AnalysisError::invalid_config(
            field,
            format!("must be >= {min}, got {value}"),
        ))
    }
}

fn range(field: &'static str, min: f64, max: f64) -> AnalysisResult<()> {
    if min.is_finite() && max.is_finite() && max > min {
        Ok(())
    } else {
        Err(AnalysisError::invalid_config(
            field,
            format!("theta range must be finite with max > min, got [{min}, {max}]"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AnalysisConfig::default().validate().unwrap();
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let mut config = AnalysisConfig::default();
        config.estimation.tolerance = -1e-4;
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "invalid_configuration");
        assert!(err.to_string().contains("estimation.tolerance"));
    }

    #[test]
    fn inverted_theta_range_is_rejected() {
        let mut config = AnalysisConfig::default();
        config.information.theta_min = 2.0;
        config.information.theta_max = -2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config: AnalysisConfig = serde_json::from_str(
            r#"{"estimation": {"max_iterations": 7}, "constant_items": "exclude"}"#,
        )
        .unwrap();
        assert_eq!(config.estimation.max_iterations, 7);
        assert_eq!(config.estimation.quadrature_points, 41);
        assert_eq!(config.constant_items, ConstantItemPolicy::Exclude);
        assert_eq!(config.dimensionality.loading_threshold, 0.30);
    }
}
