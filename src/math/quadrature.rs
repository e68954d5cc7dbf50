//! Fixed θ grids.
//!
//! The latent trait is integrated out on an equally spaced grid with weights
//! proportional to the standard normal density. Fixing the prior at N(0, 1)
//! pins the location and scale of θ, which identifies the item parameters.
//! The grid is deterministic, so two fits with the same configuration integrate
//! over exactly the same nodes.

use crate::domain::QuadratureSpec;
use crate::error::{AnalysisError, AnalysisResult};
use crate::math::normal_pdf;

/// Nodes and normalized weights approximating N(0, 1).
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureGrid {
    pub nodes: Vec<f64>,
    pub weights: Vec<f64>,
}

impl QuadratureGrid {
    /// `points` equally spaced nodes over `[min, max]` (inclusive).
    pub fn standard_normal(points: usize, min: f64, max: f64) -> AnalysisResult<Self> {
        let nodes = linear_space(min, max, points)?;
        let raw: Vec<f64> = nodes.iter().map(|&x| normal_pdf(x)).collect();
        let total: f64 = raw.iter().sum();
        let weights = raw.into_iter().map(|w| w / total).collect();
        Ok(Self { nodes, weights })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn log_weights(&self) -> Vec<f64> {
        self.weights.iter().map(|w| w.ln()).collect()
    }

    pub fn spec(&self) -> QuadratureSpec {
        QuadratureSpec {
            points: self.len(),
            theta_min: self.nodes[0],
            theta_max: self.nodes[self.len() - 1],
        }
    }
}

/// Generate `steps` equally spaced points between `min` and `max` (inclusive).
pub fn linear_space(min: f64, max: f64, steps: usize) -> AnalysisResult<Vec<f64>> {
    if !(min.is_finite() && max.is_finite() && max > min) {
        return Err(AnalysisError::invalid_config(
            "theta range",
            format!("min={min}, max={max} (must be finite and max>min)"),
        ));
    }
    if steps < 2 {
        return Err(AnalysisError::invalid_config("grid points", "must be >= 2"));
    }

    let step = (max - min) / (steps as f64 - 1.0);
    Ok((0..steps).map(|i| min + step * i as f64).collect())
}

/// Points `min, min + step, …` up to and including `max` (within rounding).
pub fn stepped_grid(min: f64, max: f64, step: f64) -> AnalysisResult<Vec<f64>> {
    if !(step.is_finite() && step > 0.0) {
        return Err(AnalysisError::invalid_config(
            "theta step",
            format!("must be finite and > 0, got {step}"),
        ));
    }
    if !(min.is_finite() && max.is_finite() && max > min) {
        return Err(AnalysisError::invalid_config(
            "theta range",
            format!("min={min}, max={max} (must be finite and max>min)"),
        ));
    }
    let n = ((max - min) / step + 1e-9).floor() as usize + 1;
    Ok((0..n).map(|i| min + step * i as f64).collect())
}
