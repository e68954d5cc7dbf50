//! Item and test information, SEM and marginal reliability.
//!
//! - item information: `I_j(θ) = a_j² P_j(θ) (1 - P_j(θ))`
//! - test information: `Σ_j I_j(θ)`
//! - SEM: `1 / √I(θ)`, absent where `I(θ) = 0`
//! - marginal reliability: `1 - Σ_θ w(θ) / I(θ)` with `w` the normalized
//!   standard normal density on the grid

use tracing::debug;

use crate::domain::{
    AnalysisConfig, InformationCurve, InformationPoint, IrtModel, ItemInformation, TestInformation,
};
use crate::error::{AnalysisError, AnalysisResult};
use crate::fit::ItemParams;
use crate::math::{normal_pdf, stepped_grid};

/// Information of one item at `theta`.
pub fn item_information(params: &ItemParams, theta: f64) -> f64 {
    let p = params.probability(theta);
    params.slope * params.slope * p * (1.0 - p)
}

/// Build item and test information curves on the configured θ grid.
pub fn test_information(model: &IrtModel, config: &AnalysisConfig) -> AnalysisResult<TestInformation> {
    config.validate()?;
    if model.items.is_empty() {
        return Err(AnalysisError::insufficient("model has no items"));
    }
    let info = &config.information;
    let thetas = stepped_grid(info.theta_min, info.theta_max, info.theta_step)?;
    let params = ItemParams::from_model(model);

    let items: Vec<ItemInformation> = model
        .items
        .iter()
        .zip(&params)
        .map(|(item, p)| ItemInformation {
            item_id: item.id.clone(),
            curve: curve(&thetas, |theta| item_information(p, theta)),
        })
        .collect();

    let test = curve(&thetas, |theta| {
        params.iter().map(|p| item_information(p, theta)).sum()
    });
    let reliability = marginal_reliability(&test);
    let peak_theta = test.peak().map(|p| p.theta);

    debug!(points = thetas.len(), ?reliability, ?peak_theta, "test information");

    Ok(TestInformation {
        test,
        items,
        reliability,
        peak_theta,
    })
}

fn curve(thetas: &[f64], information: impl Fn(f64) -> f64) -> InformationCurve {
    let points = thetas
        .iter()
        .map(|&theta| {
            let value = information(theta);
            InformationPoint {
                theta,
                information: value,
                standard_error: standard_error(value),
            }
        })
        .collect();
    InformationCurve { points }
}

/// `1 / √I`, `None` when the information is not positive.
pub fn standard_error(information: f64) -> Option<f64> {
    (information.is_finite() && information > 0.0).then(|| 1.0 / information.sqrt())
}

/// `1 - E_w[1 / I(θ)]` over the curve's grid; `None` if `I` vanishes anywhere.
///
/// The value is below 1 but not bounded below. Whenever `I(θ) < 1` across the
/// grid (short tests, e.g. any test with `Σ a_j² < 4`) it is negative.
pub fn marginal_reliability(curve: &InformationCurve) -> Option<f64> {
    if curve.points.is_empty() {
        return None;
    }
    let weights: Vec<f64> = curve.points.iter().map(|p| normal_pdf(p.theta)).collect();
    let total: f64 = weights.iter().sum();

    let mut error_variance = 0.0;
    for (point, w) in curve.points.iter().zip(&weights) {
        if !(point.information > 0.0) {
            return None;
        }
        error_variance += w / total / point.information;
    }
    Some(1.0 - error_variance)
}
