//! Numerically stable logistic helpers.
//!
//! The item response function is `P(θ) = σ(a(θ - b))`. Log-likelihoods are
//! accumulated in log space, so we need `ln σ(z)` without forming `σ(z)` first:
//! for large `|z|` the direct form rounds to `ln 0` or `ln 1`.

/// Lower/upper clamp for probabilities that feed a logarithm or a variance.
pub const PROB_EPS: f64 = 1e-10;

/// `1 / (1 + e^{-z})`.
#[inline]
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln σ(z)`.
#[inline]
pub fn log_sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        -(-z).exp().ln_1p()
    } else {
        z - z.exp().ln_1p()
    }
}

/// `ln(p / (1 - p))`.
#[inline]
pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

/// `ln Σ e^{x_i}` without overflow.
pub fn logsumexp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Standard normal density.
#[inline]
pub fn normal_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_is_symmetric_and_bounded() {
        for &z in &[-800.0, -30.0, -1.0, 0.0, 1.0, 30.0, 800.0] {
            let p = sigmoid(z);
            assert!((0.0..=1.0).contains(&p));
            assert!((p + sigmoid(-z) - 1.0).abs() < 1e-12);
        }
        assert_eq!(sigmoid(0.0), 0.5);
    }

    #[test]
    fn log_sigmoid_matches_direct_form_and_stays_finite() {
        for &z in &[-5.0, -0.3, 0.0, 0.7, 4.0] {
            assert!((log_sigmoid(z) - sigmoid(z).ln()).abs() < 1e-12);
        }
        assert!(log_sigmoid(-800.0).is_finite());
        assert!((log_sigmoid(800.0)).abs() < 1e-300);
    }

    #[test]
    fn logsumexp_handles_large_magnitudes() {
        let v = [1000.0, 1000.0];
        assert!((logsumexp(&v) - (1000.0 + 2f64.ln())).abs() < 1e-9);
        assert_eq!(logsumexp(&[]), f64::NEG_INFINITY);
    }

    #[test]
    fn logit_inverts_sigmoid() {
        for &z in &[-3.0, -0.5, 0.0, 2.0] {
            assert!((logit(sigmoid(z)) - z).abs() < 1e-10);
        }
    }
}
