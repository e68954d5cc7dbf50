//! Reporting utilities: item rankings and formatted terminal output.

pub mod format;

pub use format::*;

use std::cmp::Ordering;

use crate::domain::{FitDiagnostics, ItemFit};

/// Items ordered from worst to best fit, truncated to `top_n`.
///
/// Smaller p-values come first; items without a p-value (no degrees of
/// freedom) go last, ordered by chi-square.
pub fn rank_item_fit(diagnostics: &FitDiagnostics, top_n: usize) -> Vec<ItemFit> {
    let mut sorted = diagnostics.items.clone();
    sorted.sort_by(|a, b| {
        let by_p = match (a.p_value, b.p_value) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_p.then_with(|| {
            b.chi_square
                .partial_cmp(&a.chi_square)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.item_id.cmp(&b.item_id))
    });
    sorted.truncate(top_n);
    sorted
}
