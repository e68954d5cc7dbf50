//! Shared analysis pipeline used by the CLI front-end and tests.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! responses -> (dimensionality check) -> calibration -> item fit -> information
//!
//! The CLI can then focus on presentation (printing, plotting, exports).

use serde::Serialize;
use tracing::warn;

use crate::diagnostics::fit_diagnostics;
use crate::dimensionality::check_dimensionality;
use crate::domain::{
    AbilityEstimate, AnalysisConfig, DimensionalityResult, FitDiagnostics, IrtModel, MethodKind,
    ModelKind, ResponseMatrix, TestInformation,
};
use crate::error::AnalysisResult;
use crate::fit::{CancelToken, fit_irt_with_cancel, score_eap};
use crate::information::test_information;

/// What a calibration run should compute besides the model itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitRequest {
    pub model: ModelKind,
    /// Run a dimensionality check first (reported, not enforced).
    pub check: Option<MethodKind>,
    pub information: bool,
    pub abilities: bool,
    /// Turn a fit that stopped early into a `NonConvergence` error.
    pub require_converged: bool,
}

impl FitRequest {
    pub fn new(model: ModelKind) -> Self {
        Self {
            model,
            check: None,
            information: false,
            abilities: false,
            require_converged: false,
        }
    }
}

/// All computed outputs of a single calibration run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensionality: Option<DimensionalityResult>,
    /// Items carry their fit statistics.
    pub model: IrtModel,
    pub diagnostics: FitDiagnostics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub information: Option<TestInformation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abilities: Option<Vec<AbilityEstimate>>,
}

/// "Check dimensionality" operation.
pub fn run_dimensionality(
    matrix: &ResponseMatrix,
    method: MethodKind,
    config: &AnalysisConfig,
) -> AnalysisResult<DimensionalityResult> {
    check_dimensionality(matrix, method, config)
}

/// "Fit IRT model" operation plus the stages that depend on it.
pub fn run_fit(
    matrix: &ResponseMatrix,
    request: &FitRequest,
    config: &AnalysisConfig,
) -> AnalysisResult<RunOutput> {
    run_fit_with_cancel(matrix, request, config, &CancelToken::new())
}

pub fn run_fit_with_cancel(
    matrix: &ResponseMatrix,
    request: &FitRequest,
    config: &AnalysisConfig,
    cancel: &CancelToken,
) -> AnalysisResult<RunOutput> {
    let dimensionality = match request.check {
        Some(method) => {
            let result = check_dimensionality(matrix, method, config)?;
            if !result.unidimensional {
                warn!(
                    method = ?method,
                    variance_explained = result.solution.variance_explained,
                    "items do not look unidimensional; calibrating anyway"
                );
            }
            Some(result)
        }
        None => None,
    };

    let mut model = fit_irt_with_cancel(matrix, request.model, config, cancel)?;
    if request.require_converged {
        model = model.require_converged()?;
    }

    let diagnostics = fit_diagnostics(&model, matrix, config)?;
    let model = model.with_item_fit(&diagnostics.items);

    let information = if request.information {
        Some(test_information(&model, config)?)
    } else {
        None
    };
    let abilities = if request.abilities {
        Some(score_eap(&model, matrix)?)
    } else {
        None
    };

    Ok(RunOutput {
        dimensionality,
        model,
        diagnostics,
        information,
        abilities,
    })
}
