//! Error types.
//!
//! Two layers:
//!
//! - [`AnalysisError`]: the library taxonomy. Every failure the estimation core can
//!   produce maps to exactly one variant with a stable machine-readable code.
//! - [`AppError`]: what the `irt` binary reports (message + process exit code).

use thiserror::Error;

/// Failure kinds of the psychometric core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// Too few respondents or items for the requested analysis.
    #[error("insufficient data: {reason}")]
    InsufficientData { reason: String },

    /// An item has zero response variance and the configuration rejects it.
    #[error("item '{item_id}' has zero response variance")]
    DegenerateItem { item_id: String },

    /// The fitted parameters are not identified (e.g. non-positive slopes).
    #[error("degenerate model: {reason}")]
    DegenerateModel { reason: String },

    /// The EM loop stopped before meeting its tolerance.
    ///
    /// The estimator itself never returns this; it returns the flagged model.
    /// Callers that want a hard failure use `IrtModel::require_converged`.
    #[error("no convergence after {iterations} iterations (last log-likelihood change {last_change:.3e})")]
    NonConvergence { iterations: usize, last_change: f64 },

    /// The requested model or input type has no implementation.
    #[error("not implemented: {feature}")]
    Unimplemented { feature: String },

    /// A configuration value is outside its valid range.
    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },

    /// The response matrix handed to the core is malformed.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },
}

impl AnalysisError {
    pub fn insufficient(reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            reason: reason.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn unimplemented(feature: impl Into<String>) -> Self {
        Self::Unimplemented {
            feature: feature.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "insufficient_data",
            Self::DegenerateItem { .. } => "degenerate_item",
            Self::DegenerateModel { .. } => "degenerate_model",
            Self::NonConvergence { .. } => "non_convergence",
            Self::Unimplemented { .. } => "unimplemented",
            Self::InvalidConfiguration { .. } => "invalid_configuration",
            Self::InvalidInput { .. } => "invalid_input",
        }
    }

    /// Process exit code used by the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidInput { .. } | Self::InvalidConfiguration { .. } => 2,
            Self::InsufficientData { .. } | Self::DegenerateItem { .. } => 3,
            Self::DegenerateModel { .. } | Self::NonConvergence { .. } => 4,
            Self::Unimplemented { .. } => 5,
        }
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        AppError::new(err.exit_code(), format!("error[{}]: {err}", err.code()))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
