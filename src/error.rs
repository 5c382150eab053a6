// 🚨 Analysis Errors - typed failures of the valuation/profit core
//
// Only the data-acquisition fallbacks (CV-for-RV, 90%-of-CV-for-TV) are
// silent. Everything else surfaces as one of these.

use thiserror::Error;

/// Core result type alias
pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Neither RV nor CV present on the freshest valuation fact
    #[error("no rateable or capital value available")]
    MissingValuation,

    /// No qualifying comparable sales and no CV to fall back on
    #[error("no comparable sales and no capital value to fall back on")]
    NoTargetValue,

    /// Rejected at configuration load
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Closed-form inversion would divide by zero
    #[error("degenerate profit model: {0}")]
    DegenerateModel(String),
}

impl AnalysisError {
    pub fn invalid_config(field: &str, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidConfiguration {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Short machine-friendly label, stored alongside failed outcomes
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::MissingValuation => "missing_valuation",
            AnalysisError::NoTargetValue => "no_target_value",
            AnalysisError::InvalidConfiguration { .. } => "invalid_configuration",
            AnalysisError::DegenerateModel(_) => "degenerate_model",
        }
    }
}
