// raft-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Validation failed on '{field}': {message}")]
    #[diagnostic(
        code(raft::domain::validation),
        help("Fix the offending field and resubmit; no state was changed.")
    )]
    Validation { field: String, message: String },

    #[error("Drift alert: mean {mean_drift:.4} / max {max_drift:.4} over {} samples", window.len())]
    #[diagnostic(
        code(raft::domain::drift),
        help("Spectral radius moved too fast across recent cycles. The cycle was aborted.")
    )]
    DriftAlert {
        mean_drift: f64,
        max_drift: f64,
        window: Vec<f64>,
    },

    #[error("Spectral breach: rho {rho:.4} >= limit {limit:.4}")]
    #[diagnostic(code(raft::domain::spectral))]
    SpectralBreach { rho: f64, limit: f64 },

    #[error("Spectral estimation error: {0}")]
    #[diagnostic(
        code(raft::domain::spectral_input),
        help("Non-batch estimation takes a rank-1 probe point.")
    )]
    SpectralInput(String),

    #[error("Forbidden pattern error: {0}")]
    #[diagnostic(code(raft::domain::pattern))]
    Pattern(String),

    #[error("Charter parse error: {0}")]
    #[diagnostic(
        code(raft::domain::charter),
        help("Each clause line must read '- <id>  <text>' (two spaces between id and text).")
    )]
    CharterParse(String),
}

impl DomainError {
    /// Shortcut for per-field validation failures.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}
