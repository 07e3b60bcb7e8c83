// raft-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- FILESYSTEM (IO) ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(raft::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    // --- CONFIG / YAML ---
    #[error("YAML Parsing Error: {0}")]
    #[diagnostic(
        code(raft::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON Serialization Error: {0}")]
    #[diagnostic(code(raft::infra::json))]
    Json(#[from] serde_json::Error),

    // --- SMT SOLVER ---
    #[error("SMT parse error: {0}")]
    #[diagnostic(
        code(raft::infra::smt_parse),
        help("The obligation is not well-formed SMT-LIB2; the failure was cached.")
    )]
    SmtParse(String),

    #[error("SMT backend unavailable: {0}")]
    #[diagnostic(
        code(raft::infra::solver),
        help("The external solver process could not be spawned or crashed.")
    )]
    SolverUnavailable(String),

    // --- MODEL WEIGHTS ---
    #[error("Model load error: {0}")]
    #[diagnostic(code(raft::infra::model))]
    ModelLoad(String),
}
