// raft-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

/// Crate-wide error facade.
///
/// The split mirrors the recovery policy: `Domain` failures (validation,
/// drift, spectral input, charter parse) are recoverable at a cycle or
/// request boundary and map onto 422s and aborted cycles, while
/// `Infrastructure` failures (IO, YAML, solver, model weights) describe a
/// broken adapter and usually end the request with a 500 or the process
/// with a non-zero exit. Callers that need the distinction match on the
/// variant; everything else propagates with `?`.
#[derive(Error, Debug)]
pub enum RaftError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    /// Wiring failures with no better home (metrics registry setup).
    #[error("Internal Error: {0}")]
    InternalError(String),
}

// The event log and config store surface raw `io::Error` from their write
// paths; route those through the Infrastructure layer instead of adding a
// competing top-level variant.
impl From<std::io::Error> for RaftError {
    fn from(err: std::io::Error) -> Self {
        RaftError::Infrastructure(InfrastructureError::Io(err))
    }
}
