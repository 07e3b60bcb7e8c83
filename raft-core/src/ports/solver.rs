// raft-core/src/ports/solver.rs

use crate::infrastructure::error::InfrastructureError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Outcome of one solver invocation over an SMT-LIB2 program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveOutcome {
    /// The assertions are unsatisfiable: no violation can be constructed.
    Unsat,
    /// Satisfiable, with the model's constant assignments (name -> value).
    Sat(BTreeMap<String, String>),
    /// The solver gave up (timeout, incomplete theory).
    Unknown,
}

/// External SMT backend. The core never implements solving itself; this
/// port is the seam between the proof gate and whatever decides
/// satisfiability (a z3 child process in production, a scripted double in
/// tests).
#[async_trait]
pub trait SmtBackend: Send + Sync {
    /// Check the given SMT-LIB2 program. `timeout` of `None` relies on the
    /// solver's internal bounds.
    async fn check(
        &self,
        smt: &str,
        timeout: Option<Duration>,
    ) -> Result<SolveOutcome, InfrastructureError>;
}
