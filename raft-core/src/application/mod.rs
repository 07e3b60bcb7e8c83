// raft-core/src/application/mod.rs

pub mod governor;
pub mod operator;
pub mod plan_prover;
pub mod verifier;

pub use governor::{CycleReport, CycleState, Runtime, RuntimeBuilder};
pub use operator::operator_router;
pub use plan_prover::PlanProver;
pub use verifier::{ModelCounterexample, ProofVerdict, SmtVerifier};
