// raft-core/src/lib.rs

// 1. Memory safety
#![deny(unsafe_code)]
// 2. Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// 3. Performance
#![warn(clippy::perf)]

// --- MODULES HEXAGONAUX ---

// 1. Ports (Interfaces / Traits)
// Contracts for the model handle, the SMT backend and the proof cache.
pub mod ports;

// 2. Domain (Cœur du métier)
// Charter, config schema, diff safety, plan DSL, drift, spectral estimation.
// Depends on nothing else (no infra, no app).
pub mod domain;

// 3. Infrastructure (Adapters)
// Filesystem, YAML config store, event log, sled cache, z3 subprocess,
// energy meter, escape hatches, metrics.
pub mod infrastructure;

// 4. Application (Use Cases)
// Proof verifier, plan prover, governor cycle, operator router.
pub mod application;

// --- GESTION DES ERREURS GLOBALE ---
pub mod error;

// --- RE-EXPORTS (FACADE) ---
pub use error::RaftError;
