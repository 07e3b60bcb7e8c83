// raft-core/src/domain/diff/mod.rs

pub mod ast;
pub mod obligation;

pub use ast::{DiffAst, DiffLine, FunctionSignature};
pub use obligation::{Obligation, ObligationBuilder, ViolationDetail};
