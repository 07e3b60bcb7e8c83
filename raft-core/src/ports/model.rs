// raft-core/src/ports/model.rs

// The governor never inspects model internals. It needs exactly one
// capability: evaluating the map and its Jacobian-vector products at a
// probe point, so the spectral estimator can run power iteration without
// materializing the full Jacobian.

use ndarray::{Array1, ArrayView1};

/// A differentiable map `f: R^n -> R^m` exposed through its value and
/// Jacobian products. Implementations: analytic matrix, learned network,
/// and test doubles.
pub trait DifferentiableMap: Send + Sync {
    /// Input dimension `n` (probe points must match).
    fn input_dim(&self) -> usize;

    /// Evaluate `f(x)`.
    fn apply(&self, x: ArrayView1<'_, f64>) -> Array1<f64>;

    /// Jacobian-vector product `J(x) · v` (forward mode).
    fn jvp(&self, x: ArrayView1<'_, f64>, v: ArrayView1<'_, f64>) -> Array1<f64>;

    /// Vector-Jacobian product `J(x)ᵀ · u` (reverse mode).
    fn vjp(&self, x: ArrayView1<'_, f64>, u: ArrayView1<'_, f64>) -> Array1<f64>;
}
