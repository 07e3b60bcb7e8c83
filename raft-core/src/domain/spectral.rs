// raft-core/src/domain/spectral.rs

// Power-iteration estimate of the largest-magnitude Jacobian eigenvalue,
// computed from Jacobian-vector products only. Square maps iterate J
// directly; rectangular maps iterate JᵀJ and report the square root (the
// dominant singular value).

use crate::domain::error::DomainError;
use crate::ports::model::DifferentiableMap;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Convergence tolerance between successive estimates.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;
/// Below this norm a normalization would blow up; halt with the last estimate.
const NEAR_ZERO: f64 = 1e-10;

#[derive(Debug, Clone, Copy)]
pub struct SpectralOptions {
    /// Maximum power-iteration steps.
    pub n_iter: usize,
    /// Early-termination tolerance on |ρ_k − ρ_{k−1}|.
    pub tolerance: f64,
    /// Optional external seed for the probe vector; `None` draws from the
    /// thread-local entropy source.
    pub seed: Option<u64>,
}

impl Default for SpectralOptions {
    fn default() -> Self {
        Self {
            n_iter: 10,
            tolerance: DEFAULT_TOLERANCE,
            seed: None,
        }
    }
}

/// Estimate the spectral radius of the Jacobian of `map` at `x`.
pub fn estimate_spectral_radius(
    map: &dyn DifferentiableMap,
    x: ArrayView1<'_, f64>,
    opts: &SpectralOptions,
) -> Result<f64, DomainError> {
    let n = map.input_dim();
    if x.len() != n {
        return Err(DomainError::SpectralInput(format!(
            "probe point has dimension {}, model expects {}",
            x.len(),
            n
        )));
    }

    let y = map.apply(x);
    let square = y.len() == n;

    let mut rng = match opts.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };
    let mut v: Array1<f64> = Array1::from_iter((0..n).map(|_| rng.sample(StandardNormal)));
    let norm = l2(&v);
    if norm < NEAR_ZERO {
        return Ok(0.0);
    }
    v /= norm;

    let mut rho = 0.0_f64;
    for step in 0..opts.n_iter.max(1) {
        // One application of J (square) or JᵀJ (rectangular).
        let w = if square {
            map.jvp(x, v.view())
        } else {
            let jv = map.jvp(x, v.view());
            map.vjp(x, jv.view())
        };

        // Rayleigh quotient against the unit-norm v.
        let raw = v.dot(&w).abs();
        let estimate = if square { raw } else { raw.sqrt() };

        let converged = step > 0 && (estimate - rho).abs() < opts.tolerance;
        rho = estimate;

        let w_norm = l2(&w);
        if w_norm < NEAR_ZERO || converged {
            break;
        }
        v = w / w_norm;
    }

    Ok(rho)
}

/// Batch mode: one estimate per row of `points`, averaged arithmetically.
/// Rows are processed independently; a caller-supplied seed is varied per
/// row so batches are not trivially correlated.
pub fn estimate_spectral_radius_batch(
    map: &dyn DifferentiableMap,
    points: ArrayView2<'_, f64>,
    opts: &SpectralOptions,
) -> Result<f64, DomainError> {
    if points.nrows() == 0 {
        return Err(DomainError::SpectralInput(
            "batch estimation needs at least one probe point".to_string(),
        ));
    }

    let mut total = 0.0;
    for (i, row) in points.rows().into_iter().enumerate() {
        let row_opts = SpectralOptions {
            seed: opts.seed.map(|s| s.wrapping_add(i as u64)),
            ..*opts
        };
        total += estimate_spectral_radius(map, row, &row_opts)?;
    }
    Ok(total / points.nrows() as f64)
}

fn l2(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array2};

    /// Test double: the analytic linear map f(x) = A·x.
    struct Linear {
        a: Array2<f64>,
    }

    impl DifferentiableMap for Linear {
        fn input_dim(&self) -> usize {
            self.a.ncols()
        }
        fn apply(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
            self.a.dot(&x)
        }
        fn jvp(&self, _x: ArrayView1<'_, f64>, v: ArrayView1<'_, f64>) -> Array1<f64> {
            self.a.dot(&v)
        }
        fn vjp(&self, _x: ArrayView1<'_, f64>, u: ArrayView1<'_, f64>) -> Array1<f64> {
            self.a.t().dot(&u)
        }
    }

    fn opts_20(seed: u64) -> SpectralOptions {
        SpectralOptions {
            n_iter: 20,
            tolerance: DEFAULT_TOLERANCE,
            seed: Some(seed),
        }
    }

    #[test]
    fn test_known_spectral_radius_within_ten_percent() {
        // Eigenvalues of this matrix are 0.5 and 0.2.
        let map = Linear {
            a: arr2(&[[0.4, 0.2], [0.1, 0.3]]),
        };
        for seed in [1, 7, 42, 1337] {
            let rho =
                estimate_spectral_radius(&map, arr1(&[0.3, -0.8]).view(), &opts_20(seed)).unwrap();
            assert!(
                (rho - 0.5).abs() / 0.5 < 0.10,
                "seed {seed}: estimate {rho} not within 10% of 0.5"
            );
        }
    }

    #[test]
    fn test_diagonal_map_is_exact() {
        let map = Linear {
            a: arr2(&[[0.9, 0.0], [0.0, 0.3]]),
        };
        let rho = estimate_spectral_radius(&map, arr1(&[1.0, 1.0]).view(), &opts_20(3)).unwrap();
        assert!((rho - 0.9).abs() < 1e-3);
    }

    #[test]
    fn test_zero_map_estimates_zero() {
        let map = Linear {
            a: Array2::zeros((3, 3)),
        };
        let rho =
            estimate_spectral_radius(&map, arr1(&[1.0, 2.0, 3.0]).view(), &opts_20(5)).unwrap();
        assert!(rho.abs() < 1e-9);
    }

    #[test]
    fn test_rectangular_map_reports_singular_value() {
        // J = [[3, 0], [0, 0], [0, 4]]: singular values are 4 and 3.
        let map = Linear {
            a: arr2(&[[3.0, 0.0], [0.0, 0.0], [0.0, 4.0]]),
        };
        let rho = estimate_spectral_radius(&map, arr1(&[0.2, 0.7]).view(), &opts_20(11)).unwrap();
        assert!((rho - 4.0).abs() / 4.0 < 0.10, "estimate {rho}");
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let map = Linear {
            a: arr2(&[[0.4, 0.2], [0.1, 0.3]]),
        };
        let result = estimate_spectral_radius(&map, arr1(&[1.0, 2.0, 3.0]).view(), &opts_20(0));
        assert!(matches!(result, Err(DomainError::SpectralInput(_))));
    }

    #[test]
    fn test_batch_mode_averages_rows() {
        let map = Linear {
            a: arr2(&[[0.9, 0.0], [0.0, 0.3]]),
        };
        let points = arr2(&[[1.0, 1.0], [-2.0, 0.5], [0.1, 0.9]]);
        let rho = estimate_spectral_radius_batch(&map, points.view(), &opts_20(9)).unwrap();
        // Linear map: every row converges to the same dominant eigenvalue.
        assert!((rho - 0.9).abs() < 1e-2);
    }

    #[test]
    fn test_empty_batch_is_an_error() {
        let map = Linear {
            a: arr2(&[[0.5]]),
        };
        let points = Array2::zeros((0, 1));
        assert!(estimate_spectral_radius_batch(&map, points.view(), &opts_20(0)).is_err());
    }

    #[test]
    fn test_external_seed_is_deterministic() {
        let map = Linear {
            a: arr2(&[[0.4, 0.2], [0.1, 0.3]]),
        };
        let x = arr1(&[0.3, -0.8]);
        let a = estimate_spectral_radius(&map, x.view(), &opts_20(99)).unwrap();
        let b = estimate_spectral_radius(&map, x.view(), &opts_20(99)).unwrap();
        assert_eq!(a, b);
    }
}
