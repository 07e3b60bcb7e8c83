// raft-core/src/infrastructure/model.rs

use crate::domain::spectral::{estimate_spectral_radius, SpectralOptions};
use crate::infrastructure::error::InfrastructureError;
use crate::ports::model::DifferentiableMap;
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Serialized model parameters, hot-swappable through the operator
/// interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelWeights {
    Matrix {
        data: Vec<Vec<f64>>,
    },
    Mlp {
        w1: Vec<Vec<f64>>,
        b1: Vec<f64>,
        w2: Vec<Vec<f64>>,
        b2: Vec<f64>,
    },
}

/// Load a model handle from a weights file (JSON).
pub fn load_model(path: &Path) -> Result<Arc<dyn DifferentiableMap>, InfrastructureError> {
    let text = fs::read_to_string(path)?;
    let weights: ModelWeights = serde_json::from_str(&text)
        .map_err(|e| InfrastructureError::ModelLoad(format!("{}: {e}", path.display())))?;
    let model: Arc<dyn DifferentiableMap> = match weights {
        ModelWeights::Matrix { data } => Arc::new(MatrixModel::from_rows(&data)?),
        ModelWeights::Mlp { w1, b1, w2, b2 } => Arc::new(MlpModel::from_parts(w1, b1, w2, b2)?),
    };
    info!(path = %path.display(), dim = model.input_dim(), "model weights loaded");
    Ok(model)
}

// ---------------------------------------------------------------------
// Analytic matrix model: f(x) = A·x, Jacobian constant.
// ---------------------------------------------------------------------

pub struct MatrixModel {
    a: Array2<f64>,
}

impl MatrixModel {
    pub fn new(a: Array2<f64>) -> Self {
        Self { a }
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, InfrastructureError> {
        let nrows = rows.len();
        let ncols = rows.first().map(Vec::len).unwrap_or(0);
        if nrows == 0 || ncols == 0 || rows.iter().any(|r| r.len() != ncols) {
            return Err(InfrastructureError::ModelLoad(
                "matrix weights must be rectangular and non-empty".to_string(),
            ));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let a = Array2::from_shape_vec((nrows, ncols), flat)
            .map_err(|e| InfrastructureError::ModelLoad(e.to_string()))?;
        Ok(Self { a })
    }

    /// Random square model rescaled to a prescribed spectral radius;
    /// the bring-up model and test fixture.
    pub fn with_spectral_radius(dim: usize, target_rho: f64, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let a = Array2::from_shape_fn((dim, dim), |_| rng.sample::<f64, _>(StandardNormal));
        let mut model = Self { a };

        let probe = Array1::from_elem(dim, 1.0);
        let opts = SpectralOptions {
            n_iter: 50,
            seed: Some(seed),
            ..Default::default()
        };
        // A linear map's spectral radius scales linearly with its matrix.
        if let Ok(rho) = estimate_spectral_radius(&model, probe.view(), &opts) {
            if rho > 1e-9 {
                model.a *= target_rho / rho;
            }
        }
        model
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.a
    }
}

impl DifferentiableMap for MatrixModel {
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

// ---------------------------------------------------------------------
// Learned network: one tanh hidden layer, hand-derived products.
// ---------------------------------------------------------------------

pub struct MlpModel {
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
}

impl MlpModel {
    pub fn from_parts(
        w1: Vec<Vec<f64>>,
        b1: Vec<f64>,
        w2: Vec<Vec<f64>>,
        b2: Vec<f64>,
    ) -> Result<Self, InfrastructureError> {
        let w1 = MatrixModel::from_rows(&w1)?.a;
        let w2 = MatrixModel::from_rows(&w2)?.a;
        if b1.len() != w1.nrows() || w2.ncols() != w1.nrows() || b2.len() != w2.nrows() {
            return Err(InfrastructureError::ModelLoad(
                "mlp weights have inconsistent shapes".to_string(),
            ));
        }
        Ok(Self {
            w1,
            b1: Array1::from_vec(b1),
            w2,
            b2: Array1::from_vec(b2),
        })
    }

    /// Small-uniform initialization keeps the spectral radius manageable.
    pub fn random(in_dim: usize, hidden_dim: usize, out_dim: usize, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut draw = |_: (usize, usize)| rng.gen_range(-0.1..0.1);
        Self {
            w1: Array2::from_shape_fn((hidden_dim, in_dim), &mut draw),
            b1: Array1::zeros(hidden_dim),
            w2: Array2::from_shape_fn((out_dim, hidden_dim), &mut draw),
            b2: Array1::zeros(out_dim),
        }
    }

    /// Hidden pre-activation derivative at `x`: 1 − tanh²(W₁x + b₁).
    fn hidden_gain(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let z1 = (self.w1.dot(&x) + &self.b1).mapv(f64::tanh);
        z1.mapv(|z| 1.0 - z * z)
    }
}

impl DifferentiableMap for MlpModel {
    fn input_dim(&self) -> usize {
        self.w1.ncols()
    }

    fn apply(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let z1 = (self.w1.dot(&x) + &self.b1).mapv(f64::tanh);
        self.w2.dot(&z1) + &self.b2
    }

    fn jvp(&self, x: ArrayView1<'_, f64>, v: ArrayView1<'_, f64>) -> Array1<f64> {
        let gain = self.hidden_gain(x);
        self.w2.dot(&(gain * self.w1.dot(&v)))
    }

    fn vjp(&self, x: ArrayView1<'_, f64>, u: ArrayView1<'_, f64>) -> Array1<f64> {
        let gain = self.hidden_gain(x);
        self.w1.t().dot(&(gain * self.w2.t().dot(&u)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ndarray::arr1;

    #[test]
    fn test_matrix_model_rescales_to_target_radius() {
        let model = MatrixModel::with_spectral_radius(4, 0.5, 7);
        let probe = arr1(&[0.2, -0.4, 0.9, 0.1]);
        let opts = SpectralOptions {
            n_iter: 50,
            seed: Some(3),
            ..Default::default()
        };
        let rho = estimate_spectral_radius(&model, probe.view(), &opts).unwrap();
        assert!((rho - 0.5).abs() < 0.05, "estimate {rho}");
    }

    #[test]
    fn test_ragged_matrix_rejected() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(MatrixModel::from_rows(&rows).is_err());
    }

    #[test]
    fn test_mlp_jvp_matches_finite_difference() {
        let model = MlpModel::random(3, 8, 3, 42);
        let x = arr1(&[0.3, -0.2, 0.5]);
        let v = arr1(&[1.0, 0.5, -0.7]);

        let analytic = model.jvp(x.view(), v.view());

        let eps = 1e-6;
        let plus = model.apply((&x + &(&v * eps)).view());
        let minus = model.apply((&x - &(&v * eps)).view());
        let numeric = (plus - minus) / (2.0 * eps);

        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert!((a - n).abs() < 1e-5, "jvp {a} vs fd {n}");
        }
    }

    #[test]
    fn test_mlp_vjp_is_adjoint_of_jvp() {
        let model = MlpModel::random(4, 6, 2, 9);
        let x = arr1(&[0.1, 0.2, -0.3, 0.4]);
        let v = arr1(&[0.5, -0.5, 0.25, 1.0]);
        let u = arr1(&[0.7, -0.2]);

        // <J v, u> == <v, Jᵀ u>
        let lhs = model.jvp(x.view(), v.view()).dot(&u);
        let rhs = v.dot(&model.vjp(x.view(), u.view()));
        assert!((lhs - rhs).abs() < 1e-10);
    }

    #[test]
    fn test_weights_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        let weights = ModelWeights::Matrix {
            data: vec![vec![0.4, 0.2], vec![0.1, 0.3]],
        };
        fs::write(&path, serde_json::to_string(&weights).unwrap()).unwrap();

        let model = load_model(&path).unwrap();
        assert_eq!(model.input_dim(), 2);
        let y = model.apply(arr1(&[1.0, 0.0]).view());
        assert!((y[0] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_inconsistent_mlp_shapes_rejected() {
        let result = MlpModel::from_parts(
            vec![vec![0.1, 0.2]],          // 1x2
            vec![0.0, 0.0],                // wrong: b1 len 2, hidden is 1
            vec![vec![0.3]],               // 1x1
            vec![0.0],
        );
        assert!(result.is_err());
    }
}
