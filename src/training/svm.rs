//! Epsilon-insensitive support vector regression
//!
//! The dual is solved by coordinate descent with the bias folded into the
//! kernel (`K + 1`), which removes the equality constraint of the standard
//! formulation. Each dual variable `beta_i` stays in `[-C, C]`.

use super::models::{check_fit_inputs, check_predict_inputs, Regressor};
use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training returns an error to prevent OOM.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Dual coefficients smaller than this are not kept as support vectors
const SUPPORT_THRESHOLD: f64 = 1e-12;

/// Kernel function type
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum KernelType {
    /// Linear kernel: K(x, y) = x · y
    Linear,
    /// Radial Basis Function (Gaussian): K(x, y) = exp(-γ * ||x - y||²)
    #[default]
    RBF,
}

/// SVR configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    pub kernel: KernelType,
    /// Kernel coefficient; `None` uses `1 / (n_features * Var(X))`
    pub gamma: Option<f64>,
    /// Width of the insensitive tube
    pub epsilon: f64,
    /// Stop when no dual variable moves more than this in a sweep
    pub tol: f64,
    /// Maximum number of sweeps over the training rows
    pub max_iter: usize,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::RBF,
            gamma: None,
            epsilon: 0.1,
            tol: 1e-3,
            max_iter: 10_000,
        }
    }
}

impl SVMConfig {
    fn validate(&self) -> Result<()> {
        let check = |name: &str, value: f64, ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(HarnessError::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                    reason: "out of range".to_string(),
                })
            }
        };
        check("c", self.c, self.c.is_finite() && self.c > 0.0)?;
        check("epsilon", self.epsilon, self.epsilon.is_finite() && self.epsilon >= 0.0)?;
        if let Some(g) = self.gamma {
            check("gamma", g, g.is_finite() && g > 0.0)?;
        }
        Ok(())
    }
}

/// Support vector regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMRegressor {
    config: SVMConfig,
    support_vectors: Option<Array2<f64>>,
    /// Dual coefficients of the support vectors
    dual_coef: Option<Array1<f64>>,
    bias: f64,
    /// Resolved kernel coefficient
    gamma: f64,
    n_features: usize,
}

impl SVMRegressor {
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            support_vectors: None,
            dual_coef: None,
            bias: 0.0,
            gamma: 1.0,
            n_features: 0,
        }
    }

    pub fn config(&self) -> &SVMConfig {
        &self.config
    }

    pub fn n_support(&self) -> usize {
        self.dual_coef.as_ref().map_or(0, |d| d.len())
    }

    fn kernel(&self, x1: ArrayView1<f64>, x2: ArrayView1<f64>) -> f64 {
        kernel_value(&self.config.kernel, self.gamma, x1, x2)
    }

    fn compute_kernel_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        let n = x.nrows();
        let kernel = self.config.kernel.clone();
        let gamma = self.gamma;

        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| (0..n).map(|j| kernel_value(&kernel, gamma, x.row(i), x.row(j))).collect())
            .collect();

        let mut k = Array2::zeros((n, n));
        for (i, row) in rows.into_iter().enumerate() {
            for (j, v) in row.into_iter().enumerate() {
                k[[i, j]] = v;
            }
        }
        k
    }
}

fn kernel_value(kernel: &KernelType, gamma: f64, x1: ArrayView1<f64>, x2: ArrayView1<f64>) -> f64 {
    match kernel {
        KernelType::Linear => x1.dot(&x2),
        KernelType::RBF => {
            let norm_sq: f64 = x1.iter().zip(x2.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
            (-gamma * norm_sq).exp()
        }
    }
}

/// `1 / (n_features * Var(X))` over all entries, 1.0 for constant data
fn scale_gamma(x: &Array2<f64>) -> f64 {
    let n = x.len() as f64;
    let mean = x.sum() / n;
    let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    if var > 0.0 {
        1.0 / (x.ncols() as f64 * var)
    } else {
        1.0
    }
}

impl Regressor for SVMRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_inputs(x, y)?;
        self.config.validate()?;

        let n = x.nrows();
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(HarnessError::DataError(format!(
                "{} samples exceed the maximum {} for the SVR kernel matrix",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }

        self.gamma = self.config.gamma.unwrap_or_else(|| scale_gamma(x));
        self.n_features = x.ncols();

        // bias folded into the kernel
        let k = self.compute_kernel_matrix(x) + 1.0;
        let c = self.config.c;
        let eps = self.config.epsilon;

        let mut beta = Array1::<f64>::zeros(n);
        // f = K' beta
        let mut f = Array1::<f64>::zeros(n);
        let mut converged = false;

        for sweep in 0..self.config.max_iter {
            let mut max_change: f64 = 0.0;
            for i in 0..n {
                let q = k[[i, i]];
                if q <= 0.0 {
                    continue;
                }
                let z = q * beta[i] - f[i] + y[i];
                let updated = if z > eps {
                    (z - eps) / q
                } else if z < -eps {
                    (z + eps) / q
                } else {
                    0.0
                };
                let updated = updated.clamp(-c, c);
                let delta = updated - beta[i];
                if delta != 0.0 {
                    f.scaled_add(delta, &k.column(i));
                    beta[i] = updated;
                    max_change = max_change.max(delta.abs());
                }
            }
            if max_change < self.config.tol {
                debug!(sweeps = sweep + 1, "svr converged");
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(HarnessError::ConvergenceError {
                iterations: self.config.max_iter,
            });
        }

        let support: Vec<usize> = (0..n).filter(|&i| beta[i].abs() > SUPPORT_THRESHOLD).collect();
        self.bias = beta.sum();
        self.support_vectors = Some(x.select(Axis(0), &support));
        self.dual_coef = Some(beta.select(Axis(0), &support));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (sv, coef) = match (&self.support_vectors, &self.dual_coef) {
            (Some(sv), Some(coef)) => (sv, coef),
            _ => return Err(HarnessError::ModelNotFitted),
        };
        check_predict_inputs(x, self.n_features)?;

        let preds: Vec<f64> = x
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|row| {
                sv.axis_iter(Axis(0))
                    .zip(coef.iter())
                    .map(|(s, b)| b * self.kernel(s, row))
                    .sum::<f64>()
                    + self.bias
            })
            .collect();
        Ok(Array1::from(preds))
    }

    fn is_fitted(&self) -> bool {
        self.dual_coef.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_linear_svr_fits_line() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64 / 10.0);
        let y = x.column(0).mapv(|v| 2.0 * v + 1.0);

        let mut model = SVMRegressor::new(SVMConfig {
            c: 100.0,
            kernel: KernelType::Linear,
            epsilon: 0.01,
            max_iter: 200_000,
            ..SVMConfig::default()
        });
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        let mae = (&pred - &y).mapv(f64::abs).mean().unwrap();
        assert!(mae < 0.25, "linear SVR MAE = {}", mae);
    }

    #[test]
    fn test_rbf_svr_fits_curve() {
        let x = Array2::from_shape_fn((40, 1), |(i, _)| i as f64 / 8.0);
        let y = x.column(0).mapv(f64::sin);

        let mut model = SVMRegressor::new(SVMConfig {
            c: 10.0,
            epsilon: 0.05,
            gamma: Some(1.0),
            max_iter: 200_000,
            ..SVMConfig::default()
        });
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        let mae = (&pred - &y).mapv(f64::abs).mean().unwrap();
        assert!(mae < 0.15, "RBF SVR MAE = {}", mae);
    }

    #[test]
    fn test_wide_tube_predicts_constant() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 0.1, 0.2];
        let mut model = SVMRegressor::new(SVMConfig {
            epsilon: 10.0,
            ..SVMConfig::default()
        });
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_support(), 0);
        assert_eq!(model.predict(&x).unwrap(), array![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sweep_limit_is_a_convergence_error() {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| ((i * 3 + j * 5) % 13) as f64);
        let y = x.map_axis(Axis(1), |r| r[0] - 0.5 * r[1]);
        let mut model = SVMRegressor::new(SVMConfig {
            c: 10.0,
            epsilon: 0.01,
            max_iter: 1,
            ..SVMConfig::default()
        });
        assert!(matches!(
            model.fit(&x, &y),
            Err(HarnessError::ConvergenceError { iterations: 1 })
        ));
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_invalid_c() {
        let mut model = SVMRegressor::new(SVMConfig { c: 0.0, ..SVMConfig::default() });
        assert!(matches!(
            model.fit(&array![[1.0]], &array![1.0]),
            Err(HarnessError::InvalidParameter { .. })
        ));
    }
}
