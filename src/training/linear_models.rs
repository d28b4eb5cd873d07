//! Regularized linear models

use super::models::{check_fit_inputs, check_predict_inputs, Regressor};
use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve the symmetric positive-definite system `Ax = b` by Cholesky
/// decomposition. Returns `None` if `A` is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    // A = L * L^T
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L * y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Center columns of `x` and `y`, returning the means
fn center(x: &Array2<f64>, y: &Array1<f64>) -> (Array2<f64>, Array1<f64>, Array1<f64>, f64) {
    let x_mean = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()));
    let y_mean = y.mean().unwrap_or(0.0);
    let x_c = x - &x_mean.view().insert_axis(Axis(0));
    let y_c = y - y_mean;
    (x_c, y_c, x_mean, y_mean)
}

fn soft_threshold(val: f64, threshold: f64) -> f64 {
    if val > threshold {
        val - threshold
    } else if val < -threshold {
        val + threshold
    } else {
        0.0
    }
}

/// Ridge regression: least squares with an L2 penalty `alpha * ||w||^2`.
/// The intercept is not penalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    pub fit_intercept: bool,
    pub alpha: f64,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            alpha,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }
}

impl Regressor for RidgeRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_inputs(x, y)?;
        if !(self.alpha >= 0.0 && self.alpha.is_finite()) {
            return Err(HarnessError::InvalidParameter {
                name: "alpha".to_string(),
                value: self.alpha.to_string(),
                reason: "must be a finite non-negative number".to_string(),
            });
        }

        let (x_c, y_c, x_mean, y_mean) = if self.fit_intercept {
            center(x, y)
        } else {
            (x.clone(), y.clone(), Array1::zeros(x.ncols()), 0.0)
        };

        // (X^T X + alpha * I) w = X^T y
        let mut xtx = x_c.t().dot(&x_c);
        xtx.diag_mut().mapv_inplace(|d| d + self.alpha);
        let xty = x_c.t().dot(&y_c);

        let coefficients = cholesky_solve(&xtx, &xty).ok_or_else(|| {
            HarnessError::ComputationError("Singular matrix in ridge normal equations".to_string())
        })?;

        self.intercept = Some(y_mean - coefficients.dot(&x_mean));
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(HarnessError::ModelNotFitted)?;
        check_predict_inputs(x, coefficients.len())?;
        Ok(x.dot(coefficients) + self.intercept.unwrap_or(0.0))
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }
}

/// Elastic net fitted by cyclic coordinate descent.
///
/// Minimizes `1/(2n) ||y - Xw||^2 + alpha * l1_ratio * ||w||_1
/// + alpha * (1 - l1_ratio) / 2 * ||w||^2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticNetRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    pub fit_intercept: bool,
    /// Overall regularization strength
    pub alpha: f64,
    /// L1 ratio (0.0 = pure L2/Ridge, 1.0 = pure L1/Lasso)
    pub l1_ratio: f64,
    pub max_iter: usize,
    pub tol: f64,
    /// Sweeps used by the last fit
    pub n_iter: usize,
}

impl Default for ElasticNetRegression {
    fn default() -> Self {
        Self::new(1.0, 0.5)
    }
}

impl ElasticNetRegression {
    pub fn new(alpha: f64, l1_ratio: f64) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            alpha,
            l1_ratio: l1_ratio.clamp(0.0, 1.0),
            max_iter: 5000,
            tol: 1e-4,
            n_iter: 0,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_l1_ratio(mut self, l1_ratio: f64) -> Self {
        self.l1_ratio = l1_ratio.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }
}

impl Regressor for ElasticNetRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_inputs(x, y)?;
        if !(self.alpha >= 0.0 && self.alpha.is_finite()) {
            return Err(HarnessError::InvalidParameter {
                name: "alpha".to_string(),
                value: self.alpha.to_string(),
                reason: "must be a finite non-negative number".to_string(),
            });
        }

        let n_features = x.ncols();
        let (x_c, y_c, x_mean, y_mean) = if self.fit_intercept {
            center(x, y)
        } else {
            (x.clone(), y.clone(), Array1::zeros(n_features), 0.0)
        };

        let col_norms: Vec<f64> = x_c
            .axis_iter(Axis(1))
            .map(|c| c.dot(&c))
            .collect();

        let n = x.nrows() as f64;
        let l1_penalty = self.alpha * self.l1_ratio * n;
        let l2_penalty = self.alpha * (1.0 - self.l1_ratio) * n;

        let mut w = Array1::<f64>::zeros(n_features);
        let mut r = y_c.clone();
        let mut converged = n_features == 0;

        for iter in 0..self.max_iter {
            let mut max_change: f64 = 0.0;
            let mut max_weight: f64 = 0.0;

            for j in 0..n_features {
                let denom = col_norms[j] + l2_penalty;
                if denom < 1e-15 {
                    w[j] = 0.0;
                    continue;
                }
                let col = x_c.column(j);
                let rho = col.dot(&r) + col_norms[j] * w[j];
                let old = w[j];
                w[j] = soft_threshold(rho, l1_penalty) / denom;

                let delta = old - w[j];
                if delta != 0.0 {
                    r.scaled_add(delta, &col);
                }
                max_change = max_change.max(delta.abs());
                max_weight = max_weight.max(w[j].abs());
            }

            self.n_iter = iter + 1;
            if max_weight == 0.0 || max_change <= self.tol * max_weight {
                converged = true;
                break;
            }
        }

        if !converged {
            return Err(HarnessError::ConvergenceError {
                iterations: self.max_iter,
            });
        }

        self.intercept = Some(y_mean - w.dot(&x_mean));
        self.coefficients = Some(w);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(HarnessError::ModelNotFitted)?;
        check_predict_inputs(x, coefficients.len())?;
        Ok(x.dot(coefficients) + self.intercept.unwrap_or(0.0))
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }
}
