//! Model traits and shared input checks

use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2};

/// A regression estimator that can be fitted and asked for predictions.
///
/// Implementations are plain owned values; every fold fits a fresh one.
pub trait Regressor: Send + Sync {
    /// Fit on `x` (rows = samples) and `y`
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict one value per row of `x`
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn is_fitted(&self) -> bool;
}

/// Shape and finiteness checks shared by every estimator's `fit`
pub(crate) fn check_fit_inputs(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(HarnessError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(HarnessError::DataError("cannot fit on zero rows".to_string()));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(HarnessError::DataError(
            "feature matrix contains missing or non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Column count check shared by every estimator's `predict`
pub(crate) fn check_predict_inputs(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(HarnessError::ShapeError {
            expected: format!("{} features", n_features),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}
