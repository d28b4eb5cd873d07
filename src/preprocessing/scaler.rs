//! Feature scaling implementations

use crate::error::{HarnessError, Result};
use crate::evaluation::metric::median_in_place;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Type of scaler to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScalerType {
    /// Standard scaling (z-score normalization): (x - mean) / std
    #[default]
    Standard,
    /// Min-Max scaling: (x - min) / (max - min)
    MinMax,
    /// Robust scaling using median and IQR
    Robust,
}

/// Feature scaler over dense matrices. Expects no missing values, so it is
/// placed after an [`Imputer`](super::Imputer) in a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    scaler_type: ScalerType,
    center: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
}

impl Scaler {
    /// Create a new scaler
    pub fn new(scaler_type: ScalerType) -> Self {
        Self {
            scaler_type,
            center: None,
            scale: None,
        }
    }

    pub fn scaler_type(&self) -> ScalerType {
        self.scaler_type
    }

    /// Fit the scaler to the data
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 {
            return Err(HarnessError::DataError("cannot fit a scaler on zero rows".to_string()));
        }

        let (center, scale): (Vec<f64>, Vec<f64>) = x
            .axis_iter(Axis(1))
            .map(|col| {
                let (c, s) = match self.scaler_type {
                    ScalerType::Standard => {
                        let n = col.len() as f64;
                        let mean = col.sum() / n;
                        // population std
                        let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                        (mean, var.sqrt())
                    }
                    ScalerType::MinMax => {
                        let min = col.iter().copied().fold(f64::INFINITY, f64::min);
                        let max = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                        (min, max - min)
                    }
                    ScalerType::Robust => {
                        let mut values = col.to_vec();
                        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                        let q1 = quantile_sorted(&values, 0.25);
                        let q3 = quantile_sorted(&values, 0.75);
                        (median_in_place(&mut values), q3 - q1)
                    }
                };
                let s = if s == 0.0 || !s.is_finite() { 1.0 } else { s };
                (c, s)
            })
            .unzip();

        self.center = Some(Array1::from(center));
        self.scale = Some(Array1::from(scale));
        Ok(self)
    }

    /// Transform the data
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (center, scale) = match (&self.center, &self.scale) {
            (Some(c), Some(s)) => (c, s),
            _ => return Err(HarnessError::ModelNotFitted),
        };
        if center.len() != x.ncols() {
            return Err(HarnessError::ShapeError {
                expected: format!("{} columns", center.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        Ok((x - &center.view().insert_axis(Axis(0))) / &scale.view().insert_axis(Axis(0)))
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }
}

/// Linear-interpolated quantile of an ascending slice
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_standard_scaler() {
        let x = array![[1.0, 10.0], [2.0, 10.0], [3.0, 10.0]];
        let mut scaler = Scaler::new(ScalerType::Standard);
        let out = scaler.fit_transform(&x).unwrap();

        let mean: f64 = out.column(0).sum() / 3.0;
        assert!(mean.abs() < 1e-12);
        let var: f64 = out.column(0).iter().map(|v| v * v).sum::<f64>() / 3.0;
        assert!((var - 1.0).abs() < 1e-12);
        // constant column is centered, not divided by zero
        assert!(out.column(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_min_max_scaler() {
        let x = array![[0.0], [5.0], [10.0]];
        let mut scaler = Scaler::new(ScalerType::MinMax);
        let out = scaler.fit_transform(&x).unwrap();
        assert_eq!(out, array![[0.0], [0.5], [1.0]]);
    }

    #[test]
    fn test_robust_scaler() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let mut scaler = Scaler::new(ScalerType::Robust);
        let out = scaler.fit_transform(&x).unwrap();
        assert_eq!(out[[2, 0]], 0.0);
        assert_eq!(out[[4, 0]], 1.0);
    }

    #[test]
    fn test_column_mismatch() {
        let mut scaler = Scaler::new(ScalerType::Standard);
        scaler.fit(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        assert!(scaler.transform(&array![[1.0]]).is_err());
    }
}
