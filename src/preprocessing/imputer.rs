//! Missing value imputation

use crate::error::{HarnessError, Result};
use crate::evaluation::metric::median_in_place;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Strategy used to fill `NaN` feature values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ImputeStrategy {
    Mean,
    Median,
    Constant(f64),
}

impl Default for ImputeStrategy {
    fn default() -> Self {
        ImputeStrategy::Median
    }
}

/// Column-wise imputer fitted on training rows only.
///
/// A column that is entirely missing in the training rows is filled with 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Imputer {
    strategy: ImputeStrategy,
    fill_values: Option<Array1<f64>>,
}

impl Imputer {
    pub fn new(strategy: ImputeStrategy) -> Self {
        Self {
            strategy,
            fill_values: None,
        }
    }

    pub fn strategy(&self) -> ImputeStrategy {
        self.strategy
    }

    /// Fill values learned by `fit`, one per column
    pub fn fill_values(&self) -> Option<&Array1<f64>> {
        self.fill_values.as_ref()
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        let fills = x
            .axis_iter(Axis(1))
            .map(|col| {
                let mut present: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
                if present.is_empty() {
                    return 0.0;
                }
                match self.strategy {
                    ImputeStrategy::Mean => present.iter().sum::<f64>() / present.len() as f64,
                    ImputeStrategy::Median => median_in_place(&mut present),
                    ImputeStrategy::Constant(v) => v,
                }
            })
            .collect::<Array1<f64>>();

        self.fill_values = Some(fills);
        Ok(self)
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let fills = self.fill_values.as_ref().ok_or(HarnessError::ModelNotFitted)?;
        if fills.len() != x.ncols() {
            return Err(HarnessError::ShapeError {
                expected: format!("{} columns", fills.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.clone();
        for (mut col, &fill) in out.axis_iter_mut(Axis(1)).zip(fills.iter()) {
            col.mapv_inplace(|v| if v.is_nan() { fill } else { v });
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }
}
