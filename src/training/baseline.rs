//! Trivial baseline regressor

use super::models::{check_fit_inputs, Regressor};
use crate::error::{HarnessError, Result};
use crate::evaluation::metric::median_in_place;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Statistic predicted by [`ConstantRegressor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConstantStrategy {
    #[default]
    Mean,
    Median,
}

impl ConstantStrategy {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "mean" => Ok(ConstantStrategy::Mean),
            "median" => Ok(ConstantStrategy::Median),
            other => Err(HarnessError::InvalidParameter {
                name: "strategy".to_string(),
                value: other.to_string(),
                reason: "expected 'mean' or 'median'".to_string(),
            }),
        }
    }
}

/// Predicts one training-set statistic for every row, ignoring features
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConstantRegressor {
    pub strategy: ConstantStrategy,
    pub constant: Option<f64>,
}

impl ConstantRegressor {
    pub fn new(strategy: ConstantStrategy) -> Self {
        Self { strategy, constant: None }
    }
}

impl Regressor for ConstantRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        // features are never read, so missing values in `x` are fine
        check_fit_inputs(&Array2::zeros((x.nrows(), 0)), y)?;
        let value = match self.strategy {
            ConstantStrategy::Mean => y.sum() / y.len() as f64,
            ConstantStrategy::Median => median_in_place(&mut y.to_vec()),
        };
        self.constant = Some(value);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let c = self.constant.ok_or(HarnessError::ModelNotFitted)?;
        Ok(Array1::from_elem(x.nrows(), c))
    }

    fn is_fitted(&self) -> bool {
        self.constant.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mean_and_median() {
        let x = Array2::zeros((4, 1));
        let y = array![1.0, 2.0, 3.0, 10.0];

        let mut mean = ConstantRegressor::new(ConstantStrategy::Mean);
        mean.fit(&x, &y).unwrap();
        assert_eq!(mean.predict(&Array2::zeros((2, 1))).unwrap(), array![4.0, 4.0]);

        let mut median = ConstantRegressor::new(ConstantStrategy::Median);
        median.fit(&x, &y).unwrap();
        assert_eq!(median.predict(&x).unwrap()[0], 2.5);
    }

    #[test]
    fn test_ignores_missing_features() {
        let x = array![[f64::NAN], [f64::NAN]];
        let mut model = ConstantRegressor::default();
        model.fit(&x, &array![1.0, 3.0]).unwrap();
        assert_eq!(model.predict(&x).unwrap(), array![2.0, 2.0]);
    }

    #[test]
    fn test_empty_fit_fails() {
        let mut model = ConstantRegressor::default();
        assert!(model.fit(&Array2::zeros((0, 1)), &Array1::zeros(0)).is_err());
        assert!(!model.is_fitted());
    }
}
