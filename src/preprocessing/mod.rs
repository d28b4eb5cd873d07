//! Data preprocessing module
//!
//! Pipeline steps that run before an estimator inside every fit:
//! - Missing value imputation
//! - Feature scaling (standard, min-max, robust)
//!
//! Steps are declared as [`PreprocessStep`] values and turned into fitted
//! [`FittedStep`]s on the training rows of a single fit, so no statistics
//! leak from held-out rows.

mod imputer;
mod scaler;

pub use imputer::{ImputeStrategy, Imputer};
pub use scaler::{Scaler, ScalerType};

use crate::error::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Declarative preprocessing step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PreprocessStep {
    Impute(ImputeStrategy),
    Scale(ScalerType),
}

impl PreprocessStep {
    /// Fit the step on `x` and return the fitted step with the transformed data
    pub fn fit_transform(&self, x: &Array2<f64>) -> Result<(FittedStep, Array2<f64>)> {
        match self {
            PreprocessStep::Impute(strategy) => {
                let mut imputer = Imputer::new(*strategy);
                let out = imputer.fit_transform(x)?;
                Ok((FittedStep::Imputer(imputer), out))
            }
            PreprocessStep::Scale(kind) => {
                let mut scaler = Scaler::new(*kind);
                let out = scaler.fit_transform(x)?;
                Ok((FittedStep::Scaler(scaler), out))
            }
        }
    }
}

/// A preprocessing step fitted on training rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FittedStep {
    Imputer(Imputer),
    Scaler(Scaler),
}

impl FittedStep {
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        match self {
            FittedStep::Imputer(imputer) => imputer.transform(x),
            FittedStep::Scaler(scaler) => scaler.transform(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_impute_then_scale() {
        let x = array![[1.0], [f64::NAN], [3.0]];
        let (imputer, imputed) = PreprocessStep::Impute(ImputeStrategy::Median)
            .fit_transform(&x)
            .unwrap();
        let (scaler, scaled) = PreprocessStep::Scale(ScalerType::Standard)
            .fit_transform(&imputed)
            .unwrap();
        assert_eq!(imputed[[1, 0]], 2.0);
        assert!(scaled[[1, 0]].abs() < 1e-12);

        let test = array![[f64::NAN]];
        let out = scaler.transform(&imputer.transform(&test).unwrap()).unwrap();
        assert!(out[[0, 0]].abs() < 1e-12);
    }
}
