//! Error metrics and the learning task they belong to

use crate::error::{HarnessError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Learning task selecting loss/metric semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LearningTask {
    #[default]
    Regression,
}

/// Regression error metric
///
/// [`Metric::error`] returns the natural, positive magnitude that ends up in
/// the results table. [`Metric::score`] returns its negation so that
/// maximizing searches can treat "larger is better" uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Metric {
    #[default]
    MeanAbsoluteError,
    MedianAbsoluteError,
    MeanSquaredError,
    RootMeanSquaredError,
}

impl Metric {
    /// Parse a metric from its short or long name
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "mae" | "mean_absolute_error" | "l1" => Ok(Metric::MeanAbsoluteError),
            "medae" | "median_absolute_error" => Ok(Metric::MedianAbsoluteError),
            "mse" | "mean_squared_error" | "l2" => Ok(Metric::MeanSquaredError),
            "rmse" | "root_mean_squared_error" => Ok(Metric::RootMeanSquaredError),
            other => Err(HarnessError::ConfigError(format!(
                "unknown error metric '{}'",
                other
            ))),
        }
    }

    /// Human readable name used in reports
    pub fn display_name(&self) -> &'static str {
        match self {
            Metric::MeanAbsoluteError => "Mean Absolute Error",
            Metric::MedianAbsoluteError => "Median Absolute Error",
            Metric::MeanSquaredError => "Mean Squared Error",
            Metric::RootMeanSquaredError => "Root Mean Squared Error",
        }
    }

    /// Error magnitude (lower is better, always >= 0)
    pub fn error(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        if y_true.len() != y_pred.len() {
            return Err(HarnessError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(HarnessError::DataError(
                "cannot score an empty prediction set".to_string(),
            ));
        }

        let n = y_true.len() as f64;
        let residuals = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p);

        let value = match self {
            Metric::MeanAbsoluteError => residuals.map(f64::abs).sum::<f64>() / n,
            Metric::MedianAbsoluteError => {
                let mut abs: Vec<f64> = residuals.map(f64::abs).collect();
                median_in_place(&mut abs)
            }
            Metric::MeanSquaredError => residuals.map(|r| r * r).sum::<f64>() / n,
            Metric::RootMeanSquaredError => (residuals.map(|r| r * r).sum::<f64>() / n).sqrt(),
        };

        if !value.is_finite() {
            return Err(HarnessError::ComputationError(format!(
                "{} is not finite",
                self.display_name()
            )));
        }
        Ok(value)
    }

    /// Negated error: larger is better
    pub fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        self.error(y_true, y_pred).map(|e| -e)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Median of a slice; reorders the slice. Returns NaN for an empty slice.
pub(crate) fn median_in_place(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_mean_absolute_error() {
        let y_true = array![1.0, 2.0, 3.0, 4.0];
        let y_pred = array![1.5, 2.0, 2.0, 4.0];
        let mae = Metric::MeanAbsoluteError.error(&y_true, &y_pred).unwrap();
        assert!((mae - 0.375).abs() < 1e-12);
    }

    #[test]
    fn test_score_is_negated_error() {
        let y_true = array![1.0, 2.0, 3.0];
        let y_pred = array![2.0, 2.0, 2.0];
        for metric in [
            Metric::MeanAbsoluteError,
            Metric::MedianAbsoluteError,
            Metric::MeanSquaredError,
            Metric::RootMeanSquaredError,
        ] {
            let e = metric.error(&y_true, &y_pred).unwrap();
            let s = metric.score(&y_true, &y_pred).unwrap();
            assert!(e >= 0.0);
            assert_eq!(s, -e);
        }
    }

    #[test]
    fn test_median_absolute_error() {
        let y_true = array![0.0, 0.0, 0.0, 0.0];
        let y_pred = array![1.0, 3.0, 2.0, 10.0];
        let medae = Metric::MedianAbsoluteError.error(&y_true, &y_pred).unwrap();
        assert!((medae - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_length_mismatch() {
        let err = Metric::MeanAbsoluteError
            .error(&array![1.0, 2.0], &array![1.0])
            .unwrap_err();
        assert!(matches!(err, HarnessError::ShapeError { .. }));
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Metric::from_name("mae").unwrap(), Metric::MeanAbsoluteError);
        assert_eq!(
            Metric::from_name("mean_absolute_error").unwrap(),
            Metric::MeanAbsoluteError
        );
        assert_eq!(Metric::from_name("RMSE").unwrap(), Metric::RootMeanSquaredError);
        assert!(Metric::from_name("accuracy").is_err());
    }
}
