//! In-memory dataset consumed by the harness

use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Feature matrix, response vector and optional per-row group ids.
///
/// Rows are samples, columns are covariates. Missing feature values are
/// `NaN`; labels must be finite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    x: Array2<f64>,
    y: Array1<f64>,
    feature_names: Vec<String>,
    groups: Option<Array1<i64>>,
}

impl Dataset {
    /// Create a dataset with generated feature names (`x0`, `x1`, ...)
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        let names = (0..x.ncols()).map(|i| format!("x{}", i)).collect();
        Self::with_feature_names(x, y, names)
    }

    /// Create a dataset with explicit covariate names
    pub fn with_feature_names(
        x: Array2<f64>,
        y: Array1<f64>,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(HarnessError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }
        if feature_names.len() != x.ncols() {
            return Err(HarnessError::ShapeError {
                expected: format!("{} feature names", x.ncols()),
                actual: format!("{} feature names", feature_names.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(HarnessError::DataError("dataset has no rows".to_string()));
        }
        if let Some(pos) = y.iter().position(|v| !v.is_finite()) {
            return Err(HarnessError::DataError(format!(
                "label at row {} is not a finite number",
                pos
            )));
        }

        Ok(Self {
            x,
            y,
            feature_names,
            groups: None,
        })
    }

    /// Attach per-row group ids
    pub fn with_groups(mut self, groups: Array1<i64>) -> Result<Self> {
        if groups.len() != self.n_samples() {
            return Err(HarnessError::ShapeError {
                expected: format!("{} group ids", self.n_samples()),
                actual: format!("{} group ids", groups.len()),
            });
        }
        self.groups = Some(groups);
        Ok(self)
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn groups(&self) -> Option<&Array1<i64>> {
        self.groups.as_ref()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Number of distinct groups, or the row count when ungrouped
    pub fn n_units(&self) -> usize {
        match &self.groups {
            Some(g) => g.iter().collect::<BTreeSet<_>>().len(),
            None => self.n_samples(),
        }
    }

    /// Copy out the given rows as owned arrays
    pub fn select_rows(&self, indices: &[usize]) -> (Array2<f64>, Array1<f64>, Option<Array1<i64>>) {
        let x = self.x.select(Axis(0), indices);
        let y = self.y.select(Axis(0), indices);
        let groups = self.groups.as_ref().map(|g| g.select(Axis(0), indices));
        (x, y, groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_dataset_shape_checks() {
        let x = Array2::<f64>::zeros((4, 2));
        assert!(Dataset::new(x.clone(), array![1.0, 2.0, 3.0, 4.0]).is_ok());
        assert!(matches!(
            Dataset::new(x.clone(), array![1.0, 2.0]),
            Err(HarnessError::ShapeError { .. })
        ));
        let ds = Dataset::new(x, array![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!(ds.with_groups(array![1, 2]).is_err());
    }

    #[test]
    fn test_non_finite_label_rejected() {
        let x = Array2::<f64>::zeros((2, 1));
        let err = Dataset::new(x, array![1.0, f64::NAN]).unwrap_err();
        assert!(matches!(err, HarnessError::DataError(_)));
    }

    #[test]
    fn test_select_rows_and_units() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let ds = Dataset::new(x, array![10.0, 20.0, 30.0, 40.0])
            .unwrap()
            .with_groups(array![7, 7, 8, 9])
            .unwrap();
        assert_eq!(ds.n_units(), 3);
        let (x, y, g) = ds.select_rows(&[3, 0]);
        assert_eq!(x, array![[4.0], [1.0]]);
        assert_eq!(y, array![40.0, 10.0]);
        assert_eq!(g.unwrap(), array![9, 7]);
    }
}
