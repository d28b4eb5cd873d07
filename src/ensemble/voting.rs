//! Weighted averaging of member predictions

use crate::error::{HarnessError, Result};
use crate::training::FittedPipeline;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Weighted mean of equally long prediction vectors. Weights are normalized
/// to sum to one; `None` means equal weights.
pub fn weighted_average(predictions: &[Array1<f64>], weights: Option<&[f64]>) -> Result<Array1<f64>> {
    if predictions.is_empty() {
        return Err(HarnessError::ConfigError("No predictions provided".to_string()));
    }

    let n_samples = predictions[0].len();
    let n_models = predictions.len();
    if let Some(p) = predictions.iter().find(|p| p.len() != n_samples) {
        return Err(HarnessError::ShapeError {
            expected: format!("{} predictions", n_samples),
            actual: format!("{} predictions", p.len()),
        });
    }

    let weights: Vec<f64> = weights
        .map(|w| w.to_vec())
        .unwrap_or_else(|| vec![1.0; n_models]);
    if weights.len() != n_models {
        return Err(HarnessError::ShapeError {
            expected: format!("{} weights", n_models),
            actual: format!("{} weights", weights.len()),
        });
    }
    let weight_sum: f64 = weights.iter().sum();
    if !(weight_sum > 0.0 && weight_sum.is_finite()) || weights.iter().any(|w| *w < 0.0) {
        return Err(HarnessError::ComputationError(
            "ensemble weights must be non-negative with a positive sum".to_string(),
        ));
    }

    let mut result = Array1::zeros(n_samples);
    for (pred, &w) in predictions.iter().zip(weights.iter()) {
        if w > 0.0 {
            result.scaled_add(w / weight_sum, pred);
        }
    }
    Ok(result)
}

/// Weighted-average ensemble of fitted pipelines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedEnsemble {
    /// Candidate label of each member
    labels: Vec<String>,
    members: Vec<FittedPipeline>,
    weights: Vec<f64>,
}

impl FittedEnsemble {
    pub fn new(labels: Vec<String>, members: Vec<FittedPipeline>, weights: Vec<f64>) -> Result<Self> {
        if members.is_empty() || members.len() != weights.len() || members.len() != labels.len() {
            return Err(HarnessError::ShapeError {
                expected: format!("{} labels and weights", members.len()),
                actual: format!("{} labels, {} weights", labels.len(), weights.len()),
            });
        }
        Ok(Self { labels, members, weights })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn members(&self) -> &[FittedPipeline] {
        &self.members
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let predictions = self
            .members
            .iter()
            .map(|m| m.predict(x))
            .collect::<Result<Vec<_>>>()?;
        weighted_average(&predictions, Some(&self.weights))
    }
}
