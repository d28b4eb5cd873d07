//! Greedy forward ensemble selection with replacement (Caruana et al.)

use super::voting::weighted_average;
use crate::error::{HarnessError, Result};
use crate::evaluation::Metric;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Outcome of [`greedy_selection`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleSelection {
    /// Times each candidate was picked in the kept prefix of rounds
    pub counts: Vec<usize>,
    /// Normalized selection counts
    pub weights: Vec<f64>,
    /// Holdout error after every round
    pub trajectory: Vec<f64>,
    /// Holdout error of the returned weights
    pub best_error: f64,
}

impl EnsembleSelection {
    /// Indices of candidates with a non-zero weight
    pub fn selected(&self) -> Vec<usize> {
        (0..self.counts.len()).filter(|&i| self.counts[i] > 0).collect()
    }
}

/// Build an ensemble over holdout predictions by repeatedly adding the
/// candidate (with replacement) that minimizes the error of the running
/// average. The prefix of rounds with the lowest error is kept; ties prefer
/// fewer rounds and lower candidate indices.
pub fn greedy_selection(
    predictions: &[Array1<f64>],
    y: &Array1<f64>,
    metric: Metric,
    rounds: usize,
) -> Result<EnsembleSelection> {
    if predictions.is_empty() {
        return Err(HarnessError::ConfigError(
            "ensemble selection needs at least one candidate".to_string(),
        ));
    }
    if rounds == 0 {
        return Err(HarnessError::ConfigError(
            "ensemble selection needs at least one round".to_string(),
        ));
    }

    let n_candidates = predictions.len();
    let mut counts = vec![0usize; n_candidates];
    let mut sum = Array1::<f64>::zeros(y.len());
    let mut trajectory = Vec::with_capacity(rounds);
    let mut best: Option<(f64, Vec<usize>)> = None;

    for round in 0..rounds {
        let k = (round + 1) as f64;
        let mut round_best: Option<(usize, f64)> = None;
        for (idx, pred) in predictions.iter().enumerate() {
            let candidate = (&sum + pred) / k;
            let err = metric.error(y, &candidate)?;
            if round_best.map_or(true, |(_, e)| err < e) {
                round_best = Some((idx, err));
            }
        }

        let (idx, err) = round_best.ok_or_else(|| {
            HarnessError::ComputationError("no candidate could be scored".to_string())
        })?;
        counts[idx] += 1;
        sum += &predictions[idx];
        trajectory.push(err);

        if best.as_ref().map_or(true, |(e, _)| err < *e) {
            best = Some((err, counts.clone()));
        }
    }

    let (best_error, counts) = best.ok_or_else(|| {
        HarnessError::ComputationError("ensemble selection produced no rounds".to_string())
    })?;
    let total: usize = counts.iter().sum();
    let weights = counts.iter().map(|&c| c as f64 / total as f64).collect();

    Ok(EnsembleSelection {
        counts,
        weights,
        trajectory,
        best_error,
    })
}

/// Predictions of the selected ensemble on the holdout rows
pub fn ensemble_predictions(predictions: &[Array1<f64>], selection: &EnsembleSelection) -> Result<Array1<f64>> {
    weighted_average(predictions, Some(&selection.weights))
}
