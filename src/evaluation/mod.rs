//! Evaluator contract and the three evaluator families
//!
//! Every model family implements [`Evaluator`]. An evaluator receives the
//! shared dataset and the shared outer folds read-only, and returns one
//! [`FoldResult`] per outer fold, in fold order.

pub mod metric;

mod ensemble;
mod grid;
mod sequential;

pub use ensemble::{AutomatedEnsembleEvaluator, EnsembleCandidate};
pub use grid::PipelineGridEvaluator;
pub use metric::{LearningTask, Metric};
pub use sequential::{SearchBudget, SequentialSearchEvaluator};

use crate::config::HarnessConfig;
use crate::data::Dataset;
use crate::ensemble::FittedEnsemble;
use crate::error::{HarnessError, Result};
use crate::optimizer::{format_params, ParamSet, Study};
use crate::training::{
    CVSplit, CVStrategy, CrossValidator, FittedPipeline, OuterFoldSet, PipelineSpec,
};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Everything an evaluator needs besides the data and the folds
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub learning_task: LearningTask,
    pub metric: Metric,
    pub config: HarnessConfig,
}

impl EvalContext {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            learning_task: config.task,
            metric: config.metric,
            config,
        }
    }
}

/// Uniform contract of a model family
pub trait Evaluator: Send + Sync {
    /// Family name used in the results table
    fn name(&self) -> &str;

    /// Configuration checks run before any fitting
    fn validate(&self, ctx: &EvalContext) -> Result<()>;

    /// Distinct training units (groups, or rows when ungrouped) every outer
    /// training fold must hold for the family's inner splitting
    fn min_training_units(&self, _ctx: &EvalContext) -> usize {
        1
    }

    /// Evaluate the family on every outer fold
    fn evaluate(&self, data: &Dataset, folds: &OuterFoldSet, ctx: &EvalContext) -> Result<EvaluationResult>;
}

/// Predictor produced for one outer fold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FittedArtifact {
    Pipeline(FittedPipeline),
    Ensemble(FittedEnsemble),
}

impl FittedArtifact {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            FittedArtifact::Pipeline(p) => p.predict(x),
            FittedArtifact::Ensemble(e) => e.predict(x),
        }
    }
}

/// Outcome of one outer fold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold_idx: usize,
    /// Held-out error, a positive magnitude
    pub score: f64,
    pub artifact: FittedArtifact,
    /// Chosen hyperparameters (ensemble members map to their weights)
    pub params: ParamSet,
    /// Mean inner-fold error of the chosen configuration, if a search ran
    pub best_inner_error: Option<f64>,
    pub n_train: usize,
    pub n_test: usize,
    /// Predictions for the outer test rows, in test index order
    pub predictions: Array1<f64>,
    pub fit_duration_secs: f64,
    pub search_trials: Option<Study>,
}

/// Per-fold results of one family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub family: String,
    pub folds: Vec<FoldResult>,
}

impl EvaluationResult {
    pub fn new(family: impl Into<String>, folds: Vec<FoldResult>) -> Self {
        Self {
            family: family.into(),
            folds,
        }
    }

    pub fn scores(&self) -> Vec<f64> {
        self.folds.iter().map(|f| f.score).collect()
    }

    /// Mean held-out error
    pub fn mean(&self) -> f64 {
        mean_and_std(&self.scores()).0
    }

    /// Population standard deviation of the held-out errors
    pub fn std(&self) -> f64 {
        mean_and_std(&self.scores()).1
    }

    pub fn n_folds(&self) -> usize {
        self.folds.len()
    }
}

/// Mean and population standard deviation; NaN for an empty slice
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Rows of one outer fold, copied out of the dataset
pub(crate) struct FoldData {
    pub fold_idx: usize,
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub groups_train: Option<Array1<i64>>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<f64>,
}

impl FoldData {
    pub fn slice(data: &Dataset, split: &CVSplit) -> Self {
        let (x_train, y_train, groups_train) = data.select_rows(&split.train_indices);
        let (x_test, y_test, _) = data.select_rows(&split.test_indices);
        Self {
            fold_idx: split.fold_idx,
            x_train,
            y_train,
            groups_train,
            x_test,
            y_test,
        }
    }

    pub fn n_train(&self) -> usize {
        self.y_train.len()
    }

    pub fn n_test(&self) -> usize {
        self.y_test.len()
    }

    /// Inner folds over the training rows, indexed locally into `x_train`
    pub fn inner_splits(&self, config: &HarnessConfig) -> Result<Vec<CVSplit>> {
        let strategy = CVStrategy::for_groups(
            self.groups_train.is_some(),
            config.inner_splits,
            config.shuffle,
        );
        CrossValidator::new(strategy)
            .with_random_state(config.inner_seed(self.fold_idx))
            .split(self.n_train(), self.groups_train.as_ref())
    }
}

/// Wrap an estimator error into a fold failure of `family`
pub(crate) fn fit_failure(family: &str, fold: usize, params: &ParamSet, err: HarnessError) -> HarnessError {
    match err {
        HarnessError::FitFailure { .. } => err,
        other => HarnessError::FitFailure {
            family: family.to_string(),
            fold,
            params: format_params(params),
            reason: other.to_string(),
        },
    }
}

/// Fit on `(x_train, y_train)`, predict `x_test` and measure the error
pub(crate) fn fit_and_score(
    spec: &PipelineSpec,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    x_test: &Array2<f64>,
    y_test: &Array1<f64>,
    params: &ParamSet,
    metric: Metric,
) -> Result<(FittedPipeline, Array1<f64>, f64)> {
    let fitted = spec.fit(x_train, y_train, params)?;
    let predictions = fitted.predict(x_test)?;
    if predictions.iter().any(|p| !p.is_finite()) {
        return Err(HarnessError::ComputationError(
            "model produced non-finite predictions".to_string(),
        ));
    }
    let error = metric.error(y_test, &predictions)?;
    Ok((fitted, predictions, error))
}

/// Mean inner-fold error of `params` on the training rows of `fold`
pub(crate) fn inner_cv_error(
    spec: &PipelineSpec,
    fold: &FoldData,
    inner: &[CVSplit],
    params: &ParamSet,
    metric: Metric,
) -> Result<f64> {
    let mut total = 0.0;
    for split in inner {
        let (x_fit, y_fit) = select(&fold.x_train, &fold.y_train, &split.train_indices);
        let (x_val, y_val) = select(&fold.x_train, &fold.y_train, &split.test_indices);
        let (_, _, error) = fit_and_score(spec, &x_fit, &y_fit, &x_val, &y_val, params, metric)?;
        total += error;
    }
    Ok(total / inner.len() as f64)
}

pub(crate) fn select(x: &Array2<f64>, y: &Array1<f64>, rows: &[usize]) -> (Array2<f64>, Array1<f64>) {
    use ndarray::Axis;
    (x.select(Axis(0), rows), y.select(Axis(0), rows))
}

/// Run `f` on every outer fold; results stay in fold order
pub(crate) fn run_folds<F>(folds: &OuterFoldSet, parallel: bool, f: F) -> Result<Vec<FoldResult>>
where
    F: Fn(&CVSplit) -> Result<FoldResult> + Sync + Send,
{
    if parallel {
        folds.splits().par_iter().map(|s| f(s)).collect()
    } else {
        folds.iter().map(f).collect()
    }
}
