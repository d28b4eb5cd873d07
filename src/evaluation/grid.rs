//! Pipeline evaluator with exhaustive grid search over inner folds

use super::{
    fit_and_score, fit_failure, inner_cv_error, run_folds, EvalContext, EvaluationResult,
    Evaluator, FittedArtifact, FoldData, FoldResult,
};
use crate::data::Dataset;
use crate::error::{HarnessError, Result};
use crate::optimizer::{format_params, ParamGrid, ParamSet};
use crate::training::{CVSplit, OuterFoldSet, PipelineSpec};
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

/// Grid search over a fixed pipeline. A grid with a single point (including
/// the empty grid) skips the inner search.
pub struct PipelineGridEvaluator {
    name: String,
    spec: PipelineSpec,
    grid: ParamGrid,
}

impl PipelineGridEvaluator {
    pub fn new(name: impl Into<String>, spec: PipelineSpec, grid: ParamGrid) -> Self {
        Self {
            name: name.into(),
            spec,
            grid,
        }
    }

    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    pub fn grid(&self) -> &ParamGrid {
        &self.grid
    }

    /// Index of the best grid point and its mean inner error. Candidates
    /// are scored with the negated error; ties keep the earliest point.
    fn select_point(
        &self,
        fold: &FoldData,
        points: &[ParamSet],
        ctx: &EvalContext,
    ) -> Result<(usize, f64)> {
        let inner = fold.inner_splits(&ctx.config)?;
        let score_point = |params: &ParamSet| -> Result<f64> {
            inner_cv_error(&self.spec, fold, &inner, params, ctx.metric)
                .map(|e| -e)
                .map_err(|e| fit_failure(&self.name, fold.fold_idx, params, e))
        };

        let scores: Vec<f64> = if ctx.config.parallel {
            points.par_iter().map(score_point).collect::<Result<_>>()?
        } else {
            points.iter().map(score_point).collect::<Result<_>>()?
        };

        let mut best = (0, f64::NEG_INFINITY);
        for (idx, &score) in scores.iter().enumerate() {
            if score > best.1 {
                best = (idx, score);
            }
        }
        Ok((best.0, -best.1))
    }

    fn evaluate_fold(
        &self,
        data: &Dataset,
        split: &CVSplit,
        points: &[ParamSet],
        ctx: &EvalContext,
    ) -> Result<FoldResult> {
        let start = Instant::now();
        let fold = FoldData::slice(data, split);
        let seed = ctx.config.search_seed(fold.fold_idx);
        let points: Vec<ParamSet> = points.iter().map(|p| self.spec.seeded_params(p, seed)).collect();

        let (best_idx, best_inner_error) = if points.len() > 1 {
            let (idx, err) = self.select_point(&fold, &points, ctx)?;
            (idx, Some(err))
        } else {
            (0, None)
        };
        let params = &points[best_idx];

        let (fitted, predictions, score) = fit_and_score(
            &self.spec,
            &fold.x_train,
            &fold.y_train,
            &fold.x_test,
            &fold.y_test,
            params,
            ctx.metric,
        )
        .map_err(|e| fit_failure(&self.name, fold.fold_idx, params, e))?;

        debug!(
            family = %self.name,
            fold = fold.fold_idx,
            params = %format_params(params),
            score,
            "outer fold scored"
        );

        Ok(FoldResult {
            fold_idx: fold.fold_idx,
            score,
            artifact: FittedArtifact::Pipeline(fitted),
            params: params.clone(),
            best_inner_error,
            n_train: fold.n_train(),
            n_test: fold.n_test(),
            predictions,
            fit_duration_secs: start.elapsed().as_secs_f64(),
            search_trials: None,
        })
    }
}

impl Evaluator for PipelineGridEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, _ctx: &EvalContext) -> Result<()> {
        self.grid.validate()?;
        self.spec.estimator.check_param_names(self.grid.names())
    }

    fn min_training_units(&self, ctx: &EvalContext) -> usize {
        if self.grid.n_points() > 1 {
            ctx.config.inner_splits
        } else {
            1
        }
    }

    fn evaluate(&self, data: &Dataset, folds: &OuterFoldSet, ctx: &EvalContext) -> Result<EvaluationResult> {
        let points = self.grid.points();
        if points.is_empty() {
            return Err(HarnessError::ConfigError(format!(
                "'{}' has a grid entry without values",
                self.name
            )));
        }
        let results = run_folds(folds, ctx.config.parallel, |split| {
            self.evaluate_fold(data, split, &points, ctx)
        })?;
        Ok(EvaluationResult::new(self.name.clone(), results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::training::{build_outer_folds, ConstantStrategy, EstimatorKind};
    use ndarray::{Array1, Array2};

    fn linear_data(n: usize) -> Dataset {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
        let y: Array1<f64> = x.rows().into_iter().map(|r| 2.0 * r[0] - r[1] + 1.0).collect();
        Dataset::new(x, y).unwrap()
    }

    #[test]
    fn test_constant_baseline_scores_every_fold() {
        let data = linear_data(40);
        let folds = build_outer_folds(40, None, 4, 42).unwrap();
        let ctx = EvalContext::new(HarnessConfig::new().with_parallel(false));
        let evaluator = PipelineGridEvaluator::new(
            "Constant",
            PipelineSpec::new(EstimatorKind::Constant(ConstantStrategy::Mean)),
            ParamGrid::new(),
        );
        evaluator.validate(&ctx).unwrap();
        let result = evaluator.evaluate(&data, &folds, &ctx).unwrap();
        assert_eq!(result.n_folds(), 4);
        for (fold, split) in result.folds.iter().zip(folds.iter()) {
            assert_eq!(fold.fold_idx, split.fold_idx);
            assert_eq!(fold.n_test, 10);
            assert!(fold.best_inner_error.is_none());
            assert!(fold.score > 0.0);
        }
    }

    #[test]
    fn test_grid_prefers_weaker_penalty_on_clean_data() {
        let data = linear_data(60);
        let folds = build_outer_folds(60, None, 3, 1).unwrap();
        let ctx = EvalContext::new(HarnessConfig::new().with_inner_splits(3));
        let evaluator = PipelineGridEvaluator::new(
            "Ridge",
            PipelineSpec::new(EstimatorKind::Ridge { alpha: 1.0 }),
            ParamGrid::new().add("alpha", vec![1000.0, 0.001]),
        );
        let result = evaluator.evaluate(&data, &folds, &ctx).unwrap();
        for fold in &result.folds {
            assert_eq!(fold.params["alpha"].as_float(), Some(0.001));
            assert!(fold.best_inner_error.is_some());
        }
    }

    #[test]
    fn test_empty_value_list_is_config_error() {
        let data = linear_data(20);
        let folds = build_outer_folds(20, None, 2, 42).unwrap();
        let ctx = EvalContext::new(HarnessConfig::new());
        let evaluator = PipelineGridEvaluator::new(
            "Ridge",
            PipelineSpec::new(EstimatorKind::Ridge { alpha: 1.0 }),
            ParamGrid::new().add("alpha", Vec::<f64>::new()),
        );
        let err = evaluator.evaluate(&data, &folds, &ctx).unwrap_err();
        assert!(matches!(err, HarnessError::ConfigError(_)));
    }

    #[test]
    fn test_inner_search_needs_inner_units() {
        let ctx = EvalContext::new(HarnessConfig::new().with_inner_splits(4));
        let spec = PipelineSpec::new(EstimatorKind::Ridge { alpha: 1.0 });
        let search = PipelineGridEvaluator::new("Ridge", spec.clone(), ParamGrid::new().add("alpha", vec![0.1, 1.0]));
        let fixed = PipelineGridEvaluator::new("Ridge", spec, ParamGrid::new().add("alpha", vec![1.0]));
        assert_eq!(search.min_training_units(&ctx), 4);
        assert_eq!(fixed.min_training_units(&ctx), 1);
    }

    #[test]
    fn test_unknown_grid_parameter_rejected() {
        let ctx = EvalContext::new(HarnessConfig::new());
        let evaluator = PipelineGridEvaluator::new(
            "Ridge",
            PipelineSpec::new(EstimatorKind::Ridge { alpha: 1.0 }),
            ParamGrid::new().add("depth", vec![1i64, 2]),
        );
        assert!(evaluator.validate(&ctx).unwrap_err().is_configuration());
    }
}
