//! Pipeline evaluator with sequential model-based (TPE) search

use super::{
    fit_and_score, fit_failure, inner_cv_error, run_folds, EvalContext, EvaluationResult,
    Evaluator, FittedArtifact, FoldData, FoldResult,
};
use crate::config::HarnessConfig;
use crate::data::Dataset;
use crate::error::{HarnessError, Result};
use crate::optimizer::{
    format_params, OptimizationConfig, ParamSet, SamplerType, SearchSpace, SequentialOptimizer,
};
use crate::training::{CVSplit, OuterFoldSet, PipelineSpec};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Trial and time limits of one inner search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBudget {
    pub max_trials: usize,
    pub timeout_secs: Option<f64>,
    pub n_startup_trials: usize,
    pub patience: Option<usize>,
}

impl SearchBudget {
    pub fn new(max_trials: usize) -> Self {
        Self {
            max_trials,
            timeout_secs: None,
            n_startup_trials: 10,
            patience: None,
        }
    }

    /// Budget taken from the run configuration
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            max_trials: config.n_trials,
            timeout_secs: config.search_timeout_secs,
            n_startup_trials: config.n_startup_trials,
            patience: None,
        }
    }

    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = Some(patience);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_trials == 0 {
            return Err(HarnessError::BudgetExceeded(
                "sequential search needs max_trials >= 1".to_string(),
            ));
        }
        if let Some(t) = self.timeout_secs {
            if !(t.is_finite() && t > 0.0) {
                return Err(HarnessError::BudgetExceeded(format!(
                    "search timeout must be positive, got {}",
                    t
                )));
            }
        }
        if self.patience == Some(0) {
            return Err(HarnessError::BudgetExceeded(
                "early-stopping patience must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn optimization_config(&self, seed: u64) -> OptimizationConfig {
        let mut config = OptimizationConfig::new()
            .with_n_trials(self.max_trials)
            .with_sampler(SamplerType::TPE)
            .with_n_startup_trials(self.n_startup_trials)
            .with_random_state(seed);
        if let Some(t) = self.timeout_secs {
            config = config.with_timeout(t);
        }
        if let Some(p) = self.patience {
            config = config.with_patience(p);
        }
        config
    }
}

/// Inner TPE search over a pipeline's hyperparameters, one study per outer
/// fold seeded with the run seed plus the fold index.
pub struct SequentialSearchEvaluator {
    name: String,
    spec: PipelineSpec,
    space: SearchSpace,
    budget: SearchBudget,
}

impl SequentialSearchEvaluator {
    pub fn new(name: impl Into<String>, spec: PipelineSpec, space: SearchSpace, budget: SearchBudget) -> Self {
        Self {
            name: name.into(),
            spec,
            space,
            budget,
        }
    }

    pub fn budget(&self) -> &SearchBudget {
        &self.budget
    }

    fn evaluate_fold(&self, data: &Dataset, split: &CVSplit, ctx: &EvalContext) -> Result<FoldResult> {
        let start = Instant::now();
        let fold = FoldData::slice(data, split);
        let inner = fold.inner_splits(&ctx.config)?;

        let seed = ctx.config.search_seed(fold.fold_idx);
        let mut optimizer = SequentialOptimizer::new(self.budget.optimization_config(seed), self.space.clone());
        optimizer.optimize(|params| {
            let params = self.spec.seeded_params(params, seed);
            inner_cv_error(&self.spec, &fold, &inner, &params, ctx.metric)
                .map_err(|e| fit_failure(&self.name, fold.fold_idx, &params, e))
        })?;
        let study = optimizer.into_study();

        let (params, best_inner_error): (ParamSet, f64) = study
            .best_trial()
            .map(|t| (self.spec.seeded_params(&t.params, seed), t.value))
            .ok_or_else(|| HarnessError::ComputationError("search finished without trials".to_string()))?;

        debug!(
            family = %self.name,
            fold = fold.fold_idx,
            trials = study.trials.len(),
            stop = ?study.stop_reason,
            best = %format_params(&params),
            "inner search finished"
        );

        let (fitted, predictions, score) = fit_and_score(
            &self.spec,
            &fold.x_train,
            &fold.y_train,
            &fold.x_test,
            &fold.y_test,
            &params,
            ctx.metric,
        )
        .map_err(|e| fit_failure(&self.name, fold.fold_idx, &params, e))?;

        Ok(FoldResult {
            fold_idx: fold.fold_idx,
            score,
            artifact: FittedArtifact::Pipeline(fitted),
            params,
            best_inner_error: Some(best_inner_error),
            n_train: fold.n_train(),
            n_test: fold.n_test(),
            predictions,
            fit_duration_secs: start.elapsed().as_secs_f64(),
            search_trials: Some(study),
        })
    }
}

impl Evaluator for SequentialSearchEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, _ctx: &EvalContext) -> Result<()> {
        if self.space.is_empty() {
            return Err(HarnessError::ConfigError(format!(
                "search space of '{}' is empty",
                self.name
            )));
        }
        self.space.validate()?;
        let names = self.space.param_names();
        self.spec
            .estimator
            .check_param_names(names.iter().map(String::as_str))?;
        self.budget.validate()
    }

    fn min_training_units(&self, ctx: &EvalContext) -> usize {
        ctx.config.inner_splits
    }

    fn evaluate(&self, data: &Dataset, folds: &OuterFoldSet, ctx: &EvalContext) -> Result<EvaluationResult> {
        let results = run_folds(folds, ctx.config.parallel, |split| {
            self.evaluate_fold(data, split, ctx)
        })?;
        Ok(EvaluationResult::new(self.name.clone(), results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{build_outer_folds, EstimatorKind};
    use ndarray::{Array1, Array2};

    fn data() -> Dataset {
        let x = Array2::from_shape_fn((36, 2), |(i, j)| ((i * 5 + j * 2) % 9) as f64);
        let y: Array1<f64> = x.rows().into_iter().map(|r| r[0] + 0.5 * r[1]).collect();
        Dataset::new(x, y).unwrap()
    }

    fn evaluator(max_trials: usize) -> SequentialSearchEvaluator {
        SequentialSearchEvaluator::new(
            "Ridge TPE",
            PipelineSpec::new(EstimatorKind::Ridge { alpha: 1.0 }),
            SearchSpace::new().log_float("alpha", 1e-3, 10.0),
            SearchBudget::new(max_trials).with_n_startup_trials(2),
        )
    }

    #[test]
    fn test_trial_budget_respected() {
        let folds = build_outer_folds(36, None, 3, 42).unwrap();
        let ctx = EvalContext::new(HarnessConfig::new().with_inner_splits(3).with_parallel(false));
        let ev = evaluator(4);
        ev.validate(&ctx).unwrap();
        let result = ev.evaluate(&data(), &folds, &ctx).unwrap();
        assert_eq!(result.n_folds(), 3);
        for fold in &result.folds {
            let study = fold.search_trials.as_ref().unwrap();
            assert!(study.trials.len() <= 4);
            assert_eq!(fold.best_inner_error, study.best_value());
        }
    }

    #[test]
    fn test_search_is_reproducible() {
        let folds = build_outer_folds(36, None, 3, 42).unwrap();
        let ctx = EvalContext::new(HarnessConfig::new().with_inner_splits(3));
        let a = evaluator(5).evaluate(&data(), &folds, &ctx).unwrap();
        let b = evaluator(5).evaluate(&data(), &folds, &ctx).unwrap();
        assert_eq!(a.scores(), b.scores());
        let params_a: Vec<_> = a.folds.iter().map(|f| f.params.clone()).collect();
        let params_b: Vec<_> = b.folds.iter().map(|f| f.params.clone()).collect();
        assert_eq!(params_a, params_b);
    }

    #[test]
    fn test_zero_trial_budget_rejected() {
        let ctx = EvalContext::new(HarnessConfig::new());
        let err = evaluator(0).validate(&ctx).unwrap_err();
        assert!(matches!(err, HarnessError::BudgetExceeded(_)));
    }
}
