//! Automated multi-model ensemble search under a per-fold time budget

use super::{
    fit_and_score, fit_failure, run_folds, select, EvalContext, EvaluationResult, Evaluator,
    FittedArtifact, FoldData, FoldResult,
};
use crate::data::Dataset;
use crate::ensemble::{greedy_selection, FittedEnsemble};
use crate::error::{HarnessError, Result};
use crate::optimizer::{format_params, ParamSet, ParameterValue};
use crate::training::{holdout_split, CVSplit, OuterFoldSet, PipelineSpec};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// One fixed pipeline configuration the ensemble search may use
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleCandidate {
    pub label: String,
    pub spec: PipelineSpec,
    pub params: ParamSet,
}

impl EnsembleCandidate {
    pub fn new(label: impl Into<String>, spec: PipelineSpec, params: ParamSet) -> Self {
        Self {
            label: label.into(),
            spec,
            params,
        }
    }
}

/// Fits candidates in order until the time budget runs out, then builds a
/// greedy forward-selected weighted ensemble on a holdout part of the outer
/// training rows.
pub struct AutomatedEnsembleEvaluator {
    name: String,
    candidates: Vec<EnsembleCandidate>,
    time_budget_secs: f64,
    holdout_fraction: f64,
    rounds: usize,
}

impl AutomatedEnsembleEvaluator {
    pub fn new(name: impl Into<String>, candidates: Vec<EnsembleCandidate>, time_budget_secs: f64) -> Self {
        Self {
            name: name.into(),
            candidates,
            time_budget_secs,
            holdout_fraction: 0.2,
            rounds: 25,
        }
    }

    pub fn with_holdout_fraction(mut self, fraction: f64) -> Self {
        self.holdout_fraction = fraction;
        self
    }

    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.rounds = rounds;
        self
    }

    pub fn time_budget_secs(&self) -> f64 {
        self.time_budget_secs
    }

    pub fn candidates(&self) -> &[EnsembleCandidate] {
        &self.candidates
    }

    /// Holdout predictions of every candidate fitted within the budget,
    /// as `(candidate index, predictions)`
    fn fit_candidates(
        &self,
        fold: &FoldData,
        fit_rows: &[usize],
        holdout_rows: &[usize],
        ctx: &EvalContext,
    ) -> (Vec<usize>, Vec<Array1<f64>>) {
        let start = Instant::now();
        let (x_fit, y_fit) = select(&fold.x_train, &fold.y_train, fit_rows);
        let (x_hold, y_hold) = select(&fold.x_train, &fold.y_train, holdout_rows);
        let seed = ctx.config.search_seed(fold.fold_idx);

        let mut fitted = Vec::new();
        let mut predictions = Vec::new();
        for (idx, candidate) in self.candidates.iter().enumerate() {
            if idx > 0 && start.elapsed().as_secs_f64() >= self.time_budget_secs {
                debug!(
                    family = %self.name,
                    fold = fold.fold_idx,
                    fitted = fitted.len(),
                    skipped = self.candidates.len() - idx,
                    "ensemble time budget reached"
                );
                break;
            }
            match fit_and_score(
                &candidate.spec,
                &x_fit,
                &y_fit,
                &x_hold,
                &y_hold,
                &candidate.spec.seeded_params(&candidate.params, seed),
                ctx.metric,
            ) {
                Ok((_, pred, _)) => {
                    fitted.push(idx);
                    predictions.push(pred);
                }
                Err(e) => warn!(
                    family = %self.name,
                    fold = fold.fold_idx,
                    candidate = %candidate.label,
                    error = %e,
                    "ensemble candidate skipped"
                ),
            }
        }
        (fitted, predictions)
    }

    fn evaluate_fold(&self, data: &Dataset, split: &CVSplit, ctx: &EvalContext) -> Result<FoldResult> {
        let start = Instant::now();
        let fold = FoldData::slice(data, split);
        let no_params = ParamSet::new();

        let (fit_rows, holdout_rows) = holdout_split(
            fold.n_train(),
            fold.groups_train.as_ref(),
            self.holdout_fraction,
            ctx.config.search_seed(fold.fold_idx),
        )
        .map_err(|e| fit_failure(&self.name, fold.fold_idx, &no_params, e))?;

        let (fitted, holdout_preds) = self.fit_candidates(&fold, &fit_rows, &holdout_rows, ctx);
        if fitted.is_empty() {
            return Err(HarnessError::FitFailure {
                family: self.name.clone(),
                fold: fold.fold_idx,
                params: format_params(&no_params),
                reason: "no ensemble candidate could be fitted".to_string(),
            });
        }

        let (_, y_hold) = select(&fold.x_train, &fold.y_train, &holdout_rows);
        let selection = greedy_selection(&holdout_preds, &y_hold, ctx.metric, self.rounds)
            .map_err(|e| fit_failure(&self.name, fold.fold_idx, &no_params, e))?;

        let mut labels = Vec::new();
        let mut members = Vec::new();
        let mut weights = Vec::new();
        let mut params = ParamSet::new();
        for pos in selection.selected() {
            let candidate = &self.candidates[fitted[pos]];
            let member_params = candidate
                .spec
                .seeded_params(&candidate.params, ctx.config.search_seed(fold.fold_idx));
            let member = candidate
                .spec
                .fit(&fold.x_train, &fold.y_train, &member_params)
                .map_err(|e| fit_failure(&self.name, fold.fold_idx, &member_params, e))?;
            labels.push(candidate.label.clone());
            members.push(member);
            weights.push(selection.weights[pos]);
            params.insert(candidate.label.clone(), ParameterValue::Float(selection.weights[pos]));
        }

        let ensemble = FittedEnsemble::new(labels, members, weights)?;
        let artifact = FittedArtifact::Ensemble(ensemble);
        let scored = artifact.predict(&fold.x_test).and_then(|pred| {
            if pred.iter().any(|p| !p.is_finite()) {
                return Err(HarnessError::ComputationError(
                    "ensemble produced non-finite predictions".to_string(),
                ));
            }
            let score = ctx.metric.error(&fold.y_test, &pred)?;
            Ok((pred, score))
        });
        let (predictions, score) = scored.map_err(|e| fit_failure(&self.name, fold.fold_idx, &params, e))?;

        debug!(
            family = %self.name,
            fold = fold.fold_idx,
            candidates = fitted.len(),
            members = %format_params(&params),
            score,
            "ensemble fold scored"
        );

        Ok(FoldResult {
            fold_idx: fold.fold_idx,
            score,
            artifact,
            params,
            best_inner_error: Some(selection.best_error),
            n_train: fold.n_train(),
            n_test: fold.n_test(),
            predictions,
            fit_duration_secs: start.elapsed().as_secs_f64(),
            search_trials: None,
        })
    }
}

impl Evaluator for AutomatedEnsembleEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, ctx: &EvalContext) -> Result<()> {
        let budget = self.time_budget_secs;
        if !(budget.is_finite() && budget > 0.0) {
            return Err(HarnessError::BudgetExceeded(format!(
                "ensemble time budget must be a positive number of seconds, got {}",
                budget
            )));
        }
        if let Some(limit) = ctx.config.run_time_limit_secs {
            let total = budget * ctx.config.n_splits as f64;
            if total > limit {
                return Err(HarnessError::BudgetExceeded(format!(
                    "ensemble budget of {}s over {} folds ({}s) exceeds the run limit of {}s",
                    budget, ctx.config.n_splits, total, limit
                )));
            }
        }
        if self.candidates.is_empty() {
            return Err(HarnessError::ConfigError(format!(
                "'{}' has no ensemble candidates",
                self.name
            )));
        }
        if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
            return Err(HarnessError::ConfigError(format!(
                "holdout fraction must lie in (0, 1), got {}",
                self.holdout_fraction
            )));
        }
        if self.rounds == 0 {
            return Err(HarnessError::ConfigError(
                "ensemble selection needs at least one round".to_string(),
            ));
        }
        for candidate in &self.candidates {
            candidate
                .spec
                .estimator
                .check_param_names(candidate.params.keys().map(String::as_str))?;
        }
        Ok(())
    }

    /// The holdout split needs one unit on each side
    fn min_training_units(&self, _ctx: &EvalContext) -> usize {
        2
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
    use crate::config::HarnessConfig;
    use crate::training::{build_outer_folds, ConstantStrategy, EstimatorKind};
    use ndarray::Array2;

    fn data() -> Dataset {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| ((i * 3 + j * 5) % 13) as f64);
        let y: Array1<f64> = x.rows().into_iter().map(|r| 3.0 * r[0] - r[1]).collect();
        Dataset::new(x, y).unwrap()
    }

    fn candidates() -> Vec<EnsembleCandidate> {
        vec![
            EnsembleCandidate::new(
                "mean",
                PipelineSpec::new(EstimatorKind::Constant(ConstantStrategy::Mean)),
                ParamSet::new(),
            ),
            EnsembleCandidate::new(
                "ridge",
                PipelineSpec::new(EstimatorKind::Ridge { alpha: 0.01 }),
                ParamSet::new(),
            ),
        ]
    }

    #[test]
    fn test_ensemble_prefers_informative_member() {
        let folds = build_outer_folds(40, None, 4, 42).unwrap();
        let ctx = EvalContext::new(HarnessConfig::new().with_parallel(false));
        let ev = AutomatedEnsembleEvaluator::new("AutoEnsemble", candidates(), 30.0);
        ev.validate(&ctx).unwrap();
        let result = ev.evaluate(&data(), &folds, &ctx).unwrap();
        assert_eq!(result.n_folds(), 4);
        for fold in &result.folds {
            assert!(fold.params.contains_key("ridge"));
            assert!(fold.score < 1.0);
            assert!(matches!(fold.artifact, FittedArtifact::Ensemble(_)));
        }
    }

    #[test]
    fn test_invalid_budgets_rejected() {
        let ctx = EvalContext::new(HarnessConfig::new());
        for budget in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = AutomatedEnsembleEvaluator::new("Auto", candidates(), budget)
                .validate(&ctx)
                .unwrap_err();
            assert!(matches!(err, HarnessError::BudgetExceeded(_)));
            assert!(err.is_configuration());
        }

        let ctx = EvalContext::new(HarnessConfig::new().with_n_splits(5).with_run_time_limit(100.0));
        let err = AutomatedEnsembleEvaluator::new("Auto", candidates(), 30.0)
            .validate(&ctx)
            .unwrap_err();
        assert!(matches!(err, HarnessError::BudgetExceeded(_)));
    }

    #[test]
    fn test_all_candidates_failing_is_fit_failure() {
        let bad = vec![EnsembleCandidate::new(
            "bad ridge",
            PipelineSpec::new(EstimatorKind::Ridge { alpha: 1.0 }),
            [("alpha".to_string(), ParameterValue::Float(-1.0))].into_iter().collect(),
        )];
        let folds = build_outer_folds(40, None, 2, 0).unwrap();
        let ctx = EvalContext::new(HarnessConfig::new().with_parallel(false));
        let err = AutomatedEnsembleEvaluator::new("Auto", bad, 10.0)
            .evaluate(&data(), &folds, &ctx)
            .unwrap_err();
        assert!(matches!(err, HarnessError::FitFailure { fold: 0, .. }));
    }
}
