//! Integration test: run orchestration, results table and report

use nestcv::prelude::*;
use nestcv::training::OuterFoldSet;
use ndarray::{Array1, Array2};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn linear_data(n: usize) -> Dataset {
    let x = Array2::from_shape_fn((n, 3), |(i, j)| (((i + 1) * (j + 2)) % 17) as f64 - 8.0);
    let y: Array1<f64> = x
        .rows()
        .into_iter()
        .enumerate()
        .map(|(i, r)| 2.0 * r[0] - r[1] + 0.5 * r[2] + (i % 3) as f64 * 0.1)
        .collect();
    Dataset::new(x, y).unwrap()
}

/// Counts how often it was asked to evaluate; fails on request
struct CountingEvaluator {
    name: String,
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl Evaluator for CountingEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, _ctx: &EvalContext) -> Result<()> {
        Ok(())
    }

    fn evaluate(&self, _data: &Dataset, folds: &OuterFoldSet, _ctx: &EvalContext) -> Result<EvaluationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(HarnessError::FitFailure {
                family: self.name.clone(),
                fold: folds.len() - 1,
                params: "{}".to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        Ok(EvaluationResult::new(self.name.clone(), Vec::new()))
    }
}

fn baseline() -> Box<dyn Evaluator> {
    Box::new(PipelineGridEvaluator::new(
        "Constant Regressor",
        PipelineSpec::new(EstimatorKind::Constant(ConstantStrategy::Mean)),
        ParamGrid::new(),
    ))
}

fn ridge() -> Box<dyn Evaluator> {
    Box::new(PipelineGridEvaluator::new(
        "Ridge Regression",
        PipelineSpec::new(EstimatorKind::Ridge { alpha: 1.0 })
            .with_step(PreprocessStep::Impute(ImputeStrategy::Median))
            .with_step(PreprocessStep::Scale(ScalerType::Standard)),
        ParamGrid::new().add("alpha", vec![0.01, 1.0, 100.0]),
    ))
}

fn config() -> HarnessConfig {
    HarnessConfig::new().with_n_splits(4).with_inner_splits(3)
}

#[test]
fn test_failed_family_keeps_siblings() {
    let data = linear_data(48);
    let calls = Arc::new(AtomicUsize::new(0));
    let evaluators: Vec<Box<dyn Evaluator>> = vec![
        baseline(),
        Box::new(CountingEvaluator {
            name: "Broken".to_string(),
            calls: calls.clone(),
            fail: true,
        }),
        ridge(),
    ];

    let (table, folds) = run_all_models(&data, "Synthetic", &evaluators, &config()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(folds.len(), 4);

    let names: Vec<&str> = table.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["Constant Regressor", "Broken", "Ridge Regression"]);

    match table.get("Broken").unwrap() {
        FamilyOutcome::Failed { error } => assert!(error.contains("scripted failure")),
        FamilyOutcome::Completed(_) => panic!("family should have failed"),
    }
    let ridge = table.get("Ridge Regression").unwrap().result().unwrap();
    let baseline = table.get("Constant Regressor").unwrap().result().unwrap();
    assert!(ridge.mean() < baseline.mean());
}

#[test]
fn test_every_family_sees_identical_folds() {
    let data = linear_data(40);
    let evaluators = vec![baseline(), ridge()];
    let (table, folds) = run_all_models(&data, "Synthetic", &evaluators, &config()).unwrap();

    for (_, outcome) in table.iter() {
        let result = outcome.result().unwrap();
        assert_eq!(result.n_folds(), folds.len());
        for (fold, split) in result.folds.iter().zip(folds.iter()) {
            assert_eq!(fold.fold_idx, split.fold_idx);
            assert_eq!(fold.n_test, split.test_indices.len());
            assert_eq!(fold.n_train, split.train_indices.len());
        }
    }

    let again = build_outer_folds(40, None, 4, 42).unwrap();
    assert_eq!(folds, again);
}

#[test]
fn test_aggregates_match_fold_scores() {
    let data = linear_data(40);
    let (table, _) = run_all_models(&data, "Synthetic", &[baseline()], &config()).unwrap();
    let result = table.get("Constant Regressor").unwrap().result().unwrap();

    let scores = result.scores();
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let std = (scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();
    assert!((result.mean() - mean).abs() < 1e-12);
    assert!((result.std() - std).abs() < 1e-12);
    assert!(scores.iter().all(|s| *s > 0.0));
}

#[test]
fn test_report_lists_families_in_order() {
    let data = linear_data(40);
    let evaluators: Vec<Box<dyn Evaluator>> = vec![
        baseline(),
        Box::new(CountingEvaluator {
            name: "Broken".to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            fail: true,
        }),
    ];
    let (table, _) = run_all_models(&data, "Raw Mullen (6m)", &evaluators, &config()).unwrap();
    let report = render_report("Raw Mullen (6m)", Metric::MeanAbsoluteError, &table);
    let lines: Vec<&str> = report.lines().collect();

    assert_eq!(lines[0], "Raw Mullen (6m) Mean Absolute Error:");
    let result = table.get("Constant Regressor").unwrap().result().unwrap();
    assert_eq!(
        lines[2],
        format!(
            "Constant Regressor (mean | standard deviation) -- {:.2} | {:.2}",
            result.mean(),
            result.std()
        )
    );
    assert!(lines[3].starts_with("Broken -- FAILED: "));
    assert_eq!(lines[1], lines[4]);
}

#[test]
fn test_invalid_ensemble_budget_rejected_before_fitting() {
    let data = linear_data(40);
    let calls = Arc::new(AtomicUsize::new(0));
    let candidates = vec![EnsembleCandidate::new(
        "constant",
        PipelineSpec::new(EstimatorKind::Constant(ConstantStrategy::Mean)),
        ParamSet::new(),
    )];
    let evaluators: Vec<Box<dyn Evaluator>> = vec![
        Box::new(CountingEvaluator {
            name: "Counter".to_string(),
            calls: calls.clone(),
            fail: false,
        }),
        Box::new(AutomatedEnsembleEvaluator::new("AutoEnsemble", candidates, 0.0)),
    ];

    let err = run_all_models(&data, "Synthetic", &evaluators, &config()).unwrap_err();
    assert!(matches!(err, HarnessError::BudgetExceeded(_)));
    assert!(err.is_configuration());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_invalid_fold_count_is_config_error() {
    let data = linear_data(10);
    let config = HarnessConfig::new().with_n_splits(11);
    let err = run_all_models(&data, "Synthetic", &[baseline()], &config).unwrap_err();
    assert!(matches!(err, HarnessError::ConfigError(_)));
}

#[test]
fn test_too_few_inner_groups_rejected_before_fitting() {
    // 6 groups of 4 rows over 5 outer folds leaves one fold training on 4 groups
    let groups = Array1::from((0..24).map(|i| (i / 4) as i64).collect::<Vec<_>>());
    let data = linear_data(24).with_groups(groups).unwrap();
    let config = HarnessConfig::new().with_n_splits(5).with_inner_splits(5);
    let calls = Arc::new(AtomicUsize::new(0));
    let evaluators: Vec<Box<dyn Evaluator>> = vec![
        Box::new(CountingEvaluator {
            name: "Counter".to_string(),
            calls: calls.clone(),
            fail: false,
        }),
        ridge(),
    ];

    let err = run_all_models(&data, "Grouped", &evaluators, &config).unwrap_err();
    assert!(matches!(err, HarnessError::ConfigError(ref m) if m.contains("Ridge Regression")));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // without an inner search the same folds are usable
    let (table, folds) = run_all_models(&data, "Grouped", &[baseline()], &config).unwrap();
    assert_eq!(folds.len(), 5);
    assert!(!table.get("Constant Regressor").unwrap().is_failed());
}
