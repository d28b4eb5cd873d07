//! Run orchestrator
//!
//! [`run_all_models`] validates the configuration and every evaluator, builds
//! the outer folds once and hands the same fold set to each evaluator in
//! registration order. A failing family is recorded as
//! [`FamilyOutcome::Failed`] and does not stop the others.

use crate::config::HarnessConfig;
use crate::data::Dataset;
use crate::error::{HarnessError, Result};
use crate::evaluation::{EvalContext, EvaluationResult, Evaluator, Metric};
use crate::training::{build_outer_folds, OuterFoldSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::time::Instant;
use tracing::{info, warn};

/// Result of one model family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FamilyOutcome {
    Completed(EvaluationResult),
    Failed { error: String },
}

impl FamilyOutcome {
    pub fn result(&self) -> Option<&EvaluationResult> {
        match self {
            FamilyOutcome::Completed(r) => Some(r),
            FamilyOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FamilyOutcome::Failed { .. })
    }
}

/// Family outcomes in evaluation order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultsTable {
    entries: Vec<(String, FamilyOutcome)>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, family: impl Into<String>, outcome: FamilyOutcome) {
        self.entries.push((family.into(), outcome));
    }

    pub fn entries(&self) -> &[(String, FamilyOutcome)] {
        &self.entries
    }

    pub fn get(&self, family: &str) -> Option<&FamilyOutcome> {
        self.entries
            .iter()
            .find(|(name, _)| name == family)
            .map(|(_, outcome)| outcome)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (String, FamilyOutcome)> {
        self.entries.iter()
    }
}

/// Everything recorded for one response variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub label: String,
    pub response: String,
    pub metric: Metric,
    pub created_at: DateTime<Utc>,
    pub table: ResultsTable,
    pub folds: OuterFoldSet,
}

impl RunRecord {
    pub fn new(
        label: impl Into<String>,
        response: impl Into<String>,
        metric: Metric,
        table: ResultsTable,
        folds: OuterFoldSet,
    ) -> Self {
        Self {
            label: label.into(),
            response: response.into(),
            metric,
            created_at: Utc::now(),
            table,
            folds,
        }
    }
}

/// Evaluate every family on identical outer folds.
///
/// Configuration problems of the run or of any evaluator are returned before
/// anything is fitted.
pub fn run_all_models(
    data: &Dataset,
    label: &str,
    evaluators: &[Box<dyn Evaluator>],
    config: &HarnessConfig,
) -> Result<(ResultsTable, OuterFoldSet)> {
    config.validate()?;
    let ctx = EvalContext::new(config.clone());
    for evaluator in evaluators {
        evaluator.validate(&ctx)?;
    }

    let folds = build_outer_folds(
        data.n_samples(),
        data.groups(),
        config.n_splits,
        config.random_state,
    )?;
    info!(
        label,
        rows = data.n_samples(),
        units = data.n_units(),
        folds = folds.len(),
        grouped = folds.is_grouped(),
        "outer folds built"
    );
    check_training_units(data, &folds, evaluators, &ctx)?;

    let mut table = ResultsTable::new();
    for evaluator in evaluators {
        let start = Instant::now();
        let outcome = match evaluator.evaluate(data, &folds, &ctx) {
            Ok(result) => {
                info!(
                    label,
                    family = evaluator.name(),
                    mean = result.mean(),
                    std = result.std(),
                    secs = start.elapsed().as_secs_f64(),
                    "family evaluated"
                );
                FamilyOutcome::Completed(result)
            }
            Err(e) => {
                warn!(label, family = evaluator.name(), error = %e, "family failed");
                FamilyOutcome::Failed { error: e.to_string() }
            }
        };
        table.push(evaluator.name(), outcome);
    }

    Ok((table, folds))
}

/// Every outer training fold must hold enough units for the inner splitting
/// of every family
fn check_training_units(
    data: &Dataset,
    folds: &OuterFoldSet,
    evaluators: &[Box<dyn Evaluator>],
    ctx: &EvalContext,
) -> Result<()> {
    let unit = if data.groups().is_some() { "groups" } else { "rows" };
    for split in folds.iter() {
        let units = match data.groups() {
            Some(groups) => split
                .train_indices
                .iter()
                .map(|&i| groups[i])
                .collect::<BTreeSet<_>>()
                .len(),
            None => split.train_indices.len(),
        };
        for evaluator in evaluators {
            let required = evaluator.min_training_units(ctx);
            if units < required {
                return Err(HarnessError::ConfigError(format!(
                    "outer fold {} trains on {} {} but '{}' needs at least {}",
                    split.fold_idx,
                    units,
                    unit,
                    evaluator.name(),
                    required
                )));
            }
        }
    }
    Ok(())
}

/// Text report: header, one line per family, closing rule
pub fn render_report(label: &str, metric: Metric, table: &ResultsTable) -> String {
    let header = format!("{} {}:", label, metric.display_name());
    let mut lines = Vec::with_capacity(table.len());
    for (name, outcome) in table.iter() {
        lines.push(match outcome {
            FamilyOutcome::Completed(r) => format!(
                "{} (mean | standard deviation) -- {:.2} | {:.2}",
                name,
                r.mean(),
                r.std()
            ),
            FamilyOutcome::Failed { error } => format!("{} -- FAILED: {}", name, error),
        });
    }

    let width = lines
        .iter()
        .map(|l| l.chars().count())
        .chain(std::iter::once(header.chars().count()))
        .max()
        .unwrap_or(0);
    let rule = "-".repeat(width);

    let mut out = String::new();
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", rule);
    for line in &lines {
        let _ = writeln!(out, "{}", line);
    }
    let _ = writeln!(out, "{}", rule);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{FittedArtifact, FoldResult};
    use crate::optimizer::ParamSet;
    use crate::training::{ConstantStrategy, EstimatorKind, PipelineSpec};
    use ndarray::{array, Array1, Array2};

    fn fold(idx: usize, score: f64) -> FoldResult {
        let fitted = PipelineSpec::new(EstimatorKind::Constant(ConstantStrategy::Mean))
            .fit(&Array2::zeros((2, 1)), &array![1.0, 2.0], &ParamSet::new())
            .unwrap();
        FoldResult {
            fold_idx: idx,
            score,
            artifact: FittedArtifact::Pipeline(fitted),
            params: ParamSet::new(),
            best_inner_error: None,
            n_train: 2,
            n_test: 1,
            predictions: Array1::zeros(1),
            fit_duration_secs: 0.0,
            search_trials: None,
        }
    }

    #[test]
    fn test_report_format() {
        let mut table = ResultsTable::new();
        table.push(
            "Constant Regressor",
            FamilyOutcome::Completed(EvaluationResult::new(
                "Constant Regressor",
                vec![fold(0, 1.0), fold(1, 3.0)],
            )),
        );
        table.push("LightGBM", FamilyOutcome::Failed { error: "boom".to_string() });

        let report = render_report("Raw Mullen (6m)", Metric::MeanAbsoluteError, &table);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "Raw Mullen (6m) Mean Absolute Error:");
        assert!(lines[1].chars().all(|c| c == '-'));
        assert_eq!(
            lines[2],
            "Constant Regressor (mean | standard deviation) -- 2.00 | 1.00"
        );
        assert_eq!(lines[3], "LightGBM -- FAILED: boom");
        assert_eq!(lines[4], lines[1]);
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn test_table_keeps_insertion_order() {
        let mut table = ResultsTable::new();
        table.push("b", FamilyOutcome::Failed { error: "x".to_string() });
        table.push("a", FamilyOutcome::Failed { error: "y".to_string() });
        let names: Vec<&str> = table.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(table.get("a").unwrap().is_failed());
        assert!(table.get("c").is_none());
    }
}
