//! Default model families
//!
//! The registry evaluated by the CLI, in report order: a constant baseline,
//! three regularized linear/kernel pipelines with grid search, gradient
//! boosting with TPE search, and an automated ensemble.

use crate::config::HarnessConfig;
use crate::evaluation::{
    AutomatedEnsembleEvaluator, EnsembleCandidate, Evaluator, PipelineGridEvaluator, SearchBudget,
    SequentialSearchEvaluator,
};
use crate::optimizer::{ParamGrid, ParamSet, ParameterValue, SearchSpace};
use crate::preprocessing::{ImputeStrategy, PreprocessStep, ScalerType};
use crate::training::{
    ConstantStrategy, EstimatorKind, KernelType, LightGBMConfig, Objective, PipelineSpec,
    SVMConfig,
};

pub const CONSTANT: &str = "Constant Regressor";
pub const RIDGE: &str = "Ridge Regression";
pub const ELASTIC_NET: &str = "ElasticNet";
pub const SVR: &str = "Support Vector Regression";
pub const LIGHTGBM: &str = "LightGBM";
pub const AUTO_ENSEMBLE: &str = "AutoEnsemble";

/// `10^start ..= 10^end` with `n` log-spaced points
fn logspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![10f64.powf(start)];
    }
    let step = (end - start) / (n - 1) as f64;
    (0..n).map(|i| 10f64.powf(start + step * i as f64)).collect()
}

fn params(pairs: &[(&str, ParameterValue)]) -> ParamSet {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Median imputation followed by standardization, then `estimator`
pub fn scaled_pipeline(estimator: EstimatorKind) -> PipelineSpec {
    PipelineSpec::new(estimator)
        .with_step(PreprocessStep::Impute(ImputeStrategy::Median))
        .with_step(PreprocessStep::Scale(ScalerType::Standard))
}

fn lightgbm_l1() -> LightGBMConfig {
    LightGBMConfig {
        objective: Objective::L1,
        ..LightGBMConfig::default()
    }
}

/// Trees only need missing values filled
pub fn lightgbm_pipeline(config: LightGBMConfig) -> PipelineSpec {
    PipelineSpec::new(EstimatorKind::LightGbm(config))
        .with_step(PreprocessStep::Impute(ImputeStrategy::Median))
}

pub fn constant_family() -> PipelineGridEvaluator {
    PipelineGridEvaluator::new(
        CONSTANT,
        PipelineSpec::new(EstimatorKind::Constant(ConstantStrategy::Mean)),
        ParamGrid::new(),
    )
}

pub fn ridge_family() -> PipelineGridEvaluator {
    PipelineGridEvaluator::new(
        RIDGE,
        scaled_pipeline(EstimatorKind::Ridge { alpha: 1.0 }),
        ParamGrid::new().add("alpha", logspace(-3.0, 3.0, 7)),
    )
}

/// Only `alpha` is searched; `l1_ratio` stays at 0.5
pub fn elastic_net_family() -> PipelineGridEvaluator {
    PipelineGridEvaluator::new(
        ELASTIC_NET,
        scaled_pipeline(EstimatorKind::ElasticNet {
            alpha: 1.0,
            l1_ratio: 0.5,
        }),
        ParamGrid::new().add("alpha", logspace(-3.0, 1.0, 5)),
    )
}

pub fn svr_family() -> PipelineGridEvaluator {
    PipelineGridEvaluator::new(
        SVR,
        scaled_pipeline(EstimatorKind::Svr(SVMConfig::default())),
        ParamGrid::new().add("c", logspace(-2.0, 2.0, 5)),
    )
}

pub fn lightgbm_search_space() -> SearchSpace {
    SearchSpace::new()
        .log_float("learning_rate", 0.01, 0.3)
        .log_int("n_estimators", 20, 300)
        .log_int("max_leaves", 4, 64)
        .int("max_depth", 2, 8)
        .log_int("min_child_samples", 2, 40)
        .log_float("reg_lambda", 1e-3, 10.0)
        .log_float("reg_alpha", 1e-3, 10.0)
        .float("subsample", 0.5, 1.0)
        .float("colsample_bytree", 0.5, 1.0)
}

pub fn lightgbm_family(config: &HarnessConfig) -> SequentialSearchEvaluator {
    SequentialSearchEvaluator::new(
        LIGHTGBM,
        lightgbm_pipeline(lightgbm_l1()),
        lightgbm_search_space(),
        SearchBudget::from_config(config),
    )
}

/// Fixed configurations the ensemble search fits, cheapest first
pub fn ensemble_candidates() -> Vec<EnsembleCandidate> {
    let mut candidates = vec![EnsembleCandidate::new(
        "constant",
        PipelineSpec::new(EstimatorKind::Constant(ConstantStrategy::Median)),
        ParamSet::new(),
    )];

    for alpha in [0.1, 10.0] {
        candidates.push(EnsembleCandidate::new(
            format!("ridge(alpha={})", alpha),
            scaled_pipeline(EstimatorKind::Ridge { alpha }),
            ParamSet::new(),
        ));
    }
    candidates.push(EnsembleCandidate::new(
        "elastic_net(alpha=0.1)",
        scaled_pipeline(EstimatorKind::ElasticNet {
            alpha: 0.1,
            l1_ratio: 0.5,
        }),
        ParamSet::new(),
    ));
    candidates.push(EnsembleCandidate::new(
        "svr(linear)",
        scaled_pipeline(EstimatorKind::Svr(SVMConfig {
            kernel: KernelType::Linear,
            ..SVMConfig::default()
        })),
        ParamSet::new(),
    ));
    for c in [1.0, 10.0] {
        candidates.push(EnsembleCandidate::new(
            format!("svr(rbf, c={})", c),
            scaled_pipeline(EstimatorKind::Svr(SVMConfig::default())),
            params(&[("c", ParameterValue::Float(c))]),
        ));
    }
    candidates.push(EnsembleCandidate::new(
        "lightgbm(l2)",
        lightgbm_pipeline(LightGBMConfig::default()),
        params(&[("min_child_samples", ParameterValue::Int(5))]),
    ));
    candidates.push(EnsembleCandidate::new(
        "lightgbm(l1)",
        lightgbm_pipeline(lightgbm_l1()),
        params(&[("min_child_samples", ParameterValue::Int(5))]),
    ));
    candidates.push(EnsembleCandidate::new(
        "lightgbm(l2, slow)",
        lightgbm_pipeline(LightGBMConfig::default()),
        params(&[
            ("learning_rate", ParameterValue::Float(0.03)),
            ("n_estimators", ParameterValue::Int(300)),
            ("max_leaves", ParameterValue::Int(8)),
            ("subsample", ParameterValue::Float(0.8)),
            ("colsample_bytree", ParameterValue::Float(0.8)),
        ]),
    ));
    candidates
}

pub fn ensemble_family(config: &HarnessConfig) -> AutomatedEnsembleEvaluator {
    AutomatedEnsembleEvaluator::new(
        AUTO_ENSEMBLE,
        ensemble_candidates(),
        config.ensemble_time_budget_secs,
    )
}

/// Every default family in report order
pub fn default_registry(config: &HarnessConfig) -> Vec<Box<dyn Evaluator>> {
    vec![
        Box::new(constant_family()),
        Box::new(ridge_family()),
        Box::new(elastic_net_family()),
        Box::new(svr_family()),
        Box::new(lightgbm_family(config)),
        Box::new(ensemble_family(config)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::EvalContext;

    #[test]
    fn test_registry_order() {
        let config = HarnessConfig::default();
        let names: Vec<String> = default_registry(&config)
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec![CONSTANT, RIDGE, ELASTIC_NET, SVR, LIGHTGBM, AUTO_ENSEMBLE]);
    }

    #[test]
    fn test_default_families_validate() {
        let config = HarnessConfig::default();
        let ctx = EvalContext::new(config.clone());
        for evaluator in default_registry(&config) {
            evaluator.validate(&ctx).unwrap();
        }
    }

    #[test]
    fn test_logspace() {
        let values = logspace(-1.0, 1.0, 3);
        assert!((values[0] - 0.1).abs() < 1e-12);
        assert!((values[1] - 1.0).abs() < 1e-12);
        assert!((values[2] - 10.0).abs() < 1e-12);
    }
}
