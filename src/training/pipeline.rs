//! Declarative estimators and preprocessing pipelines
//!
//! A [`PipelineSpec`] is immutable and shared between folds; each fit builds
//! a fresh estimator from it and a concrete [`ParamSet`].

use super::baseline::{ConstantRegressor, ConstantStrategy};
use super::lightgbm::{LightGBMConfig, LightGBMRegressor, Objective};
use super::linear_models::{ElasticNetRegression, RidgeRegression};
use super::models::Regressor;
use super::svm::{KernelType, SVMConfig, SVMRegressor};
use crate::error::{HarnessError, Result};
use crate::optimizer::{ParamSet, ParameterValue};
use crate::preprocessing::{FittedStep, PreprocessStep};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Estimator family with its default settings. Hyperparameters present in a
/// [`ParamSet`] override the defaults at build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EstimatorKind {
    Constant(ConstantStrategy),
    Ridge { alpha: f64 },
    ElasticNet { alpha: f64, l1_ratio: f64 },
    Svr(SVMConfig),
    LightGbm(LightGBMConfig),
}

impl EstimatorKind {
    pub fn name(&self) -> &'static str {
        match self {
            EstimatorKind::Constant(_) => "constant",
            EstimatorKind::Ridge { .. } => "ridge",
            EstimatorKind::ElasticNet { .. } => "elastic_net",
            EstimatorKind::Svr(_) => "svr",
            EstimatorKind::LightGbm(_) => "lightgbm",
        }
    }

    /// Hyperparameter names accepted by [`EstimatorKind::build`]
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            EstimatorKind::Constant(_) => &["strategy"],
            EstimatorKind::Ridge { .. } => &["alpha"],
            EstimatorKind::ElasticNet { .. } => &["alpha", "l1_ratio", "max_iter"],
            EstimatorKind::Svr(_) => &["c", "epsilon", "gamma", "kernel", "tol", "max_iter"],
            EstimatorKind::LightGbm(_) => &[
                "objective",
                "learning_rate",
                "n_estimators",
                "max_leaves",
                "max_depth",
                "min_child_samples",
                "reg_lambda",
                "reg_alpha",
                "subsample",
                "colsample_bytree",
                "random_state",
            ],
        }
    }

    /// Reject hyperparameter names this estimator does not understand
    pub fn check_param_names<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let known = self.param_names();
        for name in names {
            if !known.contains(&name) {
                return Err(HarnessError::ConfigError(format!(
                    "unknown hyperparameter '{}' for {} (expected one of {:?})",
                    name,
                    self.name(),
                    known
                )));
            }
        }
        Ok(())
    }

    /// Build an unfitted estimator with `params` applied
    pub fn build(&self, params: &ParamSet) -> Result<TrainedModel> {
        self.check_param_names(params.keys().map(String::as_str))?;

        let model = match self {
            EstimatorKind::Constant(strategy) => {
                let strategy = match get_str(params, "strategy")? {
                    Some(s) => ConstantStrategy::from_name(s)?,
                    None => *strategy,
                };
                TrainedModel::Constant(ConstantRegressor::new(strategy))
            }
            EstimatorKind::Ridge { alpha } => {
                let alpha = get_f64(params, "alpha")?.unwrap_or(*alpha);
                TrainedModel::Ridge(RidgeRegression::new(alpha))
            }
            EstimatorKind::ElasticNet { alpha, l1_ratio } => {
                let mut model = ElasticNetRegression::new(
                    get_f64(params, "alpha")?.unwrap_or(*alpha),
                    get_f64(params, "l1_ratio")?.unwrap_or(*l1_ratio),
                );
                if let Some(max_iter) = get_usize(params, "max_iter")? {
                    model = model.with_max_iter(max_iter);
                }
                TrainedModel::ElasticNet(model)
            }
            EstimatorKind::Svr(base) => {
                let mut config = base.clone();
                if let Some(c) = get_f64(params, "c")? {
                    config.c = c;
                }
                if let Some(eps) = get_f64(params, "epsilon")? {
                    config.epsilon = eps;
                }
                if let Some(gamma) = get_f64(params, "gamma")? {
                    config.gamma = Some(gamma);
                }
                if let Some(tol) = get_f64(params, "tol")? {
                    config.tol = tol;
                }
                if let Some(max_iter) = get_usize(params, "max_iter")? {
                    config.max_iter = max_iter;
                }
                if let Some(kernel) = get_str(params, "kernel")? {
                    config.kernel = match kernel {
                        "linear" => KernelType::Linear,
                        "rbf" => KernelType::RBF,
                        other => {
                            return Err(HarnessError::InvalidParameter {
                                name: "kernel".to_string(),
                                value: other.to_string(),
                                reason: "expected 'linear' or 'rbf'".to_string(),
                            })
                        }
                    };
                }
                TrainedModel::Svr(SVMRegressor::new(config))
            }
            EstimatorKind::LightGbm(base) => {
                let mut config = base.clone();
                if let Some(objective) = get_str(params, "objective")? {
                    config.objective = Objective::from_name(objective)?;
                }
                if let Some(v) = get_f64(params, "learning_rate")? {
                    config.learning_rate = v;
                }
                if let Some(v) = get_usize(params, "n_estimators")? {
                    config.n_estimators = v;
                }
                if let Some(v) = get_usize(params, "max_leaves")? {
                    config.max_leaves = v;
                }
                if let Some(v) = get_usize(params, "max_depth")? {
                    config.max_depth = Some(v);
                }
                if let Some(v) = get_usize(params, "min_child_samples")? {
                    config.min_child_samples = v;
                }
                if let Some(v) = get_f64(params, "reg_lambda")? {
                    config.reg_lambda = v;
                }
                if let Some(v) = get_f64(params, "reg_alpha")? {
                    config.reg_alpha = v;
                }
                if let Some(v) = get_f64(params, "subsample")? {
                    config.subsample = v;
                }
                if let Some(v) = get_f64(params, "colsample_bytree")? {
                    config.colsample_bytree = v;
                }
                if let Some(v) = get_usize(params, "random_state")? {
                    config.random_state = Some(v as u64);
                }
                TrainedModel::LightGbm(LightGBMRegressor::new(config))
            }
        };
        Ok(model)
    }
}

fn wrong_type(name: &str, value: &ParameterValue, expected: &str) -> HarnessError {
    HarnessError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: format!("expected {}", expected),
    }
}

fn get_f64(params: &ParamSet, name: &str) -> Result<Option<f64>> {
    params
        .get(name)
        .map(|v| v.as_float().ok_or_else(|| wrong_type(name, v, "a number")))
        .transpose()
}

fn get_usize(params: &ParamSet, name: &str) -> Result<Option<usize>> {
    params
        .get(name)
        .map(|v| {
            v.as_int()
                .filter(|i| *i >= 0)
                .map(|i| i as usize)
                .ok_or_else(|| wrong_type(name, v, "a non-negative integer"))
        })
        .transpose()
}

fn get_str<'a>(params: &'a ParamSet, name: &str) -> Result<Option<&'a str>> {
    params
        .get(name)
        .map(|v| v.as_string().ok_or_else(|| wrong_type(name, v, "a string")))
        .transpose()
}

/// Fitted or unfitted estimator of any supported family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    Constant(ConstantRegressor),
    Ridge(RidgeRegression),
    ElasticNet(ElasticNetRegression),
    Svr(SVMRegressor),
    LightGbm(LightGBMRegressor),
}

impl TrainedModel {
    fn as_regressor(&self) -> &dyn Regressor {
        match self {
            TrainedModel::Constant(m) => m,
            TrainedModel::Ridge(m) => m,
            TrainedModel::ElasticNet(m) => m,
            TrainedModel::Svr(m) => m,
            TrainedModel::LightGbm(m) => m,
        }
    }

    fn as_regressor_mut(&mut self) -> &mut dyn Regressor {
        match self {
            TrainedModel::Constant(m) => m,
            TrainedModel::Ridge(m) => m,
            TrainedModel::ElasticNet(m) => m,
            TrainedModel::Svr(m) => m,
            TrainedModel::LightGbm(m) => m,
        }
    }
}

impl Regressor for TrainedModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.as_regressor_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.as_regressor().predict(x)
    }

    fn is_fitted(&self) -> bool {
        self.as_regressor().is_fitted()
    }
}

/// Preprocessing steps followed by an estimator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub steps: Vec<PreprocessStep>,
    pub estimator: EstimatorKind,
}

impl PipelineSpec {
    pub fn new(estimator: EstimatorKind) -> Self {
        Self {
            steps: Vec::new(),
            estimator,
        }
    }

    pub fn with_step(mut self, step: PreprocessStep) -> Self {
        self.steps.push(step);
        self
    }

    /// `params` with `random_state` set to `seed` when the estimator is
    /// randomized and `params` leaves the seed open
    pub fn seeded_params(&self, params: &ParamSet, seed: u64) -> ParamSet {
        let mut seeded = params.clone();
        if self.estimator.param_names().contains(&"random_state") && !seeded.contains_key("random_state") {
            // stored as a non-negative Int
            let value = (seed & i64::MAX as u64) as i64;
            seeded.insert("random_state".to_string(), ParameterValue::Int(value));
        }
        seeded
    }

    /// Fit every step and the estimator on `(x, y)` with `params`
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, params: &ParamSet) -> Result<FittedPipeline> {
        let mut model = self.estimator.build(params)?;

        let mut fitted_steps = Vec::with_capacity(self.steps.len());
        let mut current = x.clone();
        for step in &self.steps {
            let (fitted, out) = step.fit_transform(&current)?;
            fitted_steps.push(fitted);
            current = out;
        }

        model.fit(&current, y)?;
        Ok(FittedPipeline {
            steps: fitted_steps,
            model,
            params: params.clone(),
        })
    }
}

/// A pipeline fitted on one training subset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedPipeline {
    steps: Vec<FittedStep>,
    model: TrainedModel,
    params: ParamSet,
}

impl FittedPipeline {
    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn model(&self) -> &TrainedModel {
        &self.model
    }

    /// Transform `x` through the fitted steps and predict
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mut current = x.clone();
        for step in &self.steps {
            current = step.transform(&current)?;
        }
        self.model.predict(&current)
    }
}
