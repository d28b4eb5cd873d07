//! Model training module
//!
//! Provides the regressors evaluated by the harness:
//! - Constant baseline (mean / median)
//! - Ridge and elastic net
//! - Epsilon-insensitive support vector regression
//! - LightGBM-style leaf-wise gradient boosting
//!
//! plus the cross-validation splitter and the pipeline layer that chains
//! preprocessing steps with an estimator.

mod models;
pub mod baseline;
pub mod cross_validation;
pub mod lightgbm;
pub mod linear_models;
pub mod pipeline;
pub mod svm;

pub use baseline::{ConstantRegressor, ConstantStrategy};
pub use cross_validation::{
    build_outer_folds, holdout_split, validate_partition, CVSplit, CVStrategy, CrossValidator,
    OuterFoldSet,
};
pub use lightgbm::{LightGBMConfig, LightGBMRegressor, Objective};
pub use linear_models::{ElasticNetRegression, RidgeRegression};
pub use models::Regressor;
pub use pipeline::{EstimatorKind, FittedPipeline, PipelineSpec, TrainedModel};
pub use svm::{KernelType, SVMConfig, SVMRegressor};
