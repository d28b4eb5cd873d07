//! nestcv - Nested cross-validation harness for regression model families
//!
//! The crate compares model families (a trivial baseline, regularized linear
//! and kernel models with grid search, gradient boosting with sequential
//! model-based search, and an automated ensemble) on identical outer folds.
//!
//! # Modules
//!
//! ## Core
//! - [`training::cross_validation`] - Outer and inner fold construction
//! - [`evaluation`] - Evaluator contract and the three evaluator families
//! - [`harness`] - Run orchestration, results table, text report
//!
//! ## Model building
//! - [`preprocessing`] - Imputation and scaling pipeline steps
//! - [`training`] - Regressors and fitted pipelines
//! - [`optimizer`] - Grids, search spaces, TPE sampler, sequential study
//! - [`ensemble`] - Greedy ensemble selection and weighted averaging
//! - [`families`] - Default model-family registry
//!
//! ## Support
//! - [`config`] - Run configuration
//! - [`data`] - In-memory dataset
//! - [`utils`] - Manifest and CSV loading
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;
pub mod data;

// Core ML modules
pub mod preprocessing;
pub mod training;
pub mod optimizer;
pub mod ensemble;

// Evaluation
pub mod evaluation;
pub mod families;
pub mod harness;

// Services
pub mod cli;
pub mod utils;

pub use error::{HarnessError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::HarnessConfig;
    pub use crate::data::Dataset;
    pub use crate::error::{HarnessError, Result};
    pub use crate::evaluation::{
        AutomatedEnsembleEvaluator, EnsembleCandidate, EvalContext, EvaluationResult, Evaluator,
        FittedArtifact, FoldResult, LearningTask, Metric, PipelineGridEvaluator, SearchBudget,
        SequentialSearchEvaluator,
    };
    pub use crate::families::default_registry;
    pub use crate::harness::{render_report, run_all_models, FamilyOutcome, ResultsTable, RunRecord};
    pub use crate::optimizer::{ParamGrid, ParamSet, ParameterValue, SearchSpace};
    pub use crate::preprocessing::{ImputeStrategy, PreprocessStep, ScalerType};
    pub use crate::training::{
        build_outer_folds, CVSplit, ConstantStrategy, EstimatorKind, OuterFoldSet, PipelineSpec,
    };
}
