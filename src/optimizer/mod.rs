//! Hyperparameter search
//!
//! - Finite grids ([`ParamGrid`]) for exhaustive search
//! - Search spaces ([`SearchSpace`]) with random and TPE samplers
//! - A sequential optimizer ([`SequentialOptimizer`]) with trial, time and
//!   patience budgets

mod config;
mod optimizer;
mod samplers;
mod search_space;

pub use config::OptimizationConfig;
pub use optimizer::{SequentialOptimizer, StopReason, Study, TrialResult};
pub use samplers::{create_sampler, RandomSampler, Sampler, SamplerType, TPESampler};
pub use search_space::{
    format_params, ParamGrid, ParamSet, Parameter, ParameterType, ParameterValue, SearchSpace,
};
