//! Harness configuration
//!
//! Every knob that drives a run (fold counts, seed, search budgets, metric)
//! lives in [`HarnessConfig`], which is passed explicitly to the orchestrator
//! and to every evaluator.

use crate::error::{HarnessError, Result};
use crate::evaluation::{LearningTask, Metric};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for one nested cross-validation run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Number of outer folds
    pub n_splits: usize,

    /// Number of inner folds used for hyperparameter selection
    pub inner_splits: usize,

    /// Seed for every pseudo-random decision of the run
    pub random_state: u64,

    /// Shuffle rows before assigning ungrouped folds
    pub shuffle: bool,

    /// Learning task
    pub task: LearningTask,

    /// Error metric reported and optimized
    pub metric: Metric,

    /// Maximum number of sequential-search trials per outer fold
    pub n_trials: usize,

    /// Optional wall-clock budget for one sequential search, in seconds
    pub search_timeout_secs: Option<f64>,

    /// Random trials before the model-based sampler takes over
    pub n_startup_trials: usize,

    /// Time budget handed to the automated ensemble search per outer fold
    pub ensemble_time_budget_secs: f64,

    /// Optional ceiling on the total ensemble search time of a run
    pub run_time_limit_secs: Option<f64>,

    /// Evaluate outer folds and grid candidates in parallel
    pub parallel: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            n_splits: 5,
            inner_splits: 5,
            random_state: 42,
            shuffle: true,
            task: LearningTask::Regression,
            metric: Metric::MeanAbsoluteError,
            n_trials: 50,
            search_timeout_secs: None,
            n_startup_trials: 10,
            ensemble_time_budget_secs: 60.0,
            run_time_limit_secs: None,
            parallel: true,
        }
    }
}

impl HarnessConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        Ok(config)
    }

    pub fn with_n_splits(mut self, n: usize) -> Self {
        self.n_splits = n;
        self
    }

    pub fn with_inner_splits(mut self, n: usize) -> Self {
        self.inner_splits = n;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_search_timeout(mut self, secs: f64) -> Self {
        self.search_timeout_secs = Some(secs);
        self
    }

    pub fn with_n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_ensemble_time_budget(mut self, secs: f64) -> Self {
        self.ensemble_time_budget_secs = secs;
        self
    }

    pub fn with_run_time_limit(mut self, secs: f64) -> Self {
        self.run_time_limit_secs = Some(secs);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check the configuration before any fitting starts
    pub fn validate(&self) -> Result<()> {
        if self.n_splits < 2 {
            return Err(HarnessError::ConfigError(format!(
                "n_splits must be at least 2, got {}",
                self.n_splits
            )));
        }
        if self.inner_splits < 2 {
            return Err(HarnessError::ConfigError(format!(
                "inner_splits must be at least 2, got {}",
                self.inner_splits
            )));
        }
        if self.n_trials == 0 {
            return Err(HarnessError::BudgetExceeded(
                "n_trials must allow at least one trial".to_string(),
            ));
        }
        if let Some(t) = self.search_timeout_secs {
            if !(t.is_finite() && t > 0.0) {
                return Err(HarnessError::BudgetExceeded(format!(
                    "search_timeout_secs must be positive, got {}",
                    t
                )));
            }
        }
        if let Some(limit) = self.run_time_limit_secs {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(HarnessError::BudgetExceeded(format!(
                    "run_time_limit_secs must be positive, got {}",
                    limit
                )));
            }
        }
        Ok(())
    }

    /// Seed for the inner splitting of one outer fold
    pub(crate) fn inner_seed(&self, fold_idx: usize) -> u64 {
        self.random_state
            .wrapping_mul(31)
            .wrapping_add(1_000 + fold_idx as u64)
    }

    /// Seed for the sequential search / ensemble search of one outer fold
    pub(crate) fn search_seed(&self, fold_idx: usize) -> u64 {
        self.random_state.wrapping_add(fold_idx as u64)
    }
}
