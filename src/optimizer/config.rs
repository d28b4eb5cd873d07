//! Optimization configuration

use super::SamplerType;
use serde::{Deserialize, Serialize};

/// Configuration for one sequential optimization run. The objective is
/// always minimized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Maximum number of trials to run
    pub n_trials: usize,

    /// Maximum time in seconds; checked before each new trial
    pub timeout_secs: Option<f64>,

    /// Sampler type
    pub sampler: SamplerType,

    /// Number of initial random samples before the model-based sampler
    pub n_startup_trials: usize,

    /// Random seed
    pub random_state: Option<u64>,

    /// Stop after this many trials without improvement
    pub early_stopping_patience: Option<usize>,

    /// Minimum improvement to reset the patience counter
    pub min_improvement: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            n_trials: 50,
            timeout_secs: None,
            sampler: SamplerType::TPE,
            n_startup_trials: 10,
            random_state: Some(42),
            early_stopping_patience: None,
            min_improvement: 1e-9,
        }
    }
}

impl OptimizationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_trials(mut self, n: usize) -> Self {
        self.n_trials = n;
        self
    }

    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_sampler(mut self, sampler: SamplerType) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_n_startup_trials(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.early_stopping_patience = Some(patience);
        self
    }
}
