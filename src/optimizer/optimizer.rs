//! Sequential model-based optimizer

use super::{
    config::OptimizationConfig,
    samplers::{create_sampler, Sampler},
    search_space::{format_params, ParamSet, SearchSpace},
};
use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Result of a single trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: usize,
    pub params: ParamSet,
    /// Objective value (minimized)
    pub value: f64,
    pub duration_secs: f64,
}

/// Why a study stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    TrialBudget,
    Timeout,
    EarlyStopping,
}

/// Study containing all trials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Study {
    pub trials: Vec<TrialResult>,
    pub best_trial_idx: Option<usize>,
    pub total_duration_secs: f64,
    pub stop_reason: Option<StopReason>,
}

impl Default for Study {
    fn default() -> Self {
        Self::new()
    }
}

impl Study {
    pub fn new() -> Self {
        Self {
            trials: Vec::new(),
            best_trial_idx: None,
            total_duration_secs: 0.0,
            stop_reason: None,
        }
    }

    /// Get the best trial
    pub fn best_trial(&self) -> Option<&TrialResult> {
        self.best_trial_idx.map(|idx| &self.trials[idx])
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().map(|t| t.value)
    }

    pub fn best_params(&self) -> Option<&ParamSet> {
        self.best_trial().map(|t| &t.params)
    }

    /// Add a trial result. Ties keep the earlier trial.
    pub fn add_trial(&mut self, result: TrialResult) {
        let idx = self.trials.len();
        let is_better = match self.best_value() {
            None => true,
            Some(best) => result.value < best,
        };
        if is_better {
            self.best_trial_idx = Some(idx);
        }
        self.trials.push(result);
    }

    /// `(params, value)` pairs in trial order, as consumed by samplers
    pub fn history(&self) -> Vec<(ParamSet, f64)> {
        self.trials.iter().map(|t| (t.params.clone(), t.value)).collect()
    }
}

/// Sequential optimizer: proposes one configuration at a time from all
/// previous trials and stops on the trial budget, the optional timeout, or
/// the optional patience.
pub struct SequentialOptimizer {
    config: OptimizationConfig,
    search_space: SearchSpace,
    sampler: Box<dyn Sampler>,
    study: Study,
}

impl SequentialOptimizer {
    pub fn new(config: OptimizationConfig, search_space: SearchSpace) -> Self {
        let sampler = create_sampler(config.sampler, config.random_state, config.n_startup_trials);
        Self {
            config,
            search_space,
            sampler,
            study: Study::new(),
        }
    }

    /// Run optimization. An objective error aborts the study and is returned
    /// unchanged; a non-finite objective value is an error as well.
    pub fn optimize<F>(&mut self, mut objective: F) -> Result<&Study>
    where
        F: FnMut(&ParamSet) -> Result<f64>,
    {
        if self.config.n_trials == 0 {
            return Err(HarnessError::BudgetExceeded(
                "sequential search needs at least one trial".to_string(),
            ));
        }

        let start = Instant::now();
        let mut trials_without_improvement = 0;
        let mut history: Vec<(ParamSet, f64)> = self.study.history();
        let mut stop_reason = StopReason::TrialBudget;

        for trial_id in 0..self.config.n_trials {
            // the first trial always runs so a best configuration exists
            if trial_id > 0 {
                if let Some(t) = self.config.timeout_secs {
                    if start.elapsed().as_secs_f64() > t {
                        debug!(trials = trial_id, "search timeout reached");
                        stop_reason = StopReason::Timeout;
                        break;
                    }
                }
                if let Some(p) = self.config.early_stopping_patience {
                    if trials_without_improvement >= p {
                        debug!(trials = trial_id, patience = p, "search stopped early");
                        stop_reason = StopReason::EarlyStopping;
                        break;
                    }
                }
            }

            let trial_start = Instant::now();
            let params = self.sampler.sample(&self.search_space, &history);
            let value = objective(&params)?;
            if !value.is_finite() {
                return Err(HarnessError::ComputationError(format!(
                    "objective returned {} for {}",
                    value,
                    format_params(&params)
                )));
            }

            let improved = match self.study.best_value() {
                None => true,
                Some(best) => value < best - self.config.min_improvement,
            };
            if improved {
                trials_without_improvement = 0;
            } else {
                trials_without_improvement += 1;
            }

            debug!(
                trial = trial_id,
                value,
                params = %format_params(&params),
                "trial finished"
            );

            history.push((params.clone(), value));
            self.study.add_trial(TrialResult {
                trial_id,
                params,
                value,
                duration_secs: trial_start.elapsed().as_secs_f64(),
            });
        }

        self.study.total_duration_secs = start.elapsed().as_secs_f64();
        self.study.stop_reason = Some(stop_reason);
        Ok(&self.study)
    }

    pub fn study(&self) -> &Study {
        &self.study
    }

    /// Consume the optimizer and keep the study
    pub fn into_study(self) -> Study {
        self.study
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::SamplerType;

    fn quadratic_objective(params: &ParamSet) -> Result<f64> {
        let x = params.get("x").and_then(|p| p.as_float()).unwrap_or(0.0);
        let y = params.get("y").and_then(|p| p.as_float()).unwrap_or(0.0);
        Ok(x * x + y * y)
    }

    #[test]
    fn test_optimization_respects_trial_budget() {
        let config = OptimizationConfig::new().with_n_trials(20).with_n_startup_trials(5);
        let space = SearchSpace::new().float("x", -5.0, 5.0).float("y", -5.0, 5.0);

        let mut optimizer = SequentialOptimizer::new(config, space);
        let study = optimizer.optimize(quadratic_objective).unwrap();

        assert_eq!(study.trials.len(), 20);
        assert_eq!(study.stop_reason, Some(StopReason::TrialBudget));
        assert!(study.best_value().unwrap() < 25.0);
    }

    #[test]
    fn test_same_seed_same_trials() {
        let run = || {
            let config = OptimizationConfig::new().with_n_trials(15).with_random_state(9);
            let space = SearchSpace::new().float("x", -5.0, 5.0);
            let mut optimizer = SequentialOptimizer::new(config, space);
            optimizer.optimize(quadratic_objective).unwrap();
            optimizer.into_study()
        };
        let a: Vec<f64> = run().trials.iter().map(|t| t.value).collect();
        let b: Vec<f64> = run().trials.iter().map(|t| t.value).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_early_stopping() {
        let config = OptimizationConfig::new()
            .with_n_trials(100)
            .with_sampler(SamplerType::Random)
            .with_patience(5);
        let space = SearchSpace::new().float("x", 0.0, 1.0);

        let mut optimizer = SequentialOptimizer::new(config, space);
        let study = optimizer.optimize(|_| Ok(1.0)).unwrap();

        assert_eq!(study.trials.len(), 6);
        assert_eq!(study.stop_reason, Some(StopReason::EarlyStopping));
    }

    #[test]
    fn test_objective_error_propagates() {
        let config = OptimizationConfig::new().with_n_trials(10);
        let space = SearchSpace::new().float("x", 0.0, 1.0);
        let mut optimizer = SequentialOptimizer::new(config, space);

        let err = optimizer
            .optimize(|_| Err(HarnessError::ComputationError("boom".into())))
            .unwrap_err();
        assert!(matches!(err, HarnessError::ComputationError(_)));
    }

    #[test]
    fn test_zero_trials_rejected() {
        let config = OptimizationConfig::new().with_n_trials(0);
        let mut optimizer = SequentialOptimizer::new(config, SearchSpace::new());
        assert!(matches!(
            optimizer.optimize(quadratic_objective),
            Err(HarnessError::BudgetExceeded(_))
        ));
    }
}
