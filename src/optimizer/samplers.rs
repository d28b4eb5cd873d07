//! Sampling strategies for hyperparameter optimization
//!
//! Objective values in the history are minimized.

use super::search_space::{ParamSet, Parameter, ParameterType, ParameterValue, SearchSpace};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Type of sampler to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SamplerType {
    /// Random sampling
    Random,
    /// Tree-structured Parzen Estimator
    #[default]
    TPE,
}

/// Trait for hyperparameter samplers
pub trait Sampler: Send {
    /// Sample the next set of hyperparameters given `(params, value)` history
    fn sample(&mut self, search_space: &SearchSpace, history: &[(ParamSet, f64)]) -> ParamSet;
}

fn seeded_rng(seed: Option<u64>) -> Xoshiro256PlusPlus {
    match seed {
        Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
        None => Xoshiro256PlusPlus::from_entropy(),
    }
}

/// Random sampler
#[derive(Debug)]
pub struct RandomSampler {
    rng: Xoshiro256PlusPlus,
}

impl RandomSampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self { rng: seeded_rng(seed) }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, search_space: &SearchSpace, _history: &[(ParamSet, f64)]) -> ParamSet {
        search_space.sample(&mut self.rng)
    }
}

/// Tree-structured Parzen Estimator sampler.
///
/// After `n_startup_trials` random proposals, the history is split into the
/// best `gamma` fraction and the rest. Each parameter gets a Parzen density
/// `l(x)` over the good trials and `g(x)` over the others; candidates are
/// drawn from `l` and the one maximizing `l(x) / g(x)` is proposed.
#[derive(Debug)]
pub struct TPESampler {
    rng: Xoshiro256PlusPlus,
    n_startup_trials: usize,
    gamma: f64,
    n_candidates: usize,
    prior_weight: f64,
}

impl TPESampler {
    /// Create a new TPE sampler
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: seeded_rng(seed),
            n_startup_trials: 10,
            gamma: 0.25,
            n_candidates: 24,
            prior_weight: 1.0,
        }
    }

    /// Set number of startup trials
    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    fn sample_numeric(&mut self, low: f64, high: f64, good: &[f64], bad: &[f64]) -> f64 {
        let l = Parzen::fit(good, low, high, self.prior_weight);
        let g = Parzen::fit(bad, low, high, self.prior_weight);

        let mut best = l.draw(&mut self.rng);
        let mut best_score = f64::NEG_INFINITY;
        for _ in 0..self.n_candidates {
            let x = l.draw(&mut self.rng);
            let score = l.log_density(x) - g.log_density(x);
            if score > best_score {
                best_score = score;
                best = x;
            }
        }
        best
    }

    fn sample_categorical(&mut self, choices: &[String], good: &[&str], bad: &[&str]) -> String {
        let weights = |obs: &[&str]| -> Vec<f64> {
            let mut w: Vec<f64> = choices
                .iter()
                .map(|c| self.prior_weight + obs.iter().filter(|o| **o == c.as_str()).count() as f64)
                .collect();
            let total: f64 = w.iter().sum();
            w.iter_mut().for_each(|v| *v /= total);
            w
        };
        let pl = weights(good);
        let pg = weights(bad);

        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for _ in 0..self.n_candidates {
            let mut u = self.rng.gen::<f64>();
            let mut idx = choices.len() - 1;
            for (i, p) in pl.iter().enumerate() {
                if u < *p {
                    idx = i;
                    break;
                }
                u -= p;
            }
            let score = pl[idx].ln() - pg[idx].ln();
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }
        choices[best_idx].clone()
    }

    fn sample_parameter(&mut self, param: &Parameter, good: &[&ParamSet], bad: &[&ParamSet]) -> ParameterValue {
        let collect_f64 = |trials: &[&ParamSet], log: bool| -> Vec<f64> {
            trials
                .iter()
                .filter_map(|t| t.get(&param.name).and_then(|v| v.as_float()))
                .map(|v| if log { v.ln() } else { v })
                .collect()
        };

        match &param.param_type {
            ParameterType::Float { low, high, log_scale } => {
                let (lo, hi) = if *log_scale { (low.ln(), high.ln()) } else { (*low, *high) };
                let x = self.sample_numeric(
                    lo,
                    hi,
                    &collect_f64(good, *log_scale),
                    &collect_f64(bad, *log_scale),
                );
                let v = if *log_scale { x.exp() } else { x };
                ParameterValue::Float(v.clamp(*low, *high))
            }
            ParameterType::Int { low, high, log_scale } => {
                let (l, h) = (*low as f64 - 0.5, *high as f64 + 0.5);
                let (lo, hi) = if *log_scale {
                    (l.max(0.5).ln(), h.ln())
                } else {
                    (l, h)
                };
                let x = self.sample_numeric(
                    lo,
                    hi,
                    &collect_f64(good, *log_scale),
                    &collect_f64(bad, *log_scale),
                );
                let v = if *log_scale { x.exp() } else { x };
                ParameterValue::Int((v.round() as i64).clamp(*low, *high))
            }
            ParameterType::Categorical { choices } => {
                let collect_str = |trials: &[&ParamSet]| -> Vec<String> {
                    trials
                        .iter()
                        .filter_map(|t| t.get(&param.name).and_then(|v| v.as_string()).map(String::from))
                        .collect()
                };
                let good_s = collect_str(good);
                let bad_s = collect_str(bad);
                let good_r: Vec<&str> = good_s.iter().map(String::as_str).collect();
                let bad_r: Vec<&str> = bad_s.iter().map(String::as_str).collect();
                ParameterValue::String(self.sample_categorical(choices, &good_r, &bad_r))
            }
        }
    }
}

impl Sampler for TPESampler {
    fn sample(&mut self, search_space: &SearchSpace, history: &[(ParamSet, f64)]) -> ParamSet {
        // Use random sampling for startup trials
        if history.len() < self.n_startup_trials.max(2) {
            return search_space.sample(&mut self.rng);
        }

        let mut sorted: Vec<&(ParamSet, f64)> = history.iter().collect();
        sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let n_good = ((sorted.len() as f64 * self.gamma).ceil() as usize).clamp(1, sorted.len() - 1);
        let good: Vec<&ParamSet> = sorted[..n_good].iter().map(|(p, _)| p).collect();
        let bad: Vec<&ParamSet> = sorted[n_good..].iter().map(|(p, _)| p).collect();

        search_space
            .parameters()
            .iter()
            .map(|param| (param.name.clone(), self.sample_parameter(param, &good, &bad)))
            .collect()
    }
}

/// One-dimensional Parzen estimator: a gaussian mixture over observations
/// plus a wide prior component, truncated to `[low, high]`.
struct Parzen {
    mus: Vec<f64>,
    sigmas: Vec<f64>,
    weights: Vec<f64>,
    low: f64,
    high: f64,
}

impl Parzen {
    fn fit(observations: &[f64], low: f64, high: f64, prior_weight: f64) -> Self {
        let range = (high - low).max(f64::EPSILON);
        let prior_mu = 0.5 * (low + high);

        let mut mus: Vec<f64> = observations.iter().map(|v| v.clamp(low, high)).collect();
        mus.push(prior_mu);
        let mut order: Vec<usize> = (0..mus.len()).collect();
        order.sort_by(|&a, &b| mus[a].partial_cmp(&mus[b]).unwrap_or(std::cmp::Ordering::Equal));

        // bandwidth: distance to the farther sorted neighbour
        let n = mus.len();
        let min_sigma = range / (n as f64 + 1.0).min(100.0);
        let mut sigmas = vec![range; n];
        for (rank, &i) in order.iter().enumerate() {
            let left = if rank == 0 { mus[i] - low } else { mus[i] - mus[order[rank - 1]] };
            let right = if rank + 1 == n { high - mus[i] } else { mus[order[rank + 1]] - mus[i] };
            sigmas[i] = left.max(right).clamp(min_sigma, range);
        }
        let prior_idx = n - 1;
        sigmas[prior_idx] = range;

        let mut weights = vec![1.0; n];
        weights[prior_idx] = prior_weight;
        let total: f64 = weights.iter().sum();
        weights.iter_mut().for_each(|w| *w /= total);

        Self { mus, sigmas, weights, low, high }
    }

    fn draw(&self, rng: &mut impl Rng) -> f64 {
        let mut u = rng.gen::<f64>();
        let mut k = self.weights.len() - 1;
        for (i, w) in self.weights.iter().enumerate() {
            if u < *w {
                k = i;
                break;
            }
            u -= w;
        }
        // rejection against the bounds, clamped after a few attempts
        for _ in 0..16 {
            let x = self.mus[k] + self.sigmas[k] * standard_normal(rng);
            if x >= self.low && x <= self.high {
                return x;
            }
        }
        self.mus[k].clamp(self.low, self.high)
    }

    fn log_density(&self, x: f64) -> f64 {
        let p: f64 = self
            .mus
            .iter()
            .zip(&self.sigmas)
            .zip(&self.weights)
            .map(|((mu, sigma), w)| {
                let z = (x - mu) / sigma;
                w * (-0.5 * z * z).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
            })
            .sum();
        p.max(f64::MIN_POSITIVE).ln()
    }
}

/// Box-Muller draw from N(0, 1)
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Create a sampler from type
pub fn create_sampler(sampler_type: SamplerType, seed: Option<u64>, n_startup_trials: usize) -> Box<dyn Sampler> {
    match sampler_type {
        SamplerType::Random => Box::new(RandomSampler::new(seed)),
        SamplerType::TPE => Box::new(TPESampler::new(seed).with_n_startup(n_startup_trials)),
    }
}
