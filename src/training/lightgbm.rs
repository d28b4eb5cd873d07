//! LightGBM-style gradient boosting with leaf-wise tree growth
//!
//! - Leaf-wise (best-first) tree growth instead of level-wise
//! - Row bagging (`subsample`) and column subsampling per tree
//! - Squared (L2) and absolute (L1) objectives; with L1 each leaf's output is
//!   renewed to the median residual of the rows it holds

use super::models::{check_fit_inputs, check_predict_inputs, Regressor};
use crate::error::{HarnessError, Result};
use crate::evaluation::metric::median_in_place;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Loss minimized by the booster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Objective {
    /// Squared error
    #[default]
    L2,
    /// Absolute error
    L1,
}

impl Objective {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "l2" | "regression" | "mse" => Ok(Objective::L2),
            "l1" | "regression_l1" | "mae" => Ok(Objective::L1),
            other => Err(HarnessError::InvalidParameter {
                name: "objective".to_string(),
                value: other.to_string(),
                reason: "expected 'l2' or 'l1'".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightGBMConfig {
    pub objective: Objective,
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_child_samples: usize,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    /// Seed of row bagging and column subsampling
    pub random_state: Option<u64>,
}

impl Default for LightGBMConfig {
    fn default() -> Self {
        Self {
            objective: Objective::L2,
            n_estimators: 100,
            learning_rate: 0.1,
            max_leaves: 31,
            max_depth: None,
            min_child_samples: 20,
            reg_lambda: 0.0,
            reg_alpha: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: None,
        }
    }
}

impl LightGBMConfig {
    fn validate(&self) -> Result<()> {
        let invalid = |name: &str, value: String| HarnessError::InvalidParameter {
            name: name.to_string(),
            value,
            reason: "out of range".to_string(),
        };
        if self.n_estimators == 0 {
            return Err(invalid("n_estimators", self.n_estimators.to_string()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(invalid("learning_rate", self.learning_rate.to_string()));
        }
        if self.max_leaves < 2 {
            return Err(invalid("max_leaves", self.max_leaves.to_string()));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(invalid("subsample", self.subsample.to_string()));
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return Err(invalid("colsample_bytree", self.colsample_bytree.to_string()));
        }
        if self.reg_lambda < 0.0 || self.reg_alpha < 0.0 {
            return Err(invalid("reg_lambda/reg_alpha", format!("{}/{}", self.reg_lambda, self.reg_alpha)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum LGBNode {
    Leaf { value: f64 },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<LGBNode>,
        right: Box<LGBNode>,
    },
}

impl LGBNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        match self {
            LGBNode::Leaf { value } => *value,
            LGBNode::Split { feature, threshold, left, right } => {
                if sample[*feature] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            LGBNode::Leaf { .. } => 1,
            LGBNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

// ---- Tree building utilities ----

fn compute_leaf_weight(g: f64, h: f64, lambda: f64, alpha: f64) -> f64 {
    let g_adj = if g.abs() <= alpha { 0.0 } else { g - alpha * g.signum() };
    -g_adj / (h + lambda).max(f64::MIN_POSITIVE)
}

fn compute_gain_single(g: f64, h: f64, lambda: f64) -> f64 {
    g * g / (h + lambda).max(f64::MIN_POSITIVE)
}

/// Gradient statistics of one boosting round
struct RoundStats<'a> {
    gradients: &'a [f64],
    hessians: &'a [f64],
}

struct CandidateSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
    left_indices: Vec<usize>,
    right_indices: Vec<usize>,
}

fn find_best_split_for_feature(
    x: &Array2<f64>,
    stats: &RoundStats,
    indices: &[usize],
    feature: usize,
    config: &LightGBMConfig,
) -> Option<CandidateSplit> {
    let mut sorted: Vec<(usize, f64)> = indices.iter().map(|&i| (i, x[[i, feature]])).collect();
    sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let total_g: f64 = indices.iter().map(|&i| stats.gradients[i]).sum();
    let total_h: f64 = indices.iter().map(|&i| stats.hessians[i]).sum();
    let base_score = compute_gain_single(total_g, total_h, config.reg_lambda);
    let min_child = config.min_child_samples.max(1);

    let mut left_g = 0.0;
    let mut left_h = 0.0;
    let mut best: Option<(f64, f64, usize)> = None;

    for i in 0..sorted.len().saturating_sub(1) {
        left_g += stats.gradients[sorted[i].0];
        left_h += stats.hessians[sorted[i].0];

        if i + 1 < min_child || sorted.len() - i - 1 < min_child {
            continue;
        }
        if sorted[i].1 == sorted[i + 1].1 {
            continue;
        }

        let gain = compute_gain_single(left_g, left_h, config.reg_lambda)
            + compute_gain_single(total_g - left_g, total_h - left_h, config.reg_lambda)
            - base_score;

        if best.map_or(true, |(g, _, _)| gain > g) {
            best = Some((gain, (sorted[i].1 + sorted[i + 1].1) / 2.0, i + 1));
        }
    }

    let (gain, threshold, pos) = best?;
    if gain <= 0.0 {
        return None;
    }
    Some(CandidateSplit {
        feature,
        threshold,
        gain,
        left_indices: sorted[..pos].iter().map(|&(i, _)| i).collect(),
        right_indices: sorted[pos..].iter().map(|&(i, _)| i).collect(),
    })
}

fn best_split(
    x: &Array2<f64>,
    stats: &RoundStats,
    indices: &[usize],
    features: &[usize],
    config: &LightGBMConfig,
) -> Option<CandidateSplit> {
    if indices.len() < config.min_child_samples.max(1) * 2 {
        return None;
    }
    features
        .par_iter()
        .filter_map(|&feat| find_best_split_for_feature(x, stats, indices, feat, config))
        .collect::<Vec<_>>()
        .into_iter()
        // ties keep the lowest feature index so results do not depend on scheduling
        .fold(None, |acc: Option<CandidateSplit>, c| match acc {
            Some(a) if a.gain >= c.gain => Some(a),
            _ => Some(c),
        })
}

struct PendingSplit {
    node_id: usize,
    split: CandidateSplit,
}

impl PartialEq for PendingSplit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for PendingSplit {}
impl PartialOrd for PendingSplit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PendingSplit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.split
            .gain
            .partial_cmp(&other.split.gain)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.node_id.cmp(&self.node_id))
    }
}

enum NodeSlot {
    Leaf(Vec<usize>),
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

/// Build one tree leaf-wise; `leaf_value` turns a leaf's row set into its output
fn build_lgb_tree<F>(
    x: &Array2<f64>,
    stats: &RoundStats,
    indices: &[usize],
    config: &LightGBMConfig,
    rng: &mut Xoshiro256PlusPlus,
    leaf_value: &F,
) -> LGBNode
where
    F: Fn(&[usize]) -> f64,
{
    let n_features = x.ncols();
    let n_selected = ((n_features as f64 * config.colsample_bytree).ceil() as usize).clamp(1, n_features.max(1));
    let mut features: Vec<usize> = (0..n_features).collect();
    features.shuffle(rng);
    features.truncate(n_selected);
    features.sort_unstable();

    let mut nodes: Vec<NodeSlot> = vec![NodeSlot::Leaf(indices.to_vec())];
    let mut depths: Vec<usize> = vec![0];
    let mut heap: BinaryHeap<PendingSplit> = BinaryHeap::new();
    let max_depth = config.max_depth.unwrap_or(usize::MAX);

    if max_depth > 0 {
        if let Some(split) = best_split(x, stats, indices, &features, config) {
            heap.push(PendingSplit { node_id: 0, split });
        }
    }

    let mut n_leaves = 1usize;
    while n_leaves < config.max_leaves {
        let PendingSplit { node_id, split } = match heap.pop() {
            Some(p) => p,
            None => break,
        };

        let depth = depths[node_id];
        let left_id = nodes.len();
        let right_id = left_id + 1;

        nodes.push(NodeSlot::Leaf(Vec::new()));
        nodes.push(NodeSlot::Leaf(Vec::new()));
        depths.push(depth + 1);
        depths.push(depth + 1);
        nodes[node_id] = NodeSlot::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_id,
            right: right_id,
        };
        n_leaves += 1;

        for (child_id, child_indices) in [(left_id, split.left_indices), (right_id, split.right_indices)] {
            if depth + 1 < max_depth {
                if let Some(child_split) = best_split(x, stats, &child_indices, &features, config) {
                    heap.push(PendingSplit { node_id: child_id, split: child_split });
                }
            }
            nodes[child_id] = NodeSlot::Leaf(child_indices);
        }
    }

    fn to_node<F: Fn(&[usize]) -> f64>(nodes: &[NodeSlot], idx: usize, leaf_value: &F) -> LGBNode {
        match &nodes[idx] {
            NodeSlot::Leaf(indices) => LGBNode::Leaf { value: leaf_value(indices) },
            NodeSlot::Split { feature, threshold, left, right } => LGBNode::Split {
                feature: *feature,
                threshold: *threshold,
                left: Box::new(to_node(nodes, *left, leaf_value)),
                right: Box::new(to_node(nodes, *right, leaf_value)),
            },
        }
    }
    to_node(&nodes, 0, leaf_value)
}

// ============ LightGBM Regressor ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightGBMRegressor {
    pub config: LightGBMConfig,
    trees: Vec<LGBNode>,
    base_prediction: f64,
    n_features: usize,
}

impl LightGBMRegressor {
    pub fn new(config: LightGBMConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_prediction: 0.0,
            n_features: 0,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Total leaves over all trees
    pub fn n_leaves(&self) -> usize {
        self.trees.iter().map(LGBNode::n_leaves).sum()
    }

    fn raw_predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.base_prediction
            + self
                .trees
                .iter()
                .map(|t| self.config.learning_rate * t.predict(row))
                .sum::<f64>()
    }

    /// Rows used by one boosting round: a seeded `subsample` bag, or all rows
    fn round_indices(&self, n: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        if self.config.subsample >= 1.0 {
            return (0..n).collect();
        }
        let k = ((n as f64 * self.config.subsample).ceil() as usize).max(1);
        let mut idx: Vec<usize> = (0..n).collect();
        idx.shuffle(rng);
        idx.truncate(k);
        idx.sort_unstable();
        idx
    }
}

impl Regressor for LightGBMRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_inputs(x, y)?;
        self.config.validate()?;

        let n = x.nrows();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state.unwrap_or_default());
        self.trees.clear();
        self.n_features = x.ncols();
        self.base_prediction = match self.config.objective {
            Objective::L2 => y.sum() / n as f64,
            Objective::L1 => median_in_place(&mut y.to_vec()),
        };
        let mut predictions = Array1::from_elem(n, self.base_prediction);

        for _ in 0..self.config.n_estimators {
            let gradients: Vec<f64> = predictions
                .iter()
                .zip(y.iter())
                .map(|(&p, &yi)| match self.config.objective {
                    Objective::L2 => p - yi,
                    Objective::L1 if p > yi => 1.0,
                    Objective::L1 if p < yi => -1.0,
                    Objective::L1 => 0.0,
                })
                .collect();
            let hessians = vec![1.0; n];
            let indices = self.round_indices(n, &mut rng);

            let stats = RoundStats {
                gradients: &gradients,
                hessians: &hessians,
            };
            let lr = self.config.learning_rate;
            let tree = match self.config.objective {
                Objective::L2 => {
                    let (lambda, alpha) = (self.config.reg_lambda, self.config.reg_alpha);
                    let leaf = |rows: &[usize]| {
                        let g: f64 = rows.iter().map(|&i| gradients[i]).sum();
                        let h: f64 = rows.iter().map(|&i| hessians[i]).sum();
                        compute_leaf_weight(g, h, lambda, alpha)
                    };
                    build_lgb_tree(x, &stats, &indices, &self.config, &mut rng, &leaf)
                }
                Objective::L1 => {
                    // output in raw units before the learning-rate shrinkage
                    let leaf = |rows: &[usize]| {
                        let mut residuals: Vec<f64> = rows.iter().map(|&i| y[i] - predictions[i]).collect();
                        if residuals.is_empty() {
                            0.0
                        } else {
                            median_in_place(&mut residuals)
                        }
                    };
                    build_lgb_tree(x, &stats, &indices, &self.config, &mut rng, &leaf)
                }
            };

            for (p, row) in predictions.iter_mut().zip(x.axis_iter(Axis(0))) {
                *p += lr * tree.predict(row);
            }
            self.trees.push(tree);
        }

        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(HarnessError::ComputationError(
                "boosting produced non-finite training predictions".to_string(),
            ));
        }
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(HarnessError::ModelNotFitted);
        }
        check_predict_inputs(x, self.n_features)?;
        Ok(x.axis_iter(Axis(0)).map(|row| self.raw_predict_row(row)).collect())
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}
