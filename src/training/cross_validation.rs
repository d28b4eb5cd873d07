//! Cross-validation splitting
//!
//! [`build_outer_folds`] is the split provider of the harness: it produces the
//! [`OuterFoldSet`] that every evaluator reuses. [`CrossValidator`] is also
//! used directly by the evaluators to build inner folds over an outer
//! training fold.

use crate::error::{HarnessError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CVStrategy {
    /// K-Fold cross-validation over rows
    KFold { n_splits: usize, shuffle: bool },
    /// Group K-Fold (keeps groups together)
    GroupKFold { n_splits: usize },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::KFold { n_splits: 5, shuffle: true }
    }
}

impl CVStrategy {
    /// Pick the strategy for a run: grouped when group ids are present
    pub fn for_groups(grouped: bool, n_splits: usize, shuffle: bool) -> Self {
        if grouped {
            CVStrategy::GroupKFold { n_splits }
        } else {
            CVStrategy::KFold { n_splits, shuffle }
        }
    }

    pub fn n_splits(&self) -> usize {
        match self {
            CVStrategy::KFold { n_splits, .. } | CVStrategy::GroupKFold { n_splits } => *n_splits,
        }
    }
}

/// A single train/test split. Both index lists are sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CVSplit {
    pub fold_idx: usize,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Cross-validation splitter
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    /// Generate train/test splits
    pub fn split(&self, n_samples: usize, groups: Option<&Array1<i64>>) -> Result<Vec<CVSplit>> {
        let n_splits = self.strategy.n_splits();
        if n_splits < 2 {
            return Err(HarnessError::ConfigError(format!(
                "fold count must be at least 2, got {}",
                n_splits
            )));
        }

        let fold_of_row = match &self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => {
                self.k_fold_assignment(n_samples, *n_splits, *shuffle)?
            }
            CVStrategy::GroupKFold { n_splits } => {
                let groups = groups.ok_or_else(|| {
                    HarnessError::ConfigError("GroupKFold requires a groups array".to_string())
                })?;
                if groups.len() != n_samples {
                    return Err(HarnessError::ShapeError {
                        expected: format!("{} group ids", n_samples),
                        actual: format!("{} group ids", groups.len()),
                    });
                }
                self.group_k_fold_assignment(groups, *n_splits)?
            }
        };

        Ok(splits_from_assignment(&fold_of_row, n_splits))
    }

    /// Fold index of every row for ordinary (optionally shuffled) k-fold
    fn k_fold_assignment(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<usize>> {
        if n_samples < n_splits {
            return Err(HarnessError::ConfigError(format!(
                "fold count ({}) exceeds the number of rows ({})",
                n_splits, n_samples
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;
        let mut fold_of_row = vec![0; n_samples];
        let mut current = 0;
        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            for &row in &indices[current..current + fold_size] {
                fold_of_row[row] = fold_idx;
            }
            current += fold_size;
        }

        Ok(fold_of_row)
    }

    /// Fold index of every row when whole groups are assigned to folds.
    ///
    /// Groups are shuffled with the seed, then placed largest first into the
    /// currently lightest fold (ties go to the lowest fold index).
    fn group_k_fold_assignment(&self, groups: &Array1<i64>, n_splits: usize) -> Result<Vec<usize>> {
        let mut sizes: BTreeMap<i64, usize> = BTreeMap::new();
        for &g in groups.iter() {
            *sizes.entry(g).or_insert(0) += 1;
        }

        if sizes.len() < n_splits {
            return Err(HarnessError::ConfigError(format!(
                "fold count ({}) exceeds the number of distinct groups ({})",
                n_splits,
                sizes.len()
            )));
        }

        let mut unique_groups: Vec<(i64, usize)> = sizes.into_iter().collect();
        if self.random_state.is_some() {
            unique_groups.shuffle(&mut self.rng());
        }
        unique_groups.sort_by(|a, b| b.1.cmp(&a.1));

        let mut fold_sizes = vec![0usize; n_splits];
        let mut group_to_fold: BTreeMap<i64, usize> = BTreeMap::new();
        for (group, size) in unique_groups {
            let (lightest, _) = fold_sizes
                .iter()
                .enumerate()
                .min_by_key(|&(idx, &s)| (s, idx))
                .unwrap_or((0, &0));
            fold_sizes[lightest] += size;
            group_to_fold.insert(group, lightest);
        }

        Ok(groups.iter().map(|g| group_to_fold[g]).collect())
    }
}

fn splits_from_assignment(fold_of_row: &[usize], n_splits: usize) -> Vec<CVSplit> {
    (0..n_splits)
        .map(|fold_idx| {
            let (test_indices, train_indices): (Vec<usize>, Vec<usize>) =
                (0..fold_of_row.len()).partition(|&row| fold_of_row[row] == fold_idx);
            CVSplit {
                fold_idx,
                train_indices,
                test_indices,
            }
        })
        .collect()
}

/// Check that `splits` form an exact k-fold partition of `0..n_samples`:
/// test sets are non-empty and pairwise disjoint, their union covers every
/// row exactly once, and each train set is the complement of its test set.
pub fn validate_partition(n_samples: usize, splits: &[CVSplit]) -> Result<()> {
    let mut seen = vec![false; n_samples];

    for split in splits {
        if split.test_indices.is_empty() {
            return Err(HarnessError::ConfigError(format!(
                "fold {} has an empty test set",
                split.fold_idx
            )));
        }
        if split.train_indices.is_empty() {
            return Err(HarnessError::ConfigError(format!(
                "fold {} has an empty training set",
                split.fold_idx
            )));
        }

        let mut in_test = vec![false; n_samples];
        for &row in &split.test_indices {
            if row >= n_samples {
                return Err(HarnessError::ConfigError(format!(
                    "fold {} references row {} outside 0..{}",
                    split.fold_idx, row, n_samples
                )));
            }
            if seen[row] {
                return Err(HarnessError::ConfigError(format!(
                    "row {} appears in more than one test fold",
                    row
                )));
            }
            seen[row] = true;
            in_test[row] = true;
        }

        if split.train_indices.len() + split.test_indices.len() != n_samples
            || split
                .train_indices
                .iter()
                .any(|&row| row >= n_samples || in_test[row])
        {
            return Err(HarnessError::ConfigError(format!(
                "fold {} training rows are not the complement of its test rows",
                split.fold_idx
            )));
        }
    }

    if let Some(row) = seen.iter().position(|&s| !s) {
        return Err(HarnessError::ConfigError(format!(
            "row {} is not in any test fold",
            row
        )));
    }

    Ok(())
}

/// Immutable, validated outer fold set shared by every evaluator of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OuterFoldSet {
    splits: Vec<CVSplit>,
    n_samples: usize,
    grouped: bool,
    random_state: u64,
}

impl OuterFoldSet {
    /// Wrap and validate a list of splits
    pub fn from_splits(
        splits: Vec<CVSplit>,
        n_samples: usize,
        grouped: bool,
        random_state: u64,
    ) -> Result<Self> {
        validate_partition(n_samples, &splits)?;
        Ok(Self {
            splits,
            n_samples,
            grouped,
            random_state,
        })
    }

    /// Re-run the partition checks (e.g. after deserializing)
    pub fn validate(&self) -> Result<()> {
        validate_partition(self.n_samples, &self.splits)
    }

    pub fn splits(&self) -> &[CVSplit] {
        &self.splits
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CVSplit> {
        self.splits.iter()
    }

    pub fn get(&self, fold_idx: usize) -> Option<&CVSplit> {
        self.splits.get(fold_idx)
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn is_grouped(&self) -> bool {
        self.grouped
    }

    pub fn random_state(&self) -> u64 {
        self.random_state
    }
}

impl<'a> IntoIterator for &'a OuterFoldSet {
    type Item = &'a CVSplit;
    type IntoIter = std::slice::Iter<'a, CVSplit>;

    fn into_iter(self) -> Self::IntoIter {
        self.splits.iter()
    }
}

/// Build the outer folds of a run.
///
/// `groups = Some(..)` selects grouped splitting. Identical inputs always
/// produce identical folds.
pub fn build_outer_folds(
    n_samples: usize,
    groups: Option<&Array1<i64>>,
    n_splits: usize,
    random_state: u64,
) -> Result<OuterFoldSet> {
    let strategy = CVStrategy::for_groups(groups.is_some(), n_splits, true);
    let splits = CrossValidator::new(strategy)
        .with_random_state(random_state)
        .split(n_samples, groups)?;
    OuterFoldSet::from_splits(splits, n_samples, groups.is_some(), random_state)
}

/// Split rows into a fit part and a holdout part.
///
/// Whole groups move together when `groups` is given. The holdout receives
/// `ceil(fraction * units)` shuffled units, clamped so both parts are
/// non-empty. Returns sorted `(fit_indices, holdout_indices)`.
pub fn holdout_split(
    n_samples: usize,
    groups: Option<&Array1<i64>>,
    holdout_fraction: f64,
    random_state: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(holdout_fraction > 0.0 && holdout_fraction < 1.0) {
        return Err(HarnessError::ConfigError(format!(
            "holdout fraction must lie in (0, 1), got {}",
            holdout_fraction
        )));
    }

    let unit_of_row: Vec<i64> = match groups {
        Some(g) => {
            if g.len() != n_samples {
                return Err(HarnessError::ShapeError {
                    expected: format!("{} group ids", n_samples),
                    actual: format!("{} group ids", g.len()),
                });
            }
            g.to_vec()
        }
        None => (0..n_samples as i64).collect(),
    };

    let mut units: Vec<i64> = unit_of_row.clone();
    units.sort_unstable();
    units.dedup();
    if units.len() < 2 {
        return Err(HarnessError::ConfigError(format!(
            "a holdout split needs at least 2 units, got {}",
            units.len()
        )));
    }

    units.shuffle(&mut ChaCha8Rng::seed_from_u64(random_state));
    let n_holdout = ((holdout_fraction * units.len() as f64).ceil() as usize).clamp(1, units.len() - 1);
    let holdout_units: std::collections::BTreeSet<i64> = units[..n_holdout].iter().copied().collect();

    Ok((0..n_samples).partition(|&row| !holdout_units.contains(&unit_of_row[row])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        let splits = cv.split(100, None).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_uneven_fold_sizes() {
        let folds = build_outer_folds(11, None, 3, 0).unwrap();
        let sizes: Vec<usize> = folds.iter().map(|s| s.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 4, 3]);
    }

    #[test]
    fn test_shuffled_k_fold_is_seeded() {
        let a = build_outer_folds(50, None, 5, 42).unwrap();
        let b = build_outer_folds(50, None, 5, 42).unwrap();
        let c = build_outer_folds(50, None, 5, 43).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.splits(), c.splits());
    }

    #[test]
    fn test_group_k_fold_keeps_groups_together() {
        let groups = array![0, 0, 0, 1, 1, 2, 3, 3, 4, 5];
        let folds = build_outer_folds(10, Some(&groups), 3, 7).unwrap();
        assert!(folds.is_grouped());

        for split in &folds {
            for &i in &split.test_indices {
                for &j in &split.train_indices {
                    assert_ne!(groups[i], groups[j]);
                }
            }
        }
    }

    #[test]
    fn test_too_many_folds() {
        let err = build_outer_folds(4, None, 5, 0).unwrap_err();
        assert!(matches!(err, HarnessError::ConfigError(_)));

        let groups = array![1, 1, 2, 2, 3, 3];
        let err = build_outer_folds(6, Some(&groups), 4, 0).unwrap_err();
        assert!(matches!(err, HarnessError::ConfigError(_)));
    }

    #[test]
    fn test_single_fold_rejected() {
        let err = build_outer_folds(10, None, 1, 0).unwrap_err();
        assert!(matches!(err, HarnessError::ConfigError(_)));
    }

    #[test]
    fn test_group_length_mismatch() {
        let groups = array![1, 2, 3];
        let err = build_outer_folds(4, Some(&groups), 2, 0).unwrap_err();
        assert!(matches!(err, HarnessError::ShapeError { .. }));
    }

    #[test]
    fn test_validate_partition_detects_overlap() {
        let splits = vec![
            CVSplit { fold_idx: 0, train_indices: vec![2, 3], test_indices: vec![0, 1] },
            CVSplit { fold_idx: 1, train_indices: vec![0, 2], test_indices: vec![1, 3] },
        ];
        assert!(validate_partition(4, &splits).is_err());
    }

    #[test]
    fn test_validate_partition_detects_missing_row() {
        let splits = vec![
            CVSplit { fold_idx: 0, train_indices: vec![1, 2, 3], test_indices: vec![0] },
            CVSplit { fold_idx: 1, train_indices: vec![0, 2, 3], test_indices: vec![1] },
        ];
        assert!(validate_partition(4, &splits).is_err());
    }

    #[test]
    fn test_indices_sorted() {
        let folds = build_outer_folds(30, None, 3, 1).unwrap();
        for split in &folds {
            assert!(split.test_indices.windows(2).all(|w| w[0] < w[1]));
            assert!(split.train_indices.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_holdout_split_keeps_groups_together() {
        let groups = array![0, 0, 1, 1, 2, 2, 3, 3, 4, 4];
        let (fit, holdout) = holdout_split(10, Some(&groups), 0.2, 3).unwrap();
        assert_eq!(fit.len() + holdout.len(), 10);
        assert_eq!(holdout.len(), 2);
        assert_eq!(groups[holdout[0]], groups[holdout[1]]);
        assert!(fit.iter().all(|&r| groups[r] != groups[holdout[0]]));
    }

    #[test]
    fn test_holdout_split_is_seeded_and_non_empty() {
        let a = holdout_split(20, None, 0.25, 9).unwrap();
        let b = holdout_split(20, None, 0.25, 9).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.1.len(), 5);

        let (fit, holdout) = holdout_split(2, None, 0.9, 0).unwrap();
        assert_eq!((fit.len(), holdout.len()), (1, 1));
        assert!(holdout_split(1, None, 0.5, 0).is_err());
        assert!(holdout_split(10, None, 0.0, 0).is_err());
    }
}
