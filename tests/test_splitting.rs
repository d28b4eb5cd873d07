//! Integration test: outer fold construction properties

use nestcv::error::HarnessError;
use nestcv::training::{build_outer_folds, validate_partition};
use ndarray::Array1;
use proptest::prelude::*;
use std::collections::BTreeSet;

fn distinct(groups: &[i64]) -> usize {
    groups.iter().collect::<BTreeSet<_>>().len()
}

proptest! {
    #[test]
    fn test_folds_partition_rows(
        (n_rows, k, seed) in (2usize..150).prop_flat_map(|r| (Just(r), 2usize..=r.min(12), any::<u64>()))
    ) {
        let folds = build_outer_folds(n_rows, None, k, seed).unwrap();
        prop_assert_eq!(folds.len(), k);

        let mut all: Vec<usize> = folds.iter().flat_map(|s| s.test_indices.clone()).collect();
        all.sort_unstable();
        prop_assert_eq!(all, (0..n_rows).collect::<Vec<_>>());

        for split in &folds {
            prop_assert_eq!(split.train_indices.len() + split.test_indices.len(), n_rows);
            let size = split.test_indices.len();
            prop_assert!(size == n_rows / k || size == n_rows / k + 1);
        }
        prop_assert!(validate_partition(n_rows, folds.splits()).is_ok());
    }

    #[test]
    fn test_grouped_folds_never_split_groups(
        groups in proptest::collection::vec(0i64..15, 4..90),
        k in 2usize..6,
        seed in any::<u64>(),
    ) {
        prop_assume!(distinct(&groups) >= k);
        let g = Array1::from(groups.clone());
        let folds = build_outer_folds(groups.len(), Some(&g), k, seed).unwrap();

        let mut fold_of_group = std::collections::HashMap::new();
        for split in &folds {
            for &row in &split.test_indices {
                let previous = fold_of_group.insert(groups[row], split.fold_idx);
                prop_assert!(previous.is_none() || previous == Some(split.fold_idx));
            }
        }
    }

    #[test]
    fn test_folds_are_deterministic(
        n_rows in 10usize..100,
        k in 2usize..6,
        seed in any::<u64>(),
    ) {
        let a = build_outer_folds(n_rows, None, k, seed).unwrap();
        let b = build_outer_folds(n_rows, None, k, seed).unwrap();
        prop_assert_eq!(a, b);
    }
}

#[test]
fn test_shared_group_rows_stay_together_for_every_k() {
    // rows 0, 1, 2 belong to one subject, every other row is its own group
    let mut groups: Vec<i64> = vec![100, 100, 100];
    groups.extend(0..17);
    let g = Array1::from(groups.clone());
    let n_groups = distinct(&groups);

    for k in 2..=n_groups {
        for seed in [0u64, 1, 42] {
            let folds = build_outer_folds(groups.len(), Some(&g), k, seed).unwrap();
            let holder = folds
                .iter()
                .find(|s| s.test_indices.contains(&0))
                .unwrap();
            assert!(holder.test_indices.contains(&1));
            assert!(holder.test_indices.contains(&2));
        }
    }
}

#[test]
fn test_invalid_fold_counts() {
    assert!(matches!(
        build_outer_folds(5, None, 6, 0),
        Err(HarnessError::ConfigError(_))
    ));
    let g = Array1::from(vec![1i64, 1, 1, 2, 2, 2]);
    assert!(matches!(
        build_outer_folds(6, Some(&g), 3, 0),
        Err(HarnessError::ConfigError(_))
    ));
}

#[test]
fn test_fold_set_round_trips_through_json() {
    let folds = build_outer_folds(23, None, 4, 9).unwrap();
    let json = serde_json::to_string(&folds).unwrap();
    let back: nestcv::training::OuterFoldSet = serde_json::from_str(&json).unwrap();
    assert_eq!(folds, back);
}
