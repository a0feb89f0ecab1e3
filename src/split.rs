//! Train/test partitioning
//!
//! Claim-occurrence targets get a stratified shuffle split so the holdout keeps
//! the class balance of the full data; continuous targets get a uniform
//! shuffle split. Both are deterministic for a given seed.

use crate::error::{ModelingError, Result};
use crate::target::TargetType;
use ndarray::{Array1, Axis};
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Default share of rows held out for evaluation
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Disjoint train/test partition of a feature frame and its labels
#[derive(Debug, Clone)]
pub struct SplitResult {
    pub x_train: DataFrame,
    pub x_test: DataFrame,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
    /// Row positions in the input, ascending
    pub train_indices: Vec<usize>,
    /// Row positions in the input, ascending
    pub test_indices: Vec<usize>,
}

impl SplitResult {
    pub fn n_train(&self) -> usize {
        self.train_indices.len()
    }

    pub fn n_test(&self) -> usize {
        self.test_indices.len()
    }
}

/// Partition `features` and `labels` into train and test sets.
///
/// The test partition holds `ceil(test_fraction * n)` rows. Risk targets are
/// stratified on the rounded label.
#[instrument(skip(features, labels), fields(rows = features.height()))]
pub fn split(
    features: &DataFrame,
    labels: &Array1<f64>,
    target: TargetType,
    test_fraction: f64,
    seed: u64,
) -> Result<SplitResult> {
    let n = features.height();
    if labels.len() != n {
        return Err(ModelingError::Shape {
            expected: format!("{} labels", n),
            actual: format!("{} labels", labels.len()),
        });
    }
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ModelingError::Configuration(format!(
            "test_fraction must lie in (0, 1), got {test_fraction}"
        )));
    }

    let n_test = test_size(n, test_fraction);
    if n_test == 0 || n_test >= n {
        return Err(ModelingError::InsufficientData(format!(
            "{n} rows cannot be split into non-empty train and test partitions with test_fraction {test_fraction}"
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (mut train_indices, mut test_indices) = if target.is_classification() {
        stratified_indices(labels, n_test, &mut rng)?
    } else {
        shuffled_indices(n, n_test, &mut rng)
    };
    train_indices.sort_unstable();
    test_indices.sort_unstable();

    debug!(n_train = train_indices.len(), n_test = test_indices.len(), "split");

    Ok(SplitResult {
        x_train: take_rows(features, &train_indices)?,
        x_test: take_rows(features, &test_indices)?,
        y_train: labels.select(Axis(0), &train_indices),
        y_test: labels.select(Axis(0), &test_indices),
        train_indices,
        test_indices,
    })
}

fn test_size(n: usize, test_fraction: f64) -> usize {
    // Epsilon keeps products like 0.3 * 10 from rounding up past the exact count
    ((test_fraction * n as f64) - 1e-9).ceil().max(0.0) as usize
}

fn shuffled_indices(n: usize, n_test: usize, rng: &mut ChaCha8Rng) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    let train = indices.split_off(n_test);
    (train, indices)
}

fn stratified_indices(
    labels: &Array1<f64>,
    n_test: usize,
    rng: &mut ChaCha8Rng,
) -> Result<(Vec<usize>, Vec<usize>)> {
    // Group indices by class label
    let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        class_indices.entry(label.round() as i64).or_default().push(i);
    }

    if class_indices.len() < 2 {
        return Err(ModelingError::InsufficientData(format!(
            "stratified split needs at least two classes, found {}",
            class_indices.len()
        )));
    }
    if let Some((class, members)) = class_indices.iter().find(|(_, m)| m.len() < 2) {
        return Err(ModelingError::InsufficientData(format!(
            "class {class} has {} member(s), stratified split needs at least 2",
            members.len()
        )));
    }

    let sizes: Vec<usize> = class_indices.values().map(Vec::len).collect();
    let allocation = allocate_test_counts(&sizes, n_test);

    let mut train = Vec::with_capacity(labels.len() - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (mut members, k) in class_indices.into_values().zip(allocation) {
        members.shuffle(rng);
        test.extend_from_slice(&members[..k]);
        train.extend_from_slice(&members[k..]);
    }

    Ok((train, test))
}

/// Largest-remainder allocation of `n_test` across classes of the given sizes,
/// capped so every class keeps at least one training member.
fn allocate_test_counts(sizes: &[usize], n_test: usize) -> Vec<usize> {
    let n: usize = sizes.iter().sum();
    let quotas: Vec<f64> = sizes
        .iter()
        .map(|&s| n_test as f64 * s as f64 / n as f64)
        .collect();

    let mut counts: Vec<usize> = quotas
        .iter()
        .zip(sizes)
        .map(|(q, &s)| (q.floor() as usize).min(s - 1))
        .collect();

    // Hand out the remaining rows by descending fractional part; ties go to the
    // earlier class
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = quotas[a] - quotas[a].floor();
        let fb = quotas[b] - quotas[b].floor();
        fb.total_cmp(&fa).then(a.cmp(&b))
    });

    let mut remaining = n_test.saturating_sub(counts.iter().sum());
    while remaining > 0 {
        let before = remaining;
        for &c in &order {
            if remaining == 0 {
                break;
            }
            if counts[c] < sizes[c] - 1 {
                counts[c] += 1;
                remaining -= 1;
            }
        }
        if remaining == before {
            break;
        }
    }

    counts
}

fn take_rows(df: &DataFrame, indices: &[usize]) -> Result<DataFrame> {
    let idx = IdxCa::from_vec("idx".into(), indices.iter().map(|&i| i as IdxSize).collect());
    Ok(df.take(&idx)?)
}
