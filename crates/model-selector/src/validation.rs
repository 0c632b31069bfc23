//! Stratified Sampling and Cross-Validation Splits

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::SelectionError;

/// One train/test partition of row indices
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    /// Training rows, ascending
    pub train: Vec<usize>,
    /// Held-out rows, ascending
    pub test: Vec<usize>,
}

/// Row indices of each class, in input order: (negatives, positives)
pub fn class_indices(labels: &[bool]) -> (Vec<usize>, Vec<usize>) {
    let mut negatives = Vec::new();
    let mut positives = Vec::new();
    for (i, &label) in labels.iter().enumerate() {
        if label {
            positives.push(i);
        } else {
            negatives.push(i);
        }
    }
    (negatives, positives)
}

/// Draw exactly `size` rows keeping the class proportions of `labels`.
///
/// Per-class quotas are floored, then the rows left over go to the classes
/// with the largest fractional remainder (negatives first on ties). Returned
/// indices are ascending.
pub fn stratified_subsample(labels: &[bool], size: usize, seed: u64) -> Vec<usize> {
    if size >= labels.len() {
        return (0..labels.len()).collect();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let (mut negatives, mut positives) = class_indices(labels);
    let total = labels.len() as f64;

    let exact_neg = size as f64 * negatives.len() as f64 / total;
    let exact_pos = size as f64 * positives.len() as f64 / total;
    let mut take_neg = exact_neg.floor() as usize;
    let mut take_pos = exact_pos.floor() as usize;

    while take_neg + take_pos < size {
        let rem_neg = exact_neg - take_neg as f64;
        let rem_pos = exact_pos - take_pos as f64;
        if (rem_neg >= rem_pos && take_neg < negatives.len()) || take_pos >= positives.len() {
            take_neg += 1;
        } else {
            take_pos += 1;
        }
    }

    negatives.shuffle(&mut rng);
    positives.shuffle(&mut rng);

    let mut selected: Vec<usize> = negatives[..take_neg]
        .iter()
        .chain(&positives[..take_pos])
        .copied()
        .collect();
    selected.sort_unstable();
    selected
}

/// Shuffled k-fold splitter preserving class proportions in every fold
#[derive(Debug, Clone)]
pub struct StratifiedKFold {
    n_splits: usize,
    seed: u64,
}

impl StratifiedKFold {
    /// Create a splitter with `n_splits` folds
    pub fn new(n_splits: usize, seed: u64) -> Self {
        Self { n_splits, seed }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Partition rows into folds.
    ///
    /// Each class is shuffled with the fixed seed and dealt into `n_splits`
    /// contiguous chunks whose sizes differ by at most one. Every class must
    /// have at least `n_splits` members so each test fold holds both classes.
    pub fn split(&self, labels: &[bool]) -> Result<Vec<Fold>, SelectionError> {
        if self.n_splits < 2 {
            return Err(SelectionError::InvalidConfig(format!(
                "n_splits must be >= 2, got {}",
                self.n_splits
            )));
        }
        if labels.is_empty() {
            return Err(SelectionError::EmptyInput);
        }

        let (mut negatives, mut positives) = class_indices(labels);
        for (class, members) in [(false, &negatives), (true, &positives)] {
            if members.len() < self.n_splits {
                return Err(SelectionError::InsufficientClassMembers {
                    class,
                    count: members.len(),
                    required: self.n_splits,
                });
            }
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        negatives.shuffle(&mut rng);
        positives.shuffle(&mut rng);

        let mut test_sets: Vec<Vec<usize>> = vec![Vec::new(); self.n_splits];
        for members in [&negatives, &positives] {
            for (fold, chunk) in chunk_bounds(members.len(), self.n_splits).into_iter().enumerate() {
                test_sets[fold].extend_from_slice(&members[chunk.0..chunk.1]);
            }
        }

        let folds = test_sets
            .into_iter()
            .map(|mut test| {
                test.sort_unstable();
                let mut in_test = vec![false; labels.len()];
                for &i in &test {
                    in_test[i] = true;
                }
                let train = (0..labels.len()).filter(|&i| !in_test[i]).collect();
                Fold { train, test }
            })
            .collect();

        Ok(folds)
    }
}

/// `[start, end)` bounds of `parts` near-equal chunks over `len` items
fn chunk_bounds(len: usize, parts: usize) -> Vec<(usize, usize)> {
    let base = len / parts;
    let extra = len % parts;
    let mut bounds = Vec::with_capacity(parts);
    let mut start = 0;
    for part in 0..parts {
        let size = base + usize::from(part < extra);
        bounds.push((start, start + size));
        start += size;
    }
    bounds
}
