//! Gradient-Boosted Decision Trees

use ndarray::{Array1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::logistic::sigmoid;
use crate::metrics::log_loss;
use crate::tree::{BinMapper, BinnedMatrix, DecisionTree, MAX_BINS};
use crate::SelectionError;

/// Known negative-to-positive ratio of the training population
pub const SCALE_POS_WEIGHT: f64 = 7.29;

/// Hyperparameters of the boosting candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingParams {
    /// Boosting rounds
    pub n_estimators: usize,
    pub learning_rate: f64,
    /// Leaves per tree; trees grow best-first
    pub num_leaves: usize,
    pub min_child_samples: usize,
    /// Minimum hessian sum in a child
    pub min_child_weight: f64,
    pub lambda_l2: f64,
    /// Share of features offered to each tree
    pub feature_fraction: f64,
    pub max_bins: usize,
    /// Multiplier on the gradient of positive rows
    pub scale_pos_weight: f64,
    pub seed: u64,
    /// Log training loss while boosting
    pub verbose: bool,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            learning_rate: 0.1,
            num_leaves: 31,
            min_child_samples: 20,
            min_child_weight: 1e-3,
            lambda_l2: 0.0,
            feature_fraction: 1.0,
            max_bins: MAX_BINS - 1,
            scale_pos_weight: SCALE_POS_WEIGHT,
            seed: crate::DEFAULT_SEED,
            verbose: false,
        }
    }
}

/// Fitted boosted ensemble on the log-odds scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    init_score: f64,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct GradStats {
    grad: f64,
    hess: f64,
    count: usize,
}

impl GradStats {
    fn add(&mut self, grad: f64, hess: f64) {
        self.grad += grad;
        self.hess += hess;
        self.count += 1;
    }

    fn minus(self, other: Self) -> Self {
        Self {
            grad: self.grad - other.grad,
            hess: self.hess - other.hess,
            count: self.count - other.count,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LeafSplit {
    feature: usize,
    bin: usize,
    gain: f64,
    left: GradStats,
    right: GradStats,
}

struct Leaf {
    node: usize,
    rows: Vec<usize>,
    /// Empty once the leaf has no admissible split
    hist: Histogram,
    best: Option<LeafSplit>,
}

/// Gradient histograms, one per sampled feature in `RoundData::features` order
type Histogram = Vec<Vec<GradStats>>;

/// Per-round inputs for growing one tree
struct RoundData<'a> {
    binned: &'a BinnedMatrix,
    mapper: &'a BinMapper,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
}

impl GradientBoostedTrees {
    /// Fit `n_estimators` rounds of Newton-step trees on the weighted log-loss
    pub fn fit(
        params: &GradientBoostingParams,
        x: ArrayView2<'_, f64>,
        y: &[bool],
    ) -> Result<Self, SelectionError> {
        if params.num_leaves < 2 {
            return Err(SelectionError::InvalidConfig(format!(
                "num_leaves must be >= 2, got {}",
                params.num_leaves
            )));
        }
        if !(params.feature_fraction > 0.0 && params.feature_fraction <= 1.0) {
            return Err(SelectionError::InvalidConfig(format!(
                "feature_fraction must be in (0, 1], got {}",
                params.feature_fraction
            )));
        }

        let n_rows = x.nrows();
        let n_features = x.ncols();
        let mapper = BinMapper::fit(x, params.max_bins);
        let binned = mapper.transform(x);
        let mut rng = StdRng::seed_from_u64(params.seed);

        let sample_weight: Vec<f64> = y
            .iter()
            .map(|&l| if l { params.scale_pos_weight } else { 1.0 })
            .collect();
        let weighted_pos: f64 = y
            .iter()
            .zip(&sample_weight)
            .filter(|(l, _)| **l)
            .map(|(_, w)| w)
            .sum();
        let base_rate = (weighted_pos / sample_weight.iter().sum::<f64>()).clamp(1e-15, 1.0 - 1e-15);
        let init_score = (base_rate / (1.0 - base_rate)).ln();

        let mut raw = vec![init_score; n_rows];
        let mut grad = vec![0.0; n_rows];
        let mut hess = vec![0.0; n_rows];
        let mut trees = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            for i in 0..n_rows {
                let p = sigmoid(raw[i]);
                let target = if y[i] { 1.0 } else { 0.0 };
                grad[i] = sample_weight[i] * (p - target);
                hess[i] = (sample_weight[i] * p * (1.0 - p)).max(1e-16);
            }

            let features = round_features(params, n_features, &mut rng);
            let data = RoundData {
                binned: &binned,
                mapper: &mapper,
                grad: &grad,
                hess: &hess,
                features: &features,
            };
            let tree = grow_tree(params, &data, n_rows);

            for (i, row) in x.rows().into_iter().enumerate() {
                raw[i] += tree.predict_row(row);
            }
            trees.push(tree);

            if params.verbose && (round + 1) % 10 == 0 {
                let probabilities: Vec<f64> = raw.iter().map(|&r| sigmoid(r)).collect();
                info!(
                    "Boosting round {}: training log-loss {:.5}",
                    round + 1,
                    log_loss(y, &probabilities)
                );
            }
        }

        debug!("Gradient boosting fitted: {} trees", trees.len());

        Ok(Self {
            init_score,
            trees,
            n_features,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        Array1::from_iter(x.rows().into_iter().map(|row| {
            let raw = self.init_score
                + self.trees.iter().map(|tree| tree.predict_row(row)).sum::<f64>();
            sigmoid(raw)
        }))
    }
}

fn round_features(params: &GradientBoostingParams, n_features: usize, rng: &mut StdRng) -> Vec<usize> {
    if params.feature_fraction >= 1.0 {
        return (0..n_features).collect();
    }
    let amount = ((n_features as f64 * params.feature_fraction).ceil() as usize).clamp(1, n_features.max(1));
    let mut features = index::sample(rng, n_features, amount.min(n_features)).into_vec();
    features.sort_unstable();
    features
}

/// Grow one tree best-first until `num_leaves` or no split has positive gain.
///
/// Only the smaller child of a split gets a fresh histogram; the larger one is
/// the parent's histogram minus it.
fn grow_tree(params: &GradientBoostingParams, data: &RoundData<'_>, n_rows: usize) -> DecisionTree {
    let rows: Vec<usize> = (0..n_rows).collect();
    let root_stats = stats_of(data, &rows);
    let mut tree = DecisionTree::leaf(leaf_value(params, root_stats));

    let root_hist = build_histogram(data, &rows);
    let mut leaves = vec![new_leaf(params, data, 0, rows, root_hist, root_stats)];

    while leaves.len() < params.num_leaves {
        let chosen = leaves
            .iter()
            .enumerate()
            .filter_map(|(i, leaf)| leaf.best.map(|split| (i, split.gain)))
            .fold(None, |acc: Option<(usize, f64)>, (i, gain)| match acc {
                Some((_, best_gain)) if best_gain >= gain => acc,
                _ => Some((i, gain)),
            });
        let Some((position, _)) = chosen else {
            break;
        };

        let leaf = leaves.swap_remove(position);
        let Some(split) = leaf.best else {
            break;
        };

        let column = data.binned.column(split.feature);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
            .rows
            .iter()
            .partition(|&&i| column[i] as usize <= split.bin);

        let (left, right) = tree.split_leaf(
            leaf.node,
            split.feature,
            data.mapper.threshold(split.feature, split.bin),
            leaf_value(params, split.left),
            leaf_value(params, split.right),
        );

        let (left_hist, right_hist) = if left_rows.len() <= right_rows.len() {
            let small = build_histogram(data, &left_rows);
            let large = subtract_histogram(leaf.hist, &small);
            (small, large)
        } else {
            let small = build_histogram(data, &right_rows);
            let large = subtract_histogram(leaf.hist, &small);
            (large, small)
        };

        leaves.push(new_leaf(params, data, left, left_rows, left_hist, split.left));
        leaves.push(new_leaf(params, data, right, right_rows, right_hist, split.right));
    }

    tree
}

fn new_leaf(
    params: &GradientBoostingParams,
    data: &RoundData<'_>,
    node: usize,
    rows: Vec<usize>,
    hist: Histogram,
    stats: GradStats,
) -> Leaf {
    let best = find_split(params, data, &hist, rows.len(), stats);
    Leaf {
        node,
        rows,
        hist: if best.is_some() { hist } else { Vec::new() },
        best,
    }
}

fn stats_of(data: &RoundData<'_>, rows: &[usize]) -> GradStats {
    let mut stats = GradStats::default();
    for &i in rows {
        stats.add(data.grad[i], data.hess[i]);
    }
    stats
}

fn build_histogram(data: &RoundData<'_>, rows: &[usize]) -> Histogram {
    data.features
        .iter()
        .map(|&feature| {
            let column = data.binned.column(feature);
            let mut bins = vec![GradStats::default(); data.mapper.n_bins(feature)];
            for &i in rows {
                bins[column[i] as usize].add(data.grad[i], data.hess[i]);
            }
            bins
        })
        .collect()
}

fn subtract_histogram(mut parent: Histogram, child: &Histogram) -> Histogram {
    for (parent_bins, child_bins) in parent.iter_mut().zip(child) {
        for (bucket, &sub) in parent_bins.iter_mut().zip(child_bins) {
            *bucket = bucket.minus(sub);
        }
    }
    parent
}

fn find_split(
    params: &GradientBoostingParams,
    data: &RoundData<'_>,
    hist: &Histogram,
    n_rows: usize,
    parent: GradStats,
) -> Option<LeafSplit> {
    if n_rows < 2 * params.min_child_samples.max(1) || hist.is_empty() {
        return None;
    }

    let parent_score = score(params, parent);
    let mut best: Option<LeafSplit> = None;

    for (&feature, bins) in data.features.iter().zip(hist) {
        if bins.len() < 2 {
            continue;
        }

        let mut left = GradStats::default();
        for (bin, bucket) in bins.iter().enumerate().take(bins.len() - 1) {
            left.grad += bucket.grad;
            left.hess += bucket.hess;
            left.count += bucket.count;

            let right = parent.minus(left);
            if left.count < params.min_child_samples
                || right.count < params.min_child_samples
                || left.hess < params.min_child_weight
                || right.hess < params.min_child_weight
            {
                continue;
            }

            let gain = score(params, left) + score(params, right) - parent_score;
            if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                best = Some(LeafSplit {
                    feature,
                    bin,
                    gain,
                    left,
                    right,
                });
            }
        }
    }

    best
}

fn score(params: &GradientBoostingParams, stats: GradStats) -> f64 {
    stats.grad * stats.grad / (stats.hess + params.lambda_l2)
}

fn leaf_value(params: &GradientBoostingParams, stats: GradStats) -> f64 {
    -params.learning_rate * stats.grad / (stats.hess + params.lambda_l2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::roc_auc;
    use ndarray::Array2;

    fn quadrant() -> (Array2<f64>, Vec<bool>) {
        let x = Array2::from_shape_fn((200, 2), |(i, j)| {
            let a = (i % 20) as f64 - 9.5;
            let b = (i / 20) as f64 - 4.5;
            if j == 0 {
                a
            } else {
                b
            }
        });
        let y = x.rows().into_iter().map(|r| r[0] > 0.0 && r[1] > 0.0).collect();
        (x, y)
    }

    #[test]
    fn test_fits_interaction() {
        let (x, y) = quadrant();
        let params = GradientBoostingParams {
            n_estimators: 50,
            min_child_samples: 5,
            ..Default::default()
        };

        let model = GradientBoostedTrees::fit(&params, x.view(), &y).unwrap();
        let proba = model.predict_proba(x.view());

        assert!(roc_auc(&y, proba.as_slice().unwrap()).unwrap() > 0.95);
    }

    #[test]
    fn test_trees_respect_leaf_budget() {
        let (x, y) = quadrant();
        let params = GradientBoostingParams {
            n_estimators: 3,
            num_leaves: 4,
            min_child_samples: 5,
            ..Default::default()
        };

        let model = GradientBoostedTrees::fit(&params, x.view(), &y).unwrap();
        assert!(model.trees.iter().all(|tree| tree.n_leaves() <= 4));
    }

    #[test]
    fn test_feature_fraction_is_seeded() {
        let (x, y) = quadrant();
        let params = GradientBoostingParams {
            n_estimators: 5,
            feature_fraction: 0.5,
            min_child_samples: 5,
            ..Default::default()
        };

        let a = GradientBoostedTrees::fit(&params, x.view(), &y).unwrap();
        let b = GradientBoostedTrees::fit(&params, x.view(), &y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sibling_histogram_from_subtraction() {
        let (x, _) = quadrant();
        let mapper = BinMapper::fit(x.view(), GradientBoostingParams::default().max_bins);
        let binned = mapper.transform(x.view());
        let grad: Vec<f64> = (0..x.nrows()).map(|i| (i % 7) as f64 * 0.25 - 0.8).collect();
        let hess: Vec<f64> = (0..x.nrows()).map(|i| 0.1 + (i % 3) as f64 * 0.05).collect();
        let data = RoundData {
            binned: &binned,
            mapper: &mapper,
            grad: &grad,
            hess: &hess,
            features: &[0, 1],
        };

        let all: Vec<usize> = (0..x.nrows()).collect();
        let (small, large): (Vec<usize>, Vec<usize>) = all.iter().partition(|&&i| i % 4 == 0);

        let derived = subtract_histogram(build_histogram(&data, &all), &build_histogram(&data, &small));
        let direct = build_histogram(&data, &large);
        for (d, e) in derived.iter().flatten().zip(direct.iter().flatten()) {
            assert_eq!(d.count, e.count);
            assert!((d.grad - e.grad).abs() < 1e-9);
            assert!((d.hess - e.hess).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rejects_single_leaf() {
        let (x, y) = quadrant();
        let params = GradientBoostingParams {
            num_leaves: 1,
            ..Default::default()
        };
        assert!(GradientBoostedTrees::fit(&params, x.view(), &y).is_err());
    }
}
