//! Random Forest Classifier

use ndarray::{Array1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::candidate::{class_weights, ClassWeight};
use crate::tree::{BinMapper, BinnedMatrix, DecisionTree, MAX_BINS};
use crate::SelectionError;

/// Hyperparameters of the tree-ensemble candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    /// Depth limit; `None` grows trees until leaves are pure
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    /// Features tried per split; `None` means `sqrt(n_features)`
    pub max_features: Option<usize>,
    pub max_bins: usize,
    pub bootstrap: bool,
    pub class_weight: ClassWeight,
    /// Build trees on all available cores
    pub parallel: bool,
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_leaf: 1,
            max_features: None,
            max_bins: MAX_BINS - 1,
            bootstrap: true,
            class_weight: ClassWeight::Balanced,
            parallel: true,
            seed: crate::DEFAULT_SEED,
        }
    }
}

/// Fitted forest; probabilities are the mean of per-tree leaf fractions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
}

/// Read-only inputs shared by every tree
struct ForestData<'a> {
    binned: &'a BinnedMatrix,
    mapper: &'a BinMapper,
    labels: &'a [bool],
    class_weight: (f64, f64),
    max_features: usize,
}

impl RandomForest {
    /// Fit `n_estimators` Gini trees on bootstrap samples.
    ///
    /// Tree `t` draws from its own generator seeded with `seed + t`, so the
    /// forest is identical whether trees are built in parallel or not.
    pub fn fit(
        params: &RandomForestParams,
        x: ArrayView2<'_, f64>,
        y: &[bool],
    ) -> Result<Self, SelectionError> {
        if params.n_estimators == 0 {
            return Err(SelectionError::InvalidConfig(
                "n_estimators must be positive".to_string(),
            ));
        }

        let n_features = x.ncols();
        let mapper = BinMapper::fit(x, params.max_bins);
        let binned = mapper.transform(x);
        let max_features = params
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt() as usize)
            .clamp(1, n_features.max(1));

        let data = ForestData {
            binned: &binned,
            mapper: &mapper,
            labels: y,
            class_weight: class_weights(params.class_weight, y),
            max_features,
        };

        let build = |t: usize| build_tree(params, &data, params.seed.wrapping_add(t as u64));
        let trees: Vec<DecisionTree> = if params.parallel {
            (0..params.n_estimators).into_par_iter().map(build).collect()
        } else {
            (0..params.n_estimators).map(build).collect()
        };

        debug!(
            "Random forest fitted: {} trees, {} leaves on average",
            trees.len(),
            trees.iter().map(DecisionTree::n_leaves).sum::<usize>() / trees.len()
        );

        Ok(Self { trees, n_features })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Positive-class probability per row
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let n_trees = self.trees.len() as f64;
        Array1::from_iter(x.rows().into_iter().map(|row| {
            self.trees.iter().map(|tree| tree.predict_row(row)).sum::<f64>() / n_trees
        }))
    }
}

fn build_tree(params: &RandomForestParams, data: &ForestData<'_>, seed: u64) -> DecisionTree {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_rows = data.labels.len();
    let n_features = data.mapper.n_features();

    let mut multiplicity = vec![0u32; n_rows];
    if params.bootstrap {
        for _ in 0..n_rows {
            multiplicity[rng.gen_range(0..n_rows)] += 1;
        }
    } else {
        multiplicity.iter_mut().for_each(|m| *m = 1);
    }

    let (w_neg, w_pos) = data.class_weight;
    let weights: Vec<[f64; 2]> = (0..n_rows)
        .map(|i| {
            let m = f64::from(multiplicity[i]);
            if data.labels[i] {
                [0.0, w_pos * m]
            } else {
                [w_neg * m, 0.0]
            }
        })
        .collect();

    let root: Vec<usize> = (0..n_rows).filter(|&i| multiplicity[i] > 0).collect();
    let root_totals = totals(&root, &weights);
    let mut tree = DecisionTree::leaf(positive_fraction(root_totals));

    let mut stack = vec![(0usize, root, root_totals, 0usize)];
    while let Some((node, rows, node_totals, depth)) = stack.pop() {
        let pure = node_totals[0] <= 0.0 || node_totals[1] <= 0.0;
        let depth_reached = params.max_depth.is_some_and(|limit| depth >= limit);
        if pure || depth_reached || rows.len() < 2 * params.min_samples_leaf.max(1) {
            continue;
        }

        let candidates = index::sample(&mut rng, n_features, data.max_features.min(n_features));
        let split = best_split(
            data,
            &weights,
            &rows,
            node_totals,
            candidates.iter(),
            params.min_samples_leaf,
        );
        let Some(split) = split else {
            continue;
        };

        let column = data.binned.column(split.feature);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|&&i| column[i] as usize <= split.bin);

        let (left, right) = tree.split_leaf(
            node,
            split.feature,
            data.mapper.threshold(split.feature, split.bin),
            positive_fraction(split.left),
            positive_fraction(split.right),
        );
        stack.push((left, left_rows, split.left, depth + 1));
        stack.push((right, right_rows, split.right, depth + 1));
    }

    tree
}

struct GiniSplit {
    feature: usize,
    bin: usize,
    left: [f64; 2],
    right: [f64; 2],
}

fn best_split(
    data: &ForestData<'_>,
    weights: &[[f64; 2]],
    rows: &[usize],
    node_totals: [f64; 2],
    features: impl Iterator<Item = usize>,
    min_samples_leaf: usize,
) -> Option<GiniSplit> {
    let parent_score = purity(node_totals);
    let mut best: Option<(f64, GiniSplit)> = None;

    for feature in features {
        let n_bins = data.mapper.n_bins(feature);
        if n_bins < 2 {
            continue;
        }

        let column = data.binned.column(feature);
        let mut hist = vec![[0.0f64; 2]; n_bins];
        let mut counts = vec![0usize; n_bins];
        for &i in rows {
            let b = column[i] as usize;
            hist[b][0] += weights[i][0];
            hist[b][1] += weights[i][1];
            counts[b] += 1;
        }

        let mut left = [0.0, 0.0];
        let mut left_count = 0;
        for bin in 0..n_bins - 1 {
            left[0] += hist[bin][0];
            left[1] += hist[bin][1];
            left_count += counts[bin];

            let right_count = rows.len() - left_count;
            if left_count < min_samples_leaf.max(1) || right_count < min_samples_leaf.max(1) {
                continue;
            }

            let right = [node_totals[0] - left[0], node_totals[1] - left[1]];
            let gain = purity(left) + purity(right) - parent_score;
            if gain > 1e-12 && best.as_ref().map_or(true, |(g, _)| gain > *g) {
                best = Some((
                    gain,
                    GiniSplit {
                        feature,
                        bin,
                        left,
                        right,
                    },
                ));
            }
        }
    }

    best.map(|(_, split)| split)
}

fn totals(rows: &[usize], weights: &[[f64; 2]]) -> [f64; 2] {
    rows.iter().fold([0.0, 0.0], |acc, &i| {
        [acc[0] + weights[i][0], acc[1] + weights[i][1]]
    })
}

/// Sum of squared class weights over total weight; larger is purer
fn purity(totals: [f64; 2]) -> f64 {
    let total = totals[0] + totals[1];
    if total <= 0.0 {
        0.0
    } else {
        (totals[0] * totals[0] + totals[1] * totals[1]) / total
    }
}

fn positive_fraction(totals: [f64; 2]) -> f64 {
    let total = totals[0] + totals[1];
    if total <= 0.0 {
        0.5
    } else {
        totals[1] / total
    }
}
