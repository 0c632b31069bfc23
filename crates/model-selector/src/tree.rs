//! Feature Binning and Decision Tree Structure

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Upper bound on bins per feature so a bin index fits in a byte
pub(crate) const MAX_BINS: usize = 256;

/// Per-feature split thresholds learned from training data.
///
/// A value `v` falls in bin `b` when exactly `b` thresholds are below it, so
/// `bin(v) <= b` is equivalent to `v <= threshold(b)`.
#[derive(Debug, Clone)]
pub(crate) struct BinMapper {
    thresholds: Vec<Vec<f64>>,
}

impl BinMapper {
    /// Learn at most `max_bins` bins for every column of `x`
    pub(crate) fn fit(x: ArrayView2<'_, f64>, max_bins: usize) -> Self {
        let max_bins = max_bins.clamp(2, MAX_BINS);
        let thresholds = x
            .columns()
            .into_iter()
            .map(|column| {
                let mut sorted: Vec<f64> = column.iter().copied().collect();
                sorted.sort_by(f64::total_cmp);
                feature_thresholds(&sorted, max_bins)
            })
            .collect();
        Self { thresholds }
    }

    pub(crate) fn n_features(&self) -> usize {
        self.thresholds.len()
    }

    pub(crate) fn n_bins(&self, feature: usize) -> usize {
        self.thresholds[feature].len() + 1
    }

    /// Raw value separating bins `..=bin` from the rest
    pub(crate) fn threshold(&self, feature: usize, bin: usize) -> f64 {
        self.thresholds[feature][bin]
    }

    fn bin(&self, feature: usize, value: f64) -> u8 {
        self.thresholds[feature].partition_point(|&t| t < value) as u8
    }

    /// Bin every value of `x`, column-major
    pub(crate) fn transform(&self, x: ArrayView2<'_, f64>) -> BinnedMatrix {
        let n_rows = x.nrows();
        let mut bins = Vec::with_capacity(n_rows * x.ncols());
        for (feature, column) in x.columns().into_iter().enumerate() {
            bins.extend(column.iter().map(|&v| self.bin(feature, v)));
        }
        BinnedMatrix { n_rows, bins }
    }
}

/// Thresholds for one sorted column: midpoints between distinct values when
/// they fit in the bin budget, quantile cut points otherwise.
fn feature_thresholds(sorted: &[f64], max_bins: usize) -> Vec<f64> {
    let mut distinct: Vec<f64> = sorted.to_vec();
    distinct.dedup();

    if distinct.len() <= max_bins {
        return distinct.windows(2).map(|w| w[0] + (w[1] - w[0]) / 2.0).collect();
    }

    let n = sorted.len();
    let last = sorted[n - 1];
    let mut thresholds: Vec<f64> = Vec::with_capacity(max_bins - 1);
    for i in 1..max_bins {
        let cut = sorted[i * n / max_bins];
        if cut < last && thresholds.last().map_or(true, |&prev| cut > prev) {
            thresholds.push(cut);
        }
    }
    thresholds
}

/// Column-major bin indices of a training matrix
#[derive(Debug, Clone)]
pub(crate) struct BinnedMatrix {
    n_rows: usize,
    bins: Vec<u8>,
}

impl BinnedMatrix {
    pub(crate) fn column(&self, feature: usize) -> &[u8] {
        &self.bins[feature * self.n_rows..(feature + 1) * self.n_rows]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Binary tree routing `x[feature] <= threshold` to the left child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Tree consisting of a single leaf; its id is 0
    pub(crate) fn leaf(value: f64) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    /// Turn leaf `node` into a split with two new leaves, returning their ids
    pub(crate) fn split_leaf(
        &mut self,
        node: usize,
        feature: usize,
        threshold: f64,
        left_value: f64,
        right_value: f64,
    ) -> (usize, usize) {
        let left = self.nodes.len();
        let right = left + 1;
        self.nodes.push(Node::Leaf { value: left_value });
        self.nodes.push(Node::Leaf { value: right_value });
        self.nodes[node] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        (left, right)
    }

    /// Leaf value reached by `row`
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut current = 0;
        loop {
            match &self.nodes[current] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    current = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }
}
