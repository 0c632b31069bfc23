//! Algorithm Candidates and Fitted Models

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::boosting::{GradientBoostedTrees, GradientBoostingParams};
use crate::forest::{RandomForest, RandomForestParams};
use crate::logistic::{LogisticRegression, LogisticRegressionParams};
use crate::selector::SelectionConfig;
use crate::SelectionError;

/// Per-class sample weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassWeight {
    /// Every row weighs 1
    Uniform,
    /// Rows weigh `n_rows / (2 * n_rows_of_class)`
    Balanced,
}

/// (negative, positive) class weights for `labels`
pub(crate) fn class_weights(mode: ClassWeight, labels: &[bool]) -> (f64, f64) {
    match mode {
        ClassWeight::Uniform => (1.0, 1.0),
        ClassWeight::Balanced => {
            let n = labels.len() as f64;
            let n_pos = labels.iter().filter(|&&l| l).count() as f64;
            let n_neg = n - n_pos;
            let weight = |count: f64| if count > 0.0 { n / (2.0 * count) } else { 0.0 };
            (weight(n_neg), weight(n_pos))
        }
    }
}

/// An unfit algorithm configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlgorithmCandidate {
    LogisticRegression(LogisticRegressionParams),
    RandomForest(RandomForestParams),
    GradientBoosting(GradientBoostingParams),
}

impl AlgorithmCandidate {
    /// The three fixed candidates, in tie-break order
    pub fn presets(config: &SelectionConfig) -> Vec<Self> {
        vec![
            Self::LogisticRegression(LogisticRegressionParams {
                seed: config.seed,
                ..Default::default()
            }),
            Self::RandomForest(RandomForestParams {
                seed: config.seed,
                ..Default::default()
            }),
            Self::GradientBoosting(GradientBoostingParams {
                scale_pos_weight: config.scale_pos_weight,
                seed: config.seed,
                ..Default::default()
            }),
        ]
    }

    /// Name used in logs and selection reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::LogisticRegression(_) => "LogisticRegression",
            Self::RandomForest(_) => "RandomForest",
            Self::GradientBoosting(_) => "GradientBoosting",
        }
    }

    /// Fit a fresh model; the candidate itself is left untouched
    pub fn fit(&self, x: ArrayView2<'_, f64>, y: &[bool]) -> Result<TrainedModel, SelectionError> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(SelectionError::EmptyInput);
        }
        if x.nrows() != y.len() {
            return Err(SelectionError::LengthMismatch {
                rows: x.nrows(),
                labels: y.len(),
            });
        }

        let model = match self {
            Self::LogisticRegression(params) => {
                TrainedModel::LogisticRegression(LogisticRegression::fit(params, x, y)?)
            }
            Self::RandomForest(params) => {
                TrainedModel::RandomForest(RandomForest::fit(params, x, y)?)
            }
            Self::GradientBoosting(params) => {
                TrainedModel::GradientBoosting(GradientBoostedTrees::fit(params, x, y)?)
            }
        };
        Ok(model)
    }
}

/// A fitted classifier, immutable after `fit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrainedModel {
    LogisticRegression(LogisticRegression),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoostedTrees),
}

impl TrainedModel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LogisticRegression(_) => "LogisticRegression",
            Self::RandomForest(_) => "RandomForest",
            Self::GradientBoosting(_) => "GradientBoosting",
        }
    }

    /// Number of input columns the model was fitted on
    pub fn n_features(&self) -> usize {
        match self {
            Self::LogisticRegression(model) => model.n_features(),
            Self::RandomForest(model) => model.n_features(),
            Self::GradientBoosting(model) => model.n_features(),
        }
    }

    /// Positive-class probability per row, in row order
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, SelectionError> {
        if x.ncols() != self.n_features() {
            return Err(SelectionError::FeatureCountMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }

        Ok(match self {
            Self::LogisticRegression(model) => model.predict_proba(x),
            Self::RandomForest(model) => model.predict_proba(x),
            Self::GradientBoosting(model) => model.predict_proba(x),
        })
    }
}
