//! Model Selection
//!
//! Candidate classifiers, stratified cross-validation and ROC-AUC based
//! comparison used to pick the scoring model during training.

mod boosting;
mod candidate;
mod forest;
mod logistic;
pub mod metrics;
mod selector;
mod tree;
pub mod validation;

pub use boosting::{GradientBoostedTrees, GradientBoostingParams, SCALE_POS_WEIGHT};
pub use candidate::{AlgorithmCandidate, ClassWeight, TrainedModel};
pub use forest::{RandomForest, RandomForestParams};
pub use logistic::{LogisticRegression, LogisticRegressionParams};
pub use selector::{AlgorithmResult, ModelSelector, SelectionConfig, DEFAULT_SEED};

use thiserror::Error;

/// Errors during model fitting, scoring or selection
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("Empty input: no rows to fit or evaluate")]
    EmptyInput,
    #[error("Label count {labels} does not match row count {rows}")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("Class {class} has {count} members, at least {required} required")]
    InsufficientClassMembers {
        class: bool,
        count: usize,
        required: usize,
    },
    #[error("ROC-AUC is undefined when only one class is present")]
    SingleClass,
    #[error("Model expects {expected} features, got {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
