//! Inference Engine
//!
//! Loads the fitted feature engineer and scoring model, then turns raw
//! transaction tables into thresholded predictions.

mod batcher;
mod engine;
mod prediction;

pub use batcher::ChunkedScorer;
pub use engine::{Predictor, PredictorConfig, DEFAULT_BATCH_SIZE, DEFAULT_THRESHOLD};
pub use prediction::{PredictionResult, PredictionTable};

use std::path::PathBuf;

use feature_engine::FeatureError;
use model_selector::{SelectionError, TrainedModel};
use ndarray::ArrayView2;
use storage::StorageError;
use thiserror::Error;

/// Errors during artifact loading or prediction
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("{artifact} artifact not found at {}", path.display())]
    ArtifactNotFound {
        artifact: &'static str,
        path: PathBuf,
    },
    /// Carries at most the first five missing names, in declared order
    #[error("Missing {total} required features, first: {missing:?}")]
    MissingFeatures { missing: Vec<String>, total: usize },
    #[error("Feature engineering failed: {0}")]
    Feature(#[from] FeatureError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Model error: {0}")]
    Model(#[from] SelectionError),
    #[error("Invalid model output: expected {expected} probabilities, got {actual}")]
    InvalidOutputShape { expected: usize, actual: usize },
    #[error("Invalid prediction table: {0}")]
    InvalidPredictionTable(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Feature engineer expects {actual} raw features, configured for {expected}")]
    SchemaMismatch { expected: usize, actual: usize },
}

/// A fitted model exposing positive-class probabilities.
///
/// Output must hold one probability per input row, in row order. Values are
/// passed through as returned.
pub trait ScoringModel: Send + Sync {
    fn predict_probability(&self, rows: ArrayView2<'_, f64>) -> Result<Vec<f64>, PredictorError>;
}

impl ScoringModel for TrainedModel {
    fn predict_probability(&self, rows: ArrayView2<'_, f64>) -> Result<Vec<f64>, PredictorError> {
        Ok(self.predict_proba(rows)?.to_vec())
    }
}
