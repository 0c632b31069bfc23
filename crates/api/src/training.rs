//! Training Pipeline
//!
//! Reads labeled data, selects an algorithm by cross-validated AUC, fits it
//! on every row and persists both artifacts.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use feature_engine::{FeatureEngineer, Table};
use model_selector::{AlgorithmResult, ModelSelector};
use serde::Serialize;
use storage::{read_table, ArtifactStore};
use tracing::info;

use crate::config::AppConfig;

/// Label column of the training data
pub const TARGET_COLUMN: &str = "target";

/// Outcome of a training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub best_algorithm: String,
    pub results: Vec<AlgorithmResult>,
    pub n_rows: usize,
    pub n_features: usize,
    pub model_path: PathBuf,
    pub feature_engineer_path: PathBuf,
}

/// Train from the configured training file
pub fn train_model(config: &AppConfig) -> Result<TrainingReport> {
    let path = &config.paths.train_data;
    if !path.exists() {
        bail!("Training data not found at {}", path.display());
    }

    info!("Loading training data from {}", path.display());
    let table = read_table(path).context("Failed to read training data")?;
    train_on_table(&table, config)
}

/// Train on an in-memory labeled table
pub fn train_on_table(table: &Table, config: &AppConfig) -> Result<TrainingReport> {
    let started = Instant::now();
    let labels = labels(table)?;

    let feature_engineer = FeatureEngineer::new(config.model.raw_feature_count);
    let raw = table
        .select(&feature_engineer.raw_feature_names())
        .context("Training data lacks raw features")?;
    let engineered = feature_engineer.create_features(&raw)?;
    let x = engineered.values();
    info!(
        "Training on {} rows x {} features ({} positive)",
        x.nrows(),
        x.ncols(),
        labels.iter().filter(|&&l| l).count()
    );

    let mut selector = ModelSelector::new(config.selection_config());
    let best = selector
        .compare_algorithms(x, &labels, config.model.sample_size)
        .context("Algorithm comparison failed")?;

    info!("Fitting {} on the full dataset", best.name());
    let model = best.fit(x, &labels).context("Final fit failed")?;

    ArtifactStore::save(&model, &config.paths.model).context("Failed to save model")?;
    ArtifactStore::save(&feature_engineer, &config.paths.feature_engineer)
        .context("Failed to save feature engineer")?;

    info!(
        "Training complete in {:.1}s",
        started.elapsed().as_secs_f64()
    );

    Ok(TrainingReport {
        best_algorithm: best.name().to_string(),
        results: selector.results().to_vec(),
        n_rows: x.nrows(),
        n_features: x.ncols(),
        model_path: config.paths.model.clone(),
        feature_engineer_path: config.paths.feature_engineer.clone(),
    })
}

/// 0/1 target column as booleans
fn labels(table: &Table) -> Result<Vec<bool>> {
    let Some(column) = table.column(TARGET_COLUMN) else {
        bail!("Training data has no '{}' column", TARGET_COLUMN);
    };

    column
        .iter()
        .enumerate()
        .map(|(row, &value)| match value {
            v if v == 0.0 => Ok(false),
            v if v == 1.0 => Ok(true),
            v => bail!("Row {}: target must be 0 or 1, got {}", row, v),
        })
        .collect()
}
