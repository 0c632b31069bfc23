//! Configuration Management
//!
//! Built-in defaults, then an optional `config/scoring.toml`, then
//! `SCORING__<SECTION>__<KEY>` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use inference_engine::{PredictorConfig, DEFAULT_BATCH_SIZE, DEFAULT_THRESHOLD};
use model_selector::{SelectionConfig, DEFAULT_SEED, SCALE_POS_WEIGHT};
use serde::Deserialize;

/// Default configuration file, extension resolved by the `config` crate
pub const DEFAULT_CONFIG_FILE: &str = "config/scoring";

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Scoring and selection parameters
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub seed: u64,
    /// Decision threshold in [0, 1]
    pub threshold: f64,
    pub batch_size: usize,
    pub raw_feature_count: usize,
    /// Row cap for algorithm comparison
    pub sample_size: usize,
    pub folds: usize,
    /// Positive-class weight multiplier of the boosted-trees candidate
    pub scale_pos_weight: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let selection = SelectionConfig::default();
        Self {
            seed: DEFAULT_SEED,
            threshold: DEFAULT_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            raw_feature_count: feature_engine::RAW_FEATURE_COUNT,
            sample_size: selection.sample_size,
            folds: selection.folds,
            scale_pos_weight: SCALE_POS_WEIGHT,
        }
    }
}

/// Artifact and data file locations
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub model: PathBuf,
    pub feature_engineer: PathBuf,
    pub train_data: PathBuf,
    pub test_data: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let predictor = PredictorConfig::default();
        Self {
            model: predictor.model_path,
            feature_engineer: predictor.feature_engineer_path,
            train_data: PathBuf::from("data/train.csv"),
            test_data: PathBuf::from("data/test.csv"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load from the default file (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::build(File::with_name(DEFAULT_CONFIG_FILE).required(false), env_source())
    }

    /// Load from `path`, which must exist, and the environment
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(File::from(path.as_ref()).required(true), env_source())
    }

    fn build<F>(file: F, env: Environment) -> Result<Self>
    where
        F: config::Source + Send + Sync + 'static,
    {
        let config: Self = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let model = &self.model;
        if !(0.0..=1.0).contains(&model.threshold) {
            bail!("model.threshold must be within [0, 1], got {}", model.threshold);
        }
        if model.batch_size == 0 {
            bail!("model.batch_size must be positive");
        }
        if model.raw_feature_count == 0 {
            bail!("model.raw_feature_count must be positive");
        }
        if model.folds < 2 {
            bail!("model.folds must be at least 2, got {}", model.folds);
        }
        if model.sample_size < model.folds * 2 {
            bail!(
                "model.sample_size {} too small for {} folds",
                model.sample_size,
                model.folds
            );
        }
        Ok(())
    }

    pub fn predictor_config(&self) -> PredictorConfig {
        PredictorConfig {
            threshold: self.model.threshold,
            batch_size: self.model.batch_size,
            raw_feature_count: self.model.raw_feature_count,
            model_path: self.paths.model.clone(),
            feature_engineer_path: self.paths.feature_engineer.clone(),
        }
    }

    pub fn selection_config(&self) -> SelectionConfig {
        SelectionConfig {
            seed: self.model.seed,
            folds: self.model.folds,
            sample_size: self.model.sample_size,
            scale_pos_weight: self.model.scale_pos_weight,
        }
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("SCORING")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
