//! Predictor Implementation

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use feature_engine::{EngineeredTable, FeatureEngineer, RawRecord, Table, RAW_FEATURE_COUNT};
use model_selector::TrainedModel;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use storage::{read_table, write_table, ArtifactStore};
use tracing::{debug, info, warn};

use crate::batcher::ChunkedScorer;
use crate::prediction::{PredictionResult, PredictionTable};
use crate::{PredictorError, ScoringModel};

pub const DEFAULT_THRESHOLD: f64 = 0.5;
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Missing feature names reported in a `MissingFeatures` error
const REPORTED_MISSING: usize = 5;

/// Predictor settings, fixed at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Decision threshold in [0, 1]
    pub threshold: f64,
    /// Maximum rows per model call
    pub batch_size: usize,
    /// Raw variables the loaded feature engineer must expect
    pub raw_feature_count: usize,
    pub model_path: PathBuf,
    pub feature_engineer_path: PathBuf,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            raw_feature_count: RAW_FEATURE_COUNT,
            model_path: PathBuf::from("models/model.bin"),
            feature_engineer_path: PathBuf::from("models/feature_engineer.bin"),
        }
    }
}

#[derive(Debug)]
struct Artifacts<M> {
    model: M,
    feature_engineer: FeatureEngineer,
}

/// Scores raw transaction tables with the loaded artifacts.
///
/// Starts unloaded. The first successful load fixes the artifacts for the
/// life of the predictor; later loads leave them in place.
#[derive(Debug)]
pub struct Predictor<M = TrainedModel> {
    config: PredictorConfig,
    scorer: ChunkedScorer,
    artifacts: OnceLock<Artifacts<M>>,
}

impl<M: ScoringModel> Predictor<M> {
    /// Create an unloaded predictor
    pub fn new(config: PredictorConfig) -> Result<Self, PredictorError> {
        if !(0.0..=1.0).contains(&config.threshold) {
            return Err(PredictorError::InvalidConfig(format!(
                "threshold must be within [0, 1], got {}",
                config.threshold
            )));
        }

        info!(
            "Creating predictor: threshold={}, batch_size={}",
            config.threshold, config.batch_size
        );
        Ok(Self {
            scorer: ChunkedScorer::new(config.batch_size),
            config,
            artifacts: OnceLock::new(),
        })
    }

    /// Create a predictor that is already loaded with in-memory artifacts
    pub fn with_artifacts(
        config: PredictorConfig,
        model: M,
        feature_engineer: FeatureEngineer,
    ) -> Result<Self, PredictorError> {
        let predictor = Self::new(config)?;
        predictor.check_schema(&feature_engineer)?;
        // a fresh OnceLock is always empty
        let _ = predictor.artifacts.set(Artifacts {
            model,
            feature_engineer,
        });
        Ok(predictor)
    }

    /// Settings the predictor was built with
    pub fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Decision threshold
    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// Whether artifacts are in place
    pub fn is_loaded(&self) -> bool {
        self.artifacts.get().is_some()
    }

    /// Loaded feature engineer, if any
    pub fn feature_engineer(&self) -> Option<&FeatureEngineer> {
        self.artifacts.get().map(|a| &a.feature_engineer)
    }

    /// Validate the input schema and append the derived features.
    ///
    /// Loads the configured artifacts first when nothing is loaded yet.
    pub fn prepare(&self, table: &Table) -> Result<EngineeredTable, PredictorError>
    where
        M: DeserializeOwned,
    {
        let artifacts = self.ensure_loaded()?;
        prepare_with(&artifacts.feature_engineer, table)
    }

    /// Score one record
    pub fn predict_single(&self, record: &RawRecord) -> Result<PredictionResult, PredictorError>
    where
        M: DeserializeOwned,
    {
        let predictions = self.predict_batch(&Table::from_record(record))?;
        predictions
            .results
            .first()
            .copied()
            .ok_or(PredictorError::InvalidOutputShape {
                expected: 1,
                actual: 0,
            })
    }

    /// Score every row of `table`, keeping row order and passing `ID_code`
    /// values through
    pub fn predict_batch(&self, table: &Table) -> Result<PredictionTable, PredictorError>
    where
        M: DeserializeOwned,
    {
        let artifacts = self.ensure_loaded()?;
        let engineered = prepare_with(&artifacts.feature_engineer, table)?;

        let probabilities = self.scorer.score(&artifacts.model, engineered.values())?;
        let results: Vec<PredictionResult> = probabilities
            .into_iter()
            .map(|p| PredictionResult::from_probability(p, self.config.threshold))
            .collect();

        debug!(
            "Predicted {} rows, {} positive",
            results.len(),
            results.iter().filter(|r| r.prediction).count()
        );

        Ok(PredictionTable {
            ids: table.ids().map(<[String]>::to_vec),
            results,
        })
    }

    fn check_schema(&self, feature_engineer: &FeatureEngineer) -> Result<(), PredictorError> {
        let actual = feature_engineer.raw_feature_count();
        if actual != self.config.raw_feature_count {
            return Err(PredictorError::SchemaMismatch {
                expected: self.config.raw_feature_count,
                actual,
            });
        }
        Ok(())
    }

    /// Read a CSV table, score it and optionally write the results
    pub fn predict_from_source(
        &self,
        input: impl AsRef<Path>,
        output: Option<&Path>,
    ) -> Result<PredictionTable, PredictorError>
    where
        M: DeserializeOwned,
    {
        let table = read_table(input)?;
        let predictions = self.predict_batch(&table)?;

        if let Some(output) = output {
            write_table(&predictions.to_table()?, output)?;
            info!("Predictions saved to {}", output.display());
        }

        Ok(predictions)
    }
}

impl<M: ScoringModel + DeserializeOwned> Predictor<M> {
    /// Load the artifacts at the configured paths
    pub fn load(&self) -> Result<(), PredictorError> {
        self.load_from(&self.config.model_path, &self.config.feature_engineer_path)
    }

    /// Load both artifacts; both must exist before either is read.
    ///
    /// A predictor that is already loaded keeps its artifacts.
    pub fn load_from(
        &self,
        model_path: &Path,
        feature_engineer_path: &Path,
    ) -> Result<(), PredictorError> {
        if self.is_loaded() {
            warn!("Artifacts already loaded, ignoring load request");
            return Ok(());
        }

        for (artifact, path) in [("Model", model_path), ("Feature engineer", feature_engineer_path)] {
            if !path.exists() {
                return Err(PredictorError::ArtifactNotFound {
                    artifact,
                    path: path.to_path_buf(),
                });
            }
        }

        info!("Loading model from {}", model_path.display());
        let model: M = ArtifactStore::load(model_path)?;
        info!(
            "Loading feature engineer from {}",
            feature_engineer_path.display()
        );
        let feature_engineer: FeatureEngineer = ArtifactStore::load(feature_engineer_path)?;
        self.check_schema(&feature_engineer)?;

        if self
            .artifacts
            .set(Artifacts {
                model,
                feature_engineer,
            })
            .is_err()
        {
            warn!("Artifacts were loaded concurrently, keeping the first");
        }

        info!("Predictor loaded successfully");
        Ok(())
    }

    fn ensure_loaded(&self) -> Result<&Artifacts<M>, PredictorError> {
        if !self.is_loaded() {
            self.load()?;
        }
        self.artifacts.get().ok_or_else(|| PredictorError::ArtifactNotFound {
            artifact: "Model",
            path: self.config.model_path.clone(),
        })
    }
}

/// Keep only the raw columns, then derive features; `ID_code` rides along
fn prepare_with(
    feature_engineer: &FeatureEngineer,
    table: &Table,
) -> Result<EngineeredTable, PredictorError> {
    let required = feature_engineer.raw_feature_names();
    let missing = table.missing_columns(&required);
    if !missing.is_empty() {
        return Err(PredictorError::MissingFeatures {
            total: missing.len(),
            missing: missing.into_iter().take(REPORTED_MISSING).collect(),
        });
    }

    let raw = table.select(&required)?;
    Ok(feature_engineer.create_features(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use feature_engine::raw_feature_names;
    use ndarray::{Array2, ArrayView2};

    /// Logistic of the row mean over the first 200 columns
    #[derive(Debug, Serialize, Deserialize)]
    struct MeanModel;

    impl ScoringModel for MeanModel {
        fn predict_probability(&self, rows: ArrayView2<'_, f64>) -> Result<Vec<f64>, PredictorError> {
            Ok(rows
                .rows()
                .into_iter()
                .map(|row| {
                    let mean = row.iter().take(RAW_FEATURE_COUNT).sum::<f64>() / RAW_FEATURE_COUNT as f64;
                    1.0 / (1.0 + (-mean).exp())
                })
                .collect())
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct ConstantModel(f64);

    impl ScoringModel for ConstantModel {
        fn predict_probability(&self, rows: ArrayView2<'_, f64>) -> Result<Vec<f64>, PredictorError> {
            Ok(vec![self.0; rows.nrows()])
        }
    }

    fn raw_table(n_rows: usize) -> Table {
        let values = Array2::from_shape_fn((n_rows, RAW_FEATURE_COUNT), |(i, j)| {
            ((i * 31 + j * 7) % 19) as f64 - 9.0 + i as f64 * 0.1
        });
        let ids = (0..n_rows).map(|i| format!("test_{i}")).collect();
        Table::new(raw_feature_names(RAW_FEATURE_COUNT), values)
            .unwrap()
            .with_ids(ids)
            .unwrap()
    }

    fn config_in(dir: &Path) -> PredictorConfig {
        PredictorConfig {
            model_path: dir.join("model.bin"),
            feature_engineer_path: dir.join("feature_engineer.bin"),
            ..Default::default()
        }
    }

    fn loaded<M: ScoringModel>(model: M, batch_size: usize) -> Predictor<M> {
        let config = PredictorConfig {
            batch_size,
            ..Default::default()
        };
        Predictor::with_artifacts(config, model, FeatureEngineer::default()).unwrap()
    }

    #[test]
    fn test_batch_size_does_not_change_results() {
        let table = raw_table(23);
        let reference = loaded(MeanModel, 23).predict_batch(&table).unwrap();

        for batch_size in [1, 7, 23, DEFAULT_BATCH_SIZE] {
            let predictions = loaded(MeanModel, batch_size).predict_batch(&table).unwrap();
            assert_eq!(predictions, reference, "batch_size {batch_size}");
        }
        assert_eq!(reference.len(), 23);
        assert_eq!(reference.ids.as_deref().unwrap()[22], "test_22");
    }

    #[test]
    fn test_single_matches_batch_row() {
        let table = raw_table(3);
        let predictor = loaded(MeanModel, 10);
        let batch = predictor.predict_batch(&table).unwrap();

        let record: RawRecord = table
            .columns()
            .iter()
            .cloned()
            .zip(table.values().row(2).iter().copied())
            .collect();
        let single = predictor.predict_single(&record).unwrap();

        assert_relative_eq!(single.probability, batch.results[2].probability, epsilon = 1e-12);
        assert_eq!(single.prediction, batch.results[2].prediction);
    }

    #[test]
    fn test_probability_at_threshold_is_negative() {
        let predictor = loaded(ConstantModel(0.5), 10);
        let predictions = predictor.predict_batch(&raw_table(4)).unwrap();
        assert!(predictions.results.iter().all(|r| !r.prediction && r.confidence == 0.0));
    }

    #[test]
    fn test_missing_features_reports_first_five() {
        let table = Table::from_rows(
            vec!["var_0".to_string(), "var_1".to_string()],
            &[vec![1.0, -1.0]],
        )
        .unwrap();

        let err = loaded(MeanModel, 10).predict_batch(&table).unwrap_err();
        match err {
            PredictorError::MissingFeatures { missing, total } => {
                assert_eq!(missing, ["var_2", "var_3", "var_4", "var_5", "var_6"]);
                assert_eq!(total, RAW_FEATURE_COUNT - 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let table = raw_table(5);
        let mut columns = table.columns().to_vec();
        columns.push("target".to_string());
        let values = ndarray::concatenate(
            ndarray::Axis(1),
            &[table.values(), Array2::<f64>::ones((5, 1)).view()],
        )
        .unwrap();
        let with_target = Table::new(columns, values).unwrap();

        let predictor = loaded(MeanModel, 10);
        let plain = predictor.predict_batch(&table).unwrap();
        let extra = predictor.predict_batch(&with_target).unwrap();
        assert_eq!(plain.results, extra.results);
    }

    #[test]
    fn test_missing_artifact_keeps_unloaded() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        ArtifactStore::save(&FeatureEngineer::default(), &config.feature_engineer_path).unwrap();

        let predictor = Predictor::<MeanModel>::new(config).unwrap();
        let err = predictor.load().unwrap_err();

        assert!(matches!(
            err,
            PredictorError::ArtifactNotFound {
                artifact: "Model",
                ..
            }
        ));
        assert!(!predictor.is_loaded());
    }

    #[test]
    fn test_prepare_loads_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        ArtifactStore::save(&MeanModel, &config.model_path).unwrap();
        ArtifactStore::save(&FeatureEngineer::default(), &config.feature_engineer_path).unwrap();

        let predictor = Predictor::<MeanModel>::new(config).unwrap();
        assert!(!predictor.is_loaded());

        let engineered = predictor.prepare(&raw_table(2)).unwrap();
        assert!(predictor.is_loaded());
        assert_eq!(engineered.values().ncols(), RAW_FEATURE_COUNT + 8);
        assert_eq!(engineered.created_features().len(), 8);
    }

    #[test]
    fn test_second_load_keeps_first_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        ArtifactStore::save(&ConstantModel(0.9), &config.model_path).unwrap();
        ArtifactStore::save(&FeatureEngineer::default(), &config.feature_engineer_path).unwrap();

        let predictor = Predictor::<ConstantModel>::new(config.clone()).unwrap();
        predictor.load().unwrap();

        ArtifactStore::save(&ConstantModel(0.1), &config.model_path).unwrap();
        predictor.load().unwrap();

        let predictions = predictor.predict_batch(&raw_table(1)).unwrap();
        assert_eq!(predictions.results[0].probability, 0.9);
    }

    #[test]
    fn test_predict_from_source_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("test.csv");
        let output = dir.path().join("out").join("predictions.csv");
        write_table(&raw_table(12), &input).unwrap();

        let predictor = loaded(MeanModel, 5);
        let predictions = predictor.predict_from_source(&input, Some(&output)).unwrap();

        let reread = PredictionTable::from_table(&read_table(&output).unwrap()).unwrap();
        assert_eq!(reread.ids, predictions.ids);
        for (a, b) in reread.results.iter().zip(&predictions.results) {
            assert_eq!(a.prediction, b.prediction);
            assert_relative_eq!(a.probability, b.probability, epsilon = 1e-12);
            assert_relative_eq!(a.confidence, b.confidence, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rejects_feature_engineer_with_other_width() {
        let err = Predictor::with_artifacts(PredictorConfig::default(), MeanModel, FeatureEngineer::new(3))
            .unwrap_err();
        assert!(matches!(
            err,
            PredictorError::SchemaMismatch {
                expected: RAW_FEATURE_COUNT,
                actual: 3
            }
        ));

        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        ArtifactStore::save(&MeanModel, &config.model_path).unwrap();
        ArtifactStore::save(&FeatureEngineer::new(3), &config.feature_engineer_path).unwrap();

        let predictor = Predictor::<MeanModel>::new(config).unwrap();
        assert!(matches!(
            predictor.load(),
            Err(PredictorError::SchemaMismatch { actual: 3, .. })
        ));
        assert!(!predictor.is_loaded());
    }

    #[test]
    fn test_rejects_threshold_outside_unit_interval() {
        let config = PredictorConfig {
            threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            Predictor::<MeanModel>::new(config),
            Err(PredictorError::InvalidConfig(_))
        ));
    }
}
