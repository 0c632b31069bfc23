//! Cross-Validated Algorithm Comparison

use std::time::{Duration, Instant};

use ndarray::{ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::boosting::SCALE_POS_WEIGHT;
use crate::candidate::AlgorithmCandidate;
use crate::metrics::{mean_and_std, roc_auc};
use crate::validation::{stratified_subsample, StratifiedKFold};
use crate::SelectionError;

/// Seed shared by subsampling, fold shuffling and every candidate
pub const DEFAULT_SEED: u64 = 42;

/// Selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub seed: u64,
    /// Cross-validation folds per candidate
    pub folds: usize,
    /// Row cap applied before cross-validation
    pub sample_size: usize,
    /// Positive-class weight multiplier of the boosted-trees candidate
    pub scale_pos_weight: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            folds: 5,
            sample_size: 25_000,
            scale_pos_weight: SCALE_POS_WEIGHT,
        }
    }
}

/// Cross-validation outcome of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmResult {
    pub name: String,
    pub mean_auc: f64,
    /// Population standard deviation of the fold scores
    pub std_auc: f64,
    pub elapsed: Duration,
    pub fold_scores: Vec<f64>,
}

/// Compares the fixed candidates and remembers every result it produced
#[derive(Debug, Default)]
pub struct ModelSelector {
    config: SelectionConfig,
    results: Vec<AlgorithmResult>,
    best: Option<AlgorithmCandidate>,
}

impl ModelSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self {
            config,
            results: Vec::new(),
            best: None,
        }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Evaluate the preset candidates and return an unfit copy of the best.
    ///
    /// At most `sample_size` rows take part, drawn with class proportions
    /// kept. `x` itself is never modified.
    pub fn compare_algorithms(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &[bool],
        sample_size: usize,
    ) -> Result<AlgorithmCandidate, SelectionError> {
        let candidates = AlgorithmCandidate::presets(&self.config);
        self.compare_candidates(&candidates, x, y, sample_size)
    }

    /// Same as [`compare_algorithms`](Self::compare_algorithms) over an
    /// explicit candidate list.
    ///
    /// Candidates are scored in list order and a later one replaces the
    /// current best only with a strictly higher mean AUC, so ties go to the
    /// earliest candidate.
    pub fn compare_candidates(
        &mut self,
        candidates: &[AlgorithmCandidate],
        x: ArrayView2<'_, f64>,
        y: &[bool],
        sample_size: usize,
    ) -> Result<AlgorithmCandidate, SelectionError> {
        if candidates.is_empty() {
            return Err(SelectionError::InvalidConfig(
                "no candidates to compare".to_string(),
            ));
        }
        if x.nrows() == 0 {
            return Err(SelectionError::EmptyInput);
        }
        if x.nrows() != y.len() {
            return Err(SelectionError::LengthMismatch {
                rows: x.nrows(),
                labels: y.len(),
            });
        }

        let (x, y) = if x.nrows() > sample_size {
            let rows = stratified_subsample(y, sample_size, self.config.seed);
            info!("Sampling {} of {} rows for comparison", rows.len(), x.nrows());
            let labels: Vec<bool> = rows.iter().map(|&i| y[i]).collect();
            (x.select(Axis(0), &rows), labels)
        } else {
            (x.to_owned(), y.to_vec())
        };

        let folds = StratifiedKFold::new(self.config.folds, self.config.seed).split(&y)?;

        let mut best: Option<(f64, &AlgorithmCandidate)> = None;
        for candidate in candidates {
            let started = Instant::now();
            let mut fold_scores = Vec::with_capacity(folds.len());

            for (k, fold) in folds.iter().enumerate() {
                let train_labels: Vec<bool> = fold.train.iter().map(|&i| y[i]).collect();
                let test_labels: Vec<bool> = fold.test.iter().map(|&i| y[i]).collect();

                let model = candidate.fit(x.select(Axis(0), &fold.train).view(), &train_labels)?;
                let scores = model
                    .predict_proba(x.select(Axis(0), &fold.test).view())?
                    .to_vec();
                let auc = roc_auc(&test_labels, &scores)?;
                debug!("{} fold {}: AUC {:.4}", candidate.name(), k + 1, auc);
                fold_scores.push(auc);
            }

            let (mean_auc, std_auc) = mean_and_std(&fold_scores);
            let elapsed = started.elapsed();
            info!(
                "{}: {:.4} (±{:.4}) - {:.1}s",
                candidate.name(),
                mean_auc,
                std_auc,
                elapsed.as_secs_f64()
            );

            if best.map_or(true, |(score, _)| mean_auc > score) {
                best = Some((mean_auc, candidate));
            }

            self.results.push(AlgorithmResult {
                name: candidate.name().to_string(),
                mean_auc,
                std_auc,
                elapsed,
                fold_scores,
            });
        }

        let (score, winner) = best.ok_or(SelectionError::EmptyInput)?;
        info!("Best algorithm: {} (AUC {:.4})", winner.name(), score);

        self.best = Some(winner.clone());
        Ok(winner.clone())
    }

    /// Every result produced by this selector, oldest first
    pub fn results(&self) -> &[AlgorithmResult] {
        &self.results
    }

    /// Winner of the most recent comparison
    pub fn best_candidate(&self) -> Option<&AlgorithmCandidate> {
        self.best.as_ref()
    }
}
