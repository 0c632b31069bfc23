//! Chunked Scoring

use ndarray::{ArrayView2, Axis};
use tracing::debug;

use crate::{PredictorError, ScoringModel};

/// Scores rows in sequential chunks of at most `batch_size` rows.
///
/// Chunks only bound the size of each model call; they run one after another
/// and the output keeps input row order.
#[derive(Debug, Clone, Copy)]
pub struct ChunkedScorer {
    batch_size: usize,
}

impl ChunkedScorer {
    /// A batch size of zero is treated as one
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// One probability per row of `rows`
    pub fn score<M: ScoringModel + ?Sized>(
        &self,
        model: &M,
        rows: ArrayView2<'_, f64>,
    ) -> Result<Vec<f64>, PredictorError> {
        let mut probabilities = Vec::with_capacity(rows.nrows());

        for (i, chunk) in rows.axis_chunks_iter(Axis(0), self.batch_size).enumerate() {
            let scored = model.predict_probability(chunk)?;
            if scored.len() != chunk.nrows() {
                return Err(PredictorError::InvalidOutputShape {
                    expected: chunk.nrows(),
                    actual: scored.len(),
                });
            }
            debug!("Scored chunk {} ({} rows)", i + 1, chunk.nrows());
            probabilities.extend(scored);
        }

        Ok(probabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use std::sync::Mutex;

    /// Returns the first column and records every chunk size it saw
    #[derive(Default)]
    struct Recorder {
        chunks: Mutex<Vec<usize>>,
    }

    impl ScoringModel for Recorder {
        fn predict_probability(&self, rows: ArrayView2<'_, f64>) -> Result<Vec<f64>, PredictorError> {
            self.chunks.lock().unwrap().push(rows.nrows());
            Ok(rows.column(0).to_vec())
        }
    }

    struct Truncating;

    impl ScoringModel for Truncating {
        fn predict_probability(&self, rows: ArrayView2<'_, f64>) -> Result<Vec<f64>, PredictorError> {
            Ok(vec![0.5; rows.nrows().saturating_sub(1)])
        }
    }

    #[test]
    fn test_chunks_cover_rows_in_order() {
        let rows = Array2::from_shape_fn((10, 2), |(i, _)| i as f64);
        let model = Recorder::default();

        let scores = ChunkedScorer::new(4).score(&model, rows.view()).unwrap();

        assert_eq!(scores, (0..10).map(|i| i as f64).collect::<Vec<_>>());
        assert_eq!(*model.chunks.lock().unwrap(), vec![4, 4, 2]);
    }

    #[test]
    fn test_zero_batch_size() {
        assert_eq!(ChunkedScorer::new(0).batch_size(), 1);
    }

    #[test]
    fn test_empty_input() {
        let rows = Array2::<f64>::zeros((0, 3));
        let scores = ChunkedScorer::new(8).score(&Recorder::default(), rows.view()).unwrap();
        assert!(scores.is_empty());
    }

    #[test]
    fn test_short_model_output() {
        let rows = Array2::<f64>::zeros((3, 1));
        let err = ChunkedScorer::new(8).score(&Truncating, rows.view()).unwrap_err();
        assert!(matches!(
            err,
            PredictorError::InvalidOutputShape {
                expected: 3,
                actual: 2
            }
        ));
    }
}
