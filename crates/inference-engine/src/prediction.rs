//! Prediction Results

use feature_engine::Table;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::PredictorError;

/// Column names of a prediction table, after the optional `ID_code`
pub const PREDICTION_COLUMNS: [&str; 3] = ["prediction", "probability", "confidence"];

/// Thresholded decision for one row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: bool,
    pub probability: f64,
    /// Distance from 0.5, scaled to [0, 1] for probabilities in [0, 1]
    pub confidence: f64,
}

impl PredictionResult {
    /// `prediction` holds only when `probability` is strictly above `threshold`
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        Self {
            prediction: probability > threshold,
            probability,
            confidence: (probability - 0.5).abs() * 2.0,
        }
    }
}

/// Results of a batch call, aligned with the input rows
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictionTable {
    /// Passthrough `ID_code` values, when the input carried them
    pub ids: Option<Vec<String>>,
    pub results: Vec<PredictionResult>,
}

impl PredictionTable {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Tabular form: `prediction` as 0/1, then probability and confidence
    pub fn to_table(&self) -> Result<Table, PredictorError> {
        let values = Array2::from_shape_fn((self.results.len(), PREDICTION_COLUMNS.len()), |(i, j)| {
            let result = &self.results[i];
            match j {
                0 => f64::from(u8::from(result.prediction)),
                1 => result.probability,
                _ => result.confidence,
            }
        });

        let columns = PREDICTION_COLUMNS.iter().map(|c| c.to_string()).collect();
        let table = Table::new(columns, values)?;
        match &self.ids {
            Some(ids) => Ok(table.with_ids(ids.clone())?),
            None => Ok(table),
        }
    }

    /// Parse a table produced by [`to_table`](Self::to_table)
    pub fn from_table(table: &Table) -> Result<Self, PredictorError> {
        let column = |name: &str| {
            table.column(name).ok_or_else(|| {
                PredictorError::InvalidPredictionTable(format!("missing column {name}"))
            })
        };
        let predictions = column(PREDICTION_COLUMNS[0])?;
        let probabilities = column(PREDICTION_COLUMNS[1])?;
        let confidences = column(PREDICTION_COLUMNS[2])?;

        let mut results = Vec::with_capacity(table.n_rows());
        for i in 0..table.n_rows() {
            let prediction = match predictions[i] {
                v if v == 0.0 => false,
                v if v == 1.0 => true,
                v => {
                    return Err(PredictorError::InvalidPredictionTable(format!(
                        "row {i}: prediction must be 0 or 1, got {v}"
                    )))
                }
            };
            results.push(PredictionResult {
                prediction,
                probability: probabilities[i],
                confidence: confidences[i],
            });
        }

        Ok(Self {
            ids: table.ids().map(<[String]>::to_vec),
            results,
        })
    }
}
