//! Prediction Routes

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use feature_engine::{RawRecord, Table};
use inference_engine::PredictionResult;
use metrics::{counter, histogram};
use tracing::debug;

use crate::error::ApiError;
use crate::AppState;

/// Score one record
pub async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RawRecord>, JsonRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    counter!("prediction_requests_total", "endpoint" => "predict").increment(1);
    let Json(record) = payload.map_err(record_error)?;
    let started = Instant::now();

    let predictor = Arc::clone(&state.predictor);
    let result = tokio::task::spawn_blocking(move || predictor.predict_single(&record))
        .await
        .map_err(|e| ApiError::Internal(format!("scoring task failed: {e}")))?
        .map_err(record_error)?;

    histogram!("prediction_latency_seconds", "endpoint" => "predict")
        .record(started.elapsed().as_secs_f64());
    counter!("predictions_total").increment(1);
    Ok(Json(result))
}

/// Score a list of records, answering in input order
pub async fn predict_batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Vec<RawRecord>>, JsonRejection>,
) -> Result<Json<Vec<PredictionResult>>, ApiError> {
    counter!("prediction_requests_total", "endpoint" => "predict_batch").increment(1);
    let Json(records) = payload.map_err(record_error)?;
    if records.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let started = Instant::now();
    let table = Table::from_records(&records).map_err(record_error)?;
    debug!("Batch request with {} records", table.n_rows());

    let predictor = Arc::clone(&state.predictor);
    let predictions = tokio::task::spawn_blocking(move || predictor.predict_batch(&table))
        .await
        .map_err(|e| ApiError::Internal(format!("scoring task failed: {e}")))?
        .map_err(record_error)?;

    histogram!("prediction_latency_seconds", "endpoint" => "predict_batch")
        .record(started.elapsed().as_secs_f64());
    counter!("predictions_total").increment(predictions.len() as u64);
    Ok(Json(predictions.results))
}

fn record_error(err: impl Into<ApiError>) -> ApiError {
    counter!("prediction_errors_total").increment(1);
    err.into()
}
