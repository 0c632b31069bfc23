//! HTTP Error Mapping

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use feature_engine::FeatureError;
use inference_engine::PredictorError;
use thiserror::Error;
use tracing::{error, warn};

/// Errors returned by request handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Prediction(#[from] PredictorError),
    #[error("Invalid request: {0}")]
    BadRequest(#[from] FeatureError),
    #[error("Invalid request body: {}", .0.body_text())]
    Body(#[from] JsonRejection),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Prediction(PredictorError::MissingFeatures { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Prediction(PredictorError::ArtifactNotFound { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::BadRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Body(rejection) => rejection.status(),
            ApiError::Prediction(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Rejected request: {}", self);
        }

        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_status_mapping() {
        let missing = ApiError::from(PredictorError::MissingFeatures {
            missing: vec!["var_2".to_string()],
            total: 1,
        });
        assert_eq!(missing.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let unloaded = ApiError::from(PredictorError::ArtifactNotFound {
            artifact: "Model",
            path: PathBuf::from("models/model.bin"),
        });
        assert_eq!(unloaded.status(), StatusCode::SERVICE_UNAVAILABLE);

        let shape = ApiError::from(PredictorError::InvalidOutputShape {
            expected: 2,
            actual: 1,
        });
        assert_eq!(shape.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
