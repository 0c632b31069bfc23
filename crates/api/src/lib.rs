//! Customer Scoring API Server
//!
//! HTTP scoring service, training pipeline and shared start-up plumbing for
//! the `customer-scoring` binary.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use inference_engine::Predictor;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod error;
mod routes;
pub mod training;

use crate::config::{AppConfig, LoggingConfig};

/// Application state shared across handlers
pub struct AppState {
    /// Scoring service, loaded once and read concurrently
    pub predictor: Arc<Predictor>,
    pub version: String,
    pub start_time: Instant,
    /// Prometheus handle, absent when no recorder was installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(predictor: Predictor, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            predictor: Arc::new(predictor),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            metrics,
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health))
        .route("/metrics", get(routes::health::metrics))
        .route("/predict", post(routes::predictions::predict))
        .route("/predict_batch", post(routes::predictions::predict_batch))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Initialize logging; `RUST_LOG` overrides the configured level
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Invalid log filter")?;

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("Failed to set tracing subscriber")?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .context("Failed to set tracing subscriber")?;
    }
    Ok(())
}

/// Run the server until the listener fails
pub async fn run_server(config: AppConfig) -> Result<()> {
    let predictor = Predictor::new(config.predictor_config())?;
    if let Err(e) = predictor.load() {
        warn!("Artifacts not loaded at start-up, will retry on first request: {}", e);
    }

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics recorder unavailable: {}", e);
            None
        }
    };

    let state = Arc::new(AppState::new(predictor, metrics));
    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use feature_engine::{raw_feature_names, FeatureEngineer, Table};
    use inference_engine::PredictorConfig;
    use model_selector::AlgorithmCandidate;
    use ndarray::Array2;
    use tower::ServiceExt;

    const RAW: usize = 3;

    fn fitted_state() -> Arc<AppState> {
        let values = Array2::from_shape_fn((40, RAW), |(i, j)| {
            (((i * 13 + j * 5) % 17) as f64 - 8.0) / 2.0
        });
        let labels: Vec<bool> = values.rows().into_iter().map(|r| r[0] > 0.0).collect();

        let feature_engineer = FeatureEngineer::new(RAW);
        let table = Table::new(raw_feature_names(RAW), values).unwrap();
        let engineered = feature_engineer.create_features(&table).unwrap();
        let model = AlgorithmCandidate::LogisticRegression(Default::default())
            .fit(engineered.values(), &labels)
            .unwrap();

        let config = PredictorConfig {
            raw_feature_count: RAW,
            ..Default::default()
        };
        let predictor = Predictor::with_artifacts(config, model, feature_engineer).unwrap();
        Arc::new(AppState::new(predictor, None))
    }

    fn unloaded_state(dir: &std::path::Path) -> Arc<AppState> {
        let config = PredictorConfig {
            model_path: dir.join("model.bin"),
            feature_engineer_path: dir.join("feature_engineer.bin"),
            ..Default::default()
        };
        Arc::new(AppState::new(Predictor::new(config).unwrap(), None))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let app = create_router(fitted_state());

        let response = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["model_loaded"], true);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_predict_single() {
        let app = create_router(fitted_state());
        let request = post_json(
            "/predict",
            serde_json::json!({ "var_0": 3.5, "var_1": -1.0, "var_2": 0.5 }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let probability = body["probability"].as_f64().unwrap();
        let confidence = body["confidence"].as_f64().unwrap();
        assert_eq!(body["prediction"], probability > 0.5);
        assert!((confidence - (probability - 0.5).abs() * 2.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_predict_batch_keeps_order() {
        let state = fitted_state();
        let records = serde_json::json!([
            { "var_0": 4.0, "var_1": 0.0, "var_2": 1.0 },
            { "var_0": -4.0, "var_1": 0.0, "var_2": 1.0 },
            { "var_0": 0.5, "var_1": 2.0, "var_2": -3.0 },
        ]);

        let response = create_router(Arc::clone(&state))
            .oneshot(post_json("/predict_batch", records.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let batch = json_body(response).await;
        assert_eq!(batch.as_array().unwrap().len(), 3);

        for (i, record) in records.as_array().unwrap().iter().enumerate() {
            let single = create_router(Arc::clone(&state))
                .oneshot(post_json("/predict", record.clone()))
                .await
                .unwrap();
            let single = json_body(single).await;
            assert_eq!(single["prediction"], batch[i]["prediction"]);
            let delta = single["probability"].as_f64().unwrap() - batch[i]["probability"].as_f64().unwrap();
            assert!(delta.abs() < 1e-12, "row {i}");
        }
    }

    #[tokio::test]
    async fn test_empty_batch_answers_empty_list() {
        let response = create_router(fitted_state())
            .oneshot(post_json("/predict_batch", serde_json::json!([])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_batch_with_differing_keys_is_unprocessable() {
        let records = serde_json::json!([
            { "var_0": 1.0, "var_1": 0.0, "var_2": 1.0 },
            { "var_0": -1.0, "var_1": 0.0 },
        ]);
        let response = create_router(fitted_state())
            .oneshot(post_json("/predict_batch", records))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("Invalid request"), "{message}");
        assert!(message.contains("var_2"), "{message}");
    }

    #[tokio::test]
    async fn test_malformed_body_gets_json_error() {
        let app = create_router(fitted_state());

        let response = app
            .clone()
            .oneshot(post_json("/predict", serde_json::json!({ "ID_code": "x" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json_body(response).await["error"].is_string());

        let request = Request::builder()
            .method("POST")
            .uri("/predict_batch")
            .header("content-type", "application/json")
            .body(Body::from("[{"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_missing_features_is_unprocessable() {
        let app = create_router(fitted_state());
        let response = app
            .oneshot(post_json("/predict", serde_json::json!({ "var_0": 1.0 })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("var_1"));
    }

    #[tokio::test]
    async fn test_unloaded_predictor_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(unloaded_state(dir.path()));

        let health = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(health).await["model_loaded"], false);

        let response = app
            .oneshot(post_json("/predict", serde_json::json!({ "var_0": 1.0 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let app = create_router(fitted_state());
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
