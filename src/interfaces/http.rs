//! Thin HTTP glue over the prediction pipeline.
//!
//! One POST route hands a `(ticker, date)` pair to the orchestrator and
//! relays the structured result. The caller always receives a well-formed
//! JSON body, either a populated prediction or an `error` field, never a
//! raw fault.

use crate::application::forecasting::PredictionService;
use crate::domain::errors::ForecastError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub fn router(service: Arc<PredictionService>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
struct PredictRequest {
    ticker: String,
    date: String,
}

async fn predict(
    State(service): State<Arc<PredictionService>>,
    Json(request): Json<PredictRequest>,
) -> Result<Response, ApiError> {
    validate_ticker(&request.ticker)?;

    info!(
        "Prediction request: ticker={}, date={}",
        request.ticker, request.date
    );
    let prediction = service.predict(&request.ticker, &request.date).await?;
    Ok(Json(prediction).into_response())
}

async fn health() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

/// Tickers are 1-5 ASCII letters, case-insensitive on input.
fn validate_ticker(raw: &str) -> Result<(), ForecastError> {
    let trimmed = raw.trim();
    let valid = (1..=5).contains(&trimmed.len())
        && trimmed.chars().all(|c| c.is_ascii_alphabetic());
    if valid {
        Ok(())
    } else {
        Err(ForecastError::InvalidTicker {
            input: raw.to_string(),
        })
    }
}

struct ApiError(ForecastError);

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ForecastError::InvalidDate { .. } | ForecastError::InvalidTicker { .. } => {
                StatusCode::BAD_REQUEST
            }
            ForecastError::DataUnavailable { .. } => StatusCode::NOT_FOUND,
            ForecastError::TrainingFailed { .. } | ForecastError::ModelLoadFailed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}
