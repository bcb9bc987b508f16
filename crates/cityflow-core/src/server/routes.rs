//! HTTP handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::chat::{ChatRequest, ChatResponse};
use crate::error::{CoreError, Result};
use crate::forecast::{DEFAULT_QUERY, InferenceRequest};
use crate::service::ForecastService;

/// Advice string returned with every successful forecast.
pub const FORECAST_ADVICE: &str = "✅ Inference ok";

fn default_model_type() -> String {
    "baseline".to_string()
}

fn default_query() -> String {
    DEFAULT_QUERY.to_string()
}

/// Query string of `GET /forecast`.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastParams {
    /// City to forecast for.
    pub city: String,
    /// POI category, or `ALL`.
    pub category: String,
    /// `baseline` (default) or `finetune`.
    #[serde(default = "default_model_type")]
    pub model_type: String,
    /// Free-text time or situation description.
    #[serde(default = "default_query")]
    pub query: String,
}

/// Body of a successful `GET /forecast`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastResponse {
    /// Display label of the model used.
    pub model: String,
    /// Decoded forecaster output.
    pub prediction: String,
    /// Placeholder interval, always `[0, 0]`.
    pub interval: [u32; 2],
    /// Always [`FORECAST_ADVICE`].
    pub advice: String,
}

/// `GET /ping` liveness check.
pub async fn ping() -> Json<Value> {
    Json(json!({ "msg": "pong" }))
}

/// `GET /forecast`: one forecast without explanation.
pub async fn forecast(
    State(service): State<Arc<ForecastService>>,
    params: std::result::Result<Query<ForecastParams>, QueryRejection>,
) -> Result<Json<ForecastResponse>> {
    let Query(params) = params.map_err(|e| CoreError::InvalidRequest(e.body_text()))?;

    let outcome = service
        .forecaster()
        .run_forecast(&InferenceRequest {
            city: params.city,
            category: params.category,
            model_type: params.model_type,
            query: params.query,
        })
        .await?;

    Ok(Json(ForecastResponse {
        model: outcome.model_label,
        prediction: outcome.prediction,
        interval: [0, 0],
        advice: FORECAST_ADVICE.to_string(),
    }))
}

/// `POST /t5-chat`: forecast plus plain-language explanation.
pub async fn t5_chat(
    State(service): State<Arc<ForecastService>>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let Json(request) = payload.map_err(|e| CoreError::InvalidRequest(e.body_text()))?;
    service.chat().respond(&request).await.map(Json)
}

/// `GET /v1/manifest`: the published manifest file as-is.
pub async fn manifest(State(service): State<Arc<ForecastService>>) -> Result<Json<Value>> {
    Ok(Json(service.manifest().load().await?))
}
