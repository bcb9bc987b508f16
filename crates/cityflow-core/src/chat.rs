//! Stateless chat turn: forecast, explain, format.

use std::sync::Arc;

use cityflow_abstraction::ChatMessage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::explainer::{ALL_CATEGORIES, ExplanationContext, Explainer};
use crate::forecast::{Forecaster, InferenceRequest};

const DEFAULT_MODEL_TYPE: &str = "baseline";

fn default_model_type() -> String {
    DEFAULT_MODEL_TYPE.to_string()
}

/// Body of `POST /t5-chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation so far; only the latest user turn is used.
    pub messages: Vec<ChatMessage>,
    /// City to forecast for.
    pub city: String,
    /// Optional POI category.
    #[serde(default)]
    pub category: Option<String>,
    /// `baseline` or `finetune`; ignored without a category.
    #[serde(default = "default_model_type")]
    pub model_type: String,
}

/// Reply to a chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Markdown reply.
    pub reply: String,
}

/// Combines a forecast with its explanation.
#[derive(Debug)]
pub struct ChatOrchestrator {
    forecaster: Arc<Forecaster>,
    explainer: Arc<Explainer>,
}

impl ChatOrchestrator {
    /// Creates an orchestrator.
    pub const fn new(forecaster: Arc<Forecaster>, explainer: Arc<Explainer>) -> Self {
        Self { forecaster, explainer }
    }

    /// Answers one chat turn.
    ///
    /// # Errors
    /// `InvalidRequest` for an empty conversation or a blank city. Forecast
    /// errors propagate unchanged. Explanation problems never surface.
    pub async fn respond(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let query = latest_user_text(&request.messages)
            .ok_or_else(|| CoreError::InvalidRequest("No messages provided.".to_string()))?;

        let city = request.city.trim();
        if city.is_empty() {
            return Err(CoreError::InvalidRequest("City is required.".to_string()));
        }

        // Blank means absent; anything else is used exactly as sent.
        let category = request.category.as_deref().filter(|c| !c.trim().is_empty());
        let (model_type, forecast_category) = match category {
            Some(category) => (request.model_type.clone(), category.to_string()),
            None => (DEFAULT_MODEL_TYPE.to_string(), ALL_CATEGORIES.to_string()),
        };
        debug!(city, category = %forecast_category, model_type = %model_type, "Chat turn");

        let outcome = self
            .forecaster
            .run_forecast(&InferenceRequest {
                city: city.to_string(),
                category: forecast_category,
                model_type: model_type.clone(),
                query: query.clone(),
            })
            .await?;

        let explanation = self
            .explainer
            .explain(&ExplanationContext {
                city: city.to_string(),
                category: category.map(str::to_string),
                model_label: outcome.model_label.clone(),
                prediction: outcome.prediction.clone(),
                query,
            })
            .await;

        let location = match category {
            Some(category) => format!("{city} – {category}"),
            None => format!("{city} (all categories)"),
        };
        let reply = format!(
            "For **{location}**, using the **{label}** (mode: `{model_type}`), the T5 model predicts demand level:\n\n\
→ **{prediction}**\n\n{explanation}",
            label = outcome.model_label,
            prediction = outcome.prediction,
        );

        Ok(ChatResponse { reply })
    }
}

/// Content of the last `user` message, else of the final message.
fn latest_user_text(messages: &[ChatMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .or_else(|| messages.last())
        .map(|m| m.content.trim().to_string())
}
