//! Google Gemini model implementation.
//!
//! Implements the `Model` trait over the `generateContent` REST endpoint and
//! exposes the model listing used by operator tooling.

use async_trait::async_trait;
use cityflow_abstraction::{ChatMessage, Model, ModelError, ModelParameters, ModelResponse, ModelUsage};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const PROVIDER: &str = "gemini";

/// Google Gemini model implementation.
#[derive(Debug, Clone)]
pub struct GeminiModel {
    /// The model ID (e.g., "gemini-2.5-flash").
    model_id: String,
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the Gemini API.
    base_url: String,
    /// Per-request deadline.
    timeout: Duration,
    /// HTTP client for making requests.
    client: Client,
}

/// A model advertised by the Gemini API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeminiModelInfo {
    /// Model ID without the `models/` prefix.
    pub id: String,
    /// Human readable name, when the API provides one.
    pub display_name: Option<String>,
}

impl GeminiModel {
    /// Creates a new `GeminiModel`, reading the key from `GEMINI_API_KEY`.
    ///
    /// # Errors
    /// Returns `ModelError::AuthenticationFailed` if the variable is unset or empty.
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn new(model_id: String) -> Result<Self, ModelError> {
        let api_key = env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ModelError::AuthenticationFailed("GEMINI_API_KEY environment variable not set".to_string())
            })?;

        Ok(Self::with_api_key(model_id, api_key))
    }

    /// Creates a new `GeminiModel` with an explicit API key.
    #[must_use]
    pub fn with_api_key(model_id: String, api_key: String) -> Self {
        Self {
            model_id,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            client: Client::new(),
        }
    }

    /// Points the client at another endpoint, e.g. a mock server.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn role_to_gemini(role: &str) -> String {
        match role {
            "assistant" => "model".to_string(),
            _ => role.to_string(),
        }
    }

    /// Joins all system messages into one instruction.
    fn extract_system_messages(messages: &[ChatMessage]) -> Option<String> {
        let system_messages: Vec<&str> =
            messages.iter().filter(|msg| msg.role == "system").map(|msg| msg.content.as_str()).collect();

        if system_messages.is_empty() { None } else { Some(system_messages.join("\n\n")) }
    }

    fn map_send_error(err: &reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout(format!("Gemini request timed out: {err}"))
        } else {
            ModelError::RequestError(format!("Network error: {err}"))
        }
    }

    fn map_status(status: StatusCode, error_text: String) -> ModelError {
        match status.as_u16() {
            401 | 403 => ModelError::AuthenticationFailed(format!("API error ({status}): {error_text}")),
            402 | 429 => ModelError::QuotaExceeded { provider: PROVIDER.to_string(), message: Some(error_text) },
            408 | 504 => ModelError::Timeout(format!("API error ({status}): {error_text}")),
            _ => ModelError::ModelResponseError(format!("API error ({status}): {error_text}")),
        }
    }

    /// Lists the models that support `generateContent`.
    ///
    /// # Errors
    /// Returns a `ModelError` if the request fails or the listing is malformed.
    pub async fn list_models(&self) -> Result<Vec<GeminiModelInfo>, ModelError> {
        let url = format!("{}/models?key={}", self.base_url, self.api_key);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Self::map_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Gemini model listing failed");
            return Err(Self::map_status(status, error_text));
        }

        let listing: GeminiModelList = response
            .json()
            .await
            .map_err(|e| ModelError::SerializationError(format!("Failed to parse model list: {e}")))?;

        Ok(listing
            .models
            .into_iter()
            .filter(|m| m.supported_generation_methods.iter().any(|method| method == "generateContent"))
            .map(|m| GeminiModelInfo {
                id: m.name.strip_prefix("models/").unwrap_or(&m.name).to_string(),
                display_name: m.display_name,
            })
            .collect())
    }
}

#[async_trait]
impl Model for GeminiModel {
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(model_id = %self.model_id, prompt_len = prompt.len(), "GeminiModel generating text");
        self.generate_chat_completion(&[ChatMessage::user(prompt)], parameters).await
    }

    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.model_id,
            message_count = messages.len(),
            parameters = ?parameters,
            "GeminiModel generating chat completion"
        );

        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, self.model_id, self.api_key);

        let request_body = GeminiRequest {
            contents: messages
                .iter()
                .filter(|msg| msg.role != "system")
                .map(|msg| GeminiContent {
                    role: Self::role_to_gemini(&msg.role),
                    parts: vec![GeminiPart { text: msg.content.clone() }],
                })
                .collect(),
            generation_config: parameters.map(|params| GeminiGenerationConfig {
                temperature: params.temperature,
                top_p: params.top_p,
                max_output_tokens: params.max_tokens,
                stop_sequences: params.stop_sequences,
            }),
            system_instruction: Self::extract_system_messages(messages)
                .map(|text| GeminiSystemInstruction { parts: vec![GeminiPart { text }] }),
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send request to Gemini API");
                Self::map_send_error(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %error_text, "Gemini API returned error status");
            return Err(Self::map_status(status, error_text));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Gemini API response");
            ModelError::SerializationError(format!("Failed to parse response: {e}"))
        })?;

        let content: String = gemini_response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| content.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default();

        if content.trim().is_empty() {
            let finish_reason =
                gemini_response.candidates.first().and_then(|c| c.finish_reason.clone());
            return Err(ModelError::EmptyResponse(format!(
                "Gemini returned no text (finish reason: {})",
                finish_reason.as_deref().unwrap_or("none")
            )));
        }

        let usage = gemini_response.usage_metadata.map(|meta| ModelUsage {
            prompt_tokens: meta.prompt_token_count.unwrap_or(0),
            completion_tokens: meta.candidates_token_count.unwrap_or(0),
            total_tokens: meta.total_token_count.unwrap_or(0),
        });

        Ok(ModelResponse { content, model_id: Some(self.model_id.clone()), usage })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// Gemini API request/response structures

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiSystemInstruction>,
}

#[derive(Debug, Serialize)]
struct GeminiSystemInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "topP", skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(rename = "stopSequences", skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)] // Matches API naming
struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<GeminiListedModel>,
}

#[derive(Debug, Deserialize)]
struct GeminiListedModel {
    name: String,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "supportedGenerationMethods", default)]
    supported_generation_methods: Vec<String>,
}
