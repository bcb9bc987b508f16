//! Model abstraction layer for CityFlow.
//!
//! This crate defines the traits and types shared by the forecasting pipeline:
//!
//! - [`Model`]: chat-style large language models used to explain forecasts.
//! - [`Seq2SeqModel`] and [`TextTokenizer`]: the pretrained encoder-decoder
//!   forecasters and their tokenizers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents an error that can occur when interacting with a model.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// An error occurred during the API request (e.g., network issues, invalid request).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The model returned an error (e.g., invalid input, server failure).
    #[error("Model Response Error: {0}")]
    ModelResponseError(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    SerializationError(String),

    /// The model provider is not supported or configured.
    #[error("Unsupported Model Provider: {0}")]
    UnsupportedModelProvider(String),

    /// Provider quota exceeded or rate limit hit.
    #[error("Provider '{provider}' quota exceeded{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    QuotaExceeded {
        /// The provider name (e.g., "gemini").
        provider: String,
        /// Optional error message from the provider.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// The provider rejected the credentials.
    #[error("Authentication Error: {0}")]
    AuthenticationFailed(String),

    /// The call did not complete within its deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The provider answered but produced no usable text.
    #[error("Empty Response: {0}")]
    EmptyResponse(String),

    /// Tokenization or decoding failed.
    #[error("Tokenizer Error: {0}")]
    TokenizerError(String),

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

/// Represents a message in a conversation with a chat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender (e.g., "user", "assistant", "system").
    pub role: String,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Parameters for controlling the model's generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameters {
    /// What sampling temperature to use, between 0 and 2.
    /// Higher values mean the model will take more risks.
    pub temperature: Option<f32>,

    /// An alternative to sampling with temperature, called nucleus sampling,
    /// where the model considers the results of the tokens with `top_p` probability mass.
    pub top_p: Option<f32>,

    /// The maximum number of tokens to generate in the chat completion.
    pub max_tokens: Option<u32>,

    /// Up to 4 sequences where the API will stop generating further tokens.
    pub stop_sequences: Option<Vec<String>>,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self { temperature: Some(0.7), top_p: Some(1.0), max_tokens: Some(512), stop_sequences: None }
    }
}

/// The response from a text generation or chat completion model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// The generated content.
    pub content: String,

    /// Optional: The ID of the model used to generate the response.
    pub model_id: Option<String>,

    /// Optional: Usage statistics for the request.
    pub usage: Option<ModelUsage>,
}

/// Usage statistics for a model request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelUsage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,

    /// Number of tokens in the completion.
    pub completion_tokens: u32,

    /// Total number of tokens used.
    pub total_tokens: u32,
}

/// A trait for interacting with chat-capable language models.
///
/// All models must be `Send + Sync` to allow concurrent use across threads.
#[async_trait]
pub trait Model: Send + Sync {
    /// Generates a text completion based on the given prompt.
    ///
    /// # Errors
    /// Returns a `ModelError` if generation fails.
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError>;

    /// Generates a chat completion based on the given conversation history.
    ///
    /// System messages are forwarded as the provider's system instruction.
    ///
    /// # Errors
    /// Returns a `ModelError` if generation fails.
    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError>;

    /// Returns the ID of the model.
    fn model_id(&self) -> &str;
}

/// Decoding settings for sequence-to-sequence forecasters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Upper bound on generated tokens, excluding the decoder start token.
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,

    /// Greedy argmax decoding when `true`, temperature sampling otherwise.
    #[serde(default = "default_deterministic")]
    pub deterministic: bool,

    /// Sampling temperature, only read when `deterministic` is `false`.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Sampling seed, only read when `deterministic` is `false`.
    #[serde(default)]
    pub seed: u64,
}

fn default_max_new_tokens() -> usize {
    32
}

fn default_deterministic() -> bool {
    true
}

fn default_temperature() -> f64 {
    0.7
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            deterministic: default_deterministic(),
            temperature: default_temperature(),
            seed: 0,
        }
    }
}

/// A tokenizer paired with a [`Seq2SeqModel`].
pub trait TextTokenizer: Send + Sync {
    /// Encodes text into input ids, adding the model's special tokens.
    ///
    /// # Errors
    /// Returns `ModelError::TokenizerError` if the text cannot be encoded.
    fn encode(&self, text: &str) -> Result<Vec<u32>, ModelError>;

    /// Decodes token ids back into text.
    ///
    /// # Errors
    /// Returns `ModelError::TokenizerError` if the ids cannot be decoded.
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, ModelError>;
}

/// A pretrained encoder-decoder model.
///
/// Implementations are blocking and CPU bound; async callers are expected to
/// run them on the blocking thread pool.
pub trait Seq2SeqModel: Send + Sync {
    /// Generates output token ids for the given encoder input.
    ///
    /// # Errors
    /// Returns a `ModelError` if the forward pass fails.
    fn generate(&self, input_ids: &[u32], config: &GenerationConfig) -> Result<Vec<u32>, ModelError>;

    /// Returns the identifier of the artifact this model was loaded from.
    fn model_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exceeded_display() {
        let err = ModelError::QuotaExceeded {
            provider: "gemini".to_string(),
            message: Some("RESOURCE_EXHAUSTED".to_string()),
        };
        assert_eq!(err.to_string(), "Provider 'gemini' quota exceeded: RESOURCE_EXHAUSTED");

        let err = ModelError::QuotaExceeded { provider: "gemini".to_string(), message: None };
        assert_eq!(err.to_string(), "Provider 'gemini' quota exceeded");
    }

    #[test]
    fn test_chat_message_constructors() {
        assert_eq!(ChatMessage::system("rules").role, "system");
        assert_eq!(ChatMessage::user("hi").role, "user");
        assert_eq!(ChatMessage::assistant("hello").content, "hello");
    }

    #[test]
    fn test_generation_config_defaults() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_new_tokens, 32);
        assert!(config.deterministic);
    }

    #[test]
    fn test_generation_config_partial_deserialize() {
        let config: GenerationConfig = serde_json::from_str(r#"{"max_new_tokens": 8}"#).unwrap();
        assert_eq!(config.max_new_tokens, 8);
        assert!(config.deterministic);
        assert!((config.temperature - 0.7).abs() < f64::EPSILON);
    }
}
