//! Factory for the explanation LLM client.
//!
//! Builds a `Model` from provider configuration, loading the API key from the
//! environment when none is given.

use crate::{GeminiModel, MockModel};
use cityflow_abstraction::{Model, ModelError};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// LLM provider enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Canned responses, no network.
    Mock,
    /// Google Gemini.
    Gemini,
}

impl FromStr for ModelType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(ModelError::UnsupportedModelProvider(other.to_string())),
        }
    }
}

impl ModelType {
    /// Lowercase provider name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Gemini => "gemini",
        }
    }
}

/// LLM client configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// The provider.
    pub model_type: ModelType,
    /// The model ID (e.g., "gemini-2.5-flash").
    pub model_id: String,
    /// Optional API key (if not provided, will be loaded from environment).
    pub api_key: Option<String>,
    /// Optional endpoint override.
    pub base_url: Option<String>,
    /// Optional per-request deadline.
    pub timeout: Option<Duration>,
}

impl ModelConfig {
    /// Creates a new `ModelConfig` with the given type and model ID.
    #[must_use]
    pub const fn new(model_type: ModelType, model_id: String) -> Self {
        Self { model_type, model_id, api_key: None, base_url: None, timeout: None }
    }

    /// Sets the API key for this configuration.
    #[must_use]
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Sets the endpoint for this configuration.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Sets the per-request deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Factory for creating LLM clients.
pub struct ModelFactory;

impl ModelFactory {
    /// Creates a model instance from the given configuration.
    ///
    /// # Errors
    /// Returns a `ModelError` if creation fails (e.g., missing API key).
    pub fn create(config: ModelConfig) -> Result<Arc<dyn Model>, ModelError> {
        debug!(
            model_type = config.model_type.as_str(),
            model_id = %config.model_id,
            "Creating model instance"
        );

        match config.model_type {
            ModelType::Mock => Ok(Arc::new(MockModel::new(config.model_id))),
            ModelType::Gemini => {
                let mut model = match config.api_key.filter(|key| !key.trim().is_empty()) {
                    Some(api_key) => GeminiModel::with_api_key(config.model_id, api_key),
                    None => GeminiModel::new(config.model_id)?,
                };
                if let Some(base_url) = config.base_url {
                    model = model.with_base_url(base_url);
                }
                if let Some(timeout) = config.timeout {
                    model = model.with_timeout(timeout);
                }
                Ok(Arc::new(model))
            }
        }
    }

    /// Creates a model from a provider name and model ID.
    ///
    /// # Errors
    /// Returns a `ModelError` if the provider is unknown or creation fails.
    pub fn create_from_str(model_type: &str, model_id: String) -> Result<Arc<dyn Model>, ModelError> {
        let model_type = model_type.parse::<ModelType>()?;
        Self::create(ModelConfig::new(model_type, model_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_type_from_str() {
        assert_eq!("mock".parse::<ModelType>().unwrap(), ModelType::Mock);
        assert_eq!("Gemini".parse::<ModelType>().unwrap(), ModelType::Gemini);
        assert_eq!(" google ".parse::<ModelType>().unwrap(), ModelType::Gemini);
        assert!(matches!("claude".parse::<ModelType>(), Err(ModelError::UnsupportedModelProvider(_))));
    }

    #[test]
    fn test_create_mock() {
        let model = ModelFactory::create_from_str("mock", "mock-llm".to_string()).unwrap();
        assert_eq!(model.model_id(), "mock-llm");
    }

    #[test]
    fn test_create_gemini_with_explicit_key() {
        let config = ModelConfig::new(ModelType::Gemini, "gemini-2.5-flash".to_string())
            .with_api_key("test-key".to_string())
            .with_timeout(Duration::from_secs(5));
        let model = ModelFactory::create(config).unwrap();
        assert_eq!(model.model_id(), "gemini-2.5-flash");
    }

    #[test]
    fn test_create_unknown_provider() {
        assert!(ModelFactory::create_from_str("openai", "gpt".to_string()).is_err());
    }
}
