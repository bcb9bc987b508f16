//! Forecast inference: prompt construction, generation and decoding.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cityflow_abstraction::GenerationConfig;
use cityflow_models::{ForecastError, ModelCache, ModelEntry, ModelKind, ModelRegistry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Query used when a forecast request carries none.
pub const DEFAULT_QUERY: &str = "predict next day";

/// One forecast request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// City name, e.g. "Sydney".
    pub city: String,
    /// POI category, or `ALL` for city-level forecasts.
    pub category: String,
    /// `baseline` or `finetune`.
    pub model_type: String,
    /// Free-text description of the time or situation.
    pub query: String,
}

/// Result of a forecast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForecastOutcome {
    /// Decoded model output.
    pub prediction: String,
    /// Display label of the model that produced it.
    pub model_label: String,
    /// Model identifier.
    pub identifier: String,
    /// Which family of model was used.
    pub model_kind: ModelKind,
}

/// Formats the forecaster prompt.
#[must_use]
pub fn build_prompt(city: &str, category: &str, query: &str) -> String {
    format!("[city={city}] [category={category}] {query}")
}

/// Runs forecasts against cached models.
#[derive(Debug)]
pub struct Forecaster {
    registry: Arc<ModelRegistry>,
    cache: Arc<ModelCache>,
    generation: GenerationConfig,
    timeout: Duration,
}

impl Forecaster {
    /// Creates a forecaster.
    pub fn new(
        registry: Arc<ModelRegistry>,
        cache: Arc<ModelCache>,
        generation: GenerationConfig,
        timeout: Duration,
    ) -> Self {
        Self { registry, cache, generation, timeout }
    }

    /// The registry used for resolution.
    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Resolves, loads and runs the model for `request`.
    ///
    /// # Errors
    /// Resolution, fetch and load errors are returned unchanged; any failure
    /// while encoding, generating or decoding is `ForecastError::InferenceFailed`.
    pub async fn run_forecast(&self, request: &InferenceRequest) -> Result<ForecastOutcome, ForecastError> {
        let spec = self.registry.resolve(&request.category, &request.model_type)?.clone();
        let entry = self.cache.get_or_load(&spec.identifier).await?;

        let prompt = build_prompt(&request.city, &request.category, &request.query);
        let started = Instant::now();
        let prediction = self.generate(entry, prompt).await?;

        info!(
            city = %request.city,
            category = %request.category,
            model_type = %request.model_type,
            query = %request.query,
            model_id = %spec.identifier,
            prediction = %prediction,
            duration_ms = started.elapsed().as_millis(),
            "Forecast complete"
        );

        Ok(ForecastOutcome {
            prediction,
            model_label: spec.label,
            identifier: spec.identifier,
            model_kind: spec.kind,
        })
    }

    async fn generate(&self, entry: Arc<ModelEntry>, prompt: String) -> Result<String, ForecastError> {
        let generation = self.generation.clone();
        let task = tokio::task::spawn_blocking(move || {
            let input_ids = entry.tokenizer.encode(&prompt)?;
            debug!(model_id = %entry.identifier, input_tokens = input_ids.len(), "Encoded prompt");
            let output_ids = entry.model.generate(&input_ids, &generation)?;
            entry.tokenizer.decode(&output_ids, true)
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(text))) => Ok(text.trim().to_string()),
            Ok(Ok(Err(e))) => Err(ForecastError::InferenceFailed(e.to_string())),
            Ok(Err(join)) => Err(ForecastError::InferenceFailed(format!("generation task failed: {join}"))),
            Err(_) => Err(ForecastError::InferenceFailed(format!(
                "generation timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cityflow_abstraction::ModelError;
    use cityflow_models::mock::{MockArtifactSource, MockLoader, MockSeq2SeqModel, MockTokenizer};
    use cityflow_models::{ArtifactBundle, CacheConfig, LoadedPair, ModelLoader, ModelSpec};

    fn forecaster_with(loader: Arc<dyn ModelLoader>) -> (Forecaster, Arc<MockArtifactSource>) {
        let source = Arc::new(MockArtifactSource::new());
        let cache = ModelCache::new(source.clone(), vec![loader], CacheConfig::default()).unwrap();
        let forecaster = Forecaster::new(
            Arc::new(ModelRegistry::builtin()),
            Arc::new(cache),
            GenerationConfig::default(),
            Duration::from_secs(5),
        );
        (forecaster, source)
    }

    fn request(category: &str, model_type: &str) -> InferenceRequest {
        InferenceRequest {
            city: "Sydney".to_string(),
            category: category.to_string(),
            model_type: model_type.to_string(),
            query: "Friday 8pm".to_string(),
        }
    }

    #[test]
    fn test_build_prompt() {
        assert_eq!(
            build_prompt("New York City", "Bar", "Friday 8pm"),
            "[city=New York City] [category=Bar] Friday 8pm"
        );
    }

    #[tokio::test]
    async fn test_finetune_forecast() {
        let (forecaster, source) = forecaster_with(Arc::new(MockLoader::new("t5", " 3 ")));
        let outcome = forecaster.run_forecast(&request("Coffee Shop", "finetune")).await.unwrap();

        assert_eq!(outcome.prediction, "3");
        assert_eq!(outcome.identifier, "Altheaa21/Category-CoffeeShop");
        assert_eq!(outcome.model_label, "CoffeeShop finetune model");
        assert_eq!(outcome.model_kind, ModelKind::Finetune);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_baseline_ignores_category() {
        let (forecaster, source) = forecaster_with(Arc::new(MockLoader::new("t5", "0")));
        for category in ["Bar", "Museum", "ALL"] {
            let outcome = forecaster.run_forecast(&request(category, "baseline")).await.unwrap();
            assert_eq!(outcome.identifier, "Altheaa21/Category-baseline");
            assert_eq!(outcome.model_label, "Baseline model");
        }
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_resolution_errors_pass_through() {
        let (forecaster, source) = forecaster_with(Arc::new(MockLoader::new("t5", "0")));
        let err = forecaster.run_forecast(&request("Museum", "finetune")).await.unwrap_err();
        assert_eq!(err, ForecastError::UnsupportedCategory("Museum".to_string()));
        assert_eq!(source.fetch_count(), 0);
    }

    struct FailingLoader;

    impl ModelLoader for FailingLoader {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn load(&self, _bundle: &ArtifactBundle) -> Result<LoadedPair, ModelError> {
            Ok((Arc::new(MockSeq2SeqModel::failing("broken")), Arc::new(MockTokenizer)))
        }
    }

    #[tokio::test]
    async fn test_generation_failure_is_inference_failed() {
        let (forecaster, _) = forecaster_with(Arc::new(FailingLoader));
        let err = forecaster.run_forecast(&request("Bar", "baseline")).await.unwrap_err();
        assert!(matches!(err, ForecastError::InferenceFailed(ref m) if m.contains("broken failed to generate")));
    }

    #[test]
    fn test_outcome_serializes_kind_lowercase() {
        let outcome = ForecastOutcome {
            prediction: "1".to_string(),
            model_label: ModelSpec::baseline("acme/base").label,
            identifier: "acme/base".to_string(),
            model_kind: ModelKind::Baseline,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["model_kind"], "baseline");
    }
}
