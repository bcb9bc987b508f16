//! Process-wide state shared by the HTTP handlers and the CLI.

use std::sync::Arc;

use cityflow_abstraction::Model;
use cityflow_models::{
    ArtifactSource, LocalDirSource, ModelCache, ModelConfig, ModelFactory, ModelLoader, ModelRegistry, ModelType,
};
use tracing::{info, warn};

use crate::chat::ChatOrchestrator;
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::explainer::Explainer;
use crate::forecast::Forecaster;
use crate::manifest::ManifestStore;

/// Everything a request needs, built once at startup.
pub struct ForecastService {
    config: Config,
    registry: Arc<ModelRegistry>,
    source: Arc<dyn ArtifactSource>,
    cache: Arc<ModelCache>,
    forecaster: Arc<Forecaster>,
    explainer: Arc<Explainer>,
    chat: ChatOrchestrator,
    manifest: ManifestStore,
}

impl std::fmt::Debug for ForecastService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastService")
            .field("source", &self.source.name())
            .field("cache", &self.cache)
            .field("explainer", &self.explainer)
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

impl ForecastService {
    /// Builds the production pipeline described by `config`.
    ///
    /// Artifacts come from `hub.local_dir` when set, otherwise from the
    /// Hugging Face Hub. The explanation LLM is disabled without an API key.
    ///
    /// # Errors
    /// Returns `CoreError::Config` when the crate was built without the
    /// `ml-models` feature, or when the LLM provider is unknown.
    pub fn from_config(config: Config) -> Result<Self> {
        let source = artifact_source(&config)?;
        let loaders = production_loaders()?;
        let llm = build_llm(&config)?;
        Self::with_components(config, source, loaders, llm)
    }

    /// Builds the service from explicit parts.
    ///
    /// # Errors
    /// Returns `CoreError::Config` if the cache settings are invalid.
    pub fn with_components(
        config: Config,
        source: Arc<dyn ArtifactSource>,
        loaders: Vec<Arc<dyn ModelLoader>>,
        llm: Option<Arc<dyn Model>>,
    ) -> Result<Self> {
        let registry = Arc::new(ModelRegistry::builtin());
        let cache = ModelCache::new(source.clone(), loaders, config.timeouts.cache_config())
            .map_err(|e| CoreError::Config(e.to_string()))?;
        let cache = Arc::new(cache);

        let forecaster = Arc::new(Forecaster::new(
            registry.clone(),
            cache.clone(),
            config.forecast.generation.clone(),
            config.timeouts.generate(),
        ));
        let explainer = Arc::new(Explainer::new(llm, config.forecast.primary_city.clone(), config.timeouts.llm()));
        let chat = ChatOrchestrator::new(forecaster.clone(), explainer.clone());
        let manifest = ManifestStore::new(config.manifest.path.clone());

        info!(
            source = source.name(),
            models = registry.len(),
            llm_enabled = explainer.is_enabled(),
            "Forecast service ready"
        );

        Ok(Self { config, registry, source, cache, forecaster, explainer, chat, manifest })
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    #[must_use]
    pub fn source(&self) -> &Arc<dyn ArtifactSource> {
        &self.source
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    #[must_use]
    pub fn forecaster(&self) -> &Forecaster {
        &self.forecaster
    }

    #[must_use]
    pub fn explainer(&self) -> &Explainer {
        &self.explainer
    }

    #[must_use]
    pub fn chat(&self) -> &ChatOrchestrator {
        &self.chat
    }

    #[must_use]
    pub fn manifest(&self) -> &ManifestStore {
        &self.manifest
    }
}

fn artifact_source(config: &Config) -> Result<Arc<dyn ArtifactSource>> {
    if let Some(dir) = &config.hub.local_dir {
        info!(root = %dir.display(), "Serving model artifacts from a local directory");
        return Ok(Arc::new(LocalDirSource::new(dir.clone())));
    }

    #[cfg(feature = "ml-models")]
    {
        Ok(Arc::new(cityflow_models::HfHubSource::new(config.hub.token.clone(), config.hub.cache_dir.clone())))
    }
    #[cfg(not(feature = "ml-models"))]
    {
        Err(CoreError::Config(
            "built without the ml-models feature; set hub.local_dir or rebuild with ml-models".to_string(),
        ))
    }
}

fn production_loaders() -> Result<Vec<Arc<dyn ModelLoader>>> {
    #[cfg(feature = "ml-models")]
    {
        Ok(cityflow_models::default_loaders())
    }
    #[cfg(not(feature = "ml-models"))]
    {
        Err(CoreError::Config("built without the ml-models feature; no model loaders available".to_string()))
    }
}

/// Creates the explanation LLM, or `None` when no key is configured.
///
/// # Errors
/// Returns `CoreError::Config` for an unknown provider and `CoreError::Model`
/// if the client cannot be created.
pub fn build_llm(config: &Config) -> Result<Option<Arc<dyn Model>>> {
    let llm = &config.llm;
    let provider: ModelType = llm.provider.parse().map_err(|e| CoreError::Config(format!("llm.provider: {e}")))?;

    let mut model_config = ModelConfig::new(provider, llm.model_id.clone()).with_timeout(config.timeouts.llm());
    if provider == ModelType::Gemini {
        match llm.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => model_config = model_config.with_api_key(key.to_string()),
            None => {
                warn!("GEMINI_API_KEY not set; explanations will use the fallback text");
                return Ok(None);
            }
        }
    }
    if let Some(base_url) = &llm.base_url {
        model_config = model_config.with_base_url(base_url.clone());
    }

    Ok(Some(ModelFactory::create(model_config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cityflow_models::mock::{MockArtifactSource, MockLoader};
    use tempfile::TempDir;

    #[test]
    fn test_build_llm_without_key_is_disabled() {
        let config = Config::default();
        assert!(build_llm(&config).unwrap().is_none());
    }

    #[test]
    fn test_build_llm_with_key_and_mock() {
        let mut config = Config::default();
        config.llm.api_key = Some("test-key".to_string());
        let llm = build_llm(&config).unwrap().unwrap();
        assert_eq!(llm.model_id(), "gemini-2.5-flash");

        config.llm.provider = "mock".to_string();
        config.llm.api_key = None;
        assert!(build_llm(&config).unwrap().is_some());
    }

    #[test]
    fn test_build_llm_rejects_unknown_provider() {
        let mut config = Config::default();
        config.llm.provider = "claude".to_string();
        let Err(err) = build_llm(&config) else {
            panic!("unknown provider should be rejected");
        };
        assert!(matches!(err, CoreError::Config(ref m) if m.starts_with("llm.provider")));
    }

    #[test]
    fn test_local_dir_selects_local_source() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.hub.local_dir = Some(temp.path().to_path_buf());
        assert_eq!(artifact_source(&config).unwrap().name(), "local");
    }

    #[test]
    fn test_with_components_wires_everything() {
        let service = ForecastService::with_components(
            Config::default(),
            Arc::new(MockArtifactSource::new()),
            vec![Arc::new(MockLoader::new("t5", "0"))],
            None,
        )
        .unwrap();

        assert!(!service.explainer().is_enabled());
        assert_eq!(service.registry().len(), service.forecaster().registry().len());
        assert!(service.cache().is_empty());
        assert_eq!(service.source().name(), "mock");
        assert_eq!(service.manifest().path(), service.config().manifest.path.as_path());
    }
}
