//! Configuration module for CityFlow Core.
//!
//! Values come from defaults, then a TOML file, then environment overrides.
//! The file is the `--config` path, else `CITYFLOW_CONFIG`, else
//! `cityflow.toml` in the working directory when present.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cityflow_abstraction::GenerationConfig;
use cityflow_models::CacheConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

/// Config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "cityflow.toml";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// The address to bind the HTTP server to.
    #[serde(default = "default_address")]
    pub address: SocketAddr,
    /// Allow any origin, method and header.
    #[serde(default = "default_true")]
    pub cors_permissive: bool,
}

fn default_true() -> bool {
    true
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: default_address(), cors_permissive: true }
    }
}

/// Model artifact source configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HubConfig {
    /// Token for private Hugging Face repos.
    #[serde(default)]
    pub token: Option<String>,
    /// Local content store for downloaded artifacts.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Serve artifacts from `{local_dir}/{identifier}` instead of the Hub.
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".hf_cache")
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { token: None, cache_dir: default_cache_dir(), local_dir: None }
    }
}

/// Explanation LLM configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LlmConfig {
    /// Provider name (`gemini` or `mock`).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Provider model ID.
    #[serde(default = "default_llm_model")]
    pub model_id: String,
    /// API key; without one the explainer uses its fallback text.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Endpoint override.
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_llm_model() -> String {
    "gemini-2.5-flash".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { provider: default_provider(), model_id: default_llm_model(), api_key: None, base_url: None }
    }
}

/// Forecast pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastConfig {
    /// Decoding parameters for the forecaster.
    #[serde(flatten)]
    pub generation: GenerationConfig,
    /// City the forecasters were trained on.
    #[serde(default = "default_primary_city")]
    pub primary_city: String,
    /// Load the baseline model during startup.
    #[serde(default = "default_true")]
    pub warm_up: bool,
    /// Check that the baseline repo is reachable during startup.
    #[serde(default = "default_true")]
    pub self_check: bool,
}

fn default_primary_city() -> String {
    "New York City".to_string()
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            primary_city: default_primary_city(),
            warm_up: true,
            self_check: true,
        }
    }
}

/// Deadlines for blocking and remote work, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Artifact download.
    #[serde(default = "default_fetch_secs")]
    pub fetch_secs: u64,
    /// One loader attempt.
    #[serde(default = "default_load_secs")]
    pub load_secs: u64,
    /// One forecast generation.
    #[serde(default = "default_generate_secs")]
    pub generate_secs: u64,
    /// One explanation request.
    #[serde(default = "default_llm_secs")]
    pub llm_secs: u64,
}

fn default_fetch_secs() -> u64 {
    600
}

fn default_load_secs() -> u64 {
    300
}

fn default_generate_secs() -> u64 {
    60
}

fn default_llm_secs() -> u64 {
    30
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fetch_secs: default_fetch_secs(),
            load_secs: default_load_secs(),
            generate_secs: default_generate_secs(),
            llm_secs: default_llm_secs(),
        }
    }
}

impl TimeoutConfig {
    /// Cache deadlines derived from this section.
    #[must_use]
    pub const fn cache_config(&self) -> CacheConfig {
        CacheConfig { fetch_timeout_secs: self.fetch_secs, load_timeout_secs: self.load_secs }
    }

    /// Generation deadline.
    #[must_use]
    pub const fn generate(&self) -> Duration {
        Duration::from_secs(self.generate_secs)
    }

    /// LLM deadline.
    #[must_use]
    pub const fn llm(&self) -> Duration {
        Duration::from_secs(self.llm_secs)
    }
}

/// Manifest file configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestConfig {
    /// JSON file served at `/v1/manifest`.
    #[serde(default = "default_manifest_path")]
    pub path: PathBuf,
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("data/manifest/manifest.json")
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self { path: default_manifest_path() }
    }
}

/// Root configuration for CityFlow.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Artifact source configuration.
    #[serde(default)]
    pub hub: HubConfig,
    /// Explanation LLM configuration.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Forecast pipeline configuration.
    #[serde(default)]
    pub forecast: ForecastConfig,
    /// Deadlines.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Manifest configuration.
    #[serde(default)]
    pub manifest: ManifestConfig,
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the config file and environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be read, the TOML
    /// is invalid, or the result fails validation.
    #[allow(clippy::disallowed_methods)] // env::var is the configuration surface
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`Config::load`] with an injectable environment.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_with(path: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let explicit = path.map(Path::to_path_buf).or_else(|| env("CITYFLOW_CONFIG").map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };

        config.apply_env_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("Failed to read {}: {e}", path.display())))?;
        let config = toml::from_str(&raw)
            .map_err(|e| CoreError::Config(format!("Invalid config file {}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Apply environment overrides on top of file values.
    ///
    /// # Errors
    ///
    /// Returns an error if `CITYFLOW_ADDRESS` is not a socket address.
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("HF_TOKEN") {
            self.hub.token = Some(token);
        }
        if let Some(home) = non_empty("HF_HOME") {
            self.hub.cache_dir = PathBuf::from(home);
        }
        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(address) = non_empty("CITYFLOW_ADDRESS") {
            self.server.address = address
                .parse()
                .map_err(|e| CoreError::Config(format!("Invalid CITYFLOW_ADDRESS {address}: {e}")))?;
        }
        if let Some(path) = non_empty("CITYFLOW_MANIFEST_PATH") {
            self.manifest.path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Reject values that would make the pipeline unusable.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Config` naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.forecast.generation.max_new_tokens == 0 {
            return Err(CoreError::Config("forecast.max_new_tokens must be greater than 0".to_string()));
        }
        let timeouts = [
            ("timeouts.fetch_secs", self.timeouts.fetch_secs),
            ("timeouts.load_secs", self.timeouts.load_secs),
            ("timeouts.generate_secs", self.timeouts.generate_secs),
            ("timeouts.llm_secs", self.timeouts.llm_secs),
        ];
        if let Some((key, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(CoreError::Config(format!("{key} must be greater than 0")));
        }
        if self.forecast.primary_city.trim().is_empty() {
            return Err(CoreError::Config("forecast.primary_city must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.address, "127.0.0.1:8000".parse().unwrap());
        assert!(config.server.cors_permissive);
        assert_eq!(config.hub.cache_dir, PathBuf::from(".hf_cache"));
        assert_eq!(config.llm.model_id, "gemini-2.5-flash");
        assert_eq!(config.forecast.generation.max_new_tokens, 32);
        assert!(config.forecast.generation.deterministic);
        assert_eq!(config.forecast.primary_city, "New York City");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialize_partial_toml() {
        let raw = r#"
            [server]
            address = "0.0.0.0:9000"

            [forecast]
            max_new_tokens = 8
            deterministic = false
            warm_up = false

            [timeouts]
            llm_secs = 5
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.address, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.forecast.generation.max_new_tokens, 8);
        assert!(!config.forecast.generation.deterministic);
        assert!(!config.forecast.warm_up);
        assert!(config.forecast.self_check);
        assert_eq!(config.timeouts.llm(), Duration::from_secs(5));
        assert_eq!(config.timeouts.fetch_secs, 600);
        assert_eq!(config.llm.provider, "gemini");
    }

    #[test]
    fn test_env_overrides_file_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cityflow.toml");
        std::fs::write(
            &path,
            "[hub]\ntoken = \"file-token\"\ncache_dir = \"/tmp/file-cache\"\n[llm]\napi_key = \"file-key\"\n",
        )
        .unwrap();

        let env = env_of(&[
            ("HF_TOKEN", "env-token"),
            ("GEMINI_API_KEY", "env-key"),
            ("CITYFLOW_ADDRESS", "0.0.0.0:8080"),
            ("CITYFLOW_MANIFEST_PATH", "/srv/manifest.json"),
        ]);
        let config = Config::load_with(Some(&path), env).unwrap();

        assert_eq!(config.hub.token.as_deref(), Some("env-token"));
        assert_eq!(config.hub.cache_dir, PathBuf::from("/tmp/file-cache"));
        assert_eq!(config.llm.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.server.address, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.manifest.path, PathBuf::from("/srv/manifest.json"));
    }

    #[test]
    fn test_config_path_from_env() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(&path, "[forecast]\nprimary_city = \"Sydney\"\n").unwrap();

        let path_str = path.to_string_lossy().to_string();
        let config = Config::load_with(None, env_of(&[("CITYFLOW_CONFIG", &path_str)])).unwrap();
        assert_eq!(config.forecast.primary_city, "Sydney");
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(env_of(&[("HF_HOME", ""), ("GEMINI_API_KEY", "  ")])).unwrap();
        assert_eq!(config.hub.cache_dir, PathBuf::from(".hf_cache"));
        assert_eq!(config.llm.api_key, None);
    }

    #[test]
    fn test_invalid_address_override() {
        let mut config = Config::default();
        let err = config.apply_env_overrides(env_of(&[("CITYFLOW_ADDRESS", "not-an-address")])).unwrap_err();
        assert!(err.to_string().contains("CITYFLOW_ADDRESS"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("absent.toml");
        assert!(matches!(Config::load_with(Some(&missing), env_of(&[])), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.forecast.generation.max_new_tokens = 0;
        assert!(config.validate().unwrap_err().to_string().contains("max_new_tokens"));

        let mut config = Config::default();
        config.timeouts.generate_secs = 0;
        assert!(config.validate().unwrap_err().to_string().contains("timeouts.generate_secs"));
    }

    #[test]
    fn test_cache_config_from_timeouts() {
        let timeouts = TimeoutConfig { fetch_secs: 10, load_secs: 20, ..TimeoutConfig::default() };
        let cache = timeouts.cache_config();
        assert_eq!(cache.fetch_timeout_secs, 10);
        assert_eq!(cache.load_timeout_secs, 20);
    }
}
