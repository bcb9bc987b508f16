//! Forecaster and LLM backends for CityFlow.
//!
//! - [`registry`]: which pretrained forecaster serves a `(category, model_type)` pair
//! - [`hub`]: where the forecaster's files come from
//! - [`loader`]: how files become a runnable model
//! - [`cache`]: one load per identifier per process
//! - [`gemini`] and [`factory`]: the explanation LLM client
//!
//! The candle/Hugging Face backends sit behind the default `ml-models` feature.

pub mod cache;
pub mod error;
pub mod factory;
pub mod gemini;
pub mod hub;
pub mod loader;
pub mod mock;
pub mod registry;

pub use cache::{CacheConfig, CacheConfigError, CacheStats, ModelCache, ModelEntry};
pub use error::{ForecastError, Result};
pub use factory::{ModelConfig, ModelFactory, ModelType};
pub use gemini::{GeminiModel, GeminiModelInfo};
#[cfg(feature = "ml-models")]
pub use hub::HfHubSource;
pub use hub::{ALLOW_PATTERNS, ArtifactBundle, ArtifactSource, LocalDirSource, REQUIRED_FILES};
#[cfg(feature = "ml-models")]
pub use loader::default_loaders;
pub use loader::{LoadedPair, ModelLoader};
pub use mock::MockModel;
pub use registry::{ModelKind, ModelRegistry, ModelSpec, normalize_category};
