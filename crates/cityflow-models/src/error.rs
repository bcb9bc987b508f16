//! Error taxonomy for model selection, loading and inference.

use cityflow_abstraction::ModelError;
use thiserror::Error;

/// Errors raised while resolving, fetching, loading or running a forecaster.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForecastError {
    /// The requested model type is neither `baseline` nor `finetune`.
    #[error("Unsupported model_type: {0}")]
    UnsupportedModelType(String),

    /// A finetune model was requested for a category with no trained model.
    #[error("Unsupported category for finetune: {0}")]
    UnsupportedCategory(String),

    /// The artifact bundle could not be downloaded.
    #[error("Failed to fetch artifacts for {identifier}: {reason}")]
    ArtifactFetchFailed {
        /// Model identifier being fetched.
        identifier: String,
        /// Underlying failure.
        reason: String,
    },

    /// Every configured loader rejected the artifact bundle.
    #[error("Failed to load model {identifier}: {reason}")]
    ModelLoadFailed {
        /// Model identifier being loaded.
        identifier: String,
        /// Failures reported by each loader, in order.
        reason: String,
    },

    /// Prompt encoding, generation or decoding failed.
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
}

impl ForecastError {
    /// Returns `true` for errors caused by the caller's input.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnsupportedModelType(_) | Self::UnsupportedCategory(_))
    }
}

impl From<ModelError> for ForecastError {
    fn from(err: ModelError) -> Self {
        Self::InferenceFailed(err.to_string())
    }
}

/// Result type alias for forecaster operations.
pub type Result<T> = std::result::Result<T, ForecastError>;
