//! Error types for CityFlow Core.

use axum::Json;
use axum::response::{IntoResponse, Response};
use cityflow_abstraction::ModelError;
use cityflow_models::ForecastError;
use http::StatusCode;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::manifest::ManifestError;

/// Core error type for CityFlow operations.
///
/// The display text doubles as the `detail` field of HTTP error bodies.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Model selection, loading or inference failed.
    #[error(transparent)]
    Forecast(#[from] ForecastError),

    /// The request is malformed.
    #[error("{0}")]
    InvalidRequest(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM client errors outside the explanation path.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// The manifest could not be served.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

impl CoreError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Forecast(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Manifest(ManifestError::NotFound(_)) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Result type alias for CityFlow operations.
pub type Result<T> = std::result::Result<T, CoreError>;
