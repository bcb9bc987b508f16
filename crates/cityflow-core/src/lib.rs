//! CityFlow Core - demand forecasting service.
//!
//! This crate wires the forecaster models into a service:
//! - forecast inference over cached T5 models
//! - LLM explanations with a deterministic fallback
//! - the chat orchestrator combining both
//! - the axum HTTP server, configuration and startup checks
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cityflow_core::{Config, ForecastService, server, startup};
//!
//! #[tokio::main]
//! async fn main() -> cityflow_core::Result<()> {
//!     let config = Config::load(None)?;
//!     let addr = config.server.address;
//!     let service = Arc::new(ForecastService::from_config(config)?);
//!     startup::run_startup(&service).await;
//!     server::run(service, addr).await
//! }
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod explainer;
pub mod forecast;
pub mod manifest;
pub mod server;
pub mod service;
pub mod startup;

pub use chat::{ChatOrchestrator, ChatRequest, ChatResponse};
pub use config::Config;
pub use error::{CoreError, Result};
pub use explainer::{ExplanationContext, ExplanationFailure, Explainer};
pub use forecast::{ForecastOutcome, Forecaster, InferenceRequest, build_prompt};
pub use manifest::{ManifestError, ManifestStore};
pub use service::ForecastService;
pub use startup::StartupReport;
