//! CLI command implementations.

pub mod chat;
pub mod check;
pub mod forecast;
pub mod llm_models;
pub mod models;
pub mod serve;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use cityflow_core::{Config, ForecastService};

/// Loads configuration, honouring `--config`.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    Config::load(path).context("Failed to load configuration")
}

/// Builds the production forecast service.
pub fn build_service(config: Config) -> anyhow::Result<Arc<ForecastService>> {
    let service = ForecastService::from_config(config).context("Failed to build forecast service")?;
    Ok(Arc::new(service))
}
