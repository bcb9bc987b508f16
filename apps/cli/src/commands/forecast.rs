//! Forecast command implementation.

use std::path::Path;

use anyhow::Context;
use cityflow_core::InferenceRequest;
use serde_json::json;

use super::{build_service, load_config};

/// Runs one forecast and prints the outcome as JSON.
pub async fn execute(
    config_path: Option<&Path>,
    city: String,
    category: String,
    model_type: String,
    query: String,
) -> anyhow::Result<()> {
    let service = build_service(load_config(config_path)?)?;
    let request = InferenceRequest { city, category, model_type, query };

    let outcome = service.forecaster().run_forecast(&request).await.context("Forecast failed")?;

    let output = json!({
        "city": request.city,
        "category": request.category,
        "model_type": request.model_type,
        "model": outcome.model_label,
        "identifier": outcome.identifier,
        "prediction": outcome.prediction,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
