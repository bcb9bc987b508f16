//! LLM models command implementation.

use std::path::Path;

use anyhow::Context;
use cityflow_models::GeminiModel;
use colored::Colorize;

use super::load_config;

/// Lists Gemini models usable for explanations.
pub async fn execute(config_path: Option<&Path>, json_output: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let api_key = config
        .llm
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .context("GEMINI_API_KEY is not set")?;

    let mut client =
        GeminiModel::with_api_key(config.llm.model_id.clone(), api_key).with_timeout(config.timeouts.llm());
    if let Some(base_url) = &config.llm.base_url {
        client = client.with_base_url(base_url.as_str());
    }

    let models = client.list_models().await.context("Failed to list Gemini models")?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    println!("{}", format!("Gemini models supporting generateContent ({})", models.len()).bold().cyan());
    for model in &models {
        let marker = if model.id == config.llm.model_id { " (configured)".green() } else { "".normal() };
        match &model.display_name {
            Some(name) => println!("  {}{}  {}", model.id, marker, name.dimmed()),
            None => println!("  {}{}", model.id, marker),
        }
    }
    Ok(())
}
