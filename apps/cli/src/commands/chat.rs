//! Chat command implementation.

use std::path::Path;

use anyhow::Context;
use cityflow_abstraction::ChatMessage;
use cityflow_core::ChatRequest;

use super::{build_service, load_config};

/// Answers one chat message.
pub async fn execute(
    config_path: Option<&Path>,
    city: String,
    category: Option<String>,
    model_type: String,
    message: String,
) -> anyhow::Result<()> {
    let service = build_service(load_config(config_path)?)?;
    let request = ChatRequest { messages: vec![ChatMessage::user(message)], city, category, model_type };

    let response = service.chat().respond(&request).await.context("Chat failed")?;
    println!("{}", response.reply);
    Ok(())
}
