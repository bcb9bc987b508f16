//! Models command implementation.

use cityflow_models::ModelRegistry;
use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct ModelRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Identifier")]
    identifier: String,
    #[tabled(rename = "Label")]
    label: String,
}

/// Prints the forecaster registry.
pub fn execute(json_output: bool) -> anyhow::Result<()> {
    let registry = ModelRegistry::builtin();

    if json_output {
        let specs: Vec<_> = registry.specs().collect();
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }

    println!("{}", format!("Forecast models ({})", registry.len()).bold().cyan());
    let rows = registry.specs().map(|spec| ModelRow {
        key: spec.key.clone(),
        kind: spec.kind.to_string(),
        identifier: spec.identifier.clone(),
        label: spec.label.clone(),
    });
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(())
}
