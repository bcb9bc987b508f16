//! Check command implementation.

use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;

use super::{build_service, load_config};

#[derive(Debug, Serialize)]
struct CheckResult {
    identifier: String,
    label: String,
    ok: bool,
    revision: Option<String>,
    error: Option<String>,
}

/// Checks every registry entry against the configured artifact source.
pub async fn execute(config_path: Option<&Path>, json_output: bool) -> anyhow::Result<()> {
    let service = build_service(load_config(config_path)?)?;

    let mut results = Vec::with_capacity(service.registry().len());
    for spec in service.registry().specs() {
        let source = Arc::clone(service.source());
        let identifier = spec.identifier.clone();
        let outcome = tokio::task::spawn_blocking(move || source.revision(&identifier)).await?;

        let (revision, error) = match outcome {
            Ok(revision) => (revision, None),
            Err(e) => (None, Some(e.to_string())),
        };
        results.push(CheckResult {
            identifier: spec.identifier.clone(),
            label: spec.label.clone(),
            ok: error.is_none(),
            revision,
            error,
        });
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("{} ({})", "Model artifacts".bold().cyan(), service.source().name());
        for result in &results {
            if result.ok {
                let revision = result
                    .revision
                    .as_deref()
                    .map_or_else(String::new, |r| format!(" @ {}", r.get(..7).unwrap_or(r)));
                println!("  {} {}{}", "✓".green(), result.identifier, revision.dimmed());
            } else {
                let error = result.error.as_deref().unwrap_or_default();
                println!("  {} {}: {}", "✗".red(), result.identifier, error.red());
            }
        }
    }

    let failed = results.iter().filter(|r| !r.ok).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} models unreachable", results.len());
    }
    Ok(())
}
