//! Startup checks. Failures are logged, never fatal.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::service::ForecastService;

/// What startup found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    /// Revision of the baseline repo, when the check ran and succeeded.
    pub baseline_revision: Option<String>,
    /// Whether the baseline model is now in the cache.
    pub warmed_up: bool,
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

/// Checks that the baseline artifacts are reachable.
pub async fn self_check(service: &ForecastService) -> Option<String> {
    let config = service.config();
    if !config.forecast.self_check {
        return None;
    }
    if config.hub.local_dir.is_none() && config.hub.token.is_none() {
        warn!("HF_TOKEN not found; private repos may fail later.");
        return None;
    }

    let identifier = service.registry().baseline().identifier.clone();
    let source = Arc::clone(service.source());
    let lookup = identifier.clone();
    match tokio::task::spawn_blocking(move || source.revision(&lookup)).await {
        Ok(Ok(Some(sha))) => {
            info!(model_id = %identifier, sha = short_sha(&sha), "Baseline repo reachable");
            Some(sha)
        }
        Ok(Ok(None)) => {
            info!(model_id = %identifier, "Baseline artifacts present");
            None
        }
        Ok(Err(e)) => {
            warn!(model_id = %identifier, error = %e, "Baseline self-check failed");
            None
        }
        Err(e) => {
            warn!(model_id = %identifier, error = %e, "Baseline self-check task failed");
            None
        }
    }
}

/// Loads the baseline model so the first request does not pay for it.
pub async fn warm_up(service: &ForecastService) -> bool {
    if !service.config().forecast.warm_up {
        return false;
    }

    let identifier = &service.registry().baseline().identifier;
    let started = Instant::now();
    match service.cache().get_or_load(identifier).await {
        Ok(entry) => {
            info!(
                model_id = %identifier,
                loader = entry.loader,
                duration_ms = started.elapsed().as_millis(),
                "Baseline model warmed up"
            );
            true
        }
        Err(e) => {
            warn!(model_id = %identifier, error = %e, "Baseline warm-up failed");
            false
        }
    }
}

/// Runs the self-check, then the warm-up.
pub async fn run_startup(service: &ForecastService) -> StartupReport {
    let baseline_revision = self_check(service).await;
    let warmed_up = warm_up(service).await;
    StartupReport { baseline_revision, warmed_up }
}
