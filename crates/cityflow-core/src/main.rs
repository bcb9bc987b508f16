//! CityFlow Server - Entry Point
//!
//! This binary starts the CityFlow HTTP server.

use std::sync::Arc;

use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cityflow_core::{Config, ForecastService, server, startup};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cityflow_core=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::load(None) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            std::process::exit(1);
        }
    };
    let addr = config.server.address;

    let service = match ForecastService::from_config(config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!(error = %e, "Failed to build forecast service");
            std::process::exit(1);
        }
    };

    startup::run_startup(&service).await;

    if let Err(e) = server::run(service, addr).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
