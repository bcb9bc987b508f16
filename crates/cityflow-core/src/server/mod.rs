//! Server module for CityFlow Core.
//!
//! An axum router over a shared [`ForecastService`].

pub mod logging;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::Result;
use crate::service::ForecastService;
use logging::RequestLoggerLayer;

/// Builds the HTTP router.
pub fn router(service: Arc<ForecastService>) -> Router {
    let cors = if service.config().server.cors_permissive { CorsLayer::very_permissive() } else { CorsLayer::new() };

    Router::new()
        .route("/ping", get(routes::ping))
        .route("/forecast", get(routes::forecast))
        .route("/t5-chat", post(routes::t5_chat))
        .route("/v1/manifest", get(routes::manifest))
        .layer(cors)
        .layer(RequestLoggerLayer)
        .with_state(service)
}

/// Serves until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to bind to `addr`.
pub async fn run(service: Arc<ForecastService>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Starting HTTP server");

    axum::serve(listener, router(service)).with_graceful_shutdown(shutdown_signal()).await?;

    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
