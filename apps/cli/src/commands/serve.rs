//! Serve command implementation.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use cityflow_core::{server, startup};

use super::{build_service, load_config};

/// Runs the HTTP server until Ctrl-C.
pub async fn execute(
    config_path: Option<&Path>,
    address: Option<SocketAddr>,
    skip_startup: bool,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(address) = address {
        config.server.address = address;
    }
    let addr = config.server.address;

    let service = build_service(config)?;
    if !skip_startup {
        startup::run_startup(&service).await;
    }

    server::run(service, addr).await.with_context(|| format!("Server on {addr} failed"))
}
