//! CityFlow CLI - Command-line interface for the CityFlow forecast service
//!
//! This CLI provides a `cityflow` command for serving the HTTP API and for
//! running forecasts, chat turns and health checks from a terminal.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use commands::{chat, check, forecast, llm_models, models, serve};

/// CityFlow - city-level POI demand forecasts with plain-language explanations
#[derive(Parser, Debug)]
#[command(name = "cityflow", author, version, about = "CityFlow demand forecast service")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (overrides CITYFLOW_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        address: Option<std::net::SocketAddr>,

        /// Skip the startup self-check and warm-up
        #[arg(long)]
        skip_startup: bool,
    },

    /// Run one forecast and print it as JSON
    Forecast {
        #[arg(long)]
        city: String,

        /// POI category, or ALL
        #[arg(long)]
        category: String,

        /// baseline or finetune
        #[arg(long, default_value = "baseline")]
        model_type: String,

        /// Free-text description of the time or situation
        #[arg(long, default_value = cityflow_core::forecast::DEFAULT_QUERY)]
        query: String,
    },

    /// Run one chat turn and print the reply
    Chat {
        #[arg(long)]
        city: String,

        #[arg(long)]
        category: Option<String>,

        #[arg(long, default_value = "baseline")]
        model_type: String,

        /// The user message
        message: String,
    },

    /// List the forecaster registry
    Models {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that every registry entry is reachable
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List Gemini models that support generateContent
    LlmModels {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(log_level: &str, json: bool) -> anyhow::Result<()> {
    let level = match log_level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false);
    if json {
        builder.json().try_init().map_err(|e| anyhow::anyhow!(e))?;
    } else {
        builder.without_time().try_init().map_err(|e| anyhow::anyhow!(e))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.json_logs)?;

    let config_path = args.config.as_deref();
    match args.command {
        Command::Serve { address, skip_startup } => {
            serve::execute(config_path, address, skip_startup).await?;
        }
        Command::Forecast { city, category, model_type, query } => {
            forecast::execute(config_path, city, category, model_type, query).await?;
        }
        Command::Chat { city, category, model_type, message } => {
            chat::execute(config_path, city, category, model_type, message).await?;
        }
        Command::Models { json } => {
            models::execute(json)?;
        }
        Command::Check { json } => {
            check::execute(config_path, json).await?;
        }
        Command::LlmModels { json } => {
            llm_models::execute(config_path, json).await?;
        }
    }

    Ok(())
}
