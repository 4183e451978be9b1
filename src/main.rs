//! reliq - reliable list-queue worker
//!
//! Main entry point for the reliq CLI.

mod cli;
mod cmd_queue;

use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reliq_config::{ConfigLoader, ConfigValidator, LoggingConfig};

use crate::cli::Cli;
use crate::cmd_queue::handle_queue_command;

/// Initialize tracing on stderr; stdout carries job output.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = PathBuf::from(ConfigLoader::expand_path(&cli.config));
    let mut config = ConfigLoader::load_or_default(&config_path)?;
    if let Some(namespace) = cli.namespace {
        config.queue.namespace = namespace;
    }

    init_tracing(&config.logging);
    if !config_path.exists() {
        debug!("No config at {}, using defaults", config_path.display());
    }

    let warnings = ConfigValidator::validate(&config)?.into_result()?;
    for warning in &warnings {
        warn!(field = %warning.path, "{}", warning.message);
    }

    handle_queue_command(cli.command, config).await
}
