//! CLI definitions for reliq.

use clap::{Parser, Subcommand};

/// reliq CLI.
#[derive(Parser)]
#[command(name = "reliq")]
#[command(about = "Reliable list-queue worker and operator tool")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "reliq.toml", global = true)]
    pub config: String,

    /// Override the queue namespace from the config file
    #[arg(short, long, env = "RELIQ_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Push a JSON payload onto the queue
    Push {
        /// Payload as JSON text
        payload: String,
    },

    /// Consume jobs until interrupted, printing each payload
    Work {
        /// Acknowledge after printing instead of on delivery
        #[arg(long)]
        manual: bool,

        /// Reject every job with this message instead of acknowledging it
        #[arg(long, conflicts_with = "manual")]
        reject_with: Option<String>,
    },

    /// Show list sizes and recent rejections
    Inspect {
        /// Number of rejected jobs to print
        #[arg(long, default_value_t = 10)]
        errors: usize,
    },

    /// Move abandoned in-flight jobs back to pending
    Recover {
        /// Recover every in-flight job (only safe with no worker running)
        #[arg(long)]
        all: bool,

        /// Recover jobs created more than this many seconds ago
        #[arg(long, conflicts_with = "all")]
        older_than: Option<u64>,
    },
}
