//! Replicator binary.
//!
//! Parses the command line, builds the replicator configuration, initializes tracing and runs
//! the replication on a multi-threaded runtime until it finishes or the process is stopped.

use clap::Parser;
use config::load_config;
use config::shared::ReplicatorConfig;
use telemetry::tracing::{TracingOptions, init_tracing_with};
use tracing::error;

use crate::cli::{Cli, Command};
use crate::core::start_replicator_with_config;

mod cli;
mod core;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, tracing_options) = match cli.command {
        Command::Run(args) => (
            args.to_config(),
            TracingOptions {
                level: args.log_level.clone(),
                log_file: args.log_file.clone(),
            },
        ),
        Command::RunFromConfig => (
            load_config::<ReplicatorConfig>()?,
            TracingOptions::default(),
        ),
    };

    // Validation happens before anything is connected or written.
    config.validate()?;

    let _log_flusher = init_tracing_with(env!("CARGO_BIN_NAME"), tracing_options)?;

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_replicator_with_config(config));

    if let Err(err) = &result {
        error!("{err:#}");
    }

    result
}
