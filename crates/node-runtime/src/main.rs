//! # Ghost
//!
//! Entry point of the oracle ghost node.
//!
//! ## Startup Sequence
//!
//! 1. Parse the command line and install logging
//! 2. Load the config files (or the embedded defaults)
//! 3. With `--config.env` / `--config.json`: print and exit
//! 4. Build keys, transports, the ghost service and the morph engine
//! 5. Run until Ctrl+C, then cancel every service and wait for them
//!
//! Exit code 0 on a clean stop or after a dump, 1 on any failure.

use anyhow::{Context, Result};
use clap::Parser;
use node_runtime::{Cli, Node, Startup};
use os_config::EnvSource;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

async fn run(cli: Cli) -> Result<()> {
    let outcome = match cli.prepare(EnvSource::os())? {
        Startup::Exit(dump) => {
            println!("{dump}");
            return Ok(());
        }
        Startup::Run(outcome) => outcome,
    };

    let node = Node::build(&outcome.config)?;
    let ctx = CancellationToken::new();
    let shutdown = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
        }
        shutdown.cancel();
    });

    node.run(ctx).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = os_telemetry::init_logging(&cli.log_config()).context("failed to initialize logging") {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %format!("{err:#}"), "Ghost failed");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
