//! Command line of the `ghost` binary and the config loading step that
//! runs before any service starts.

use crate::config::{Config, DEFAULT_CONFIG};
use anyhow::{Context, Result};
use clap::Parser;
use os_config::{DumpFlags, EnvSource, LoadOutcome, Loader};
use os_telemetry::{LogConfig, LogFormat};
use std::path::PathBuf;
use tracing::debug;

/// Ghost: oracle node that announces its data models to peers.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "ghost")]
#[command(about = "Oracle ghost node")]
pub struct Cli {
    /// Config file; repeat to layer files, later ones win
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Vec<PathBuf>,

    /// Print the environment variables the config references, then exit
    #[arg(long = "config.env")]
    pub config_env: bool,

    /// Print the decoded config as JSON, then exit
    #[arg(long = "config.json")]
    pub config_json: bool,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(long = "log.verbosity", value_name = "LEVEL")]
    pub log_verbosity: Option<String>,

    /// Log output format (text or json)
    #[arg(long = "log.format", value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,
}

/// What to do after loading the config.
#[derive(Debug)]
pub enum Startup {
    /// Print this and exit successfully.
    Exit(String),
    /// Start the node.
    Run(Box<LoadOutcome<Config>>),
}

impl Cli {
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        LogConfig::from_env().with_overrides(self.log_verbosity.as_deref(), self.log_format)
    }

    #[must_use]
    pub fn dump_flags(&self) -> DumpFlags {
        DumpFlags {
            env: self.config_env,
            json: self.config_json,
        }
    }

    /// Load the config files, or the embedded defaults when none are given.
    pub fn load(&self, env: EnvSource) -> Result<LoadOutcome<Config>> {
        let loader = Loader::new(env);
        let outcome = if self.config.is_empty() {
            debug!("No config files given, using embedded defaults");
            loader.load_embeds(&[DEFAULT_CONFIG])
        } else {
            loader.load_files(&self.config)
        };
        outcome.context("failed to load configuration")
    }

    /// Load the config and decide between dumping it and running.
    pub fn prepare(&self, env: EnvSource) -> Result<Startup> {
        let outcome = self.load(env)?;
        match self
            .dump_flags()
            .render(&outcome)
            .context("failed to render configuration")?
        {
            Some(dump) => Ok(Startup::Exit(dump)),
            None => Ok(Startup::Run(Box::new(outcome))),
        }
    }
}
