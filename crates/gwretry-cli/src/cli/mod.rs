//! CLI for running gateway calls under backoff.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gwretry_core::config;
use std::path::PathBuf;

use commands::{run_classify, run_config, run_exec, ExecOptions};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "gwretry")]
#[command(about = "Run gateway calls under deadline-bounded exponential backoff", long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of ~/.config/gwretry/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run a program, retrying while it fails with a transient gateway error.
    Exec {
        /// Use the coordination preset (45s budget) instead of the configured policy.
        #[arg(long)]
        coordination: bool,
        /// Override the total retry budget, in seconds.
        #[arg(long, value_name = "SECS")]
        timeout: Option<f64>,
        /// Override the label used in timeout messages.
        #[arg(long, value_name = "TEXT")]
        context: Option<String>,
        /// Program and arguments. Failure text is read from its stderr.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Report whether an error message would be retried.
    Classify {
        /// Error message (words are joined with spaces).
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// Print the effective configuration.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = match &cli.config {
            Some(path) => config::load_from_path(path)?,
            None => config::load_or_init()?,
        };
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Exec {
                coordination,
                timeout,
                context,
                command,
            } => {
                let opts = ExecOptions {
                    coordination,
                    timeout_secs: timeout,
                    context,
                };
                run_exec(&cfg, &opts, &command).await?;
            }
            CliCommand::Classify { message } => run_classify(&cfg, &message.join(" ")),
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
