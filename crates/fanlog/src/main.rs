//! fanlog - ship log lines to console, files and a search backend
//!
//! # Usage
//!
//! ```bash
//! # Ship stdin (default)
//! my-app | fanlog --config fanlog.toml
//!
//! # Validate a config and probe the remote backend
//! fanlog check --config fanlog.toml
//! ```

mod cmd;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fanlog_config::Config;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// fanlog - structured log fan-out
#[derive(Parser, Debug)]
#[command(name = "fanlog")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Diagnostics level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read lines from stdin and fan them out (default)
    Ship(cmd::ship::ShipArgs),

    /// Validate configuration and probe the remote backend
    Check(cmd::check::CheckArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Command::Check(args)) => {
            // Check prints its own report, diagnostics only on request
            if let Some(level) = cli.log_level.as_deref() {
                init_logging(level)?;
            }
            cmd::check::run(&config, args).await
        }
        Some(Command::Ship(args)) => {
            init_logging(&resolve_log_level(cli.log_level.as_deref(), &config))?;
            cmd::ship::run(&config, args).await
        }
        None => {
            init_logging(&resolve_log_level(cli.log_level.as_deref(), &config))?;
            cmd::ship::run(&config, cmd::ship::ShipArgs::default()).await
        }
    }
}

/// Config file if given, otherwise defaults (JSON lines on stdout)
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Resolve diagnostics level: CLI flag > config file
fn resolve_log_level(cli_level: Option<&str>, config: &Config) -> String {
    match cli_level {
        Some(level) => level.to_string(),
        None => config.log.diagnostics.as_str().to_string(),
    }
}

/// Initialize the tracing subscriber for fanlog's own diagnostics.
///
/// Diagnostics go to stderr so they never mix with console-sink output.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("warn"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    Ok(())
}
