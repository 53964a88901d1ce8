//! Ship command - fan stdin lines out to the configured sinks
//!
//! # Usage
//!
//! ```bash
//! my-app | fanlog ship --config fanlog.toml
//!
//! # Rotate the remote destination every minute
//! my-app | fanlog ship --flush-every-secs 60
//! ```
//!
//! A line holding a JSON object keeps its fields; `level` and `msg` are
//! lifted into the record. Anything else is logged at info with the whole
//! line as the message.

use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Args;
use fanlog::{FlushOutcome, Level, Logger};
use fanlog_config::Config;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Ship command arguments
#[derive(Args, Debug)]
pub struct ShipArgs {
    /// Seconds to wait for the final flush before exiting
    #[arg(long, default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// Flush and rotate the remote sink every N seconds (0 = only at exit)
    #[arg(long, default_value_t = 0)]
    pub flush_every_secs: u64,
}

impl Default for ShipArgs {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: 5,
            flush_every_secs: 0,
        }
    }
}

/// Run the ship command
pub async fn run(config: &Config, args: ShipArgs) -> Result<()> {
    let logger = Logger::from_config(config).await?;
    let flush_deadline = config.remote.flush_timeout;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = (args.flush_every_secs > 0).then(|| {
        let mut interval = tokio::time::interval(Duration::from_secs(args.flush_every_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.reset();
        interval
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut shipped = 0u64;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => {
                        let (level, message, fields) = parse_line(&line);
                        logger.log_map(level, &message, fields);
                        shipped += 1;
                    }
                    None => break, // EOF
                }
            }
            _ = next_tick(&mut ticker) => {
                if let Err(e) = logger.flush(flush_deadline).await {
                    tracing::error!(error = %e, "periodic flush failed");
                }
            }
            _ = &mut shutdown => {
                tracing::info!("interrupted, shutting down");
                break;
            }
        }
    }

    tracing::info!(shipped, "input finished, flushing");
    match logger
        .flush_with_timeout(Duration::from_secs(args.shutdown_timeout_secs))
        .await
    {
        FlushOutcome::Flushed => Ok(()),
        FlushOutcome::Failed(e) => Err(anyhow!("final flush failed: {}", e)),
        FlushOutcome::TimedOut => {
            tracing::warn!(
                timeout_secs = args.shutdown_timeout_secs,
                "final flush timed out, buffered records may be lost"
            );
            Ok(())
        }
    }
}

async fn next_tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Split an input line into level, message and extra fields
fn parse_line(line: &str) -> (Level, String, Map<String, Value>) {
    let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(line) else {
        return (Level::Info, line.to_string(), Map::new());
    };

    let level = match fields.remove("level") {
        Some(Value::String(s)) => s.parse().unwrap_or(Level::Info),
        _ => Level::Info,
    };
    let message = match fields.remove("msg") {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };

    (level, message, fields)
}
