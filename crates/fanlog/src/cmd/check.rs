//! Check command - validate configuration and probe the remote backend
//!
//! # Usage
//!
//! ```bash
//! fanlog check --config fanlog.toml
//! ```
//!
//! Prints the enabled sinks, the destination a record would land in right
//! now, and whether the remote backend answers.

use anyhow::{Result, bail};
use clap::Args;
use fanlog_config::Config;
use fanlog_sinks::{DestinationConfig, DestinationNameGenerator, is_ready};

/// Check command arguments
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Skip the remote readiness probe
    #[arg(long)]
    pub offline: bool,
}

/// Run the check command
pub async fn run(config: &Config, args: CheckArgs) -> Result<()> {
    config.validate()?;

    println!("config ok");
    println!("  sinks:       {}", config.enabled_sinks().join(", "));
    println!("  level:       {}", config.log.level.as_str());

    let remote = &config.remote;
    if !remote.enabled {
        return Ok(());
    }

    let mut destination =
        DestinationConfig::new(remote.index.clone()).with_format(remote.index_format.clone());
    if let Some(tz) = remote.time_zone()? {
        destination = destination.with_timezone(tz);
    }
    let names = DestinationNameGenerator::new(destination);
    println!("  destination: {}", names.generate());

    if args.offline {
        return Ok(());
    }

    if is_ready(&remote.url, remote.readiness_timeout, remote.insecure).await {
        println!("  remote:      {} ready", remote.url);
        Ok(())
    } else {
        bail!("remote backend at {} is not ready", remote.url)
    }
}
