//! fanlog - Structured logging with fan-out
//!
//! Every record is encoded once as a JSON object and written to each enabled
//! sink: console, a size-rotating file, and a remote bulk-indexing backend
//! with time-bucketed destinations.
//!
//! # Example
//!
//! ```ignore
//! use fanlog::{FlushOutcome, Logger};
//! use fanlog_config::Config;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let config = Config::from_file("fanlog.toml")?;
//! let logger = Logger::from_config(&config).await?;
//!
//! logger.info("user signed in", &[("user_id", json!(42))]);
//!
//! // Drain the remote buffer and start a fresh destination
//! logger.flush(Duration::from_secs(30)).await?;
//!
//! // On shutdown, never wait longer than 5s
//! let outcome = logger.flush_with_timeout(Duration::from_secs(5)).await;
//! ```

pub mod layer;
mod logger;

pub use layer::FanOutLayer;
pub use logger::{FlushError, FlushOutcome, Logger, LoggerError};

pub use fanlog_sinks::Level;
