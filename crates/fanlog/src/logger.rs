//! Logger facade
//!
//! The handle applications log through. Cheap to clone; every clone shares
//! one fan-out. There is no process-global instance: build one at startup
//! and pass it to whatever needs to log.
//!
//! # Shutdown
//!
//! ```ignore
//! match logger.flush_with_timeout(Duration::from_secs(5)).await {
//!     FlushOutcome::Flushed => {}
//!     FlushOutcome::Failed(e) => eprintln!("flush failed: {e}"),
//!     FlushOutcome::TimedOut => eprintln!("flush still running, exiting anyway"),
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use fanlog_config::{Config, ConfigError};
use fanlog_sinks::{
    BulkTransport, Clock, ConsoleSink, DeliveryError, FanOut, FanOutBuildError, FanOutError,
    HttpBulkTransport, Level, LogRecord, RemoteSinkFactory, RotatingFileSink, RotationError,
    SinkError, SystemClock, is_ready,
};
use serde_json::{Map, Value};

/// Errors building a [`Logger`]
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open sink: {0}")]
    Sink(#[from] SinkError),

    #[error("failed to build fan-out: {0}")]
    Build(#[from] FanOutBuildError),

    #[error("failed to set up remote transport: {0}")]
    Transport(#[from] DeliveryError),

    #[error("remote backend at {0} is not ready")]
    NotReady(String),
}

/// Errors from [`Logger::flush`]
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    /// A local sink failed to flush
    #[error(transparent)]
    Local(#[from] FanOutError),

    #[error(transparent)]
    Rotation(#[from] RotationError),

    /// The spawned flush task panicked or was cancelled
    #[error("flush task failed: {0}")]
    Task(String),
}

/// Result of [`Logger::flush_with_timeout`]
#[derive(Debug)]
pub enum FlushOutcome {
    Flushed,
    Failed(FlushError),
    /// The flush is still running in the background
    TimedOut,
}

impl FlushOutcome {
    pub fn is_flushed(&self) -> bool {
        matches!(self, FlushOutcome::Flushed)
    }
}

struct Inner {
    fanout: FanOut,
    flush_timeout: Duration,
    clock: Arc<dyn Clock>,
}

/// Cloneable logging handle
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

impl Logger {
    pub fn new(fanout: FanOut) -> Self {
        Self::with_clock(fanout, Arc::new(SystemClock))
    }

    /// Logger stamping records with `clock`
    pub fn with_clock(fanout: FanOut, clock: Arc<dyn Clock>) -> Self {
        Self::from_parts(fanout, fanlog_sinks::DEFAULT_FLUSH_TIMEOUT, clock)
    }

    fn from_parts(fanout: FanOut, flush_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                fanout,
                flush_timeout,
                clock,
            }),
        }
    }

    /// Build every enabled sink from `config`
    ///
    /// The remote sink ships over HTTP. With `require_ready` set, the backend
    /// must answer the readiness probe first.
    ///
    /// # Errors
    ///
    /// Fails on an invalid config, a sink that cannot be opened, an
    /// unreachable backend when readiness is required, or when called
    /// outside a tokio runtime with the remote sink enabled.
    pub async fn from_config(config: &Config) -> Result<Self, LoggerError> {
        config.validate()?;

        let remote = &config.remote;
        if !remote.enabled {
            return Self::build(config, None);
        }

        let transport = HttpBulkTransport::from_config(remote)?;
        if remote.require_ready
            && !is_ready(&remote.url, remote.readiness_timeout, remote.insecure).await
        {
            return Err(LoggerError::NotReady(remote.url.clone()));
        }

        Self::build(config, Some(Arc::new(transport)))
    }

    /// Like [`Logger::from_config`] with a caller-provided remote transport
    pub fn from_config_with_transport(
        config: &Config,
        transport: Arc<dyn BulkTransport>,
    ) -> Result<Self, LoggerError> {
        config.validate()?;
        Self::build(config, Some(transport))
    }

    fn build(
        config: &Config,
        transport: Option<Arc<dyn BulkTransport>>,
    ) -> Result<Self, LoggerError> {
        let mut builder = FanOut::builder();

        if config.console.enabled {
            let level = config.effective_level(config.console.level).into();
            builder = builder.sink(Arc::new(ConsoleSink::from_config(&config.console, level)));
        }

        if config.file.enabled {
            let level = config.effective_level(config.file.level).into();
            builder = builder.sink(Arc::new(RotatingFileSink::from_config(&config.file, level)?));
        }

        if config.remote.enabled
            && let Some(transport) = transport
        {
            builder = builder.remote(RemoteSinkFactory::from_config(config, transport)?);
        }

        let fanout = builder.build()?;
        tracing::info!(sinks = ?fanout.sink_names(), "logger ready");

        Ok(Self::from_parts(
            fanout,
            config.remote.flush_timeout,
            Arc::new(SystemClock),
        ))
    }

    /// Whether any sink would take a record at `level`
    pub fn enabled(&self, level: Level) -> bool {
        self.inner.fanout.accepts_any(level)
    }

    /// Encode one record and fan it out
    ///
    /// Sink failures never reach the caller; they are reported through the
    /// rate-limited diagnostics of each sink.
    pub fn log(&self, level: Level, message: &str, fields: &[(&str, Value)]) {
        if !self.enabled(level) {
            return;
        }
        let fields = fields
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect();
        self.log_map(level, message, fields);
    }

    /// [`Logger::log`] with an owned field map
    pub fn log_map(&self, level: Level, message: &str, fields: Map<String, Value>) {
        if !self.enabled(level) {
            return;
        }
        let record = LogRecord::encode(level, self.inner.clock.now(), message, fields);
        self.write_record(&record);
    }

    pub fn trace(&self, message: &str, fields: &[(&str, Value)]) {
        self.log(Level::Trace, message, fields);
    }

    pub fn debug(&self, message: &str, fields: &[(&str, Value)]) {
        self.log(Level::Debug, message, fields);
    }

    pub fn info(&self, message: &str, fields: &[(&str, Value)]) {
        self.log(Level::Info, message, fields);
    }

    pub fn warn(&self, message: &str, fields: &[(&str, Value)]) {
        self.log(Level::Warn, message, fields);
    }

    pub fn error(&self, message: &str, fields: &[(&str, Value)]) {
        self.log(Level::Error, message, fields);
    }

    /// Fan out an already-encoded record
    pub fn write_record(&self, record: &LogRecord) {
        if let Err(e) = self.inner.fanout.write(record) {
            tracing::debug!(
                delivered = e.delivered,
                failed = e.failures.len(),
                "record not delivered to every sink"
            );
        }
    }

    /// Flush local sinks, then drain and rotate the remote writer
    ///
    /// # Errors
    ///
    /// The remote rotation still runs when a local sink failed to flush; a
    /// rotation error takes precedence over a local one.
    pub async fn flush(&self, deadline: Duration) -> Result<(), FlushError> {
        let local = self.inner.fanout.flush();
        self.inner.fanout.flush_remote(deadline).await?;
        local?;
        Ok(())
    }

    /// Flush with the configured drain deadline, waiting at most `timeout`
    ///
    /// On timeout the flush keeps running in the background and its result is
    /// logged when it finishes.
    pub async fn flush_with_timeout(&self, timeout: Duration) -> FlushOutcome {
        let logger = self.clone();
        let deadline = self.inner.flush_timeout;
        let mut task = tokio::spawn(async move { logger.flush(deadline).await });

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok(()))) => {
                tracing::info!("logs flushed");
                FlushOutcome::Flushed
            }
            Ok(Ok(Err(e))) => {
                tracing::error!(error = %e, "log flush failed");
                FlushOutcome::Failed(e)
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "log flush task failed");
                FlushOutcome::Failed(FlushError::Task(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(timeout = ?timeout, "log flush timed out, continuing in background");
                tokio::spawn(async move {
                    match task.await {
                        Ok(Ok(())) => tracing::info!("background log flush completed"),
                        Ok(Err(e)) => tracing::error!(error = %e, "background log flush failed"),
                        Err(e) => tracing::error!(error = %e, "background log flush task failed"),
                    }
                });
                FlushOutcome::TimedOut
            }
        }
    }

    pub fn fanout(&self) -> &FanOut {
        &self.inner.fanout
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("fanout", &self.inner.fanout)
            .field("flush_timeout", &self.inner.flush_timeout)
            .finish()
    }
}

#[cfg(test)]
#[path = "logger_test.rs"]
mod logger_test;
