//! Remote sink - buffered writer over a batch delivery pipe
//!
//! # Lifecycle
//!
//! ```text
//! Open --flush()--> Closed (stop raised, pipe draining) --> replaced by factory
//! ```
//!
//! A writer is flushed at most once. After a successful flush the fan-out asks
//! the [`RemoteSinkFactory`] for a brand-new writer bound to a fresh
//! destination; the closed one is never reopened.
//!
//! # Write path
//!
//! The state check and destination lookup run under one mutex; the hand-off
//! to the pipe runs outside it with its own submission budget, so a slow pipe
//! never blocks `flush()` from raising the stop signal.

use std::sync::Arc;
use std::time::Duration;

use fanlog_config::{Config, RemoteConfig};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::common::{MetricsSnapshot, Sink, SinkError, SinkMetrics};
use crate::delivery::{
    BatchDeliveryClient, BulkIndexer, BulkIndexerConfig, BulkItem, BulkTransport, DEFAULT_FLUSH_BYTES,
    DEFAULT_FLUSH_INTERVAL, DEFAULT_QUEUE_SIZE, DEFAULT_WORKERS, DeliveryError, DeliveryStats,
};
use crate::destination::{DestinationConfig, DestinationNameGenerator};
use crate::record::{Level, LogRecord};

/// Budget for handing one record to the pipe
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Budget for draining the pipe on flush
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote writer errors
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    /// Writer was already flushed and closed
    #[error("writer already closed")]
    Closed,

    /// Flush has begun; new records are refused
    #[error("writer is stopping")]
    Stopping,

    /// Pipe did not drain within the deadline (writer stays closed)
    #[error("flush did not complete within {0:?}")]
    FlushTimeout(Duration),

    /// Record payload is not a JSON object
    #[error("failed to re-encode record: {0}")]
    Encode(String),

    /// Pipe rejected the record or failed to close
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

#[derive(Debug, Default)]
struct WriterState {
    closed: bool,
}

/// Buffered writer bound to one delivery pipe
pub struct RemoteWriter {
    client: Arc<dyn BatchDeliveryClient>,
    names: DestinationNameGenerator,
    state: Mutex<WriterState>,
    stop: CancellationToken,
    submit_timeout: Duration,
}

impl RemoteWriter {
    pub fn new(client: Arc<dyn BatchDeliveryClient>, names: DestinationNameGenerator) -> Self {
        Self {
            client,
            names,
            state: Mutex::new(WriterState::default()),
            stop: CancellationToken::new(),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Hand one record to the pipe
    ///
    /// The payload is re-parsed as a JSON object and re-serialized before
    /// submission, tagged with the destination for the current instant.
    ///
    /// # Errors
    ///
    /// - [`WriterError::Closed`] after `flush()` completed its state change
    /// - [`WriterError::Stopping`] once the stop signal is raised
    /// - [`WriterError::Encode`] for a payload that is not a JSON object
    /// - [`WriterError::Delivery`] when the pipe refuses the item
    pub fn write(&self, record: &LogRecord) -> Result<usize, WriterError> {
        let destination = {
            let state = self.state.lock();
            if state.closed {
                return Err(WriterError::Closed);
            }
            self.names.generate()
        };

        let document: Map<String, Value> = serde_json::from_slice(record.payload())
            .map_err(|e| WriterError::Encode(e.to_string()))?;
        let body = Value::Object(document).to_string();

        if self.stop.is_cancelled() {
            return Err(WriterError::Stopping);
        }

        match self
            .client
            .add(BulkItem::new(destination, body), self.submit_timeout)
        {
            Ok(()) => Ok(record.len()),
            Err(_) if self.stop.is_cancelled() => Err(WriterError::Stopping),
            Err(e) => Err(WriterError::Delivery(e)),
        }
    }

    /// Stop accepting records and drain the pipe within `deadline`
    ///
    /// # Errors
    ///
    /// - [`WriterError::Closed`] on a second call; the pipe is not touched
    /// - [`WriterError::FlushTimeout`] when draining overruns the deadline
    /// - [`WriterError::Delivery`] when the pipe fails to close
    pub async fn flush(&self, deadline: Duration) -> Result<(), WriterError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(WriterError::Closed);
            }
            self.stop.cancel();
            state.closed = true;
        }

        let before = self.client.stats();
        tracing::info!(
            added = before.added,
            flushed = before.flushed,
            failed = before.failed,
            "starting remote flush"
        );

        match tokio::time::timeout(deadline, self.client.close()).await {
            Err(_) => {
                tracing::warn!(deadline = ?deadline, "remote flush timed out");
                return Err(WriterError::FlushTimeout(deadline));
            }
            Ok(Err(e)) => return Err(WriterError::Delivery(e)),
            Ok(Ok(())) => {}
        }

        let after = self.client.stats();
        tracing::info!(
            added = after.added,
            flushed = after.flushed,
            failed = after.failed,
            requests = after.requests,
            "remote flush completed"
        );

        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn stats(&self) -> DeliveryStats {
        self.client.stats()
    }

    /// Destination a record written now would land in
    pub fn destination(&self) -> String {
        self.names.generate()
    }
}

impl std::fmt::Debug for RemoteWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteWriter")
            .field("closed", &self.is_closed())
            .field("stopping", &self.stop.is_cancelled())
            .field("stats", &self.stats())
            .finish()
    }
}

/// [`Sink`] adapter over a [`RemoteWriter`]
pub struct RemoteSink {
    writer: Arc<RemoteWriter>,
    level: Level,
    metrics: SinkMetrics,
}

impl RemoteSink {
    pub fn new(writer: Arc<RemoteWriter>, level: Level) -> Self {
        Self {
            writer,
            level,
            metrics: SinkMetrics::new(),
        }
    }

    pub fn writer(&self) -> &Arc<RemoteWriter> {
        &self.writer
    }
}

impl Sink for RemoteSink {
    fn name(&self) -> &str {
        "remote"
    }

    fn accepts(&self, level: Level) -> bool {
        level >= self.level
    }

    fn write(&self, record: &LogRecord) -> Result<usize, SinkError> {
        match self.writer.write(record) {
            Ok(n) => {
                self.metrics.record_written(n as u64);
                Ok(n)
            }
            Err(e) => {
                self.metrics.write_error();
                Err(SinkError::Remote(e))
            }
        }
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Tuning shared by every writer a factory builds
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub level: Level,
    pub workers: usize,
    pub flush_bytes: usize,
    pub flush_interval: Duration,
    pub queue_size: usize,
    pub submit_timeout: Duration,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            level: Level::Info,
            workers: DEFAULT_WORKERS,
            flush_bytes: DEFAULT_FLUSH_BYTES,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            queue_size: DEFAULT_QUEUE_SIZE,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        }
    }
}

impl RemoteSettings {
    /// Settings for the `[remote]` section, at the sink's effective level
    pub fn from_config(config: &Config) -> Self {
        let remote = &config.remote;
        Self {
            level: config.effective_level(remote.level).into(),
            workers: remote.workers,
            flush_bytes: remote.flush_bytes,
            flush_interval: remote.flush_interval,
            queue_size: remote.queue_size,
            submit_timeout: remote.submit_timeout,
        }
    }
}

/// Builds fresh (sink, writer) pairs
///
/// Called once at startup and again after every successful flush.
#[derive(Clone)]
pub struct RemoteSinkFactory {
    names: DestinationNameGenerator,
    transport: Arc<dyn BulkTransport>,
    settings: RemoteSettings,
}

impl RemoteSinkFactory {
    pub fn new(
        names: DestinationNameGenerator,
        transport: Arc<dyn BulkTransport>,
        settings: RemoteSettings,
    ) -> Self {
        Self {
            names,
            transport,
            settings,
        }
    }

    /// Factory for the `[remote]` section of a validated config
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Creation`] when the timezone cannot be resolved.
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn BulkTransport>,
    ) -> Result<Self, SinkError> {
        let names = DestinationNameGenerator::new(destination_config(&config.remote)?);
        Ok(Self::new(names, transport, RemoteSettings::from_config(config)))
    }

    /// Build a new pipe and writer bound to a fresh destination
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Creation`] when the pipe cannot be built, e.g.
    /// outside a tokio runtime.
    pub fn create(&self) -> Result<(Arc<RemoteSink>, Arc<RemoteWriter>), SinkError> {
        let destination = self.names.generate();
        let indexer = BulkIndexer::new(
            BulkIndexerConfig {
                workers: self.settings.workers,
                flush_bytes: self.settings.flush_bytes,
                flush_interval: self.settings.flush_interval,
                queue_size: self.settings.queue_size,
                default_destination: destination.clone(),
            },
            Arc::clone(&self.transport),
        )
        .map_err(|e| SinkError::creation(e.to_string()))?;

        let writer = Arc::new(
            RemoteWriter::new(Arc::new(indexer), self.names.clone())
                .with_submit_timeout(self.settings.submit_timeout),
        );
        let sink = Arc::new(RemoteSink::new(Arc::clone(&writer), self.settings.level));

        tracing::debug!(%destination, "remote writer created");
        Ok((sink, writer))
    }

    pub fn names(&self) -> &DestinationNameGenerator {
        &self.names
    }

    pub fn settings(&self) -> &RemoteSettings {
        &self.settings
    }
}

fn destination_config(remote: &RemoteConfig) -> Result<DestinationConfig, SinkError> {
    let mut config =
        DestinationConfig::new(remote.index.clone()).with_format(remote.index_format.clone());
    if let Some(tz) = remote
        .time_zone()
        .map_err(|e| SinkError::creation(e.to_string()))?
    {
        config = config.with_timezone(tz);
    }
    Ok(config)
}
