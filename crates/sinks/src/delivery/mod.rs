//! Batch delivery pipe
//!
//! Accumulates records into NDJSON bulk bodies and ships them through a
//! [`BulkTransport`] from a small pool of worker lanes.
//!
//! # Architecture
//!
//! ```text
//! [add()] --round robin--> [lane 0 channel] --> [lane task] --bulk body--> [transport]
//!                     \--> [lane 1 channel] --> [lane task] --bulk body--> [transport]
//! ```
//!
//! Each lane flushes when its buffer reaches `flush_bytes` or when
//! `flush_interval` elapses, whichever comes first. `close()` drops the lane
//! senders; every lane drains what it has, sends a final request and exits.
//!
//! Records are appended to a lane in submission order, but two lanes commit
//! independently so the backend may see them out of order.
//!
//! # Full queues
//!
//! `add` is synchronous and is usually called from inside a tokio task. When a
//! lane queue is full it waits for space without starving the lanes:
//!
//! - multi-thread runtime: `block_in_place` + `send_timeout`
//! - current-thread runtime: the wait is handed to a spawned task and `add`
//!   returns at once; a record that still finds no room within the budget is
//!   counted as failed
//! - outside any runtime: blocks on the pipe's runtime handle

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::task::JoinHandle;

/// Parallel senders per pipe
pub const DEFAULT_WORKERS: usize = 2;

/// Buffered bytes per lane that trigger a bulk request
pub const DEFAULT_FLUSH_BYTES: usize = 256 * 1024;

/// Maximum time a record waits in a lane buffer
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

/// Records queued per lane before `add` starts waiting
pub const DEFAULT_QUEUE_SIZE: usize = 4096;

/// One document bound for one destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    /// Target collection; empty means the pipe's default destination
    pub destination: String,
    /// Serialized JSON document
    pub body: Bytes,
}

impl BulkItem {
    pub fn new(destination: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            destination: destination.into(),
            body: body.into(),
        }
    }
}

/// Pipe counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Items accepted by `add`
    pub added: u64,
    /// Items the backend acknowledged
    pub flushed: u64,
    /// Items lost to transport or per-item failures
    pub failed: u64,
    /// Bulk requests issued
    pub requests: u64,
}

/// Result of one bulk request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

impl BulkOutcome {
    pub fn all_succeeded(items: usize) -> Self {
        Self {
            succeeded: items,
            failed: 0,
        }
    }
}

/// Errors from the delivery pipe
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Pipe is closed, no more items accepted
    #[error("delivery pipe closed")]
    Closed,

    /// Lane queue stayed full for the whole submission budget
    #[error("delivery queue full after {0:?}")]
    QueueFull(Duration),

    /// Document could not be shaped into a bulk item
    #[error("failed to encode document: {0}")]
    Encode(String),

    /// Request never completed
    #[error("transport error: {0}")]
    Transport(String),

    /// Backend answered with a non-success status
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Pipe could not be built
    #[error("invalid pipe setup: {0}")]
    Setup(String),
}

/// What a remote writer needs from its delivery pipe
#[async_trait]
pub trait BatchDeliveryClient: Send + Sync {
    /// Queue one item, waiting at most `budget` for queue space
    fn add(&self, item: BulkItem, budget: Duration) -> Result<(), DeliveryError>;

    /// Stop accepting items and wait until everything queued was sent.
    ///
    /// A second call returns [`DeliveryError::Closed`].
    async fn close(&self) -> Result<(), DeliveryError>;

    fn stats(&self) -> DeliveryStats;
}

/// Sends one NDJSON bulk body to the backend
#[async_trait]
pub trait BulkTransport: Send + Sync {
    async fn send(&self, body: Bytes, items: usize) -> Result<BulkOutcome, DeliveryError>;
}

/// Tuning for a [`BulkIndexer`]
#[derive(Debug, Clone)]
pub struct BulkIndexerConfig {
    pub workers: usize,
    pub flush_bytes: usize,
    pub flush_interval: Duration,
    pub queue_size: usize,
    /// Used for items that carry no destination
    pub default_destination: String,
}

impl Default for BulkIndexerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            flush_bytes: DEFAULT_FLUSH_BYTES,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            queue_size: DEFAULT_QUEUE_SIZE,
            default_destination: String::new(),
        }
    }
}

#[derive(Debug, Default)]
struct IndexerStats {
    added: AtomicU64,
    flushed: AtomicU64,
    failed: AtomicU64,
    requests: AtomicU64,
}

impl IndexerStats {
    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            added: self.added.load(Ordering::Relaxed),
            flushed: self.flushed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
        }
    }
}

/// Buffering, multi-lane bulk pipe
///
/// Owns its lane tasks; they are never shared with another pipe.
pub struct BulkIndexer {
    /// Lane senders; `None` once closed
    lanes: Mutex<Option<Vec<mpsc::Sender<BulkItem>>>>,
    /// Hand-offs still waiting for room, per lane
    overflow: Vec<Arc<AtomicUsize>>,
    next_lane: AtomicUsize,
    runtime: Handle,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<IndexerStats>,
    default_destination: String,
}

impl BulkIndexer {
    /// Build the pipe and spawn its lanes on the current tokio runtime
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Setup`] when called outside a runtime or with
    /// zero-sized tuning values.
    pub fn new(
        config: BulkIndexerConfig,
        transport: Arc<dyn BulkTransport>,
    ) -> Result<Self, DeliveryError> {
        if config.workers == 0 {
            return Err(DeliveryError::Setup("workers must be greater than 0".into()));
        }
        if config.flush_bytes == 0 || config.queue_size == 0 {
            return Err(DeliveryError::Setup(
                "flush_bytes and queue_size must be greater than 0".into(),
            ));
        }
        if config.flush_interval.is_zero() {
            return Err(DeliveryError::Setup("flush_interval must be greater than 0".into()));
        }
        let runtime = Handle::try_current()
            .map_err(|e| DeliveryError::Setup(format!("no tokio runtime: {}", e)))?;

        let stats = Arc::new(IndexerStats::default());
        let mut senders = Vec::with_capacity(config.workers);
        let mut workers = Vec::with_capacity(config.workers);

        for lane_id in 0..config.workers {
            let (tx, rx) = mpsc::channel(config.queue_size);
            let lane = Lane {
                id: lane_id,
                receiver: rx,
                transport: Arc::clone(&transport),
                flush_bytes: config.flush_bytes,
                flush_interval: config.flush_interval,
                stats: Arc::clone(&stats),
            };
            senders.push(tx);
            workers.push(runtime.spawn(lane.run()));
        }

        tracing::debug!(
            destination = %config.default_destination,
            workers = config.workers,
            flush_bytes = config.flush_bytes,
            flush_interval = ?config.flush_interval,
            "bulk indexer started"
        );

        Ok(Self {
            lanes: Mutex::new(Some(senders)),
            overflow: (0..config.workers)
                .map(|_| Arc::new(AtomicUsize::new(0)))
                .collect(),
            next_lane: AtomicUsize::new(0),
            runtime,
            workers: Mutex::new(workers),
            stats,
            default_destination: config.default_destination,
        })
    }

    pub fn default_destination(&self) -> &str {
        &self.default_destination
    }

    pub fn is_closed(&self) -> bool {
        self.lanes.lock().is_none()
    }

    fn pick_lane(&self) -> Result<(usize, mpsc::Sender<BulkItem>), DeliveryError> {
        let lanes = self.lanes.lock();
        let Some(lanes) = lanes.as_ref() else {
            return Err(DeliveryError::Closed);
        };
        let idx = self.next_lane.fetch_add(1, Ordering::Relaxed) % lanes.len();
        Ok((idx, lanes[idx].clone()))
    }

    /// Wait up to `budget` for room in a full lane
    fn wait_for_space(
        &self,
        idx: usize,
        lane: mpsc::Sender<BulkItem>,
        item: BulkItem,
        budget: Duration,
    ) -> Result<(), DeliveryError> {
        let result = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                // Blocking here would stop the lanes from draining
                self.hand_off(idx, lane, item, budget, &handle);
                return Ok(());
            }
            Ok(handle) => {
                tokio::task::block_in_place(|| handle.block_on(lane.send_timeout(item, budget)))
            }
            Err(_) => self.runtime.block_on(lane.send_timeout(item, budget)),
        };

        match result {
            Ok(()) => {
                self.stats.added.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(SendTimeoutError::Timeout(_)) => Err(DeliveryError::QueueFull(budget)),
            Err(SendTimeoutError::Closed(_)) => Err(DeliveryError::Closed),
        }
    }

    /// Queue `item` from a spawned task; later items for the lane follow it
    fn hand_off(
        &self,
        idx: usize,
        lane: mpsc::Sender<BulkItem>,
        item: BulkItem,
        budget: Duration,
        handle: &Handle,
    ) {
        self.stats.added.fetch_add(1, Ordering::Relaxed);
        let overflow = Arc::clone(&self.overflow[idx]);
        let stats = Arc::clone(&self.stats);
        overflow.fetch_add(1, Ordering::AcqRel);

        handle.spawn(async move {
            if let Err(e) = lane.send_timeout(item, budget).await {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                let reason = match e {
                    SendTimeoutError::Timeout(_) => "queue stayed full",
                    SendTimeoutError::Closed(_) => "pipe closed",
                };
                tracing::error!(lane = idx, budget = ?budget, reason, "queued record dropped");
            }
            overflow.fetch_sub(1, Ordering::AcqRel);
        });
    }
}

#[async_trait]
impl BatchDeliveryClient for BulkIndexer {
    fn add(&self, mut item: BulkItem, budget: Duration) -> Result<(), DeliveryError> {
        let (idx, lane) = self.pick_lane()?;
        if item.destination.is_empty() {
            item.destination.clone_from(&self.default_destination);
        }

        // Jumping the queue past a pending hand-off would reorder the lane
        if self.overflow[idx].load(Ordering::Acquire) == 0 {
            match lane.try_send(item) {
                Ok(()) => {
                    self.stats.added.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(TrySendError::Closed(_)) => return Err(DeliveryError::Closed),
                Err(TrySendError::Full(back)) => item = back,
            }
        }

        self.wait_for_space(idx, lane, item, budget)
    }

    async fn close(&self) -> Result<(), DeliveryError> {
        let senders = self.lanes.lock().take();
        if senders.is_none() {
            return Err(DeliveryError::Closed);
        }
        // Lanes finish once every sender, including in-flight clones, is gone
        drop(senders);

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            worker
                .await
                .map_err(|e| DeliveryError::Transport(format!("lane task failed: {}", e)))?;
        }

        Ok(())
    }

    fn stats(&self) -> DeliveryStats {
        self.stats.snapshot()
    }
}

/// One worker lane: buffer, size/time triggered flushes, final drain
struct Lane {
    id: usize,
    receiver: mpsc::Receiver<BulkItem>,
    transport: Arc<dyn BulkTransport>,
    flush_bytes: usize,
    flush_interval: Duration,
    stats: Arc<IndexerStats>,
}

impl Lane {
    async fn run(mut self) {
        let mut buffer = BytesMut::with_capacity(self.flush_bytes);
        let mut pending = 0usize;

        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                item = self.receiver.recv() => {
                    match item {
                        Some(item) => {
                            append_item(&mut buffer, &item);
                            pending += 1;
                            if buffer.len() >= self.flush_bytes {
                                self.flush(&mut buffer, &mut pending).await;
                            }
                        }
                        None => break, // All senders dropped
                    }
                }
                _ = ticker.tick() => {
                    if pending > 0 {
                        self.flush(&mut buffer, &mut pending).await;
                    }
                }
            }
        }

        if pending > 0 {
            self.flush(&mut buffer, &mut pending).await;
        }
        tracing::debug!(lane = self.id, "bulk lane finished");
    }

    async fn flush(&self, buffer: &mut BytesMut, pending: &mut usize) {
        let body = buffer.split().freeze();
        let items = std::mem::take(pending);
        self.stats.requests.fetch_add(1, Ordering::Relaxed);

        match self.transport.send(body, items).await {
            Ok(outcome) => {
                self.stats
                    .flushed
                    .fetch_add(outcome.succeeded as u64, Ordering::Relaxed);
                self.stats
                    .failed
                    .fetch_add(outcome.failed as u64, Ordering::Relaxed);
                if outcome.failed > 0 {
                    tracing::warn!(
                        lane = self.id,
                        failed = outcome.failed,
                        items,
                        "bulk request partially rejected"
                    );
                }
            }
            Err(e) => {
                self.stats.failed.fetch_add(items as u64, Ordering::Relaxed);
                tracing::error!(lane = self.id, error = %e, items, "bulk request failed");
            }
        }
    }
}

/// Append `{"index":{"_index":...}}\n{document}\n`
pub(crate) fn append_item(buffer: &mut BytesMut, item: &BulkItem) {
    let action = serde_json::json!({ "index": { "_index": item.destination } });
    buffer.put_slice(action.to_string().as_bytes());
    buffer.put_u8(b'\n');
    buffer.put_slice(&item.body);
    buffer.put_u8(b'\n');
}
