//! fanlog - Sinks
//!
//! Fan-out log core: one encoded record, many sinks.
//!
//! # Architecture
//!
//! ```text
//!                         +--> [ConsoleSink]
//! [LogRecord] --> [FanOut] --> [RotatingFileSink]
//!                         +--> [RemoteSink] --> [RemoteWriter] --> [BulkIndexer] --> [BulkTransport]
//!                                   ^
//!                                   | swapped after every flush_remote()
//!                             [RemoteSinkFactory]
//! ```
//!
//! # Available Sinks
//!
//! | Sink | Purpose | Buffered |
//! |------|---------|----------|
//! | `console` | stdout/stderr, JSON or pretty | No |
//! | `file` | size-rotating file with backups | Yes (64KB) |
//! | `remote` | bulk indexing into time-bucketed destinations | Yes (256KB / 10s per lane) |
//!
//! # Example
//!
//! ```ignore
//! use fanlog_sinks::{ConsoleSink, FanOut, Level};
//! use fanlog_config::ConsoleStyle;
//! use std::sync::Arc;
//!
//! let fanout = FanOut::builder()
//!     .sink(Arc::new(ConsoleSink::stdout(ConsoleStyle::Json, Level::Info)))
//!     .remote(factory)
//!     .build()?;
//!
//! fanout.write(&record)?;
//! fanout.flush_remote(Duration::from_secs(30)).await?;
//! ```

// =============================================================================
// Records and time
// =============================================================================

/// Levels and encoded records
pub mod record;

/// Injectable time source
pub mod clock;

/// Time-bucketed destination names
pub mod destination;

// =============================================================================
// Sink implementations
// =============================================================================

/// Console sink - JSON or pretty lines on stdout/stderr
pub mod console;

/// Rotating file sink - size-based rotation with backups
pub mod file;

/// Remote sink - buffered writer and its factory
pub mod remote;

// =============================================================================
// Delivery and fan-out
// =============================================================================

/// Batch delivery pipe (worker lanes over a bulk transport)
pub mod delivery;

/// HTTP bulk transport and readiness probe
pub mod http;

/// Fan-out core and flush-and-rotate protocol
pub mod fanout;

/// Shared utilities
pub mod util;

// =============================================================================
// Common types
// =============================================================================

mod common;

pub use clock::{Clock, ManualClock, SystemClock};
pub use common::{MetricsSnapshot, Sink, SinkError, SinkMetrics};
pub use console::ConsoleSink;
pub use delivery::{
    BatchDeliveryClient, BulkIndexer, BulkIndexerConfig, BulkItem, BulkOutcome, BulkTransport,
    DeliveryError, DeliveryStats,
};
pub use destination::{DateFormat, DestinationConfig, DestinationNameGenerator};
pub use fanout::{FanOut, FanOutBuildError, FanOutBuilder, FanOutError, RotationError, SinkFailure};
pub use file::{RotatingFileSink, RotationPolicy};
pub use http::{HttpBulkTransport, is_ready};
pub use record::{Level, LogRecord};
pub use remote::{
    DEFAULT_FLUSH_TIMEOUT, DEFAULT_SUBMIT_TIMEOUT, RemoteSettings, RemoteSink, RemoteSinkFactory,
    RemoteWriter, WriterError,
};
