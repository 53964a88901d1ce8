//! Common types and utilities for sinks
//!
//! The `Sink` trait every fan-out slot implements, shared metrics and errors.

use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::record::{Level, LogRecord};
use crate::remote::WriterError;

/// A destination for encoded records
///
/// Sinks filter on their own minimum level; the fan-out asks `accepts`
/// before every `write` and never filters on its own.
pub trait Sink: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Whether a record at `level` should be written here
    fn accepts(&self, level: Level) -> bool;

    /// Write one record, returning the bytes accepted
    fn write(&self, record: &LogRecord) -> Result<usize, SinkError>;

    /// Push buffered bytes to the underlying stream
    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Point-in-time counters
    fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot::default()
    }
}

/// Metrics shared by all sink types
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Records successfully written
    pub records_written: AtomicU64,

    /// Bytes successfully written
    pub bytes_written: AtomicU64,

    /// Write errors encountered
    pub write_errors: AtomicU64,

    /// Flush operations performed
    pub flush_count: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            records_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
        }
    }

    /// Record a successfully written record
    #[inline]
    pub fn record_written(&self, bytes: u64) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a write error
    #[inline]
    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a flush operation
    #[inline]
    pub fn flush(&self) {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_written: self.records_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            flush_count: self.flush_count.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of sink metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_written: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
    pub flush_count: u64,
}

/// Common sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    /// Sink (or its delivery pipe) could not be built
    #[error("failed to create sink: {0}")]
    Creation(String),

    /// Failed to write data
    #[error("write failed: {0}")]
    Write(String),

    /// Failed to flush data
    #[error("flush failed: {0}")]
    Flush(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote writer rejected or failed the record
    #[error("remote: {0}")]
    Remote(#[from] WriterError),
}

impl SinkError {
    /// Create a creation error
    pub fn creation(msg: impl Into<String>) -> Self {
        Self::Creation(msg.into())
    }

    /// Create a write error
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    /// Create a flush error
    pub fn flush(msg: impl Into<String>) -> Self {
        Self::Flush(msg.into())
    }
}

#[cfg(test)]
#[path = "common_test.rs"]
mod common_test;
