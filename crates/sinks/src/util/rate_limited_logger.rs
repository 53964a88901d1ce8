//! Rate-limited sink failure reporting
//!
//! A sink that fails every write (disk full, backend down) would otherwise
//! emit one diagnostic per log record. Each fan-out slot owns one of these;
//! it reports at most once per interval and carries the number of failures
//! swallowed since the previous report.
//!
//! # Example
//!
//! ```
//! use fanlog_sinks::util::RateLimitedLogger;
//! use std::time::Duration;
//!
//! let logger = RateLimitedLogger::new("file", Duration::from_secs(10));
//! let err = std::io::Error::other("disk full");
//!
//! assert!(logger.report(&err));
//! assert!(!logger.report(&err));
//! assert_eq!(logger.total_error_count(), 2);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval between reports for one sink
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Per-sink failure reporter
pub struct RateLimitedLogger {
    /// Sink name attached to every report
    sink: String,

    /// Minimum interval between reports
    min_interval: Duration,

    /// Last time we reported
    last_log_time: Mutex<Option<Instant>>,

    /// Failures since last report
    error_count: AtomicU64,

    /// Failures ever recorded
    total_errors: AtomicU64,
}

impl RateLimitedLogger {
    pub fn new(sink: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            sink: sink.into(),
            min_interval,
            last_log_time: Mutex::new(None),
            error_count: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
        }
    }

    /// Reporter with the default 10 second interval
    pub fn for_sink(sink: impl Into<String>) -> Self {
        Self::new(sink, DEFAULT_LOG_INTERVAL)
    }

    /// Count a failure and report it if the interval has passed
    ///
    /// Returns true if the failure was reported, false if it was suppressed.
    pub fn report(&self, error: &dyn std::fmt::Display) -> bool {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        self.total_errors.fetch_add(1, Ordering::Relaxed);

        let should_log = {
            let mut last_time = self.last_log_time.lock();
            let now = Instant::now();

            match *last_time {
                Some(last) if now.duration_since(last) < self.min_interval => false,
                _ => {
                    *last_time = Some(now);
                    true
                }
            }
        };

        if !should_log {
            return false;
        }

        let count = self.error_count.swap(0, Ordering::Relaxed);
        let total = self.total_errors.load(Ordering::Relaxed);

        if count > 1 {
            tracing::error!(
                sink = %self.sink,
                error = %error,
                suppressed_count = count - 1,
                total_errors = total,
                "sink write failed (rate-limited)"
            );
        } else {
            tracing::error!(
                sink = %self.sink,
                error = %error,
                total_errors = total,
                "sink write failed"
            );
        }
        true
    }

    pub fn sink(&self) -> &str {
        &self.sink
    }

    /// Failures since the last report
    pub fn pending_error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn total_error_count(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for RateLimitedLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedLogger")
            .field("sink", &self.sink)
            .field("min_interval", &self.min_interval)
            .field("total_errors", &self.total_error_count())
            .finish()
    }
}
