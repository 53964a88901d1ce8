//! Tests for the logger facade

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use fanlog_config::Config;
use fanlog_sinks::{
    BulkOutcome, BulkTransport, DeliveryError, FanOut, Level, LogRecord, ManualClock, Sink,
    SinkError,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::TempDir;

use super::{FlushOutcome, Logger, LoggerError};

// ============================================================================
// Test doubles
// ============================================================================

struct MemorySink {
    level: Level,
    fail: bool,
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    fn new(level: Level) -> Arc<Self> {
        Arc::new(Self {
            level,
            fail: false,
            records: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            level: Level::Trace,
            fail: true,
            records: Mutex::new(Vec::new()),
        })
    }

    fn json(&self, idx: usize) -> Value {
        serde_json::from_slice(self.records.lock()[idx].payload()).unwrap()
    }

    fn count(&self) -> usize {
        self.records.lock().len()
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &str {
        if self.fail { "broken" } else { "memory" }
    }

    fn accepts(&self, level: Level) -> bool {
        level >= self.level
    }

    fn write(&self, record: &LogRecord) -> Result<usize, SinkError> {
        if self.fail {
            return Err(SinkError::write("unavailable"));
        }
        self.records.lock().push(record.clone());
        Ok(record.len())
    }
}

#[derive(Default)]
struct MemoryTransport {
    bodies: Mutex<Vec<String>>,
    stall: Option<Duration>,
}

impl MemoryTransport {
    fn text(&self) -> String {
        self.bodies.lock().concat()
    }
}

#[async_trait]
impl BulkTransport for MemoryTransport {
    async fn send(&self, body: Bytes, items: usize) -> Result<BulkOutcome, DeliveryError> {
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        self.bodies
            .lock()
            .push(String::from_utf8_lossy(&body).into_owned());
        Ok(BulkOutcome::all_succeeded(items))
    }
}

fn file_and_remote_config(dir: &TempDir) -> Config {
    let toml = format!(
        r#"
[console]
enabled = false

[file]
enabled = true
path = "{}"

[remote]
enabled = true
url = "http://localhost:9200"
index = "svc-logs"
"#,
        dir.path().join("svc.log").display()
    );
    Config::from_str(&toml).unwrap()
}

// ============================================================================
// Logging
// ============================================================================

#[test]
fn test_log_encodes_fields() {
    let sink = MemorySink::new(Level::Trace);
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 25, 12, 0, 0).unwrap(),
    ));
    let logger = Logger::with_clock(FanOut::builder().sink(sink.clone()).build().unwrap(), clock);

    logger.info(
        "request handled",
        &[("status", json!(200)), ("msg", json!("dropped"))],
    );

    assert_eq!(
        sink.json(0),
        json!({
            "ts": "2024-01-25T12:00:00.000Z",
            "level": "INFO",
            "msg": "request handled",
            "status": 200,
        })
    );
}

#[test]
fn test_levels_below_every_sink_are_skipped() {
    let sink = MemorySink::new(Level::Warn);
    let logger = Logger::new(FanOut::builder().sink(sink.clone()).build().unwrap());

    assert!(!logger.enabled(Level::Info));
    assert!(logger.enabled(Level::Error));

    logger.debug("quiet", &[]);
    logger.info("quiet", &[]);
    logger.warn("loud", &[]);
    logger.error("louder", &[]);

    assert_eq!(sink.count(), 2);
    assert_eq!(sink.json(1)["level"], "ERROR");
}

#[test]
fn test_sink_failure_does_not_reach_caller() {
    let good = MemorySink::new(Level::Trace);
    let logger = Logger::new(
        FanOut::builder()
            .sink(MemorySink::failing())
            .sink(good.clone())
            .build()
            .unwrap(),
    );

    logger.error("still delivered", &[]);
    assert_eq!(good.count(), 1);
}

#[test]
fn test_clones_share_sinks() {
    let sink = MemorySink::new(Level::Trace);
    let logger = Logger::new(FanOut::builder().sink(sink.clone()).build().unwrap());
    let clone = logger.clone();

    logger.info("a", &[]);
    clone.info("b", &[]);

    assert_eq!(sink.count(), 2);
}

// ============================================================================
// Construction from config
// ============================================================================

#[tokio::test]
async fn test_from_config_with_transport_builds_file_and_remote() {
    let dir = TempDir::new().unwrap();
    let config = file_and_remote_config(&dir);
    let transport = Arc::new(MemoryTransport::default());

    let logger = Logger::from_config_with_transport(&config, transport.clone()).unwrap();
    assert_eq!(logger.fanout().sink_names(), vec!["file", "remote"]);

    logger.info("shipped", &[("user", json!("ada"))]);
    logger.flush(Duration::from_secs(5)).await.unwrap();

    let file = std::fs::read_to_string(dir.path().join("svc.log")).unwrap();
    assert!(file.contains("\"msg\":\"shipped\""));

    let bulk = transport.text();
    assert!(bulk.contains("\"_index\":\"svc-logs-"));
    assert!(bulk.contains("\"user\":\"ada\""));
}

#[tokio::test]
async fn test_from_config_without_remote() {
    let dir = TempDir::new().unwrap();
    let toml = format!(
        "[console]\nenabled = false\n\n[file]\nenabled = true\npath = \"{}\"\n",
        dir.path().join("a.log").display()
    );
    let config = Config::from_str(&toml).unwrap();

    let logger = Logger::from_config(&config).await.unwrap();
    assert_eq!(logger.fanout().sink_names(), vec!["file"]);
    assert!(!logger.fanout().has_remote());
}

#[tokio::test]
async fn test_from_config_rejects_no_sinks() {
    let mut config = Config::default();
    config.console.enabled = false;

    let result = Logger::from_config(&config).await;
    assert!(matches!(result, Err(LoggerError::Config(_))));
}

#[tokio::test]
async fn test_from_config_requires_ready_backend() {
    let config = Config::from_str(
        r#"
[remote]
enabled = true
url = "http://127.0.0.1:9"
index = "svc-logs"
require_ready = true
readiness_timeout = "200ms"
"#,
    )
    .unwrap();

    let result = Logger::from_config(&config).await;
    assert!(matches!(result, Err(LoggerError::NotReady(_))));
}

// ============================================================================
// Flush
// ============================================================================

#[tokio::test]
async fn test_flush_with_timeout_local_only() {
    let logger = Logger::new(
        FanOut::builder()
            .sink(MemorySink::new(Level::Trace))
            .build()
            .unwrap(),
    );

    let outcome = logger.flush_with_timeout(Duration::from_secs(1)).await;
    assert!(outcome.is_flushed());
}

#[tokio::test]
async fn test_flush_rotates_remote_writer() {
    let dir = TempDir::new().unwrap();
    let config = file_and_remote_config(&dir);
    let logger =
        Logger::from_config_with_transport(&config, Arc::new(MemoryTransport::default())).unwrap();

    let before = logger.fanout().remote_writer().unwrap();
    assert!(logger.flush_with_timeout(Duration::from_secs(5)).await.is_flushed());
    let after = logger.fanout().remote_writer().unwrap();

    assert!(before.is_closed());
    assert!(!after.is_closed());

    // Writes keep flowing to the replacement
    logger.info("after rotation", &[]);
    assert_eq!(after.stats().added, 1);
}

#[tokio::test]
async fn test_flush_with_timeout_shorter_than_flush() {
    let dir = TempDir::new().unwrap();
    let config = file_and_remote_config(&dir);
    let transport = Arc::new(MemoryTransport {
        stall: Some(Duration::from_secs(10)),
        ..Default::default()
    });
    let logger = Logger::from_config_with_transport(&config, transport).unwrap();

    logger.info("slow", &[]);
    let outcome = logger.flush_with_timeout(Duration::from_millis(50)).await;

    assert!(matches!(outcome, FlushOutcome::TimedOut));
    // The logger is still usable after giving up on the flush
    logger.info("after timeout", &[]);
}
