//! `tracing` integration
//!
//! [`FanOutLayer`] turns tracing events into records so an application can
//! keep using `tracing::info!` and friends:
//!
//! ```ignore
//! use tracing_subscriber::prelude::*;
//!
//! tracing_subscriber::registry()
//!     .with(FanOutLayer::new(logger.clone()))
//!     .init();
//!
//! tracing::info!(port = 8080, "listening");
//! // {"ts":"...","level":"INFO","msg":"listening","port":8080,"target":"app"}
//! ```
//!
//! Events emitted by fanlog's own crates are skipped so sink diagnostics
//! never loop back into the sinks.

use serde_json::{Map, Number, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::Logger;
use fanlog_sinks::Level;

/// Target prefix of events that are never fanned out
const INTERNAL_TARGET_PREFIX: &str = "fanlog";

/// Layer forwarding tracing events to a [`Logger`]
#[derive(Debug, Clone)]
pub struct FanOutLayer {
    logger: Logger,
}

impl FanOutLayer {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S: Subscriber> Layer<S> for FanOutLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(INTERNAL_TARGET_PREFIX) {
            return;
        }

        let level = Level::from(*metadata.level());
        if !self.logger.enabled(level) {
            return;
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        visitor
            .fields
            .insert("target".into(), Value::String(metadata.target().to_string()));

        self.logger
            .log_map(level, &visitor.message.unwrap_or_default(), visitor.fields);
    }
}

/// Collects event fields; `message` becomes the record's `msg`
#[derive(Default)]
struct JsonVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl JsonVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for JsonVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value).map_or(Value::Null, Value::Number);
        self.insert(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::String(format!("{:?}", value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fanlog_sinks::{FanOut, LogRecord, Sink, SinkError};
    use parking_lot::Mutex;
    use tracing_subscriber::prelude::*;

    #[derive(Default)]
    struct Capture {
        records: Mutex<Vec<LogRecord>>,
    }

    impl Sink for Capture {
        fn name(&self) -> &str {
            "capture"
        }

        fn accepts(&self, level: Level) -> bool {
            level >= Level::Info
        }

        fn write(&self, record: &LogRecord) -> Result<usize, SinkError> {
            self.records.lock().push(record.clone());
            Ok(record.len())
        }
    }

    fn capture() -> (Arc<Capture>, Logger) {
        let sink = Arc::new(Capture::default());
        let logger = Logger::new(FanOut::builder().sink(sink.clone()).build().unwrap());
        (sink, logger)
    }

    #[test]
    fn test_event_becomes_record() {
        let (sink, logger) = capture();
        let subscriber = tracing_subscriber::registry().with(FanOutLayer::new(logger));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "app::http", port = 8080, tls = true, "listening");
        });

        let records = sink.records.lock();
        assert_eq!(records.len(), 1);
        let json: Value = serde_json::from_slice(records[0].payload()).unwrap();
        assert_eq!(json["msg"], "listening");
        assert_eq!(json["level"], "INFO");
        assert_eq!(json["port"], 8080);
        assert_eq!(json["tls"], true);
        assert_eq!(json["target"], "app::http");
    }

    #[test]
    fn test_levels_below_sinks_skipped() {
        let (sink, logger) = capture();
        let subscriber = tracing_subscriber::registry().with(FanOutLayer::new(logger));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "app", "noise");
            tracing::warn!(target: "app", "kept");
        });

        assert_eq!(sink.records.lock().len(), 1);
    }

    #[test]
    fn test_internal_events_skipped() {
        let (sink, logger) = capture();
        let subscriber = tracing_subscriber::registry().with(FanOutLayer::new(logger));

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "fanlog_sinks::fanout", "sink write failed");
        });

        assert!(sink.records.lock().is_empty());
    }
}
