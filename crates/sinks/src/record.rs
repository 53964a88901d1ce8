//! Log records
//!
//! A record is encoded exactly once, as a single JSON object, and the same
//! bytes are handed to every sink.
//!
//! ```text
//! {"ts":"2024-01-25T12:00:00.000Z","level":"INFO","msg":"started","port":8080}
//! ```

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use fanlog_config::LogLevel;
use serde_json::{Map, Value};

/// Keys owned by the encoder; fields with these names are dropped.
const RESERVED_KEYS: [&str; 3] = ["ts", "level", "msg"];

/// Record severity, ordered from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Upper-case name as written into records
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            other => Err(format!("unknown level '{}'", other)),
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::Trace,
            LogLevel::Debug => Level::Debug,
            LogLevel::Info => Level::Info,
            LogLevel::Warn => Level::Warn,
            LogLevel::Error => Level::Error,
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// One encoded log entry
///
/// Cheap to clone: the payload is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    level: Level,
    timestamp: DateTime<Utc>,
    payload: Bytes,
}

impl LogRecord {
    /// Wrap an already-encoded payload
    pub fn new(level: Level, timestamp: DateTime<Utc>, payload: impl Into<Bytes>) -> Self {
        Self {
            level,
            timestamp,
            payload: payload.into(),
        }
    }

    /// Encode message and fields into a JSON object record
    pub fn encode(
        level: Level,
        timestamp: DateTime<Utc>,
        message: &str,
        fields: Map<String, Value>,
    ) -> Self {
        let mut object = Map::with_capacity(fields.len() + RESERVED_KEYS.len());
        object.insert(
            "ts".into(),
            Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        object.insert("level".into(), Value::String(level.as_str().into()));
        object.insert("msg".into(), Value::String(message.into()));
        for (key, value) in fields {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                object.insert(key, value);
            }
        }

        let payload = Value::Object(object).to_string().into_bytes();
        Self::new(level, timestamp, payload)
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Encoded bytes, without a trailing newline
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("INFO".parse::<Level>().unwrap(), Level::Info);
        assert_eq!("warning".parse::<Level>().unwrap(), Level::Warn);
        assert!("loud".parse::<Level>().is_err());
    }

    #[test]
    fn test_level_from_config() {
        assert_eq!(Level::from(LogLevel::Debug), Level::Debug);
        assert_eq!(Level::from(LogLevel::Error), Level::Error);
    }

    #[test]
    fn test_encode_shape() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 25, 12, 0, 0).unwrap();
        let mut fields = Map::new();
        fields.insert("port".into(), json!(8080));
        fields.insert("msg".into(), json!("shadowed"));

        let record = LogRecord::encode(Level::Info, ts, "started", fields);
        let value: Value = serde_json::from_slice(record.payload()).unwrap();

        assert_eq!(value["ts"], "2024-01-25T12:00:00.000Z");
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["msg"], "started");
        assert_eq!(value["port"], 8080);
        assert_eq!(record.level(), Level::Info);
        assert_eq!(record.timestamp(), ts);
    }

    #[test]
    fn test_encode_key_order() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 25, 12, 0, 0).unwrap();
        let mut fields = Map::new();
        fields.insert("port".into(), json!(8080));
        fields.insert("app".into(), json!("api"));

        let record = LogRecord::encode(Level::Info, ts, "started", fields);

        assert_eq!(
            std::str::from_utf8(record.payload()).unwrap(),
            r#"{"ts":"2024-01-25T12:00:00.000Z","level":"INFO","msg":"started","port":8080,"app":"api"}"#
        );
    }
}
