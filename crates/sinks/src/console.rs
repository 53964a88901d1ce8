//! Console sink
//!
//! Writes one line per record to stdout or stderr.
//!
//! # Styles
//!
//! - `json`: the encoded record as-is
//! - `pretty`: `15:04:05 INFO {"msg":...}` with the level optionally coloured
//!
//! # Example Output (pretty)
//!
//! ```text
//! 09:12:44 INFO  {"ts":"2024-01-25T09:12:44.120Z","level":"INFO","msg":"started"}
//! 09:12:45 ERROR {"ts":"2024-01-25T09:12:45.003Z","level":"ERROR","msg":"boom"}
//! ```

use std::io::{self, Write};

use fanlog_config::{ConsoleConfig, ConsoleStyle, ConsoleTarget};
use owo_colors::{OwoColorize, Style};
use parking_lot::Mutex;

use crate::common::{MetricsSnapshot, Sink, SinkError, SinkMetrics};
use crate::record::{Level, LogRecord};

/// Get style for log level
fn level_style(level: Level, enabled: bool) -> Style {
    if !enabled {
        return Style::new();
    }
    match level {
        Level::Error => Style::new().red(),
        Level::Warn => Style::new().yellow(),
        Level::Info => Style::new().green(),
        Level::Debug => Style::new(),
        Level::Trace => Style::new().dimmed(),
    }
}

/// Line-oriented console sink
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
    style: ConsoleStyle,
    color: bool,
    level: Level,
    metrics: SinkMetrics,
}

impl ConsoleSink {
    /// Sink over an arbitrary writer
    pub fn with_writer(out: Box<dyn Write + Send>, style: ConsoleStyle, level: Level) -> Self {
        Self {
            out: Mutex::new(out),
            style,
            color: false,
            level,
            metrics: SinkMetrics::new(),
        }
    }

    pub fn stdout(style: ConsoleStyle, level: Level) -> Self {
        Self::with_writer(Box::new(io::stdout()), style, level)
    }

    pub fn stderr(style: ConsoleStyle, level: Level) -> Self {
        Self::with_writer(Box::new(io::stderr()), style, level)
    }

    /// Sink for a `[console]` section at the given effective level
    pub fn from_config(config: &ConsoleConfig, level: Level) -> Self {
        let sink = match config.target {
            ConsoleTarget::Stdout => Self::stdout(config.style, level),
            ConsoleTarget::Stderr => Self::stderr(config.style, level),
        };
        sink.with_color(config.color)
    }

    /// Colour the level in pretty style
    #[must_use]
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    fn render(&self, record: &LogRecord) -> Vec<u8> {
        let payload = trim_newline(record.payload());
        let mut line = Vec::with_capacity(payload.len() + 16);

        if self.style == ConsoleStyle::Pretty {
            let level = record.level();
            let prefix = format!(
                "{} {:<5} ",
                record.timestamp().format("%H:%M:%S"),
                level.as_str().style(level_style(level, self.color))
            );
            line.extend_from_slice(prefix.as_bytes());
        }

        line.extend_from_slice(payload);
        line.push(b'\n');
        line
    }
}

fn trim_newline(payload: &[u8]) -> &[u8] {
    payload.strip_suffix(b"\n").unwrap_or(payload)
}

impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn accepts(&self, level: Level) -> bool {
        level >= self.level
    }

    fn write(&self, record: &LogRecord) -> Result<usize, SinkError> {
        let line = self.render(record);
        let result = self.out.lock().write_all(&line);

        match result {
            Ok(()) => {
                self.metrics.record_written(line.len() as u64);
                Ok(line.len())
            }
            Err(e) => {
                self.metrics.write_error();
                Err(SinkError::Io(e))
            }
        }
    }

    fn flush(&self) -> Result<(), SinkError> {
        self.out.lock().flush()?;
        self.metrics.flush();
        Ok(())
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    /// Writer sharing its buffer with the test
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn record(level: Level) -> LogRecord {
        let ts = Utc.with_ymd_and_hms(2024, 1, 25, 9, 12, 44).unwrap();
        LogRecord::new(level, ts, "{\"msg\":\"started\"}\n")
    }

    #[test]
    fn test_json_style_writes_payload_line() {
        let buf = SharedBuf::default();
        let sink = ConsoleSink::with_writer(Box::new(buf.clone()), ConsoleStyle::Json, Level::Info);

        sink.write(&record(Level::Info)).unwrap();
        sink.write(&record(Level::Warn)).unwrap();

        assert_eq!(buf.text(), "{\"msg\":\"started\"}\n{\"msg\":\"started\"}\n");
        assert_eq!(sink.metrics().records_written, 2);
    }

    #[test]
    fn test_pretty_style_prefix() {
        let buf = SharedBuf::default();
        let sink =
            ConsoleSink::with_writer(Box::new(buf.clone()), ConsoleStyle::Pretty, Level::Info);

        sink.write(&record(Level::Info)).unwrap();

        assert_eq!(buf.text(), "09:12:44 INFO  {\"msg\":\"started\"}\n");
    }

    #[test]
    fn test_pretty_style_colors_level() {
        let buf = SharedBuf::default();
        let sink =
            ConsoleSink::with_writer(Box::new(buf.clone()), ConsoleStyle::Pretty, Level::Info)
                .with_color(true);

        sink.write(&record(Level::Error)).unwrap();

        let text = buf.text();
        assert!(text.contains("\u{1b}["));
        assert!(text.contains("ERROR"));
    }

    #[test]
    fn test_level_filter() {
        let sink = ConsoleSink::with_writer(Box::new(io::sink()), ConsoleStyle::Json, Level::Warn);
        assert!(!sink.accepts(Level::Info));
        assert!(sink.accepts(Level::Warn));
    }

    #[test]
    fn test_write_error_counted() {
        let sink = ConsoleSink::with_writer(Box::new(BrokenPipe), ConsoleStyle::Json, Level::Info);

        assert!(matches!(sink.write(&record(Level::Info)), Err(SinkError::Io(_))));
        assert_eq!(sink.metrics().write_errors, 1);
    }
}
