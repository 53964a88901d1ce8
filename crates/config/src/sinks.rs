//! Sink configuration
//!
//! Three fixed sinks: console, rotating file, and the remote bulk indexer.
//! Each section is optional; a section's `level` raises the global minimum
//! for that sink only.

use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::logging::LogLevel;

/// Default destination name pattern (`logs-2024.01.25`)
pub const DEFAULT_INDEX_FORMAT: &str = "%Y.%m.%d";

/// Console output style
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleStyle {
    /// One JSON object per line (default)
    #[default]
    Json,
    /// `15:04:05 INFO {...}` with an optional coloured level
    Pretty,
}

/// Console stream
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleTarget {
    /// Standard output (default)
    #[default]
    Stdout,
    /// Standard error
    Stderr,
}

/// Console sink configuration
///
/// # Example
///
/// ```toml
/// [console]
/// style = "pretty"
/// color = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Default: true
    pub enabled: bool,

    /// Default: json
    pub style: ConsoleStyle,

    /// Colour the level in pretty style
    /// Default: true
    pub color: bool,

    /// Default: stdout
    pub target: ConsoleTarget,

    /// Per-sink minimum level
    pub level: Option<LogLevel>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            style: ConsoleStyle::Json,
            color: true,
            target: ConsoleTarget::Stdout,
            level: None,
        }
    }
}

/// Compression applied to rotated backups
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// No compression (default)
    #[default]
    None,
    /// LZ4 frame compression, `.lz4` suffix
    Lz4,
}

/// Rotating file sink configuration
///
/// # Example
///
/// ```toml
/// [file]
/// enabled = true
/// path = "/var/log/app/app.log"
/// max_size_mb = 10
/// max_backups = 5
/// max_age_days = 30
/// compression = "lz4"
/// flush_interval = "100ms"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Default: false
    pub enabled: bool,

    /// Active log file path
    pub path: String,

    /// Rotate once the active file would exceed this size
    /// Default: 10
    pub max_size_mb: u64,

    /// Delete backups older than this (0 = keep regardless of age)
    /// Default: 30
    pub max_age_days: u32,

    /// Keep at most this many backups (0 = unlimited)
    /// Default: 5
    pub max_backups: usize,

    /// Default: none
    pub compression: Compression,

    /// Flush buffered lines at most this long after a write (0 = every line)
    /// Default: 0
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Per-sink minimum level
    pub level: Option<LogLevel>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: String::new(),
            max_size_mb: 10,
            max_age_days: 30,
            max_backups: 5,
            compression: Compression::None,
            flush_interval: Duration::ZERO,
            level: None,
        }
    }
}

impl FileConfig {
    /// `max_size_mb` in bytes, `None` when that overflows `u64`
    pub fn max_size_bytes(&self) -> Option<u64> {
        self.max_size_mb.checked_mul(1024 * 1024)
    }
}

/// Remote bulk-indexing sink configuration
///
/// # Example
///
/// ```toml
/// [remote]
/// enabled = true
/// url = "https://localhost:9200"
/// index = "app-logs"
/// index_format = "%Y.%m.%d-%H"
/// timezone = "Asia/Tokyo"
/// insecure = true
/// flush_interval = "10s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Default: false
    pub enabled: bool,

    /// Base URL of the search backend (`{url}/_bulk` receives batches)
    pub url: String,

    /// Base index name; the time bucket is appended (`{index}-{bucket}`)
    pub index: String,

    /// strftime pattern for the time bucket
    /// Default: "%Y.%m.%d"
    pub index_format: String,

    /// IANA timezone used for bucketing
    /// Default: UTC
    pub timezone: Option<String>,

    /// Basic auth user
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<String>,

    /// Accept invalid TLS certificates
    /// Default: false
    pub insecure: bool,

    /// Parallel bulk senders
    /// Default: 2
    pub workers: usize,

    /// Per-lane buffered bytes that trigger a bulk request
    /// Default: 262144 (256KB)
    pub flush_bytes: usize,

    /// Maximum time a record waits in a lane buffer
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Per-lane queue capacity
    /// Default: 4096
    pub queue_size: usize,

    /// Budget for handing one record to the pipe
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub submit_timeout: Duration,

    /// Budget for draining the pipe on flush
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub flush_timeout: Duration,

    /// Budget for the readiness probe
    /// Default: 2s
    #[serde(with = "humantime_serde")]
    pub readiness_timeout: Duration,

    /// Refuse to start when the backend is not reachable
    /// Default: false
    pub require_ready: bool,

    /// Per-sink minimum level
    pub level: Option<LogLevel>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            index: String::new(),
            index_format: DEFAULT_INDEX_FORMAT.into(),
            timezone: None,
            username: None,
            password: None,
            insecure: false,
            workers: 2,
            flush_bytes: 256 * 1024, // 256KB
            flush_interval: Duration::from_secs(10),
            queue_size: 4096,
            submit_timeout: Duration::from_secs(5),
            flush_timeout: Duration::from_secs(30),
            readiness_timeout: Duration::from_secs(2),
            require_ready: false,
            level: None,
        }
    }
}

impl RemoteConfig {
    /// Resolve the configured timezone, `None` meaning UTC
    pub fn time_zone(&self) -> Result<Option<Tz>> {
        match self.timezone.as_deref() {
            None | Some("") => Ok(None),
            Some(name) => name.parse::<Tz>().map(Some).map_err(|_| {
                ConfigError::invalid_value(
                    "sink",
                    "remote",
                    "timezone",
                    format!("unknown zone '{}'", name),
                )
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_defaults() {
        let config = RemoteConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.index_format, DEFAULT_INDEX_FORMAT);
        assert_eq!(config.workers, 2);
        assert_eq!(config.flush_bytes, 256 * 1024);
        assert_eq!(config.flush_interval, Duration::from_secs(10));
        assert_eq!(config.submit_timeout, Duration::from_secs(5));
        assert_eq!(config.flush_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_remote_durations_parse_humantime() {
        let config: RemoteConfig = toml::from_str(
            r#"
flush_interval = "500ms"
flush_timeout = "1m"
"#,
        )
        .unwrap();
        assert_eq!(config.flush_interval, Duration::from_millis(500));
        assert_eq!(config.flush_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_time_zone_resolution() {
        let mut config = RemoteConfig::default();
        assert!(config.time_zone().unwrap().is_none());

        config.timezone = Some("Asia/Tokyo".into());
        assert_eq!(config.time_zone().unwrap(), Some(chrono_tz::Asia::Tokyo));

        config.timezone = Some("Mars/Olympus".into());
        assert!(config.time_zone().is_err());
    }

    #[test]
    fn test_file_defaults() {
        let config = FileConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.max_size_mb, 10);
        assert_eq!(config.max_backups, 5);
        assert_eq!(config.max_age_days, 30);
        assert_eq!(config.compression, Compression::None);
        assert_eq!(config.flush_interval, Duration::ZERO);
        assert_eq!(config.max_size_bytes(), Some(10 * 1024 * 1024));
    }

    #[test]
    fn test_file_flush_interval_parse() {
        let config: FileConfig = toml::from_str(r#"flush_interval = "100ms""#).unwrap();
        assert_eq!(config.flush_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_file_max_size_overflow() {
        let config = FileConfig {
            max_size_mb: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.max_size_bytes(), None);
    }

    #[test]
    fn test_console_style_parse() {
        let config: ConsoleConfig = toml::from_str(
            r#"
style = "pretty"
target = "stderr"
level = "warn"
"#,
        )
        .unwrap();
        assert_eq!(config.style, ConsoleStyle::Pretty);
        assert_eq!(config.target, ConsoleTarget::Stderr);
        assert_eq!(config.level, Some(LogLevel::Warn));
    }
}
