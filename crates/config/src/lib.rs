//! fanlog Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use fanlog_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[console]\nstyle = \"pretty\"").unwrap();
//! assert!(config.console.enabled);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [file]
//! enabled = true
//! path = "logs/app.log"
//!
//! [remote]
//! enabled = true
//! url = "http://localhost:9200"
//! index = "app-logs"
//! ```

mod error;
mod logging;
mod sinks;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogLevel};
pub use sinks::{
    Compression, ConsoleConfig, ConsoleStyle, ConsoleTarget, DEFAULT_INDEX_FORMAT, FileConfig,
    RemoteConfig,
};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults. With no file at all the
/// logger writes JSON lines to stdout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Levels
    pub log: LogConfig,

    /// Console sink
    pub console: ConsoleConfig,

    /// Rotating file sink
    pub file: FileConfig,

    /// Remote bulk-indexing sink
    pub remote: RemoteConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML, or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// Effective minimum level for a sink with an optional override.
    ///
    /// A sink can only be stricter than the global level, never looser.
    pub fn effective_level(&self, sink_level: Option<LogLevel>) -> LogLevel {
        match sink_level {
            Some(level) => level.max(self.log.level),
            None => self.log.level,
        }
    }

    /// Names of the enabled sinks in fan-out order
    pub fn enabled_sinks(&self) -> Vec<&'static str> {
        let mut sinks = Vec::new();
        if self.console.enabled {
            sinks.push("console");
        }
        if self.file.enabled {
            sinks.push("file");
        }
        if self.remote.enabled {
            sinks.push("remote");
        }
        sinks
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert!(config.console.enabled);
        assert!(!config.file.enabled);
        assert!(!config.remote.enabled);
        assert_eq!(config.enabled_sinks(), vec!["console"]);
    }

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[log]
level = "debug"
diagnostics = "info"

[console]
style = "pretty"
color = false

[file]
enabled = true
path = "logs/app.log"
max_size_mb = 20
max_backups = 3
compression = "lz4"

[remote]
enabled = true
url = "https://search.internal:9200"
index = "app-logs"
index_format = "%Y.%m.%d-%H"
timezone = "Asia/Tokyo"
username = "admin"
password = "secret"
insecure = true
flush_interval = "2s"
"#;
        let config = Config::from_str(toml).unwrap();

        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.console.style, ConsoleStyle::Pretty);
        assert!(!config.console.color);
        assert_eq!(config.file.max_size_mb, 20);
        assert_eq!(config.file.compression, Compression::Lz4);
        assert_eq!(config.remote.index, "app-logs");
        assert_eq!(config.remote.index_format, "%Y.%m.%d-%H");
        assert!(config.remote.insecure);
        assert_eq!(config.remote.flush_interval, std::time::Duration::from_secs(2));
        assert_eq!(config.enabled_sinks(), vec!["console", "file", "remote"]);
    }

    #[test]
    fn test_effective_level_never_looser_than_global() {
        let config = Config::from_str("[log]\nlevel = \"warn\"").unwrap();
        assert_eq!(config.effective_level(None), LogLevel::Warn);
        assert_eq!(config.effective_level(Some(LogLevel::Debug)), LogLevel::Warn);
        assert_eq!(config.effective_level(Some(LogLevel::Error)), LogLevel::Error);
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_str("invalid { toml");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[console]\nstyle = \"pretty\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.console.style, ConsoleStyle::Pretty);
    }

    #[test]
    fn test_from_missing_file() {
        let result = Config::from_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }
}
