//! Time-bucketed destination names
//!
//! Produces `{base}-{bucket}` where the bucket is "now" rendered in a fixed
//! timezone with a strftime pattern. Two calls inside one bucket yield the
//! same name; crossing a boundary (hour, day, month, year, or the timezone's
//! own midnight) yields a new one.
//!
//! ```text
//! base = "app-logs", format = "%Y.%m.%d", tz = UTC
//! 2024-01-01T23:59:59Z -> app-logs-2024.01.01
//! 2024-01-02T00:00:00Z -> app-logs-2024.01.02
//! ```
//!
//! Names are never cached: callers ask again at send time.

use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::clock::{Clock, SystemClock};

/// Standard bucket patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `logs-2024.01.25` (default)
    Dot,
    /// `logs-2024-01-25`
    Dash,
    /// `logs-20240125`
    Short,
    /// `logs-2024.01.25-14`
    HourlyDot,
}

impl DateFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateFormat::Dot => "%Y.%m.%d",
            DateFormat::Dash => "%Y-%m-%d",
            DateFormat::Short => "%Y%m%d",
            DateFormat::HourlyDot => "%Y.%m.%d-%H",
        }
    }
}

/// Inputs for a [`DestinationNameGenerator`]
#[derive(Debug, Clone)]
pub struct DestinationConfig {
    /// Base name, e.g. `app-logs`
    pub base: String,
    /// strftime pattern; empty means [`DateFormat::Dot`]
    pub format: String,
    /// Bucketing timezone; `None` means UTC
    pub timezone: Option<Tz>,
}

impl DestinationConfig {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            format: String::new(),
            timezone: None,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = Some(timezone);
        self
    }
}

/// Computes the destination for "now"
#[derive(Debug, Clone)]
pub struct DestinationNameGenerator {
    base: String,
    format: String,
    timezone: Tz,
    clock: Arc<dyn Clock>,
}

impl DestinationNameGenerator {
    /// Generator reading the wall clock
    pub fn new(config: DestinationConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: DestinationConfig, clock: Arc<dyn Clock>) -> Self {
        let format = if config.format.is_empty() {
            DateFormat::Dot.as_str().to_string()
        } else {
            escape_invalid_directives(&config.format)
        };

        Self {
            base: config.base,
            format,
            timezone: config.timezone.unwrap_or(Tz::UTC),
            clock,
        }
    }

    /// Destination for the clock's current instant
    pub fn generate(&self) -> String {
        self.generate_at(self.clock.now())
    }

    /// Destination for an explicit instant
    pub fn generate_at(&self, instant: DateTime<Utc>) -> String {
        let local = instant.with_timezone(&self.timezone);
        format!("{}-{}", self.base, local.format(&self.format))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Effective pattern after defaulting and escaping
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

fn has_invalid_directive(pattern: &str) -> bool {
    StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}

/// Rewrite directives chrono cannot render as literal text.
///
/// chrono fails the whole `Display` on one bad directive; here `%Q` becomes
/// `%%Q` and renders as `%Q`.
fn escape_invalid_directives(pattern: &str) -> String {
    if !has_invalid_directive(pattern) {
        return pattern.to_string();
    }

    let mut escaped = String::with_capacity(pattern.len() + 4);
    let mut rest = pattern;
    while let Some(pos) = rest.find('%') {
        escaped.push_str(&rest[..pos]);
        let directive = directive_prefix(&rest[pos..]);
        if has_invalid_directive(directive) {
            escaped.push('%');
        }
        escaped.push_str(directive);
        rest = &rest[pos + directive.len()..];
    }
    escaped.push_str(rest);
    escaped
}

/// `%`, any padding/width/colon modifiers, then one specifier character.
fn directive_prefix(s: &str) -> &str {
    let mut end = 1;
    for (idx, c) in s.char_indices().skip(1) {
        end = idx + c.len_utf8();
        if !matches!(c, '-' | '_' | '0'..='9' | '.' | ':' | '#') {
            break;
        }
    }
    &s[..end]
}

#[cfg(test)]
#[path = "destination_test.rs"]
mod destination_test;
