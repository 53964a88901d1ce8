//! Tests for destination name generation

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Asia::Tokyo;

use crate::clock::ManualClock;
use crate::destination::{DateFormat, DestinationConfig, DestinationNameGenerator};

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn generator(config: DestinationConfig, now: DateTime<Utc>) -> (DestinationNameGenerator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now));
    let generator = DestinationNameGenerator::with_clock(config, clock.clone());
    (generator, clock)
}

// ============================================================================
// Formats
// ============================================================================

#[test]
fn test_preset_formats() {
    let now = at(2024, 1, 25, 12, 0, 0);
    let cases = [
        ("logs", DateFormat::Dot, "logs-2024.01.25"),
        ("app-logs", DateFormat::Dash, "app-logs-2024-01-25"),
        ("metrics", DateFormat::Short, "metrics-20240125"),
        ("hourly-logs", DateFormat::HourlyDot, "hourly-logs-2024.01.25-12"),
    ];

    for (base, format, expected) in cases {
        let config = DestinationConfig::new(base).with_format(format.as_str());
        let (generator, _) = generator(config, now);
        assert_eq!(generator.generate(), expected, "format {:?}", format);
    }
}

#[test]
fn test_custom_hourly_format() {
    let config = DestinationConfig::new("hourly-logs").with_format("%Y-%m-%d-%H");
    let (generator, _) = generator(config, at(2024, 1, 25, 14, 30, 0));
    assert_eq!(generator.generate(), "hourly-logs-2024-01-25-14");
}

#[test]
fn test_empty_format_defaults_to_dot() {
    let (generator, _) = generator(DestinationConfig::new("default-logs"), at(2024, 1, 25, 12, 0, 0));
    assert_eq!(generator.format(), "%Y.%m.%d");
    assert_eq!(generator.generate(), "default-logs-2024.01.25");
}

#[test]
fn test_missing_timezone_defaults_to_utc() {
    let config = DestinationConfig::new("utc-logs").with_format(DateFormat::Dot.as_str());
    let (generator, _) = generator(config, at(2024, 1, 25, 23, 30, 0));
    assert_eq!(generator.timezone(), chrono_tz::Tz::UTC);
    assert_eq!(generator.generate(), "utc-logs-2024.01.25");
}

#[test]
fn test_invalid_directive_rendered_literally() {
    let config = DestinationConfig::new("odd").with_format("%Y.%Q.%m");
    let (generator, _) = generator(config, at(2024, 3, 5, 0, 0, 0));
    assert_eq!(generator.generate(), "odd-2024.%Q.03");
}

#[test]
fn test_trailing_percent_rendered_literally() {
    let config = DestinationConfig::new("odd").with_format("%Y%");
    let (generator, _) = generator(config, at(2024, 3, 5, 0, 0, 0));
    assert_eq!(generator.generate(), "odd-2024%");
}

#[test]
fn test_plain_text_pattern_passes_through() {
    let config = DestinationConfig::new("static").with_format("current");
    let (generator, _) = generator(config, at(2024, 3, 5, 0, 0, 0));
    assert_eq!(generator.generate(), "static-current");
}

// ============================================================================
// Determinism and rotation
// ============================================================================

#[test]
fn test_same_instant_same_name() {
    let (generator, _) = generator(DestinationConfig::new("logs"), at(2024, 6, 1, 8, 0, 0));
    assert_eq!(generator.generate(), generator.generate());
    assert_eq!(generator.generate(), generator.generate_at(at(2024, 6, 1, 8, 0, 0)));
}

#[test]
fn test_daily_rotation() {
    let (generator, clock) = generator(DestinationConfig::new("app-logs"), at(2024, 1, 1, 0, 0, 0));

    let scenarios = [
        (at(2024, 1, 1, 0, 0, 0), "app-logs-2024.01.01"),
        (at(2024, 1, 1, 23, 59, 59), "app-logs-2024.01.01"),
        (at(2024, 1, 2, 0, 0, 0), "app-logs-2024.01.02"),
        (at(2024, 2, 1, 0, 0, 0), "app-logs-2024.02.01"),
        (at(2025, 1, 1, 0, 0, 0), "app-logs-2025.01.01"),
    ];

    for (instant, expected) in scenarios {
        clock.set(instant);
        assert_eq!(generator.generate(), expected, "at {}", instant);
    }
}

#[test]
fn test_hourly_rotation() {
    let config = DestinationConfig::new("hourly-logs").with_format(DateFormat::HourlyDot.as_str());
    let (generator, clock) = generator(config, at(2024, 1, 1, 0, 0, 0));

    let scenarios = [
        (at(2024, 1, 1, 0, 0, 0), "hourly-logs-2024.01.01-00"),
        (at(2024, 1, 1, 0, 59, 59), "hourly-logs-2024.01.01-00"),
        (at(2024, 1, 1, 1, 0, 0), "hourly-logs-2024.01.01-01"),
        (at(2024, 1, 2, 0, 0, 0), "hourly-logs-2024.01.02-00"),
    ];

    for (instant, expected) in scenarios {
        clock.set(instant);
        assert_eq!(generator.generate(), expected, "at {}", instant);
    }
}

#[test]
fn test_timezone_crosses_midnight_before_utc() {
    let (utc, clock) = generator(DestinationConfig::new("logs"), at(2024, 1, 1, 0, 0, 0));
    let tokyo = DestinationNameGenerator::with_clock(
        DestinationConfig::new("logs").with_timezone(Tokyo),
        clock.clone(),
    );

    // 00:00 UTC is 09:00 JST, same calendar day
    assert_eq!(utc.generate(), "logs-2024.01.01");
    assert_eq!(tokyo.generate(), "logs-2024.01.01");

    // 15:00 UTC is 00:00 JST the next day
    clock.set(at(2024, 1, 1, 15, 0, 0));
    assert_eq!(utc.generate(), "logs-2024.01.01");
    assert_eq!(tokyo.generate(), "logs-2024.01.02");
}

#[test]
fn test_tokyo_dash_format() {
    let config = DestinationConfig::new("app-logs")
        .with_format(DateFormat::Dash.as_str())
        .with_timezone(Tokyo);
    let (generator, _) = generator(config, at(2024, 1, 25, 0, 0, 0));
    assert_eq!(generator.generate(), "app-logs-2024-01-25");
}
