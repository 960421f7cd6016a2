// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for duration parsing (Go-style duration format)

#[cfg(test)]
mod tests {
    use super::super::{format_duration, parse_duration};
    use std::time::Duration;

    // ========================================================================
    // Valid Duration Parsing Tests
    // ========================================================================

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
    }

    #[test]
    fn test_parse_duration_bare_integer_is_seconds() {
        assert_eq!(
            parse_duration("5").unwrap(),
            Duration::from_secs(5),
            "bare integers should be read as seconds"
        );
    }

    #[test]
    fn test_parse_duration_trims_whitespace() {
        assert_eq!(parse_duration(" 30s ").unwrap(), Duration::from_secs(30));
    }

    // ========================================================================
    // Invalid Duration Tests
    // ========================================================================

    #[test]
    fn test_parse_duration_rejects_invalid() {
        assert!(parse_duration("").is_err(), "empty string");
        assert!(parse_duration("s").is_err(), "missing value");
        assert!(parse_duration("10x").is_err(), "unknown unit");
        assert!(parse_duration("-5s").is_err(), "negative value");
        assert!(parse_duration("1.5s").is_err(), "fractional value");
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert!(parse_duration(&format!("{}h", u64::MAX)).is_err());
    }

    // ========================================================================
    // Formatting
    // ========================================================================

    #[test]
    fn test_format_duration_picks_largest_exact_unit() {
        assert_eq!(format_duration(Duration::from_secs(600)), "10m");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_secs(90)), "90s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }
}
