// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Duration parsing for Go-style duration strings.
//!
//! Configuration values such as `RUNTIME_POLL_PERIOD=5s` or
//! `ROUTE_REENCRYPT_TIMEOUT=10m` are written in Go duration format. This module
//! parses them into `std::time::Duration` and formats them back for annotations.

use anyhow::{bail, Context, Result};
use std::time::Duration;

const MILLIS_PER_SECOND: u64 = 1000;
const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3600;

/// Parse a Go-style duration string into a Rust `Duration`.
///
/// Supported units:
/// - `ms` (milliseconds): "500ms"
/// - `s` (seconds): "5s"
/// - `m` (minutes): "10m"
/// - `h` (hours): "1h"
///
/// A bare integer is read as seconds, which keeps `RUNTIME_POLL_PERIOD=5` working.
///
/// # Examples
///
/// ```
/// use fleetshard_sync::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
/// assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// assert!(parse_duration("10x").is_err());
/// ```
///
/// # Errors
///
/// Returns an error if the string is empty, the value is not a non-negative
/// integer, the unit is unknown, or the value overflows.
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let trimmed = duration_str.trim();
    if trimmed.is_empty() {
        bail!("Duration string cannot be empty");
    }

    let split_pos = trimmed
        .chars()
        .position(|c| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());

    let (value_str, unit) = trimmed.split_at(split_pos);

    let value: u64 = value_str
        .parse()
        .with_context(|| format!("Duration '{duration_str}' must start with an integer"))?;

    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "" | "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(
            value
                .checked_mul(SECONDS_PER_MINUTE)
                .context("Duration value too large (overflow)")?,
        ),
        "h" => Duration::from_secs(
            value
                .checked_mul(SECONDS_PER_HOUR)
                .context("Duration value too large (overflow)")?,
        ),
        _ => {
            bail!("Unsupported duration unit '{unit}'. Use 'ms', 's', 'm', or 'h'")
        }
    };

    Ok(duration)
}

/// Format a `Duration` using the largest unit that represents it exactly.
///
/// Used for HAProxy annotations, which accept the same unit suffixes.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % u128::from(MILLIS_PER_SECOND) != 0 {
        return format!("{millis}ms");
    }
    let secs = duration.as_secs();
    if secs != 0 && secs % SECONDS_PER_HOUR == 0 {
        format!("{}h", secs / SECONDS_PER_HOUR)
    } else if secs != 0 && secs % SECONDS_PER_MINUTE == 0 {
        format!("{}m", secs / SECONDS_PER_MINUTE)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod duration_tests;
