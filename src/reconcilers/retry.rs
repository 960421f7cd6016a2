// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry logic with exponential backoff.
//!
//! This module drives the runtime poll loop ([`RetryTicker`]) and retries short
//! upstream calls such as the batched status report ([`retry_call`]).

use crate::constants::{
    POLL_BACKOFF_INITIAL_SECS, POLL_BACKOFF_MAX_ATTEMPTS, POLL_BACKOFF_MULTIPLIER,
    POLL_BACKOFF_RANDOMIZATION, POLL_BACKOFF_RESET_WINDOW_SECS,
};
use rand::Rng;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Backoff multiplier (exponential growth factor) for short upstream calls
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// HTTP retry initial interval (200ms)
const HTTP_INITIAL_INTERVAL_MILLIS: u64 = 200;

/// HTTP retry maximum interval (5 seconds)
const HTTP_MAX_INTERVAL_SECS: u64 = 5;

/// HTTP retry maximum elapsed time (30 seconds)
const HTTP_MAX_ELAPSED_TIME_SECS: u64 = 30;

/// Simple exponential backoff implementation.
///
/// Provides exponential backoff with randomization (jitter) to prevent thundering herd.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Initial interval duration, restored by [`ExponentialBackoff::reset`]
    pub initial_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Maximum total elapsed time
    pub max_elapsed_time: Option<Duration>,
    /// Backoff multiplier (typically 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
    /// Start time for tracking total elapsed time
    start_time: Instant,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with specified parameters.
    #[must_use]
    pub fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            max_elapsed_time,
            multiplier,
            randomization_factor,
            start_time: Instant::now(),
        }
    }

    /// Get the next backoff interval, or None if max elapsed time exceeded.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed_time {
            if self.start_time.elapsed() >= max_elapsed {
                return None;
            }
        }

        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        Some(jittered)
    }

    /// Restart the schedule from the initial interval.
    pub fn reset(&mut self) {
        self.current_interval = self.initial_interval;
        self.start_time = Instant::now();
    }

    /// Apply randomization (jitter) to an interval.
    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let min = secs - delta;
        let max = secs + delta;

        let mut rng = rand::thread_rng();
        let jittered = rng.gen_range(min..=max);

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Backoff of the Fleet Manager poll after consecutive failures.
///
/// # Retry Schedule
///
/// 1. 5s
/// 2. 15s
/// 3. 45s
/// 4. 135s
/// 5. 405s
///
/// each ±10%. The ticker then waits the reset window and starts over.
#[must_use]
pub fn poll_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_secs(POLL_BACKOFF_INITIAL_SECS),
        Duration::from_secs(POLL_BACKOFF_RESET_WINDOW_SECS),
        None,
        POLL_BACKOFF_MULTIPLIER,
        POLL_BACKOFF_RANDOMIZATION,
    )
}

/// Create exponential backoff configuration for short HTTP calls.
///
/// # Configuration
///
/// - **Initial interval**: 200ms
/// - **Max interval**: 5 seconds
/// - **Max elapsed time**: 30 seconds total
/// - **Multiplier**: 2.0 (exponential growth)
/// - **Randomization**: ±10% (prevents thundering herd)
#[must_use]
pub fn http_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(HTTP_INITIAL_INTERVAL_MILLIS),
        Duration::from_secs(HTTP_MAX_INTERVAL_SECS),
        Some(Duration::from_secs(HTTP_MAX_ELAPSED_TIME_SECS)),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Determine if an HTTP status code is retryable.
///
/// # Retryable Status Codes
///
/// - **408** (Request Timeout)
/// - **429** (Too Many Requests) - Rate limiting
/// - **5xx** - Server and gateway errors
#[must_use]
pub fn is_retryable_http_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Drives the runtime loop: the regular poll period on success, exponential
/// backoff on consecutive failures.
///
/// After [`POLL_BACKOFF_MAX_ATTEMPTS`] consecutive failures the ticker waits the
/// reset window once and restarts the backoff schedule.
#[derive(Debug, Clone)]
pub struct RetryTicker {
    period: Duration,
    backoff: ExponentialBackoff,
    consecutive_failures: u32,
    max_attempts: u32,
    reset_window: Duration,
}

impl RetryTicker {
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self::with_backoff(
            period,
            poll_backoff(),
            POLL_BACKOFF_MAX_ATTEMPTS,
            Duration::from_secs(POLL_BACKOFF_RESET_WINDOW_SECS),
        )
    }

    #[must_use]
    pub fn with_backoff(
        period: Duration,
        backoff: ExponentialBackoff,
        max_attempts: u32,
        reset_window: Duration,
    ) -> Self {
        RetryTicker {
            period,
            backoff,
            consecutive_failures: 0,
            max_attempts,
            reset_window,
        }
    }

    /// Record a successful tick and return the delay before the next one.
    pub fn succeeded(&mut self) -> Duration {
        if self.consecutive_failures > 0 {
            debug!(
                failures = self.consecutive_failures,
                "Poll recovered, resetting backoff"
            );
        }
        self.consecutive_failures = 0;
        self.backoff.reset();
        self.period
    }

    /// Record a failed tick and return the delay before the next one.
    pub fn failed(&mut self) -> Duration {
        self.consecutive_failures += 1;
        if self.consecutive_failures > self.max_attempts {
            warn!(
                failures = self.consecutive_failures,
                reset_window = ?self.reset_window,
                "Poll backoff exhausted, waiting for reset window"
            );
            self.consecutive_failures = 0;
            self.backoff.reset();
            return self.reset_window;
        }
        self.backoff.next_backoff().unwrap_or(self.reset_window)
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Retry an async call with exponential backoff.
///
/// Retries while `is_retryable` returns `true` for the error and the backoff has
/// time left; fails immediately on permanent errors. Cancelling `cancel` ends
/// the current backoff sleep and no further attempt is made.
///
/// # Errors
///
/// Returns the last error when it is not retryable, the backoff is exhausted or
/// `cancel` fires.
pub async fn retry_call<T, E, F, Fut>(
    mut backoff: ExponentialBackoff,
    operation_name: &str,
    cancel: &CancellationToken,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        "Call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                if !is_retryable(&e) {
                    error!(
                        operation = operation_name,
                        error = %e,
                        "Non-retryable error, failing immediately"
                    );
                    return Err(e);
                }

                if cancel.is_cancelled() {
                    debug!(operation = operation_name, attempt = attempt, "Cancelled, not retrying");
                    return Err(e);
                }

                if let Some(duration) = backoff.next_backoff() {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        retry_after = ?duration,
                        error = %e,
                        "Retryable error, will retry"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            debug!(operation = operation_name, attempt = attempt, "Cancelled during backoff");
                            return Err(e);
                        }
                        () = tokio::time::sleep(duration) => {}
                    }
                } else {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "Backoff exhausted, giving up"
                    );
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
