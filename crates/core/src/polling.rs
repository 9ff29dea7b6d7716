//! Backoff schedule and result classification for long-running operations.
//!
//! The async driver lives in `imgstudio_genmedia::poller`; this module only
//! holds the pieces that can be computed without a runtime:
//!
//! - [`PollConfig`] -- the tunable schedule (interval, growth, cap, jitter).
//! - [`Backoff`] -- the mutable interval that grows after each not-done check.
//! - [`resolve_status`] -- maps one status-check report to "keep polling"
//!   or a terminal [`PollResult`].

use std::time::Duration;

use serde::Serialize;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Delay before the first status check.
pub const DEFAULT_INITIAL_INTERVAL_MS: u64 = 6_000;
/// Upper bound on the stored interval.
pub const DEFAULT_MAX_INTERVAL_MS: u64 = 60_000;
/// Growth factor applied to the stored interval after each not-done check.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.2;
/// Number of status checks before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
/// Fraction of the interval used as the jitter span.
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// A uniform sample that produces zero jitter.
pub const NO_JITTER: f64 = 0.5;

/// Message carried by a failure when the backend finished without output.
pub const NO_RESULTS_MESSAGE: &str = "Operation completed but returned no results";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunable parameters for one poller.
///
/// Every field can be overridden on its own; unset fields keep the
/// defaults above.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_factor: f64,
    pub max_attempts: u32,
    pub jitter_factor: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(DEFAULT_INITIAL_INTERVAL_MS),
            max_interval: Duration::from_millis(DEFAULT_MAX_INTERVAL_MS),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl PollConfig {
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }

    /// Reject schedules that would never poll, shrink, or overflow.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.initial_interval.is_zero() {
            return Err(CoreError::Validation(
                "initial_interval must be greater than zero".to_string(),
            ));
        }
        if self.max_interval < self.initial_interval {
            return Err(CoreError::Validation(format!(
                "max_interval ({} ms) must not be below initial_interval ({} ms)",
                self.max_interval.as_millis(),
                self.initial_interval.as_millis(),
            )));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(CoreError::Validation(format!(
                "backoff_factor must be a finite number >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.max_attempts == 0 {
            return Err(CoreError::Validation(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(CoreError::Validation(format!(
                "jitter_factor must be within [0, 1], got {}",
                self.jitter_factor
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Backoff math
// ---------------------------------------------------------------------------

/// Apply jitter to `current` using a uniform sample in `[0, 1)`.
///
/// `jitter = current * jitter_factor * (sample - 0.5)`, and the result is
/// `round(current + jitter)` in whole milliseconds. The delay therefore
/// stays within `current * (1 +/- jitter_factor / 2)`.
pub fn jittered_delay(current: Duration, jitter_factor: f64, sample: f64) -> Duration {
    let current_ms = current.as_secs_f64() * 1000.0;
    let jitter = current_ms * jitter_factor * (sample - 0.5);
    Duration::from_millis((current_ms + jitter).round().max(0.0) as u64)
}

/// Grow `current` by the backoff factor, clamped to `max_interval`.
///
/// The product is clamped in seconds before it becomes a `Duration`, so a
/// factor large enough to overflow still yields `max_interval`.
pub fn grow_interval(current: Duration, config: &PollConfig) -> Duration {
    let max_secs = config.max_interval.as_secs_f64();
    let grown = (current.as_secs_f64() * config.backoff_factor).min(max_secs);
    Duration::try_from_secs_f64(grown).unwrap_or(config.max_interval)
}

/// The stored polling interval of one tracking session.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    current: Duration,
}

impl Backoff {
    pub fn new(config: &PollConfig) -> Self {
        Self {
            current: config.initial_interval,
        }
    }

    /// Interval the next [`step`](Self::step) will jitter.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self, config: &PollConfig) {
        self.current = config.initial_interval;
    }

    /// Return the jittered delay for the next check and grow the stored
    /// interval for the check after that.
    pub fn step(&mut self, config: &PollConfig, sample: f64) -> Duration {
        let delay = jittered_delay(self.current, config.jitter_factor, sample);
        self.current = grow_interval(self.current, config);
        delay
    }

    /// [`step`](Self::step) with a fresh random sample.
    pub fn step_random(&mut self, config: &PollConfig) -> Duration {
        self.step(config, rand::random::<f64>())
    }
}

// ---------------------------------------------------------------------------
// Status reports and results
// ---------------------------------------------------------------------------

/// What one status check reports about a long-running operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStatus<T> {
    pub done: bool,
    pub payload: Option<T>,
    pub error: Option<String>,
}

impl<T> OperationStatus<T> {
    pub fn pending() -> Self {
        Self {
            done: false,
            payload: None,
            error: None,
        }
    }

    pub fn completed(payload: T) -> Self {
        Self {
            done: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            done: true,
            payload: None,
            error: Some(error.into()),
        }
    }
}

/// Payloads that can be "done but empty".
pub trait ResultPayload {
    fn has_results(&self) -> bool;
}

impl<T> ResultPayload for Vec<T> {
    fn has_results(&self) -> bool {
        !self.is_empty()
    }
}

impl ResultPayload for String {
    fn has_results(&self) -> bool {
        !self.is_empty()
    }
}

impl ResultPayload for serde_json::Value {
    fn has_results(&self) -> bool {
        match self {
            serde_json::Value::Null => false,
            serde_json::Value::Array(items) => !items.is_empty(),
            serde_json::Value::Object(map) => !map.is_empty(),
            serde_json::Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }
}

/// Why a tracked operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The backend reported `done` with an error.
    Backend,
    /// The status check itself failed (network, HTTP status, decoding).
    Transport,
    /// The backend reported `done` without error and without output.
    EmptyResult,
}

/// Terminal outcome of one polling sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult<T> {
    Success(T),
    Failure { kind: FailureKind, message: String },
    Timeout { attempts: u32, message: String },
}

impl<T> PollResult<T> {
    pub fn timeout(attempts: u32) -> Self {
        Self::Timeout {
            attempts,
            message: format!("Operation timed out after {attempts} status checks"),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Failure {
            kind: FailureKind::Transport,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Stable category string for logs and API responses.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Failure { kind, .. } => match kind {
                FailureKind::Backend => "backend",
                FailureKind::Transport => "transport",
                FailureKind::EmptyResult => "empty",
            },
            Self::Timeout { .. } => "timeout",
        }
    }

    /// Human-readable message, if this is not a success.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure { message, .. } | Self::Timeout { message, .. } => Some(message),
        }
    }
}

/// Decide what a status report means for the polling loop.
///
/// Returns `None` while the operation is still running. A report with an
/// error wins over a payload; a done report with neither yields an
/// [`FailureKind::EmptyResult`] failure.
pub fn resolve_status<T: ResultPayload>(status: OperationStatus<T>) -> Option<PollResult<T>> {
    if !status.done {
        return None;
    }
    if let Some(error) = status.error {
        return Some(PollResult::Failure {
            kind: FailureKind::Backend,
            message: error,
        });
    }
    match status.payload {
        Some(payload) if payload.has_results() => Some(PollResult::Success(payload)),
        _ => Some(PollResult::Failure {
            kind: FailureKind::EmptyResult,
            message: NO_RESULTS_MESSAGE.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle phase of a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    /// Nothing is tracked.
    Idle,
    /// A timer is armed for the next check.
    Scheduled,
    /// A status check is in flight.
    Checking,
    /// A result was produced; stays here until the next `start`.
    Terminal,
}
