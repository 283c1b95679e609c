//! Error types for the rate-limit middleware.

use std::fmt;

/// A type-erased error, matching `tower`'s own `crate::BoxError` used
/// throughout `timeout`, `buffer`, and `limit`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error constructing a [`crate::GateLayer`] from a [`crate::Config`].
///
/// Surfaced immediately at construction time; the filter refuses to start
/// rather than deferring validation into `poll_ready`.
#[derive(Debug)]
pub enum ConfigError {
    /// `alpha` was outside `(0, 1]`.
    InvalidAlpha(f64),
    /// `sample_period_ms` was `0` or greater than `1000`.
    InvalidSamplePeriod(u64),
    /// `max_requests_per_second` was not positive.
    InvalidMaxRps(f64),
    /// `max_delay_queue` was not positive.
    InvalidMaxDelayQueue(usize),
    /// `delay_ms` was not positive.
    InvalidDelay(u64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidAlpha(v) => {
                write!(f, "alpha must be in (0, 1], got {}", v)
            }
            ConfigError::InvalidSamplePeriod(v) => {
                write!(f, "sample_period_ms must be in 1..=1000, got {}", v)
            }
            ConfigError::InvalidMaxRps(v) => {
                write!(f, "max_requests_per_second must be > 0, got {}", v)
            }
            ConfigError::InvalidMaxDelayQueue(v) => {
                write!(f, "max_delay_queue must be > 0, got {}", v)
            }
            ConfigError::InvalidDelay(v) => {
                write!(f, "delay_ms must be > 0, got {}", v)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
