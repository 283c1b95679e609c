//! Construction-time configuration for [`crate::gate::GateLayer`].

use crate::error::ConfigError;

/// Tunables for the rate-limiting filter, per `SPEC_FULL.md` §3/§11.
///
/// `Config` carries only the numeric knobs; the identity function and
/// rejection handler are supplied separately to [`crate::gate::GateLayer::new`]
/// as concrete values; the original spec's single `id.type` selector is
/// resolved at the call site by picking a concrete [`crate::IdentityFn`]
/// implementor rather than threading a runtime string registry through
/// `Config`.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Requests/second above which a tracked identity is considered over
    /// its limit.
    pub max_requests_per_second: f64,
    /// Upper bound on distinct identities tracked concurrently.
    pub max_trackers: usize,
    /// Width, in milliseconds, of the sampling window the rate estimator
    /// folds into its EMA on each flush. Must be in `1..=1000`.
    pub sample_period_ms: u64,
    /// Smoothing factor for the EMA update, in `(0, 1]`.
    pub alpha: f64,
    /// How long a request may sit in the delayed-rejection queue before a
    /// response is written, in milliseconds.
    pub delay_ms: u64,
    /// Upper bound on requests held in the delayed-rejection queue at once.
    pub max_delay_queue: usize,
    /// HTTP status code written for a rejected request.
    pub reject_status: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_requests_per_second: 100.0,
            max_trackers: 10_000,
            sample_period_ms: 100,
            alpha: 0.2,
            delay_ms: 1000,
            max_delay_queue: 1000,
            reject_status: 420,
        }
    }
}

impl Config {
    /// Checks every field against the invariants `SPEC_FULL.md` §3
    /// requires, returning the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(ConfigError::InvalidAlpha(self.alpha));
        }
        if self.sample_period_ms == 0 || self.sample_period_ms > 1000 {
            return Err(ConfigError::InvalidSamplePeriod(self.sample_period_ms));
        }
        if !(self.max_requests_per_second > 0.0) {
            return Err(ConfigError::InvalidMaxRps(self.max_requests_per_second));
        }
        if self.max_delay_queue == 0 {
            return Err(ConfigError::InvalidMaxDelayQueue(self.max_delay_queue));
        }
        if self.delay_ms == 0 {
            return Err(ConfigError::InvalidDelay(self.delay_ms));
        }
        Ok(())
    }
}
