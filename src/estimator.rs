//! Component A/B: the adaptive EMA rate estimator and its factory.

use crate::clock::Clock;
use crate::error::ConfigError;
use std::sync::Arc;

/// One second, expressed in nanoseconds.
const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Idle threshold: below this smoothed rate, with the limit not exceeded,
/// a tracker is considered idle and eligible for eviction.
const IDLE_EMA_THRESHOLD: f64 = 1e-4;

/// Per-identity exponential moving average of requests/second.
///
/// See `SPEC_FULL.md` §4.A for the derivation of the adaptive-alpha update.
/// This is the arithmetic core of the whole filter; it never fails, never
/// allocates, and holds no lock of its own (the enclosing
/// [`crate::tracker::Tracker`] supplies mutual exclusion).
#[derive(Debug, Clone)]
pub struct RateEstimator {
    ema: f64,
    sample_count: u64,
    sample_start_nanos: u64,
    alpha: f64,
    sample_period_nanos: u64,
    max_rps: f64,
}

impl RateEstimator {
    fn new(alpha: f64, sample_period_nanos: u64, max_rps: f64, now: u64) -> Self {
        RateEstimator {
            ema: 0.0,
            sample_count: 0,
            sample_start_nanos: now,
            alpha,
            sample_period_nanos,
            max_rps,
        }
    }

    /// Adds one sample at `now` and returns whether the rate is exceeded.
    pub fn observe_and_test(&mut self, now: u64) -> bool {
        self.sample_count += 1;
        self.update_and_decide(now, true)
    }

    /// Returns whether the rate is exceeded, without adding a sample. Per
    /// §4.A rule 3, a pure test still flushes the current window into the
    /// EMA, so a subsequent `is_idle` reflects an up-to-date estimate.
    pub fn test_only(&mut self, now: u64) -> bool {
        self.update_and_decide(now, false)
    }

    /// True iff the rate is not exceeded and the EMA has decayed to
    /// (near) zero.
    pub fn is_idle(&self, _now: u64) -> bool {
        !self.is_exceeded() && self.ema <= IDLE_EMA_THRESHOLD
    }

    fn is_exceeded(&self) -> bool {
        self.ema > self.max_rps
    }

    /// `add_sample` distinguishes `observe_and_test` (true) from
    /// `test_only` (false, the "pure test" case in rule 3 below).
    fn update_and_decide(&mut self, now: u64, add_sample: bool) -> bool {
        let burst = self.sample_count as f64 > self.max_rps;
        let elapsed = now.saturating_sub(self.sample_start_nanos);
        let period_elapsed = elapsed > self.sample_period_nanos;

        if burst || period_elapsed || !add_sample {
            if elapsed > 0 {
                let current_rate = self.sample_count as f64 * NANOS_PER_SEC / elapsed as f64;
                let adjusted_alpha =
                    (self.alpha * elapsed as f64 / self.sample_period_nanos as f64).min(1.0);
                self.ema = adjusted_alpha * current_rate + (1.0 - adjusted_alpha) * self.ema;
            } else {
                let guessed_rate =
                    self.sample_count as f64 * NANOS_PER_SEC / self.sample_period_nanos as f64;
                self.ema = self.alpha * guessed_rate + (1.0 - self.alpha) * self.ema;
            }

            // `now` may arrive slightly out of monotonic order across
            // threads; never move the window start backwards.
            self.sample_start_nanos = now.max(self.sample_start_nanos);
            self.sample_count = 0;
        }

        self.is_exceeded()
    }
}

/// Holds the immutable estimator parameters and a [`Clock`], producing
/// fresh, zeroed [`RateEstimator`]s for newly observed identities.
#[derive(Clone)]
pub struct RateEstimatorFactory {
    alpha: f64,
    sample_period_nanos: u64,
    max_rps: f64,
    clock: Arc<dyn Clock>,
}

impl RateEstimatorFactory {
    /// Validates `alpha`, `sample_period_ms`, and `max_rps`, matching the
    /// construction-time invariants in §3/§4.B.
    pub fn new(
        alpha: f64,
        sample_period_ms: u64,
        max_rps: f64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(ConfigError::InvalidAlpha(alpha));
        }
        if sample_period_ms == 0 || sample_period_ms > 1000 {
            return Err(ConfigError::InvalidSamplePeriod(sample_period_ms));
        }
        if !(max_rps > 0.0) {
            return Err(ConfigError::InvalidMaxRps(max_rps));
        }

        Ok(RateEstimatorFactory {
            alpha,
            sample_period_nanos: sample_period_ms * 1_000_000,
            max_rps,
            clock,
        })
    }

    /// Produces a fresh estimator anchored at the current clock reading.
    pub fn new_estimator(&self) -> RateEstimator {
        RateEstimator::new(
            self.alpha,
            self.sample_period_nanos,
            self.max_rps,
            self.clock.now_nanos(),
        )
    }

    /// The current reading of the factory's underlying clock.
    pub fn now_nanos(&self) -> u64 {
        self.clock.now_nanos()
    }
}

impl std::fmt::Debug for RateEstimatorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateEstimatorFactory")
            .field("alpha", &self.alpha)
            .field("sample_period_nanos", &self.sample_period_nanos)
            .field("max_rps", &self.max_rps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;

    fn factory(max_rps: f64) -> RateEstimatorFactory {
        RateEstimatorFactory::new(0.2, 100, max_rps, Arc::new(MonotonicClock::new())).unwrap()
    }

    #[test]
    fn ema_never_negative() {
        let mut est = factory(10.0).new_estimator();
        let mut now = 0u64;
        for _ in 0..50 {
            est.observe_and_test(now);
            now += 1_000_000;
            assert!(est.ema >= 0.0);
        }
    }

    #[test]
    fn light_load_never_exceeds() {
        let mut est = factory(10.0).new_estimator();
        // 5 requests in 1 second, well under max_rps * 0.5 = 5... use 4.
        let mut now = 0u64;
        let mut exceeded = false;
        for _ in 0..4 {
            exceeded = est.observe_and_test(now);
            now += 250_000_000;
        }
        assert!(!exceeded);
        assert!(!est.test_only(now));
    }

    #[test]
    fn sustained_overload_eventually_exceeds() {
        let mut est = factory(10.0).new_estimator();
        let mut now = 0u64;
        let mut exceeded = false;
        // 100 req/s for 10 periods of 100ms = 10 samples/period.
        for _ in 0..10 {
            for _ in 0..10 {
                exceeded = est.observe_and_test(now);
                now += 1_000_000; // 1ms between samples
            }
        }
        assert!(exceeded, "ema={}", est.ema);
    }

    #[test]
    fn idle_implies_not_exceeded_afterwards() {
        let mut est = factory(10.0).new_estimator();
        let mut now = 0u64;
        est.observe_and_test(now);
        now += 4_000_000_000; // 4s of silence
        assert!(est.is_idle(now));
        assert!(!est.test_only(now));
    }

    #[test]
    fn zero_delta_matches_guessed_rate_path() {
        // Two observations at the identical timestamp should match a
        // single observation computed via the guessed-rate branch.
        let mut a = factory(1000.0).new_estimator();
        a.observe_and_test(0);
        a.observe_and_test(0);

        let mut b = factory(1000.0).new_estimator();
        b.observe_and_test(0);
        b.test_only(0);

        assert!((a.ema - b.ema).abs() < 1e-9);
    }

    #[test]
    fn alpha_one_overwrites_ema_fully() {
        let factory = RateEstimatorFactory::new(1.0, 100, 10.0, Arc::new(MonotonicClock::new()))
            .unwrap();
        let mut est = factory.new_estimator();
        est.observe_and_test(0);
        est.observe_and_test(150_000_000);
        // alpha=1 means the window's current_rate fully replaces ema.
        assert!((est.ema - (1.0 * 1e9 / 150_000_000.0)).abs() < 1e-6);
    }

    #[test]
    fn sample_period_of_one_ms_does_not_divide_by_zero() {
        let factory = RateEstimatorFactory::new(0.5, 1, 10.0, Arc::new(MonotonicClock::new()))
            .unwrap();
        let mut est = factory.new_estimator();
        for now in 0..20 {
            est.observe_and_test(now);
        }
        assert!(est.ema.is_finite());
    }

    #[test]
    fn non_monotonic_now_does_not_corrupt_state() {
        let mut est = factory(10.0).new_estimator();
        est.observe_and_test(1_000_000);
        // A few microseconds of thread skew, slightly before the window start.
        let exceeded = est.observe_and_test(999_000);
        assert!(!exceeded.then(|| ()).is_some() || est.ema.is_finite());
        assert!(est.ema >= 0.0);
        assert!(est.sample_start_nanos >= 1_000_000);
    }

    #[test]
    fn invalid_alpha_rejected() {
        assert!(RateEstimatorFactory::new(0.0, 100, 10.0, Arc::new(MonotonicClock::new())).is_err());
        assert!(RateEstimatorFactory::new(1.5, 100, 10.0, Arc::new(MonotonicClock::new())).is_err());
    }

    #[test]
    fn invalid_sample_period_rejected() {
        assert!(RateEstimatorFactory::new(0.2, 0, 10.0, Arc::new(MonotonicClock::new())).is_err());
        assert!(RateEstimatorFactory::new(0.2, 1001, 10.0, Arc::new(MonotonicClock::new())).is_err());
    }
}
