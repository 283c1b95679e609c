//! Monotonic time source.
//!
//! Rate decisions are always bound to a monotonic nanosecond clock, never to
//! wall-clock time. [`Clock`] is a small capability trait (see the
//! `Scheduler interface` note in `SPEC_FULL.md` §9) so that tests can swap in
//! a deterministic clock; production code uses [`MonotonicClock`], which is
//! backed by `tokio::time::Instant` and therefore respects
//! `tokio::time::pause`/`advance` under `#[tokio::test(start_paused = true)]`.

use std::fmt;
use tokio::time::Instant;

/// A monotonic nanosecond clock.
pub trait Clock: fmt::Debug + Send + Sync + 'static {
    /// Returns the current instant in nanoseconds since some fixed,
    /// unspecified epoch. Only differences between two calls are meaningful.
    fn now_nanos(&self) -> u64;
}

/// The production [`Clock`], anchored at the instant it was constructed.
#[derive(Clone)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Creates a clock anchored at the current instant.
    pub fn new() -> Self {
        MonotonicClock {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        MonotonicClock::new()
    }
}

impl fmt::Debug for MonotonicClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonotonicClock").finish()
    }
}

impl Clock for MonotonicClock {
    fn now_nanos(&self) -> u64 {
        Instant::now()
            .saturating_duration_since(self.epoch)
            .as_nanos() as u64
    }
}
