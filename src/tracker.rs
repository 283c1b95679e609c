//! Component C: per-identity tracking state held by the
//! [`crate::table::TrackerTable`].

use crate::estimator::RateEstimator;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// How long a tracker may go unobserved before the [`crate::wheel::TimeoutWheel`]
/// is willing to consider it idle enough to evict, per `SPEC_FULL.md` §4.E.
pub const TRACKER_TTL_NANOS: u64 = 2_000_000_000;

/// One identity's rate-estimation state.
///
/// The estimator lives behind a [`std::sync::Mutex`] rather than a
/// `tokio::sync::Mutex`: every operation on it is O(1) floating point
/// arithmetic with no `.await` point, so a std mutex can be locked
/// synchronously from inside [`crate::table::TrackerTable::retain_live`]'s
/// non-async `DashMap::retain` closure. The expiry deadline is kept outside
/// the mutex in its own atomic so the sweep can skip live trackers without
/// taking the lock at all.
#[derive(Debug)]
pub struct Tracker {
    estimator: Mutex<RateEstimator>,
    expire_at_nanos: AtomicU64,
}

impl Tracker {
    pub(crate) fn new(estimator: RateEstimator, now: u64) -> Self {
        Tracker {
            estimator: Mutex::new(estimator),
            expire_at_nanos: AtomicU64::new(now + TRACKER_TTL_NANOS),
        }
    }

    /// Records one request at `now`, rearms the expiry deadline, and
    /// returns whether the identity is currently over its limit.
    pub fn observe(&self, now: u64) -> bool {
        self.rearm(now);
        let mut est = self.estimator.lock().unwrap_or_else(|e| e.into_inner());
        est.observe_and_test(now)
    }

    /// True if, as of `now`, this tracker has decayed to an idle rate and
    /// its TTL has elapsed — the two conditions
    /// [`crate::table::TrackerTable::retain_live`] requires before evicting.
    pub fn is_idle(&self, now: u64) -> bool {
        if now < self.expire_at_nanos.load(Ordering::Acquire) {
            return false;
        }
        let mut est = self.estimator.lock().unwrap_or_else(|e| e.into_inner());
        // A pure test flushes the pending window before judging idleness,
        // so a tracker that has simply gone quiet mid-window is still
        // recognized as idle rather than held onto by stale accounting.
        est.test_only(now);
        est.is_idle(now)
    }

    /// The next instant at which this tracker becomes eligible for
    /// eviction, absent further requests.
    pub fn expire_at_nanos(&self) -> u64 {
        self.expire_at_nanos.load(Ordering::Acquire)
    }

    /// Pushes the expiry deadline `TRACKER_TTL_NANOS` out from `now`.
    pub fn rearm(&self, now: u64) {
        self.expire_at_nanos
            .store(now + TRACKER_TTL_NANOS, Ordering::Release);
    }
}
