//! Component D: the concurrent, bounded table of per-identity trackers.

use crate::estimator::RateEstimatorFactory;
use crate::tracker::Tracker;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// A concurrent map from identity string to that identity's [`Tracker`],
/// bounded by `max_trackers`.
///
/// Backed by [`DashMap`], the sharded concurrent hash map also reached for
/// by the rate-limiter crates this filter's dependency stack was modeled on
/// ([`SPEC_FULL.md`] §4.D); it gives the `Gate`'s hot path lock-free reads
/// for already-tracked identities and fine-grained per-shard locking only
/// when inserting a new one.
#[derive(Debug)]
pub struct TrackerTable {
    trackers: DashMap<String, Arc<Tracker>>,
    max_trackers: usize,
    factory: RateEstimatorFactory,
    notify: Arc<Notify>,
}

impl TrackerTable {
    pub fn new(max_trackers: usize, factory: RateEstimatorFactory) -> Self {
        TrackerTable {
            trackers: DashMap::new(),
            max_trackers,
            factory,
            notify: Arc::new(Notify::new()),
        }
    }

    /// The number of identities currently tracked.
    pub fn size(&self) -> usize {
        self.trackers.len()
    }

    /// The configured upper bound on distinct tracked identities.
    pub fn max_trackers_hint(&self) -> usize {
        self.max_trackers
    }

    /// Returns the [`Tracker`] for `id`, creating one if `id` is new.
    ///
    /// Returns `None` if `id` is new and the table is already at (or over)
    /// `max_trackers` — the precise, identity-aware overflow check. The
    /// `Gate` additionally performs a loose `size() > max_trackers`
    /// pre-check of its own before resolving identity at all (see
    /// `SPEC_FULL.md` §4.H step 1); that coarser check alone would let one
    /// more *new* identity slip in at exactly `size() == max_trackers`, so
    /// this method re-checks precisely for the not-already-present case,
    /// which is the only case that can grow the table.
    pub fn get_or_create(&self, id: &str) -> Option<Arc<Tracker>> {
        if let Some(existing) = self.trackers.get(id) {
            return Some(Arc::clone(existing.value()));
        }

        if self.trackers.len() >= self.max_trackers {
            debug!(identity = id, "tracker table full, refusing new identity");
            return None;
        }

        let now = self.factory.now_nanos();
        let tracker = self
            .trackers
            .entry(id.to_owned())
            .or_insert_with(|| Arc::new(Tracker::new(self.factory.new_estimator(), now)))
            .clone();
        self.notify.notify_one();
        Some(tracker)
    }

    /// Sweeps every tracker, evicting those that are both past their TTL
    /// and idle, and rearming the rest so the next sweep has an up-to-date
    /// deadline. Called by the [`crate::wheel::TimeoutWheel`]; never called
    /// from the request path.
    pub fn retain_live(&self, now: u64) {
        self.trackers.retain(|_, tracker| {
            if tracker.is_idle(now) {
                false
            } else {
                true
            }
        });
    }

    /// A handle the [`crate::wheel::TimeoutWheel`] can wait on to be woken
    /// as soon as the table receives its first tracker, so the wheel can
    /// stay dormant while the table is empty.
    pub fn notify_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }
}
