//! Component E: the background sweep that reclaims idle trackers.
//!
//! Modeled on `tower::buffer::Worker`'s spawned-task shape: a long-lived
//! background future owned by a handle that signals shutdown through a
//! channel on `Drop`, rather than requiring callers to remember to cancel
//! it explicitly.

use crate::clock::Clock;
use crate::scheduler::Scheduler;
use crate::table::TrackerTable;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::trace;

/// Half the tracker TTL: frequent enough that no tracker overstays its TTL
/// by more than one sweep interval, per `SPEC_FULL.md` §4.E.
const SWEEP_INTERVAL: Duration = Duration::from_millis(1000);

/// A handle to the spawned background sweep task.
///
/// Dropping this handle asks the task to stop at its next wakeup; it does
/// not block waiting for that to happen. Call [`TimeoutWheel::shutdown`]
/// directly to do so deliberately.
#[derive(Debug)]
pub struct TimeoutWheel {
    shutdown: Option<oneshot::Sender<()>>,
}

impl TimeoutWheel {
    /// Spawns the sweep loop on `scheduler`, sweeping `table` every
    /// [`SWEEP_INTERVAL`] while it is non-empty, and going dormant (waiting
    /// on `table`'s [`tokio::sync::Notify`] handle) while it is empty.
    pub fn spawn(table: Arc<TrackerTable>, clock: Arc<dyn Clock>, scheduler: &dyn Scheduler) -> Self {
        let (tx, rx) = oneshot::channel();
        let notify = table.notify_handle();

        scheduler.spawn(Box::pin(async move {
            let mut shutdown = rx;
            loop {
                if table.size() == 0 {
                    trace!("timeout wheel dormant, waiting for first tracker");
                    tokio::select! {
                        _ = notify.notified() => {}
                        _ = &mut shutdown => return,
                    }
                    continue;
                }

                tokio::select! {
                    _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
                    _ = &mut shutdown => return,
                }

                let now = clock.now_nanos();
                let before = table.size();
                table.retain_live(now);
                let evicted = before - table.size();
                if evicted > 0 {
                    trace!(evicted, remaining = table.size(), "swept idle trackers");
                }
            }
        }));

        TimeoutWheel { shutdown: Some(tx) }
    }

    /// Signals the sweep loop to stop at its next wakeup.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TimeoutWheel {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use crate::estimator::RateEstimatorFactory;
    use crate::scheduler::TokioScheduler;

    #[tokio::test(start_paused = true)]
    async fn sweeps_away_idle_tracker() {
        let clock = Arc::new(MonotonicClock::new());
        let factory = RateEstimatorFactory::new(0.2, 100, 10.0, clock.clone()).unwrap();
        let table = Arc::new(TrackerTable::new(10, factory));
        table.get_or_create("a").unwrap();
        assert_eq!(table.size(), 1);

        let scheduler = TokioScheduler::new();
        let wheel = TimeoutWheel::spawn(table.clone(), clock.clone(), &scheduler);

        tokio::time::advance(Duration::from_millis(2001)).await;
        tokio::task::yield_now().await;

        assert_eq!(table.size(), 0);
        wheel.shutdown();
    }
}
