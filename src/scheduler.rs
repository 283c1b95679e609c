//! The background-task capability used by the [`crate::wheel::TimeoutWheel`]
//! and the delayed [`crate::reject::DelayedReject`] handler.
//!
//! Modeled as a small trait rather than calling `tokio::spawn` directly
//! throughout, per the "Scheduler interface" design note in `SPEC_FULL.md`
//! §9: not prescribed to a specific timer implementation, with the
//! production default backed by the Tokio runtime.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Spawns fire-and-forget background work.
pub trait Scheduler: fmt::Debug + Send + Sync + 'static {
    /// Runs `fut` to completion on whatever executor backs this scheduler.
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send>>);
}

/// The production [`Scheduler`], backed by `tokio::spawn`.
#[derive(Clone, Default)]
pub struct TokioScheduler {
    _p: (),
}

impl TokioScheduler {
    /// Creates a new Tokio-backed scheduler. Must be constructed on a
    /// Tokio runtime.
    pub fn new() -> Self {
        TokioScheduler { _p: () }
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler").finish()
    }
}

impl Scheduler for TokioScheduler {
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send>>) {
        tokio::spawn(fut);
    }
}
