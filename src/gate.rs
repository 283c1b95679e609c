//! Component H: the `tower::Service`/`Layer` pair that orchestrates every
//! other component on the request path.

use crate::clock::{Clock, MonotonicClock};
use crate::config::Config;
use crate::error::ConfigError;
use crate::estimator::RateEstimatorFactory;
use crate::identity::IdentityFn;
use crate::reject::RejectionHandler;
use crate::request::{ConnectionInfo, TimestampedRequest};
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::table::TrackerTable;
use crate::wheel::TimeoutWheel;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;
use tracing::{debug, trace};

struct Shared<Id, Rej> {
    table: Arc<TrackerTable>,
    clock: Arc<dyn Clock>,
    identity: Id,
    reject: Rej,
    // Held only to keep the sweep task alive for as long as any `Gate`
    // built from this `GateLayer` is; dropping the last clone tears the
    // background sweep down.
    _wheel: Arc<TimeoutWheel>,
}

/// A [`tower_layer::Layer`] that wraps an inner service with per-client rate
/// limiting.
///
/// Construction validates `config` and spawns the shared [`TimeoutWheel`]
/// once; every [`Gate`] produced by [`Layer::layer`] shares the same
/// [`TrackerTable`] and sweep task, mirroring how `tower::limit::RateLimitLayer`
/// separates one-time setup from per-`Service` wrapping.
pub struct GateLayer<Id, Rej> {
    shared: Arc<Shared<Id, Rej>>,
}

impl<Id, Rej> Clone for GateLayer<Id, Rej> {
    fn clone(&self) -> Self {
        GateLayer {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<Id: std::fmt::Debug, Rej: std::fmt::Debug> std::fmt::Debug for GateLayer<Id, Rej> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateLayer").finish()
    }
}

impl<Id, Rej> GateLayer<Id, Rej> {
    /// Validates `config`, constructs the shared [`TrackerTable`], and spawns
    /// its [`TimeoutWheel`] on the default Tokio-backed [`Scheduler`].
    ///
    /// Must be called from within a Tokio runtime, since the sweep task is
    /// spawned immediately rather than lazily on first request.
    pub fn new(config: Config, identity: Id, reject: Rej) -> Result<Self, ConfigError> {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let scheduler = TokioScheduler::new();
        Self::new_with(config, identity, reject, clock, &scheduler)
    }

    /// As [`GateLayer::new`], but with an explicit [`Clock`] and
    /// [`Scheduler`], so tests can supply deterministic, virtual-time-paused
    /// collaborators.
    pub fn new_with(
        config: Config,
        identity: Id,
        reject: Rej,
        clock: Arc<dyn Clock>,
        scheduler: &dyn Scheduler,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let factory = RateEstimatorFactory::new(
            config.alpha,
            config.sample_period_ms,
            config.max_requests_per_second,
            Arc::clone(&clock),
        )?;
        let table = Arc::new(TrackerTable::new(config.max_trackers, factory));
        let wheel = TimeoutWheel::spawn(Arc::clone(&table), Arc::clone(&clock), scheduler);

        Ok(GateLayer {
            shared: Arc::new(Shared {
                table,
                clock,
                identity,
                reject,
                _wheel: Arc::new(wheel),
            }),
        })
    }
}

impl<S, Id, Rej> Layer<S> for GateLayer<Id, Rej>
where
    Id: Clone,
    Rej: Clone,
{
    type Service = Gate<S, Id, Rej>;

    fn layer(&self, inner: S) -> Self::Service {
        Gate {
            inner,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// A `tower::Service` that rate-limits requests per derived client identity
/// before forwarding them to `inner`.
pub struct Gate<S, Id, Rej> {
    inner: S,
    shared: Arc<Shared<Id, Rej>>,
}

impl<S: Clone, Id, Rej> Clone for Gate<S, Id, Rej> {
    fn clone(&self) -> Self {
        Gate {
            inner: self.inner.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: std::fmt::Debug, Id, Rej> std::fmt::Debug for Gate<S, Id, Rej> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate").field("inner", &self.inner).finish()
    }
}

impl<S, Req, Id, Rej> Service<Req> for Gate<S, Id, Rej>
where
    S: Service<Req>,
    S::Future: Send + 'static,
    Req: TimestampedRequest + ConnectionInfo + Send + 'static,
    Id: IdentityFn<Req>,
    Rej: RejectionHandler<Req, S::Response, S::Error>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = GateFuture<S::Future, Rej::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // The gate itself never applies backpressure; admission control
        // happens per-request in `call`, matching §4.H's "no per-line
        // pseudocode" contract that step 1 onward is all decided at call
        // time, keyed off that request's own identity.
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let shared = Arc::clone(&self.shared);

        // Step 1: loose pre-check so a table already at capacity short
        // circuits before paying for identity derivation at all.
        if shared.table.size() > shared.table_capacity_hint() {
            debug!("tracker table over capacity, rejecting before identity resolution");
            return GateFuture::reject(shared.reject.reject(req));
        }

        // Step 2: identity resolution; null means "reject without
        // admitting to the table".
        let id = match shared.identity.identify(&req) {
            Some(id) => id,
            None => {
                trace!("identity function returned null, rejecting");
                return GateFuture::reject(shared.reject.reject(req));
            }
        };

        // Step 3: acquire or create the tracker for `id` atomically.
        let tracker = match shared.table.get_or_create(&id) {
            Some(tracker) => tracker,
            None => {
                debug!(identity = %id, "tracker table full, rejecting new identity");
                return GateFuture::reject(shared.reject.reject(req));
            }
        };

        // Step 4: observe inside the tracker's own lock, binding the
        // canonical `now` to the request's own arrival time where the
        // caller supplies one, falling back to the filter's own clock.
        let now = req
            .begin_time_nanos()
            .unwrap_or_else(|| shared.clock.now_nanos());
        let exceeded = tracker.observe(now);

        if exceeded {
            // Step 6.
            debug!(identity = %id, "rate exceeded, rejecting");
            GateFuture::reject(shared.reject.reject(req))
        } else {
            // Step 5.
            GateFuture::forward(self.inner.call(req))
        }
    }
}

impl<Id, Rej> Shared<Id, Rej> {
    /// The threshold the loose, pre-identity-resolution overflow check in
    /// `call` step 1 uses. Kept identical to `max_trackers` itself; the
    /// precise, identity-aware check lives in
    /// [`TrackerTable::get_or_create`], which is what actually prevents the
    /// table from growing past its bound for genuinely new identities.
    fn table_capacity_hint(&self) -> usize {
        self.table.max_trackers_hint()
    }
}

pin_project! {
    /// The future returned by [`Gate::call`]: either forwarding to the
    /// inner service or handing off to the rejection handler.
    ///
    /// Modeled on `tower::buffer::future::ResponseFuture`'s pin-projected
    /// enum shape for a service whose future can take one of a small, fixed
    /// set of forms depending on a runtime decision made in `call`.
    #[project = GateFutureProj]
    pub enum GateFuture<F1, F2> {
        Forward { #[pin] future: F1 },
        Reject { #[pin] future: F2 },
    }
}

impl<F1, F2> GateFuture<F1, F2> {
    fn forward(future: F1) -> Self {
        GateFuture::Forward { future }
    }

    fn reject(future: F2) -> Self {
        GateFuture::Reject { future }
    }
}

impl<F1, F2, Resp, E> Future for GateFuture<F1, F2>
where
    F1: Future<Output = Result<Resp, E>>,
    F2: Future<Output = Result<Resp, E>>,
{
    type Output = Result<Resp, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project() {
            GateFutureProj::Forward { future } => future.poll(cx),
            GateFutureProj::Reject { future } => future.poll(cx),
        }
    }
}
