//! Component G: rejection handlers for requests that exceed their rate.

use crate::clock::Clock;
use crate::scheduler::Scheduler;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::warn;

/// Builds a response carrying a given HTTP-style status code.
///
/// A small conversion trait rather than hard-coding `http::Response`, so a
/// [`RejectionHandler`] can be used in front of a non-HTTP `tower::Service`
/// whose response type still has some notion of a status.
pub trait RejectResponse {
    fn reject_response(status: u16) -> Self;
}

impl<B: Default> RejectResponse for http::Response<B> {
    fn reject_response(status: u16) -> Self {
        let mut resp = http::Response::new(B::default());
        *resp.status_mut() =
            http::StatusCode::from_u16(status).unwrap_or(http::StatusCode::TOO_MANY_REQUESTS);
        resp
    }
}

/// Produces the response (or error) written for a rejected request.
///
/// Mirrors `tower_service::Service` deliberately (a `reject` "call" and an
/// associated `Future`) so both [`ImmediateReject`] and [`DelayedReject`]
/// compose the same way a `tower::Service` would inside [`crate::gate::Gate`].
pub trait RejectionHandler<Req, Resp, E>: Send + Sync + 'static {
    type Future: Future<Output = Result<Resp, E>> + Send + 'static;

    fn reject(&self, req: Req) -> Self::Future;
}

/// Rejects immediately with a fixed status code.
#[derive(Debug, Clone, Copy)]
pub struct ImmediateReject {
    status: u16,
}

impl ImmediateReject {
    pub fn new(status: u16) -> Self {
        ImmediateReject { status }
    }
}

impl<Req, Resp, E> RejectionHandler<Req, Resp, E> for ImmediateReject
where
    Req: Send + 'static,
    Resp: RejectResponse + Send + 'static,
    E: Send + 'static,
{
    type Future = std::future::Ready<Result<Resp, E>>;

    fn reject(&self, _req: Req) -> Self::Future {
        std::future::ready(Ok(Resp::reject_response(self.status)))
    }
}

struct QueueEntry<Resp, E> {
    deadline_nanos: u64,
    tx: oneshot::Sender<Result<Resp, E>>,
}

struct Inner<Resp, E> {
    status: u16,
    delay: Duration,
    max_queue: usize,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    queue: Mutex<VecDeque<QueueEntry<Resp, E>>>,
    armed: AtomicBool,
}

/// Rejects after holding the request for a configured delay, up to a bounded
/// queue depth.
///
/// Grounded on `tower::buffer::Worker`'s decoupling of "enqueue a request"
/// from "a background task eventually resolves it" via a `oneshot` channel
/// per request, and on `tower::buffer`'s bounded-channel backpressure model
/// for the queue depth limit. Unlike `tower::buffer`, a full queue does not
/// backpressure the caller — consistent with `SPEC_FULL.md` §4.G, the
/// oldest queued entry is dropped (and answered immediately) to make room,
/// since every entry is itself heading toward a rejection response and a
/// request.
pub struct DelayedReject<Resp, E> {
    inner: Arc<Inner<Resp, E>>,
}

impl<Resp, E> Clone for DelayedReject<Resp, E> {
    fn clone(&self) -> Self {
        DelayedReject {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Resp, E> std::fmt::Debug for DelayedReject<Resp, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedReject")
            .field("status", &self.inner.status)
            .field("delay", &self.inner.delay)
            .field("max_queue", &self.inner.max_queue)
            .finish()
    }
}

impl<Resp, E> DelayedReject<Resp, E>
where
    Resp: RejectResponse + Send + 'static,
    E: Send + 'static,
{
    pub fn new(
        status: u16,
        delay: Duration,
        max_queue: usize,
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        DelayedReject {
            inner: Arc::new(Inner {
                status,
                delay,
                max_queue,
                clock,
                scheduler,
                queue: Mutex::new(VecDeque::new()),
                armed: AtomicBool::new(false),
            }),
        }
    }

    /// Enqueues a new rejection, head-dropping the oldest queued entry under
    /// saturation, and arms the tick task if it is not already running.
    fn enqueue(&self) -> oneshot::Receiver<Result<Resp, E>> {
        let (tx, rx) = oneshot::channel();
        let now = self.inner.clock.now_nanos();
        let deadline_nanos = now + self.inner.delay.as_nanos() as u64;
        let entry = QueueEntry { deadline_nanos, tx };

        let dropped = {
            let mut queue = self.inner.queue.lock().unwrap_or_else(|e| e.into_inner());
            if queue.len() >= self.inner.max_queue {
                let dropped = queue.pop_front();
                queue.push_back(entry);
                dropped
            } else {
                queue.push_back(entry);
                None
            }
        };

        if let Some(dropped) = dropped {
            warn!(
                max_queue = self.inner.max_queue,
                "delayed rejection queue saturated, head-dropping oldest entry"
            );
            let _ = dropped.tx.send(Ok(Resp::reject_response(self.inner.status)));
        }

        if !self.inner.armed.swap(true, Ordering::AcqRel) {
            Self::spawn_tick(Arc::clone(&self.inner));
        }

        rx
    }

    /// Runs the recurring tick loop: every `delay / 2`, drains every entry
    /// whose deadline has passed and answers it, going dormant (clearing
    /// `armed`) once the queue empties.
    fn spawn_tick(inner: Arc<Inner<Resp, E>>) {
        let period = inner.delay / 2;
        let period = if period.as_nanos() == 0 {
            Duration::from_millis(1)
        } else {
            period
        };
        let scheduler = Arc::clone(&inner.scheduler);
        scheduler.spawn(Box::pin(async move {
            loop {
                tokio::time::sleep(period).await;
                let now = inner.clock.now_nanos();
                let due: Vec<QueueEntry<Resp, E>> = {
                    let mut queue = inner.queue.lock().unwrap_or_else(|e| e.into_inner());
                    let mut due = Vec::new();
                    while let Some(front) = queue.front() {
                        if front.deadline_nanos <= now {
                            due.push(queue.pop_front().unwrap());
                        } else {
                            break;
                        }
                    }
                    due
                };
                for entry in due {
                    let _ = entry.tx.send(Ok(Resp::reject_response(inner.status)));
                }

                let empty = inner.queue.lock().unwrap_or_else(|e| e.into_inner()).is_empty();
                if empty {
                    inner.armed.store(false, Ordering::Release);
                    return;
                }
            }
        }));
    }
}

/// The future returned by [`DelayedReject::reject`].
#[derive(Debug)]
pub struct DelayedRejectFuture<Resp, E> {
    rx: oneshot::Receiver<Result<Resp, E>>,
}

impl<Resp, E> Future for DelayedRejectFuture<Resp, E> {
    type Output = Result<Resp, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => panic!("DelayedReject tick task dropped without answering"),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<Req, Resp, E> RejectionHandler<Req, Resp, E> for DelayedReject<Resp, E>
where
    Req: Send + 'static,
    Resp: RejectResponse + Send + 'static,
    E: Send + 'static,
{
    type Future = DelayedRejectFuture<Resp, E>;

    fn reject(&self, _req: Req) -> Self::Future {
        DelayedRejectFuture {
            rx: self.enqueue(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use crate::scheduler::TokioScheduler;

    #[derive(Debug, Default)]
    struct Body;

    #[tokio::test]
    async fn immediate_reject_returns_configured_status() {
        let handler = ImmediateReject::new(420);
        let resp: http::Response<Body> = handler.reject(()).await.unwrap();
        assert_eq!(resp.status(), 420);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_reject_resolves_after_delay() {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new());
        let handler: DelayedReject<http::Response<Body>, std::convert::Infallible> =
            DelayedReject::new(420, Duration::from_millis(100), 10, clock, scheduler);

        let fut = handler.reject(());
        tokio::time::advance(Duration::from_millis(150)).await;
        let resp = fut.await.unwrap();
        assert_eq!(resp.status(), 420);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_queue_head_drops_oldest() {
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::new());
        let handler: DelayedReject<http::Response<Body>, std::convert::Infallible> =
            DelayedReject::new(420, Duration::from_millis(1000), 1, clock, scheduler);

        let oldest = handler.reject(());
        let _newest = handler.reject(());

        // The oldest was dropped immediately to make room, well before the
        // configured delay elapses.
        tokio::time::advance(Duration::from_millis(1)).await;
        let resp = oldest.await.unwrap();
        assert_eq!(resp.status(), 420);
    }
}
