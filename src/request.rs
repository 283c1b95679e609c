//! Request-side capabilities the [`crate::gate::Gate`] needs from whatever
//! request type it is layered over.
//!
//! Kept as small traits rather than requiring a concrete `http::Request<B>`
//! so the filter can sit in front of any `tower::Service`, not just an HTTP
//! stack — the same shape `tower`'s own `Load`/`Instrument` traits use to
//! stay generic over the request type.

use std::net::SocketAddr;

/// Gives the [`crate::estimator::RateEstimator`] a monotonic arrival time
/// for the request, independent of when the `Gate` actually gets scheduled
/// to poll it.
///
/// Most callers can ignore this and let [`crate::gate::Gate`] stamp the
/// request with the filter's own [`crate::clock::Clock`] at `call` time;
/// it exists so a caller that already timestamps requests upstream (e.g. at
/// the edge of a load balancer) can supply that timestamp instead.
pub trait TimestampedRequest {
    /// The request's arrival time, in nanoseconds since the same epoch the
    /// filter's [`crate::clock::Clock`] uses. Returning `None` tells the
    /// `Gate` to stamp the request itself.
    fn begin_time_nanos(&self) -> Option<u64> {
        None
    }
}

/// Connection-level metadata an [`crate::identity::IdentityFn`] may need to
/// derive a client identity (remote address, a load balancer's opaque
/// connection id, and so on).
pub trait ConnectionInfo {
    /// The peer socket address, if the transport exposes one.
    fn remote_socket_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// An opaque, transport-assigned connection identifier (e.g. an HTTP/2
    /// stream's parent connection, or a Unix socket's file descriptor),
    /// for deployments behind a proxy that strips the real address.
    fn connection_id(&self) -> Option<u64> {
        None
    }
}

// A blanket default so any `http::Request<B>` satisfies both traits with
// "unknown" answers out of the box; callers opt in to richer identities by
// implementing these traits on their own request wrapper type instead.
impl<B> TimestampedRequest for http::Request<B> {}
impl<B> ConnectionInfo for http::Request<B> {}
