//! Component F: pluggable client identity derivation.

use crate::request::ConnectionInfo;
use std::fmt;

/// Derives a client identity string from a request.
///
/// Returning `None` maps the request onto the shared `""` bucket (see
/// `SPEC_FULL.md` §4.F); this is deliberate, not an error, for requests the
/// identity function cannot or should not distinguish (e.g. no peer address
/// available behind a proxy that strips it).
pub trait IdentityFn<Req>: fmt::Debug + Send + Sync + 'static {
    /// Computes the identity key used to look up this request's
    /// [`crate::tracker::Tracker`] in the [`crate::table::TrackerTable`].
    fn identify(&self, req: &Req) -> Option<String>;
}

impl<Req, F> IdentityFn<Req> for F
where
    F: Fn(&Req) -> Option<String> + Send + Sync + 'static,
{
    fn identify(&self, req: &Req) -> Option<String> {
        (self)(req)
    }
}

impl<Req> fmt::Debug for dyn IdentityFn<Req> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn IdentityFn")
    }
}

/// Identifies a client by remote IP address alone, ignoring the port.
///
/// The common choice for services sitting directly in front of clients,
/// where a single client may open many short-lived connections from
/// different ephemeral ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteAddress;

impl<Req: ConnectionInfo> IdentityFn<Req> for RemoteAddress {
    fn identify(&self, req: &Req) -> Option<String> {
        req.remote_socket_addr().map(|addr| addr.ip().to_string())
    }
}

/// Identifies a client by remote IP address and port together.
///
/// Useful behind a NAT gateway where distinct clients can share one public
/// IP but never share a source port at the same instant.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteAddressPort;

impl<Req: ConnectionInfo> IdentityFn<Req> for RemoteAddressPort {
    fn identify(&self, req: &Req) -> Option<String> {
        req.remote_socket_addr().map(|addr| addr.to_string())
    }
}

/// Identifies a client by remote port alone.
///
/// Rarely correct on its own; kept because a reverse proxy that multiplexes
/// distinct upstream clients onto fixed, client-assigned source ports can
/// make this meaningful, and it's a one-line change from [`RemoteAddress`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RemotePort;

impl<Req: ConnectionInfo> IdentityFn<Req> for RemotePort {
    fn identify(&self, req: &Req) -> Option<String> {
        req.remote_socket_addr().map(|addr| addr.port().to_string())
    }
}

/// Identifies a client by the transport's opaque connection id, for
/// deployments where [`ConnectionInfo::remote_socket_addr`] is unavailable
/// (e.g. behind a proxy that forwards over a Unix socket).
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionId;

impl<Req: ConnectionInfo> IdentityFn<Req> for ConnectionId {
    fn identify(&self, req: &Req) -> Option<String> {
        req.connection_id().map(|id| id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeReq(Option<std::net::SocketAddr>, Option<u64>);

    impl ConnectionInfo for FakeReq {
        fn remote_socket_addr(&self) -> Option<std::net::SocketAddr> {
            self.0
        }
        fn connection_id(&self) -> Option<u64> {
            self.1
        }
    }

    #[test]
    fn remote_address_drops_port() {
        let req = FakeReq(Some("10.0.0.1:4242".parse().unwrap()), None);
        assert_eq!(RemoteAddress.identify(&req), Some("10.0.0.1".to_string()));
    }

    #[test]
    fn remote_address_port_keeps_both() {
        let req = FakeReq(Some("10.0.0.1:4242".parse().unwrap()), None);
        assert_eq!(
            RemoteAddressPort.identify(&req),
            Some("10.0.0.1:4242".to_string())
        );
    }

    #[test]
    fn missing_address_yields_none() {
        let req = FakeReq(None, None);
        assert_eq!(RemoteAddress.identify(&req), None);
    }

    #[test]
    fn closure_impl_works_as_identity_fn() {
        let id: &dyn IdentityFn<FakeReq> = &(|_: &FakeReq| Some("fixed".to_string()));
        let req = FakeReq(None, None);
        assert_eq!(id.identify(&req), Some("fixed".to_string()));
    }

    #[test]
    fn connection_id_reads_opaque_id() {
        let req = FakeReq(None, Some(7));
        assert_eq!(ConnectionId.identify(&req), Some("7".to_string()));
    }
}
