//! Creates bound, listening sockets for a resolved endpoint.
//!
//! `SO_REUSEADDR` is always set. `SO_REUSEPORT` is set when the platform
//! exposes it; callers whose key carries a non-empty `uid` on a platform
//! without it are rejected, since membership in a port-reuse set is then
//! meaningless.

use crate::resolver::ResolvedEndpoint;
use socket2::{Domain, Protocol, Socket, Type};
use std::os::unix::io::{FromRawFd, IntoRawFd, OwnedFd};
#[cfg(test)]
use std::net::TcpListener;

const BACKLOG: i32 = 128;

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("socket reuse-port requested via non-empty uid but SO_REUSEPORT is unavailable")]
    ReusePortUnavailable,
    #[error("socket setup failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Create, configure, bind, and listen on a socket for `endpoint`.
///
/// `uid_is_empty` reflects whether the cache key's `uid` is the empty
/// string; when `SO_REUSEPORT` cannot be set, a non-empty `uid` is a
/// programming error per the bind policy, not a silent fallback.
pub fn bind_listen(endpoint: &ResolvedEndpoint, uid_is_empty: bool) -> Result<OwnedFd, FactoryError> {
    let domain = Domain::from(endpoint.family);
    let ty = Type::from(endpoint.sock_type);
    let proto = if endpoint.proto != 0 {
        Some(Protocol::from(endpoint.proto))
    } else {
        None
    };
    let socket = Socket::new(domain, ty, proto)?;

    socket.set_reuse_address(true)?;

    if set_reuse_port(&socket).is_err() && !uid_is_empty {
        return Err(FactoryError::ReusePortUnavailable);
    }

    socket.bind(&endpoint.addr.into())?;
    socket.listen(BACKLOG)?;

    let fd = socket.into_raw_fd();
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

#[cfg(unix)]
fn set_reuse_port(socket: &Socket) -> std::io::Result<()> {
    socket.set_reuse_port(true)
}

#[cfg(not(unix))]
fn set_reuse_port(_socket: &Socket) -> std::io::Result<()> {
    Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "SO_REUSEPORT unavailable"))
}

/// Test helper: bind a loopback listener the same way the factory does,
/// without going through `getaddrinfo`.
#[cfg(test)]
pub(crate) fn bind_loopback_for_test() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").expect("loopback bind should succeed in test sandbox")
}
