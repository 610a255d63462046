//! Per-connection orchestration: read one request, resolve it, serve each
//! endpoint from the cache (binding on miss), and terminate the response.

use crate::cache::LruCache;
use crate::fdpass::{self, FdPassError};
use crate::key::CacheKey;
use crate::request::{apply_limit, parse_request};
use crate::resolver::resolve;
use crate::socket_factory::{bind_listen, FactoryError};
use std::os::unix::io::{AsRawFd, OwnedFd};
use std::os::unix::net::UnixStream;

const MAX_REQUEST_BYTES: usize = 8192;
const DIAGNOSTIC_FAILURE: &[u8] = b"getaddrinfo failed!";
const TERMINATOR: &[u8] = b"!";
const CHUNK: &[u8] = b".";

/// Bits always ORed into the resolver flags: request the canonical name and
/// restrict results to addresses suitable for binding.
pub const ALWAYS_SET_FLAGS: i32 = libc::AI_CANONNAME | libc::AI_PASSIVE;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("descriptor transfer failed: {0}")]
    Transfer(#[from] FdPassError),
}

/// Outcome of handling one connection, for logging/backoff at the loop level.
pub enum Outcome {
    /// The client disconnected without sending anything.
    EmptyRequest,
    /// The request was malformed or failed to resolve; diagnostic sent.
    Rejected,
    /// `n` endpoints were served, including 0.
    Served(usize),
}

/// Handle a single accepted connection to completion.
pub fn handle_connection(
    stream: &UnixStream,
    cache: &mut LruCache<OwnedFd>,
) -> Result<Outcome, HandlerError> {
    let mut buf = [0u8; MAX_REQUEST_BYTES];
    let n = std::io::Read::read(&mut &*stream, &mut buf)?;
    if n == 0 {
        return Ok(Outcome::EmptyRequest);
    }

    let line = String::from_utf8_lossy(&buf[..n]);
    let parsed = match parse_request(&line, ALWAYS_SET_FLAGS) {
        Ok(p) => p,
        Err(_) => {
            fdpass::send_plain(stream, DIAGNOSTIC_FAILURE)?;
            return Ok(Outcome::Rejected);
        }
    };

    let resolved = match resolve(
        parsed.host.as_deref(),
        parsed.port.as_deref(),
        parsed.family,
        parsed.sock_type,
        parsed.proto,
        parsed.flags,
    ) {
        Ok(endpoints) => endpoints,
        Err(_) => {
            fdpass::send_plain(stream, DIAGNOSTIC_FAILURE)?;
            return Ok(Outcome::Rejected);
        }
    };

    let endpoints = apply_limit(resolved, parsed.limit);
    let uid_is_empty = parsed.uid.is_empty();
    let mut served = 0usize;

    for endpoint in &endpoints {
        let key = CacheKey::new(
            parsed.uid.clone(),
            endpoint.family,
            endpoint.sock_type,
            endpoint.proto,
            endpoint.canonical_name.clone(),
            endpoint.addr,
        );

        let (fd, freshly_created) = match cache.get_touch(&key) {
            Some(existing) => (existing.as_raw_fd(), false),
            None => match bind_listen(endpoint, uid_is_empty) {
                Ok(owned) => {
                    let raw = owned.as_raw_fd();
                    cache.insert(key.clone(), owned);
                    (raw, true)
                }
                Err(FactoryError::ReusePortUnavailable) | Err(FactoryError::Io(_)) => continue,
            },
        };

        match fdpass::send_fd(stream, CHUNK, fd) {
            Ok(()) => served += 1,
            Err(e) => {
                if freshly_created {
                    cache.remove(&key);
                }
                return Err(e.into());
            }
        }
    }

    fdpass::send_plain(stream, TERMINATOR)?;
    Ok(Outcome::Served(served))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_returns_without_writing() {
        let (client, server) = UnixStream::pair().unwrap();
        drop(client);
        let mut cache: LruCache<OwnedFd> = LruCache::new(8);
        let outcome = handle_connection(&server, &mut cache).unwrap();
        assert!(matches!(outcome, Outcome::EmptyRequest));
    }

    #[test]
    fn malformed_request_sends_diagnostic() {
        let (client, server) = UnixStream::pair().unwrap();
        std::io::Write::write_all(&mut &client, b"core0").unwrap();
        let mut cache: LruCache<OwnedFd> = LruCache::new(8);
        let outcome = handle_connection(&server, &mut cache).unwrap();
        assert!(matches!(outcome, Outcome::Rejected));

        let mut buf = [0u8; 64];
        let n = std::io::Read::read(&mut &client, &mut buf).unwrap();
        assert_eq!(&buf[..n], DIAGNOSTIC_FAILURE);
    }

    #[test]
    fn zero_limit_sends_only_terminator() {
        let (client, server) = UnixStream::pair().unwrap();
        std::io::Write::write_all(&mut &client, b"core0 127.0.0.1:0 2 1 0 0 0").unwrap();
        let mut cache: LruCache<OwnedFd> = LruCache::new(8);
        let outcome = handle_connection(&server, &mut cache).unwrap();
        assert!(matches!(outcome, Outcome::Served(0)));

        let mut buf = [0u8; 64];
        let (n, fd) = fdpass::recv_fd(&client, &mut buf).unwrap();
        assert_eq!(&buf[..n], TERMINATOR);
        assert!(fd.is_none());
    }

    #[test]
    fn repeated_request_reuses_the_cached_socket() {
        let mut cache: LruCache<OwnedFd> = LruCache::new(8);

        let (client1, server1) = UnixStream::pair().unwrap();
        std::io::Write::write_all(&mut &client1, b"core0 127.0.0.1:0 2 1 0 0 1").unwrap();
        handle_connection(&server1, &mut cache).unwrap();
        let mut buf = [0u8; 64];
        let (_, fd1) = fdpass::recv_fd(&client1, &mut buf).unwrap();
        let fd1 = fd1.unwrap();
        let local1 = unsafe {
            use std::os::unix::io::FromRawFd;
            std::net::TcpListener::from_raw_fd(fd1).local_addr().unwrap()
        };

        let (client2, server2) = UnixStream::pair().unwrap();
        let req2 = format!("core0 127.0.0.1:{} 2 1 0 0 1", local1.port());
        std::io::Write::write_all(&mut &client2, req2.as_bytes()).unwrap();
        handle_connection(&server2, &mut cache).unwrap();
        let (_, fd2) = fdpass::recv_fd(&client2, &mut buf).unwrap();
        assert!(fd2.is_some());
        assert_eq!(cache.len(), 1);
    }
}
