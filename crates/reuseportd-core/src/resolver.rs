//! Address resolution via `getaddrinfo(3)`, called directly through `libc`.
//!
//! Numeric `family`/`sock_type`/`proto`/`flags` are passed through to the
//! system resolver verbatim rather than mapped through a typed hints enum,
//! so the wire request's arbitrary numeric values are honored exactly as
//! given instead of being rejected or coerced.

use std::ffi::{CStr, CString};
use std::net::SocketAddr;
use std::ptr;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("getaddrinfo failed: {0}")]
    GetAddrInfo(String),
    #[error("host or service name contains an interior nul byte")]
    InteriorNul,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub family: i32,
    pub sock_type: i32,
    pub proto: i32,
    pub canonical_name: String,
    pub addr: SocketAddr,
}

/// Resolve `host`/`port` with the given numeric hints, mirroring
/// `getaddrinfo(host, port, &hints, &mut res)`.
pub fn resolve(
    host: Option<&str>,
    port: Option<&str>,
    family: i32,
    sock_type: i32,
    proto: i32,
    flags: i32,
) -> Result<Vec<ResolvedEndpoint>, ResolveError> {
    let host_c = host.map(CString::new).transpose().map_err(|_| ResolveError::InteriorNul)?;
    let port_c = port.map(CString::new).transpose().map_err(|_| ResolveError::InteriorNul)?;

    let mut hints: libc::addrinfo = unsafe { std::mem::zeroed() };
    hints.ai_family = family;
    hints.ai_socktype = sock_type;
    hints.ai_protocol = proto;
    hints.ai_flags = flags;

    let mut res: *mut libc::addrinfo = ptr::null_mut();
    let rc = unsafe {
        libc::getaddrinfo(
            host_c.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
            port_c.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
            &hints,
            &mut res,
        )
    };

    if rc != 0 {
        let msg = unsafe { CStr::from_ptr(libc::gai_strerror(rc)) }
            .to_string_lossy()
            .into_owned();
        return Err(ResolveError::GetAddrInfo(msg));
    }

    let mut out = Vec::new();
    let mut cur = res;
    while !cur.is_null() {
        let ai = unsafe { &*cur };
        if let Some(addr) = sockaddr_to_std(ai.ai_addr, ai.ai_addrlen) {
            let canonical_name = if !ai.ai_canonname.is_null() {
                unsafe { CStr::from_ptr(ai.ai_canonname) }.to_string_lossy().into_owned()
            } else {
                String::new()
            };
            out.push(ResolvedEndpoint {
                family: ai.ai_family,
                sock_type: ai.ai_socktype,
                proto: ai.ai_protocol,
                canonical_name,
                addr,
            });
        }
        cur = ai.ai_next;
    }

    unsafe { libc::freeaddrinfo(res) };
    Ok(out)
}

fn sockaddr_to_std(sa: *const libc::sockaddr, len: libc::socklen_t) -> Option<SocketAddr> {
    if sa.is_null() {
        return None;
    }
    let family = unsafe { (*sa).sa_family as i32 };
    match family {
        libc::AF_INET => {
            if (len as usize) < std::mem::size_of::<libc::sockaddr_in>() {
                return None;
            }
            let sin = unsafe { &*(sa as *const libc::sockaddr_in) };
            let ip = std::net::Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
            let port = u16::from_be(sin.sin_port);
            Some(SocketAddr::new(ip.into(), port))
        }
        libc::AF_INET6 => {
            if (len as usize) < std::mem::size_of::<libc::sockaddr_in6>() {
                return None;
            }
            let sin6 = unsafe { &*(sa as *const libc::sockaddr_in6) };
            let ip = std::net::Ipv6Addr::from(sin6.sin6_addr.s6_addr);
            let port = u16::from_be(sin6.sin6_port);
            Some(SocketAddr::new(ip.into(), port))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_loopback_numeric_host_and_port() {
        let got = resolve(
            Some("127.0.0.1"),
            Some("0"),
            libc::AF_INET,
            libc::SOCK_STREAM,
            0,
            libc::AI_NUMERICHOST | libc::AI_NUMERICSERV,
        )
        .expect("resolve should succeed for a numeric loopback host");
        assert!(!got.is_empty());
        assert_eq!(got[0].family, libc::AF_INET);
    }

    #[test]
    fn invalid_service_name_fails() {
        let got = resolve(
            Some("127.0.0.1"),
            Some("not-a-port-or-service-name"),
            libc::AF_INET,
            libc::SOCK_STREAM,
            0,
            libc::AI_NUMERICHOST,
        );
        assert!(got.is_err());
    }
}
