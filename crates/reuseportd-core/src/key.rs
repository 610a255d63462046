//! Cache key identifying a single resolved, bindable endpoint.

use std::net::SocketAddr;

/// Everything that distinguishes one cached listening socket from another.
///
/// `uid` groups clients that should share a kernel port-reuse set; on a
/// platform where `SO_REUSEPORT` could not be set, every key must carry an
/// empty `uid` (enforced by the socket factory, not here).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub uid: String,
    pub family: i32,
    pub sock_type: i32,
    pub proto: i32,
    pub canonical_name: String,
    pub addr: SocketAddr,
}

impl CacheKey {
    pub fn new(
        uid: impl Into<String>,
        family: i32,
        sock_type: i32,
        proto: i32,
        canonical_name: impl Into<String>,
        addr: SocketAddr,
    ) -> Self {
        Self {
            uid: uid.into(),
            family,
            sock_type,
            proto,
            canonical_name: canonical_name.into(),
            addr,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "uid={:?} family={} type={} proto={} name={:?} addr={}",
            self.uid, self.family, self.sock_type, self.proto, self.canonical_name, self.addr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn keys_with_same_fields_are_equal() {
        let a = CacheKey::new("core0", 2, 1, 6, "localhost", addr(8080));
        let b = CacheKey::new("core0", 2, 1, 6, "localhost", addr(8080));
        assert_eq!(a, b);
    }

    #[test]
    fn differing_uid_changes_identity() {
        let a = CacheKey::new("core0", 2, 1, 6, "localhost", addr(8080));
        let b = CacheKey::new("core1", 2, 1, 6, "localhost", addr(8080));
        assert_ne!(a, b);
    }
}
