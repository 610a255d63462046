//! Process-wide signal flags and the daemon's bundled mutable state.
//!
//! Signal handlers cannot close over non-`'static` state, so the flags they
//! set live in process-wide statics; everything else (the cache, the
//! listener, the failure counter) lives in [`DaemonContext`], which the
//! event loop owns directly.

use crate::cache::LruCache;
use std::os::unix::io::OwnedFd;
use std::os::unix::net::UnixListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static TERMINATED: AtomicBool = AtomicBool::new(false);
static RESET: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_terminate(_: libc::c_int) {
    TERMINATED.store(true, Ordering::SeqCst);
}

extern "C" fn handle_reset(_: libc::c_int) {
    RESET.store(true, Ordering::SeqCst);
}

/// Install handlers for SIGTERM, SIGINT (treated identically to SIGTERM),
/// and SIGHUP (cache reset). Handlers only set flags; all work happens at
/// loop boundaries in [`crate::event_loop::run`].
pub fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, handle_terminate as *const () as libc::sighandler_t);
        libc::signal(libc::SIGINT, handle_terminate as *const () as libc::sighandler_t);
        libc::signal(libc::SIGHUP, handle_reset as *const () as libc::sighandler_t);
    }
}

pub fn is_terminated() -> bool {
    TERMINATED.load(Ordering::SeqCst)
}

/// Consume the reset flag, returning whether it was set.
pub fn take_reset() -> bool {
    RESET.swap(false, Ordering::SeqCst)
}

/// Bundled daemon state: the cache, the accept-side listener, and the
/// tunables that shape eviction and timeouts.
pub struct DaemonContext {
    pub listener: UnixListener,
    pub cache: LruCache<OwnedFd>,
    pub keepalive: Duration,
    pub client_timeout: Duration,
}

impl DaemonContext {
    pub fn new(listener: UnixListener, capacity: usize, keepalive: Duration, client_timeout: Duration) -> Self {
        Self {
            listener,
            cache: LruCache::new(capacity),
            keepalive,
            client_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_flag_is_consumed_once() {
        RESET.store(true, Ordering::SeqCst);
        assert!(take_reset());
        assert!(!take_reset());
    }
}
