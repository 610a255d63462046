//! The cooperative accept loop: bounded-wait accept, signal-flag polling,
//! keepalive eviction, and failure-count backoff.

use crate::context::{self, DaemonContext};
use crate::handler::{handle_connection, Outcome};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

/// How long a single accept wait blocks before the loop re-checks signal
/// flags and runs keepalive eviction again.
const ACCEPT_WAIT: Duration = Duration::from_secs(1);
/// Consecutive-failure threshold before the loop starts throttling itself.
const FAILURE_THRESHOLD: u32 = 2;
/// Sleep applied once the threshold is exceeded, to avoid hot-looping on a
/// persistent fault (e.g. a full file-descriptor table).
const BACKOFF: Duration = Duration::from_millis(500);

/// Run the accept loop until a termination signal is observed.
pub fn run(ctx: &mut DaemonContext) -> io::Result<()> {
    let mut consecutive_failures = 0u32;

    while !context::is_terminated() {
        io::stdout().flush().ok();
        io::stderr().flush().ok();

        if context::take_reset() {
            let evicted = ctx.cache.clear();
            if !evicted.is_empty() {
                tracing::info!(count = evicted.len(), "cache reset, closed all cached sockets");
            }
        }

        let stale = ctx.cache.evict_stale(ctx.keepalive);
        if !stale.is_empty() {
            let keys: Vec<String> = stale.iter().map(|(k, _)| k.to_string()).collect();
            tracing::info!(count = keys.len(), keys = ?keys, "evicted stale cache entries");
        }

        match accept_with_timeout(ctx, ACCEPT_WAIT) {
            Ok(None) => continue, // accept timed out; loop around
            Ok(Some(stream)) => {
                stream.set_read_timeout(Some(ctx.client_timeout)).ok();
                stream.set_write_timeout(Some(ctx.client_timeout)).ok();

                match handle_connection(&stream, &mut ctx.cache) {
                    Ok(Outcome::EmptyRequest) => {}
                    Ok(Outcome::Rejected) => {}
                    Ok(Outcome::Served(_)) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "request handling failed");
                        consecutive_failures += 1;
                        if consecutive_failures > FAILURE_THRESHOLD {
                            std::thread::sleep(BACKOFF);
                        }
                        continue;
                    }
                }
                consecutive_failures = 0;
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                consecutive_failures += 1;
                if consecutive_failures > FAILURE_THRESHOLD {
                    std::thread::sleep(BACKOFF);
                }
            }
        }
    }

    Ok(())
}

/// `accept()` bounded by `timeout`, implemented with `libc::poll` since
/// `std::os::unix::net::UnixListener` has no native accept timeout.
fn accept_with_timeout(
    ctx: &DaemonContext,
    timeout: Duration,
) -> io::Result<Option<std::os::unix::net::UnixStream>> {
    let fd = ctx.listener.as_raw_fd();
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };

    let rc = unsafe { libc::poll(&mut pfd, 1, timeout.as_millis() as libc::c_int) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(None);
        }
        return Err(err);
    }
    if rc == 0 {
        return Ok(None);
    }

    let (stream, _addr) = ctx.listener.accept()?;
    Ok(Some(stream))
}
