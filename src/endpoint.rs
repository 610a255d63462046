//! Local control endpoint lifecycle: umask-scoped bind, stale-node removal,
//! and cleanup-on-exit.
//!
//! Mirrors the original daemon's bind sequence: set a temporary umask,
//! unlink any pre-existing node at the path (ignoring "doesn't exist"),
//! bind, restore the umask, then listen with the same backlog the cached
//! sockets use.

use crate::cli::UmaskMode;
use anyhow::{Context, Result};
use socket2::{Domain, SockAddr, Socket, Type};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

const BACKLOG: i32 = 128;

fn umask_for(mode: UmaskMode) -> libc::mode_t {
    match mode {
        UmaskMode::Default => {
            // Leave the process umask untouched; restore the same value.
            unsafe {
                let current = libc::umask(0);
                libc::umask(current);
                current
            }
        }
        UmaskMode::WorldWritable => 0,
        UmaskMode::GroupAccessible => 0o007,
        UmaskMode::UserOnly => 0o077,
    }
}

/// Bind the local control endpoint at `path`, applying `mode`'s umask only
/// for the duration of the bind.
pub fn bind(path: &Path, mode: UmaskMode) -> Result<UnixListener> {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("removing stale endpoint at {}", path.display())),
    }

    let wanted = umask_for(mode);
    let previous = unsafe { libc::umask(wanted) };

    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)
        .with_context(|| "creating control endpoint socket");
    let bind_result = socket.and_then(|s| {
        let addr = SockAddr::unix(path)?;
        s.bind(&addr)?;
        s.listen(BACKLOG)?;
        Ok(s)
    });

    unsafe { libc::umask(previous) };

    let socket = bind_result.with_context(|| format!("binding control endpoint at {}", path.display()))?;
    Ok(socket.into())
}

/// Removes the endpoint path on drop, unless disarmed (e.g. because
/// privileges were dropped and the process may no longer have permission).
pub struct CleanupGuard {
    path: Option<PathBuf>,
}

impl CleanupGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Disarm cleanup; used when privilege drop makes unlink unreliable.
    pub fn disarm(&mut self) {
        self.path = None;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_sock_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("reuseportd-endpoint-test-{}-{}.sock", std::process::id(), name))
    }

    #[test]
    fn binds_and_replaces_a_stale_node() {
        let path = temp_sock_path("stale");
        std::fs::write(&path, b"stale").unwrap();
        let _listener = bind(&path, UmaskMode::Default).expect("bind should replace the stale file");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn cleanup_guard_removes_path_on_drop() {
        let path = temp_sock_path("cleanup");
        let listener = bind(&path, UmaskMode::UserOnly).unwrap();
        {
            let _guard = CleanupGuard::new(path.clone());
        }
        assert!(!path.exists());
        drop(listener);
    }

    #[test]
    fn disarmed_guard_leaves_path_in_place() {
        let path = temp_sock_path("disarmed");
        let listener = bind(&path, UmaskMode::Default).unwrap();
        {
            let mut guard = CleanupGuard::new(path.clone());
            guard.disarm();
        }
        assert!(path.exists());
        drop(listener);
        std::fs::remove_file(&path).ok();
    }
}
