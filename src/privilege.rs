//! Dropping from root to an unprivileged `user:group` after the endpoint is
//! bound. Requires the real user to be root; clears supplementary groups
//! before switching, and switches group before user.

use anyhow::{bail, Context, Result};
use std::ffi::CString;

pub struct Identity {
    pub uid: libc::uid_t,
    pub gid: libc::gid_t,
}

/// Parse a `user:group` string into numeric uid/gid via `getpwnam`/`getgrnam`.
pub fn parse_id_string(spec: &str) -> Result<Identity> {
    let (user, group) = spec
        .split_once(':')
        .with_context(|| format!("expected USER:GROUP, got {spec:?}"))?;

    let uid = lookup_user(user).with_context(|| format!("unknown user {user:?}"))?;
    let gid = lookup_group(group).with_context(|| format!("unknown group {group:?}"))?;
    Ok(Identity { uid, gid })
}

fn lookup_user(name: &str) -> Option<libc::uid_t> {
    let c_name = CString::new(name).ok()?;
    let pw = unsafe { libc::getpwnam(c_name.as_ptr()) };
    if pw.is_null() {
        None
    } else {
        Some(unsafe { (*pw).pw_uid })
    }
}

fn lookup_group(name: &str) -> Option<libc::gid_t> {
    let c_name = CString::new(name).ok()?;
    let gr = unsafe { libc::getgrnam(c_name.as_ptr()) };
    if gr.is_null() {
        None
    } else {
        Some(unsafe { (*gr).gr_gid })
    }
}

/// Set a restrictive default umask (0o077) for the remainder of the
/// process's life. Called unconditionally on every run, independent of
/// whether `-d` was given, so files created after the endpoint is bound
/// default to user-only permissions.
pub fn harden_default_umask() {
    unsafe {
        libc::umask(0o077);
    }
}

/// Clear supplementary groups, then `setgid`/`setuid` to `identity`.
///
/// Only the real superuser may do this; called with a non-root real uid is
/// a programming error in the caller, not a recoverable condition.
pub fn drop_privilege(identity: &Identity) -> Result<()> {
    let real_uid = unsafe { libc::getuid() };
    if real_uid != 0 {
        bail!("privilege drop requested but process is not running as root");
    }

    if unsafe { libc::setgroups(0, std::ptr::null()) } != 0 {
        bail!("setgroups failed: {}", std::io::Error::last_os_error());
    }
    if unsafe { libc::setgid(identity.gid) } != 0 {
        bail!("setgid failed: {}", std::io::Error::last_os_error());
    }
    if unsafe { libc::setuid(identity.uid) } != 0 {
        bail!("setuid failed: {}", std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_strings_without_a_colon() {
        assert!(parse_id_string("nobody").is_err());
    }

    #[test]
    fn resolves_a_well_known_account() {
        // root:root exists on effectively every POSIX system.
        let id = parse_id_string("root:root").expect("root:root should resolve");
        assert_eq!(id.uid, 0);
        assert_eq!(id.gid, 0);
    }
}
