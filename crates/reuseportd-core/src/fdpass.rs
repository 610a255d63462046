//! Passing a file descriptor over a Unix domain stream socket via
//! `SCM_RIGHTS` ancillary data, built and walked by hand with `libc`.
//!
//! Every message carries at least one byte of payload; some platforms
//! reject control-message-only sends.

use std::io;
use std::mem::size_of;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;

#[derive(Debug, thiserror::Error)]
pub enum FdPassError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("message carried no SCM_RIGHTS ancillary data")]
    NoAncillaryData,
}

/// `CMSG_SPACE(sizeof(int))`, computed the way the `CMSG_*` macros do.
fn cmsg_space_one_fd() -> usize {
    unsafe { libc::CMSG_SPACE(size_of::<RawFd>() as u32) as usize }
}

/// Send `payload` (must be non-empty) over `stream`, attaching `fd` as a
/// single `SCM_RIGHTS` ancillary record.
pub fn send_fd(stream: &UnixStream, payload: &[u8], fd: RawFd) -> Result<(), FdPassError> {
    debug_assert!(!payload.is_empty(), "fd-bearing messages must carry a payload byte");

    let mut cmsg_buf = vec![0u8; cmsg_space_one_fd()];
    let mut iov = libc::iovec {
        iov_base: payload.as_ptr() as *mut _,
        iov_len: payload.len(),
    };
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.as_mut_ptr() as *mut _;
    msg.msg_controllen = cmsg_buf.len();

    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        debug_assert!(!cmsg.is_null());
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(size_of::<RawFd>() as u32) as _;
        std::ptr::write_unaligned(libc::CMSG_DATA(cmsg) as *mut RawFd, fd);
    }

    let rc = unsafe { libc::sendmsg(stream.as_raw_fd(), &msg, 0) };
    if rc < 0 {
        return Err(FdPassError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Send `payload` with no ancillary data (used for the terminator and for
/// parse/resolve failure diagnostics).
pub fn send_plain(stream: &UnixStream, payload: &[u8]) -> Result<(), FdPassError> {
    use std::io::Write;
    (&*stream).write_all(payload)?;
    Ok(())
}

/// Receive one message, returning its payload and the first `SCM_RIGHTS` fd
/// if one was attached. Used by tests (and by any client embedded in this
/// crate's own integration tests) to validate what the handler sent.
pub fn recv_fd(stream: &UnixStream, buf: &mut [u8]) -> Result<(usize, Option<RawFd>), FdPassError> {
    let mut cmsg_buf = vec![0u8; cmsg_space_one_fd()];
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr() as *mut _,
        iov_len: buf.len(),
    };
    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.as_mut_ptr() as *mut _;
    msg.msg_controllen = cmsg_buf.len();

    let n = unsafe { libc::recvmsg(stream.as_raw_fd(), &mut msg, 0) };
    if n < 0 {
        return Err(FdPassError::Io(io::Error::last_os_error()));
    }

    let mut fd = None;
    let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&msg) };
    while !cmsg.is_null() {
        let c = unsafe { &*cmsg };
        if c.cmsg_level == libc::SOL_SOCKET && c.cmsg_type == libc::SCM_RIGHTS {
            fd = Some(unsafe { std::ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const RawFd) });
            break;
        }
        cmsg = unsafe { libc::CMSG_NXTHDR(&msg, cmsg) };
    }

    Ok((n as usize, fd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::FromRawFd;

    #[test]
    fn round_trips_a_descriptor_over_a_socketpair() {
        let (a, b) = UnixStream::pair().unwrap();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let listener_fd = listener.as_raw_fd();

        send_fd(&a, b".", listener_fd).unwrap();

        let mut buf = [0u8; 1];
        let (n, fd) = recv_fd(&b, &mut buf).unwrap();
        assert_eq!(n, 1);
        assert_eq!(&buf[..n], b".");
        let received_fd = fd.expect("SCM_RIGHTS should have carried a descriptor");

        // The received fd is a distinct handle on the same listener.
        let received = unsafe { std::net::TcpListener::from_raw_fd(received_fd) };
        assert_eq!(
            received.local_addr().unwrap().port(),
            listener.local_addr().unwrap().port()
        );
    }

    #[test]
    fn terminator_carries_no_ancillary_data() {
        let (a, b) = UnixStream::pair().unwrap();
        send_plain(&a, b"!").unwrap();
        let mut buf = [0u8; 1];
        let (n, fd) = recv_fd(&b, &mut buf).unwrap();
        assert_eq!(n, 1);
        assert_eq!(&buf[..n], b"!");
        assert!(fd.is_none());
    }
}
