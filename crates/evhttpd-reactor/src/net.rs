//! Listener setup and non-blocking accept
//!
//! Raw socket plumbing for the reactor. Everything here runs on the
//! reactor thread; accepted descriptors come back non-blocking and
//! close-on-exec so the connection code never needs a separate fcntl
//! round-trip.

use crate::error::{NetError, Result};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::io::RawFd;

/// Kernel accept backlog for the listening socket.
pub const LISTEN_BACKLOG: libc::c_int = 5;

pub(crate) fn last_errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

/// Create the listening socket: `SO_REUSEADDR`, bound to
/// `INADDR_ANY:port`, non-blocking, backlog [`LISTEN_BACKLOG`].
/// Pass port 0 to let the kernel pick one (see [`local_port`]).
pub fn listen(port: u16) -> Result<RawFd> {
    unsafe {
        let fd = libc::socket(
            libc::AF_INET,
            libc::SOCK_STREAM | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            0,
        );
        if fd < 0 {
            return Err(NetError::Listen(last_errno()));
        }

        let opt: libc::c_int = 1;
        if libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &opt as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        ) < 0
        {
            let e = last_errno();
            libc::close(fd);
            return Err(NetError::Listen(e));
        }

        let mut addr: libc::sockaddr_in = std::mem::zeroed();
        addr.sin_family = libc::AF_INET as libc::sa_family_t;
        addr.sin_addr.s_addr = libc::INADDR_ANY;
        addr.sin_port = port.to_be();

        if libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        ) < 0
        {
            let e = last_errno();
            libc::close(fd);
            return Err(NetError::Listen(e));
        }

        if libc::listen(fd, LISTEN_BACKLOG) < 0 {
            let e = last_errno();
            libc::close(fd);
            return Err(NetError::Listen(e));
        }

        Ok(fd)
    }
}

/// Accept one pending connection, non-blocking.
///
/// `Ok(None)` means no connection is pending (the accept loop's stop
/// condition under edge triggering). The accepted fd is non-blocking and
/// close-on-exec.
pub fn accept(listener: RawFd) -> Result<Option<(RawFd, SocketAddrV4)>> {
    let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut addr_len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

    let fd = unsafe {
        libc::accept4(
            listener,
            &mut addr as *mut _ as *mut libc::sockaddr,
            &mut addr_len,
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        )
    };
    if fd < 0 {
        let e = last_errno();
        if e == libc::EAGAIN || e == libc::EWOULDBLOCK {
            return Ok(None);
        }
        return Err(NetError::Os(e));
    }
    Ok(Some((fd, peer_of(&addr))))
}

/// The port a listener is actually bound to (relevant after binding
/// port 0).
pub fn local_port(fd: RawFd) -> Result<u16> {
    let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut addr_len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockname(fd, &mut addr as *mut _ as *mut libc::sockaddr, &mut addr_len)
    };
    if ret < 0 {
        return Err(NetError::Os(last_errno()));
    }
    Ok(u16::from_be(addr.sin_port))
}

/// Close a descriptor, ignoring the result. Used on paths where the
/// connection is already being torn down.
pub fn close(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

fn peer_of(addr: &libc::sockaddr_in) -> SocketAddrV4 {
    SocketAddrV4::new(
        Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)),
        u16::from_be(addr.sin_port),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpStream;

    #[test]
    fn test_listen_and_accept() {
        let listener = listen(0).unwrap();
        let port = local_port(listener).unwrap();
        assert_ne!(port, 0);

        // Nothing pending yet.
        assert!(matches!(accept(listener), Ok(None)));

        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        client.write_all(b"x").unwrap();

        // The connection may take a moment to land in the backlog.
        let accepted = loop {
            match accept(listener).unwrap() {
                Some(pair) => break pair,
                None => std::thread::yield_now(),
            }
        };
        let (fd, peer) = accepted;
        assert!(fd >= 0);
        assert_eq!(*peer.ip(), std::net::Ipv4Addr::new(127, 0, 0, 1));

        close(fd);
        close(listener);
    }
}
