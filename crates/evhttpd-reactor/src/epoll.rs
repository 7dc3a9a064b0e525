//! epoll interest-set wrapper
//!
//! All connection descriptors are registered edge-triggered and one-shot:
//! a readiness event fires once per transition to ready, and after it is
//! delivered the descriptor is muted until `rearm()`. Edge triggering is
//! what forces the read/accept-until-EAGAIN discipline in the callers;
//! one-shot is what serializes access to a connection across the reactor
//! and the worker pool.

use crate::error::{NetError, Result};
use crate::net;
use std::os::unix::io::RawFd;
use std::ptr;

/// Which direction a connection should next be woken for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

/// An owned epoll instance.
pub struct Epoll {
    epfd: RawFd,
}

impl Epoll {
    pub fn new() -> Result<Epoll> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(NetError::EpollCreate(net::last_errno()));
        }
        Ok(Epoll { epfd })
    }

    /// Register `fd` for read readiness, edge-triggered, optionally
    /// one-shot. The listener is the only descriptor added without
    /// one-shot.
    pub fn add(&self, fd: RawFd, one_shot: bool) -> Result<()> {
        let mut flags = libc::EPOLLIN | libc::EPOLLET | libc::EPOLLRDHUP;
        if one_shot {
            flags |= libc::EPOLLONESHOT;
        }
        self.ctl(libc::EPOLL_CTL_ADD, fd, flags)
    }

    /// Re-enable a one-shot descriptor for the next event in the given
    /// direction. If the socket is already ready, the event fires on the
    /// next wait.
    pub fn rearm(&self, fd: RawFd, interest: Interest) -> Result<()> {
        let dir = match interest {
            Interest::Read => libc::EPOLLIN,
            Interest::Write => libc::EPOLLOUT,
        };
        self.ctl(
            libc::EPOLL_CTL_MOD,
            fd,
            dir | libc::EPOLLET | libc::EPOLLONESHOT | libc::EPOLLRDHUP,
        )
    }

    /// Remove a descriptor from the interest set entirely.
    pub fn remove(&self, fd: RawFd) -> Result<()> {
        let ret = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, ptr::null_mut()) };
        if ret < 0 {
            return Err(NetError::EpollCtl(net::last_errno()));
        }
        Ok(())
    }

    /// Block until at least one registered descriptor is ready, or the
    /// timeout expires (`-1` blocks indefinitely). Returns the number of
    /// events written into `events`.
    pub fn wait(&self, events: &mut [libc::epoll_event], timeout_ms: i32) -> Result<usize> {
        let n = unsafe {
            libc::epoll_wait(
                self.epfd,
                events.as_mut_ptr(),
                events.len() as libc::c_int,
                timeout_ms,
            )
        };
        if n < 0 {
            return Err(NetError::EpollWait(net::last_errno()));
        }
        Ok(n as usize)
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, flags: libc::c_int) -> Result<()> {
        let mut ev = libc::epoll_event {
            events: flags as u32,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut ev) };
        if ret < 0 {
            return Err(NetError::EpollCtl(net::last_errno()));
        }
        Ok(())
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe_pair() -> (RawFd, RawFd) {
        let mut fds = [0; 2];
        let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
        assert_eq!(ret, 0);
        (fds[0], fds[1])
    }

    fn write_byte(fd: RawFd) {
        let b = [1u8];
        let n = unsafe { libc::write(fd, b.as_ptr() as *const libc::c_void, 1) };
        assert_eq!(n, 1);
    }

    fn close(fd: RawFd) {
        unsafe {
            libc::close(fd);
        }
    }

    #[test]
    fn test_one_shot_fires_once_until_rearmed() {
        let ep = Epoll::new().unwrap();
        let (rd, wr) = pipe_pair();
        ep.add(rd, true).unwrap();

        let mut events = [libc::epoll_event { events: 0, u64: 0 }; 8];

        write_byte(wr);
        let n = ep.wait(&mut events, 1000).unwrap();
        assert_eq!(n, 1);
        assert_eq!(events[0].u64 as RawFd, rd);
        assert_ne!(events[0].events & libc::EPOLLIN as u32, 0);

        // One-shot exhausted: more data does not produce another event.
        write_byte(wr);
        let n = ep.wait(&mut events, 100).unwrap();
        assert_eq!(n, 0);

        // Re-arming reports the still-pending readability.
        ep.rearm(rd, Interest::Read).unwrap();
        let n = ep.wait(&mut events, 1000).unwrap();
        assert_eq!(n, 1);

        close(rd);
        close(wr);
    }

    #[test]
    fn test_rearm_for_write() {
        let ep = Epoll::new().unwrap();
        let (rd, wr) = pipe_pair();
        ep.add(wr, true).unwrap();

        let mut events = [libc::epoll_event { events: 0, u64: 0 }; 8];
        // A fresh pipe has write space but the registration was
        // read-interest; flip to write and expect an event.
        ep.rearm(wr, Interest::Write).unwrap();
        let n = ep.wait(&mut events, 1000).unwrap();
        assert_eq!(n, 1);
        assert_ne!(events[0].events & libc::EPOLLOUT as u32, 0);

        close(rd);
        close(wr);
    }

    #[test]
    fn test_removed_fd_reports_nothing() {
        let ep = Epoll::new().unwrap();
        let (rd, wr) = pipe_pair();
        ep.add(rd, true).unwrap();
        ep.remove(rd).unwrap();

        write_byte(wr);
        let mut events = [libc::epoll_event { events: 0, u64: 0 }; 8];
        let n = ep.wait(&mut events, 100).unwrap();
        assert_eq!(n, 0);

        close(rd);
        close(wr);
    }
}
