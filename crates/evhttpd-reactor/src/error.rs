//! evhttpd-reactor error types.

use std::fmt;

#[derive(Debug)]
pub enum NetError {
    /// Listening socket setup failed (socket/bind/listen).
    Listen(i32),
    /// epoll instance could not be created.
    EpollCreate(i32),
    /// Interest-set mutation failed.
    EpollCtl(i32),
    /// epoll_wait failed. EINTR is surfaced so the loop can retry.
    EpollWait(i32),
    /// Peer closed its end of the connection.
    PeerClosed,
    /// Buffered request bytes reached the hard cap.
    BufferFull,
    /// Connection table is at the configured ceiling.
    TableFull,
    /// Worker queue rejected the submission.
    QueueFull,
    /// OS error with errno.
    Os(i32),
}

impl NetError {
    /// True for wait failures caused by signal delivery, which the
    /// reactor loop retries instead of treating as fatal.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, NetError::EpollWait(e) | NetError::Os(e) if *e == libc::EINTR)
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listen(e) => write!(f, "listener setup: errno {}", e),
            Self::EpollCreate(e) => write!(f, "epoll create: errno {}", e),
            Self::EpollCtl(e) => write!(f, "epoll ctl: errno {}", e),
            Self::EpollWait(e) => write!(f, "epoll wait: errno {}", e),
            Self::PeerClosed => write!(f, "peer closed connection"),
            Self::BufferFull => write!(f, "request exceeds buffer cap"),
            Self::TableFull => write!(f, "connection table full"),
            Self::QueueFull => write!(f, "worker queue full"),
            Self::Os(e) => write!(f, "OS error: errno {}", e),
        }
    }
}

impl std::error::Error for NetError {}

pub type Result<T> = std::result::Result<T, NetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_interrupted() {
        assert!(NetError::EpollWait(libc::EINTR).is_interrupted());
        assert!(!NetError::EpollWait(libc::EBADF).is_interrupted());
        assert!(!NetError::PeerClosed.is_interrupted());
    }
}
