//! Per-connection state machine
//!
//! One `Connection` per live descriptor. The reactor performs the
//! non-blocking bulk read and the response drain; a worker thread runs
//! `process()` (parse + response staging). The one-shot protocol
//! guarantees those never overlap; the `guard` counter asserts it in
//! debug builds.
//!
//! The response is staged as a head buffer plus a body reference (mmap
//! for files, inline bytes for generated error pages) and drained with
//! `writev`, so large bodies are never copied. A single `bytes_sent`
//! cursor across head and body makes partial writes resume correctly.

use crate::epoll::Interest;
use crate::error::{NetError, Result};
use crate::net;
use evhttpd_http::fs::{self, FileMap};
use evhttpd_http::request::{Progress, RequestParser};
use evhttpd_http::response::{self, StatusCode};
use std::net::SocketAddrV4;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

/// Read chunk size for the bulk-read loop.
const READ_CHUNK: usize = 2048;

/// Hard cap on buffered request bytes (request line + headers + body).
/// A connection that exceeds it is closed.
pub const MAX_REQUEST_BYTES: usize = 16 * 1024;

/// What a drain pass accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The socket stopped accepting bytes; re-arm for write readiness.
    Partial,
    /// The whole staged response went out.
    Done { keep_alive: bool },
}

/// Staged response body.
enum Body {
    Empty,
    Bytes(Vec<u8>),
    File(FileMap),
}

impl Body {
    fn as_slice(&self) -> &[u8] {
        match self {
            Body::Empty => &[],
            Body::Bytes(b) => b,
            Body::File(map) => map.as_slice(),
        }
    }
}

/// Debug instrumentation for the one-shot protocol: entry increments the
/// counter and asserts it was zero, so two threads inside the same
/// connection's read/process/write logic trip immediately.
struct AccessGuard<'a> {
    counter: &'a AtomicU32,
}

impl<'a> AccessGuard<'a> {
    fn enter(counter: &'a AtomicU32, fd: RawFd) -> AccessGuard<'a> {
        let prev = counter.fetch_add(1, Ordering::SeqCst);
        debug_assert_eq!(prev, 0, "concurrent access to connection fd {}", fd);
        AccessGuard { counter }
    }
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// State for one accepted socket.
pub struct Connection {
    fd: RawFd,
    peer: SocketAddrV4,
    read_buf: Vec<u8>,
    parser: RequestParser,
    head: Vec<u8>,
    body: Body,
    bytes_sent: usize,
    keep_alive: bool,
    guard: AtomicU32,
}

impl Connection {
    pub(crate) fn new(fd: RawFd, peer: SocketAddrV4) -> Connection {
        Connection {
            fd,
            peer,
            read_buf: Vec::with_capacity(READ_CHUNK),
            parser: RequestParser::new(),
            head: Vec::new(),
            body: Body::Empty,
            bytes_sent: 0,
            keep_alive: false,
            guard: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[inline]
    pub fn peer(&self) -> SocketAddrV4 {
        self.peer
    }

    /// Total bytes staged for the current response.
    pub fn staged_len(&self) -> usize {
        self.head.len() + self.body.as_slice().len()
    }

    /// Bulk-read everything the socket currently has, per the
    /// edge-triggered contract. Returns `Ok` when the socket is drained
    /// (EAGAIN); any failure means the connection must be closed.
    pub(crate) fn fill_read_buf(&mut self) -> Result<()> {
        let _guard = AccessGuard::enter(&self.guard, self.fd);
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = unsafe {
                libc::read(
                    self.fd,
                    chunk.as_mut_ptr() as *mut libc::c_void,
                    chunk.len(),
                )
            };
            if n > 0 {
                if self.read_buf.len() + n as usize > MAX_REQUEST_BYTES {
                    return Err(NetError::BufferFull);
                }
                self.read_buf.extend_from_slice(&chunk[..n as usize]);
                continue;
            }
            if n == 0 {
                return Err(NetError::PeerClosed);
            }
            let e = net::last_errno();
            if e == libc::EAGAIN || e == libc::EWOULDBLOCK {
                return Ok(());
            }
            if e == libc::EINTR {
                continue;
            }
            return Err(NetError::Os(e));
        }
    }

    /// Parse the buffered bytes and, on a complete or malformed request,
    /// stage the response. Runs on a worker thread. Returns the direction
    /// the caller must re-arm the descriptor for; the caller performs the
    /// re-arm after releasing its borrow of this connection.
    pub(crate) fn process(&mut self, doc_root: &Path) -> Interest {
        let _guard = AccessGuard::enter(&self.guard, self.fd);
        match self.parser.advance(&self.read_buf) {
            Progress::NeedMore => Interest::Read,
            Progress::Malformed => {
                // The request framing cannot be trusted past this point.
                self.keep_alive = false;
                self.stage_error(StatusCode::BadRequest);
                Interest::Write
            }
            Progress::Complete => {
                self.keep_alive = self.parser.keep_alive();
                self.stage_resolved(doc_root);
                Interest::Write
            }
        }
    }

    /// Send as much of the staged response as the socket will take.
    pub(crate) fn drain_write(&mut self) -> Result<WriteOutcome> {
        let _guard = AccessGuard::enter(&self.guard, self.fd);
        loop {
            let head_skip = self.bytes_sent.min(self.head.len());
            let body_skip = self.bytes_sent - head_skip;
            let body = self.body.as_slice();
            let head_rem = &self.head[head_skip..];
            let body_rem = &body[body_skip.min(body.len())..];

            if head_rem.is_empty() && body_rem.is_empty() {
                return Ok(WriteOutcome::Done {
                    keep_alive: self.keep_alive,
                });
            }

            let mut iov = [libc::iovec {
                iov_base: std::ptr::null_mut(),
                iov_len: 0,
            }; 2];
            let mut cnt = 0;
            if !head_rem.is_empty() {
                iov[cnt] = libc::iovec {
                    iov_base: head_rem.as_ptr() as *mut libc::c_void,
                    iov_len: head_rem.len(),
                };
                cnt += 1;
            }
            if !body_rem.is_empty() {
                iov[cnt] = libc::iovec {
                    iov_base: body_rem.as_ptr() as *mut libc::c_void,
                    iov_len: body_rem.len(),
                };
                cnt += 1;
            }

            let n = unsafe { libc::writev(self.fd, iov.as_ptr(), cnt as libc::c_int) };
            if n < 0 {
                let e = net::last_errno();
                if e == libc::EAGAIN || e == libc::EWOULDBLOCK {
                    return Ok(WriteOutcome::Partial);
                }
                if e == libc::EINTR {
                    continue;
                }
                return Err(NetError::Os(e));
            }
            self.bytes_sent += n as usize;
        }
    }

    /// Clear request and response state for the next keep-alive cycle.
    /// Slot reuse after a close goes through `Connection::new` instead.
    pub(crate) fn reset(&mut self) {
        self.read_buf.clear();
        self.parser.reset();
        self.head.clear();
        self.body = Body::Empty;
        self.bytes_sent = 0;
        self.keep_alive = false;
    }

    fn stage_resolved(&mut self, doc_root: &Path) {
        match fs::resolve(doc_root, self.parser.target()) {
            Ok(path) => match FileMap::open(&path) {
                Ok(map) => {
                    self.head = response::build_head(
                        StatusCode::Ok,
                        map.len(),
                        response::content_type_for(&path),
                        self.keep_alive,
                    );
                    self.body = Body::File(map);
                    self.bytes_sent = 0;
                }
                Err(_) => self.stage_error(StatusCode::InternalServerError),
            },
            Err(status) => self.stage_error(status),
        }
    }

    fn stage_error(&mut self, status: StatusCode) {
        let page = response::error_body(status);
        self.head = response::build_head(status, page.len(), "text/html", self.keep_alive);
        self.body = Body::Bytes(page.into_bytes());
        self.bytes_sent = 0;
    }
}
