//! The reactor event loop
//!
//! Single-threaded owner of the listening socket and the epoll interest
//! set. Translates kernel readiness into connection lifecycle actions:
//! accept, bulk-read + hand-off to the pool, response drain, close. The
//! only blocking point is `epoll_wait`; every socket operation is
//! non-blocking and resumes from saved cursors on the next event.

use crate::conn::Connection;
use crate::ctx::ServerCtx;
use crate::epoll::{Epoll, Interest};
use crate::error::Result;
use crate::net;
use crate::pool::WorkerPool;
use crate::table::ConnTable;
use evhttpd_core::{env_get, hdebug, herror, hinfo, hwarn};
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::sync::Arc;

/// Slots are fd-indexed, so the table must be able to address descriptor
/// values above a small ceiling.
const MIN_SLOT_CAPACITY: usize = 1024;

/// Reactor configuration. Fixed at startup; the environment overrides
/// the defaults (see `from_env`).
pub struct ReactorConfig {
    /// Worker thread count.
    pub workers: usize,
    /// Task queue bound; submissions beyond it are shed.
    pub queue_capacity: usize,
    /// Maximum simultaneous connections.
    pub max_connections: usize,
    /// Event batch size per `epoll_wait`.
    pub max_events: usize,
    /// Directory static content is served from.
    pub doc_root: PathBuf,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            queue_capacity: 10_000,
            max_connections: 65_536,
            max_events: 10_000,
            doc_root: PathBuf::from("./webroot"),
        }
    }
}

impl ReactorConfig {
    /// Read configuration from `EVHTTPD_*` environment variables,
    /// falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workers: env_get("EVHTTPD_WORKERS", defaults.workers),
            queue_capacity: env_get("EVHTTPD_QUEUE_CAP", defaults.queue_capacity),
            max_connections: env_get("EVHTTPD_MAX_CONNS", defaults.max_connections),
            max_events: env_get("EVHTTPD_MAX_EVENTS", defaults.max_events),
            doc_root: PathBuf::from(env_get(
                "EVHTTPD_DOC_ROOT",
                defaults.doc_root.to_string_lossy().into_owned(),
            )),
        }
    }
}

/// The dispatcher. Owns the listener and the server context; workers hold
/// `Arc` clones of the context.
pub struct Reactor {
    ctx: Arc<ServerCtx>,
    pool: WorkerPool,
    listener: RawFd,
    max_events: usize,
}

impl Reactor {
    /// Set up the listener, epoll instance, connection table and worker
    /// pool. Any failure here is fatal to startup.
    pub fn bind(config: ReactorConfig, port: u16) -> Result<Reactor> {
        let listener = net::listen(port)?;

        let epoll = match Epoll::new() {
            Ok(ep) => ep,
            Err(e) => {
                net::close(listener);
                return Err(e);
            }
        };

        let slot_capacity = config.max_connections.max(MIN_SLOT_CAPACITY);
        let table = ConnTable::new(slot_capacity, config.max_connections);
        let ctx = Arc::new(ServerCtx::new(epoll, table, config.doc_root));
        let pool = WorkerPool::start(Arc::clone(&ctx), config.workers, config.queue_capacity);

        // The listener is the one descriptor that is not one-shot.
        if let Err(e) = ctx.epoll.add(listener, false) {
            net::close(listener);
            return Err(e);
        }

        hinfo!(
            "evhttpd: listening on port {} ({} workers, queue {}, ceiling {})",
            net::local_port(listener).unwrap_or(port),
            pool.worker_count(),
            config.queue_capacity,
            ctx.table.ceiling()
        );

        Ok(Reactor {
            ctx,
            pool,
            listener,
            max_events: config.max_events.max(1),
        })
    }

    /// The bound port (relevant after binding port 0).
    pub fn local_port(&self) -> Result<u16> {
        net::local_port(self.listener)
    }

    /// Shared context handle, for observing connection counts.
    pub fn ctx(&self) -> &Arc<ServerCtx> {
        &self.ctx
    }

    /// Block dispatching events forever. Returns only on a fatal wait
    /// failure; interruption by a signal retries the wait.
    pub fn run(&mut self) -> Result<()> {
        let mut events = vec![libc::epoll_event { events: 0, u64: 0 }; self.max_events];
        loop {
            let n = match self.ctx.epoll.wait(&mut events, -1) {
                Ok(n) => n,
                Err(ref e) if e.is_interrupted() => continue,
                Err(e) => {
                    herror!("evhttpd: epoll wait failed: {}", e);
                    return Err(e);
                }
            };

            for ev in events.iter().take(n) {
                let ev = *ev;
                let fd = ev.u64 as RawFd;
                if fd == self.listener {
                    self.accept_pending();
                } else if ev.events & (libc::EPOLLRDHUP | libc::EPOLLHUP | libc::EPOLLERR) as u32
                    != 0
                {
                    // Peer hangup or socket error: drop the connection,
                    // buffered response data notwithstanding.
                    self.ctx.close_conn(fd);
                } else if ev.events & libc::EPOLLIN as u32 != 0 {
                    self.on_readable(fd);
                } else if ev.events & libc::EPOLLOUT as u32 != 0 {
                    self.on_writable(fd);
                }
            }
        }
    }

    /// Accept until the backlog is empty (edge-triggered listener) or the
    /// ceiling refuses further connections.
    fn accept_pending(&self) {
        loop {
            match net::accept(self.listener) {
                Ok(Some((fd, peer))) => {
                    let conn = Connection::new(fd, peer);
                    if self.ctx.table.insert(fd, conn).is_err() {
                        hwarn!(
                            "evhttpd: connection table full (ceiling {}), refusing {}",
                            self.ctx.table.ceiling(),
                            peer
                        );
                        net::close(fd);
                        continue;
                    }
                    if let Err(e) = self.ctx.epoll.add(fd, true) {
                        herror!("evhttpd: register fd {} failed: {}", fd, e);
                        self.ctx.table.remove(fd);
                        net::close(fd);
                        continue;
                    }
                    hdebug!(
                        "evhttpd: accepted {} (fd {}, active {})",
                        peer,
                        fd,
                        self.ctx.table.active()
                    );
                }
                Ok(None) => break,
                Err(e) => {
                    hwarn!("evhttpd: accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// Readable: bulk-read, then hand the connection to the pool. Any
    /// read failure, or a saturated queue, closes the connection.
    fn on_readable(&self, fd: RawFd) {
        // Safety: this fd's event was just delivered; the descriptor is
        // muted until re-armed, so the reactor holds it exclusively.
        let res = match unsafe { self.ctx.conn_mut(fd) } {
            Some(conn) => conn.fill_read_buf(),
            None => return,
        };
        match res {
            Ok(()) => {
                if let Err(e) = self.pool.submit(fd) {
                    hwarn!("evhttpd: shedding fd {}: {}", fd, e);
                    self.ctx.close_conn(fd);
                }
            }
            Err(e) => {
                hdebug!("evhttpd: read fd {}: {}", fd, e);
                self.ctx.close_conn(fd);
            }
        }
    }

    /// Writable: drain the staged response. A finished keep-alive
    /// connection is reset and re-armed for the next request; otherwise
    /// the connection closes.
    fn on_writable(&self, fd: RawFd) {
        enum AfterWrite {
            Rearm(Interest),
            Close,
        }

        // Safety: as in on_readable — the one-shot protocol hands this
        // connection to the reactor exclusively.
        let after = match unsafe { self.ctx.conn_mut(fd) } {
            Some(conn) => match conn.drain_write() {
                Ok(crate::conn::WriteOutcome::Partial) => AfterWrite::Rearm(Interest::Write),
                Ok(crate::conn::WriteOutcome::Done { keep_alive: true }) => {
                    conn.reset();
                    AfterWrite::Rearm(Interest::Read)
                }
                Ok(crate::conn::WriteOutcome::Done { keep_alive: false }) => AfterWrite::Close,
                Err(e) => {
                    hdebug!("evhttpd: write fd {}: {}", fd, e);
                    AfterWrite::Close
                }
            },
            None => return,
        };

        match after {
            AfterWrite::Rearm(interest) => {
                if let Err(e) = self.ctx.epoll.rearm(fd, interest) {
                    herror!("evhttpd: rearm fd {} failed: {}", fd, e);
                    self.ctx.close_conn(fd);
                }
            }
            AfterWrite::Close => self.ctx.close_conn(fd),
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        net::close(self.listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::path::Path;
    use std::thread;
    use std::time::Duration;

    fn temp_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "evhttpd-e2e-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn small_config(doc_root: &Path) -> ReactorConfig {
        ReactorConfig {
            workers: 2,
            queue_capacity: 64,
            max_connections: 64,
            max_events: 64,
            doc_root: doc_root.to_path_buf(),
        }
    }

    /// Boot a server on an ephemeral port; the reactor thread runs for
    /// the rest of the test process.
    fn spawn_server(config: ReactorConfig) -> u16 {
        let mut reactor = Reactor::bind(config, 0).expect("bind");
        let port = reactor.local_port().expect("local_port");
        thread::spawn(move || {
            let _ = reactor.run();
        });
        port
    }

    fn connect(port: u16) -> TcpStream {
        let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    /// Read one response: headers, then exactly Content-Length body
    /// bytes.
    fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
                break pos;
            }
            let n = stream.read(&mut chunk).expect("read headers");
            assert!(n > 0, "connection closed before headers completed");
            buf.extend_from_slice(&chunk[..n]);
        };

        let head = String::from_utf8(buf[..header_end].to_vec()).expect("header utf8");
        let content_length: usize = head
            .lines()
            .find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse().ok())?
            })
            .expect("Content-Length header");

        let mut body = buf[header_end + 4..].to_vec();
        while body.len() < content_length {
            let n = stream.read(&mut chunk).expect("read body");
            assert!(n > 0, "connection closed mid-body");
            body.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(body.len(), content_length);
        (head, body)
    }

    #[test]
    fn test_serves_static_file() {
        let root = temp_root("static");
        fs::write(root.join("index.html"), b"<h1>it works</h1>").unwrap();
        let port = spawn_server(small_config(&root));

        let mut stream = connect(port);
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let (head, body) = read_response(&mut stream);
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(head.contains("Content-Type: text/html"));
        assert!(head.contains("Connection: close"));
        assert_eq!(body, b"<h1>it works</h1>");
    }

    #[test]
    fn test_keep_alive_two_requests_one_connection() {
        let root = temp_root("keepalive");
        fs::write(root.join("a.html"), b"alpha page").unwrap();
        fs::write(root.join("b.html"), b"bravo page").unwrap();
        let port = spawn_server(small_config(&root));

        let mut stream = connect(port);

        stream
            .write_all(b"GET /a.html HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .unwrap();
        let (head, body) = read_response(&mut stream);
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(head.contains("Connection: keep-alive"));
        assert_eq!(body, b"alpha page");

        stream
            .write_all(b"GET /b.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();
        let (head, body) = read_response(&mut stream);
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(body, b"bravo page");
    }

    #[test]
    fn test_request_split_across_reads() {
        let root = temp_root("split");
        fs::write(root.join("page.html"), b"split ok").unwrap();
        let port = spawn_server(small_config(&root));

        let mut stream = connect(port);
        stream.write_all(b"GET /page.html HTT").unwrap();
        stream.flush().unwrap();
        // Let the first fragment arrive as its own readable event.
        thread::sleep(Duration::from_millis(50));
        stream
            .write_all(b"P/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .unwrap();

        let (head, body) = read_response(&mut stream);
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(body, b"split ok");
    }

    #[test]
    fn test_post_resolves_target() {
        let root = temp_root("post");
        fs::write(root.join("form.html"), b"posted").unwrap();
        let port = spawn_server(small_config(&root));

        let mut stream = connect(port);
        stream
            .write_all(
                b"POST /form.html HTTP/1.1\r\nHost: localhost\r\n\
                  Content-Length: 7\r\nConnection: close\r\n\r\npayload",
            )
            .unwrap();
        let (head, body) = read_response(&mut stream);
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(body, b"posted");
    }

    #[test]
    fn test_missing_file_is_404() {
        let root = temp_root("notfound");
        let port = spawn_server(small_config(&root));

        let mut stream = connect(port);
        stream
            .write_all(b"GET /nope.html HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
            .unwrap();
        let (head, body) = read_response(&mut stream);
        assert!(head.starts_with("HTTP/1.1 404 Not Found"));
        assert!(String::from_utf8_lossy(&body).contains("404 Not Found"));
    }

    #[test]
    fn test_unsupported_method_gets_400_then_close() {
        let root = temp_root("malformed");
        let port = spawn_server(small_config(&root));

        let mut stream = connect(port);
        stream
            .write_all(b"PATCH /x HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();
        let (head, _) = read_response(&mut stream);
        assert!(head.starts_with("HTTP/1.1 400 Bad Request"));
        assert!(head.contains("Connection: close"));

        // The server closes after a malformed request.
        let mut rest = Vec::new();
        let n = stream.read_to_end(&mut rest).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_missing_version_gets_400() {
        let root = temp_root("noversion");
        let port = spawn_server(small_config(&root));

        let mut stream = connect(port);
        stream.write_all(b"GET /index.html\r\n\r\n").unwrap();
        let (head, _) = read_response(&mut stream);
        assert!(head.starts_with("HTTP/1.1 400 Bad Request"));
    }

    #[test]
    fn test_large_response_arrives_complete() {
        let root = temp_root("large");
        let payload: Vec<u8> = (0..1_000_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(root.join("big.bin"), &payload).unwrap();
        let port = spawn_server(small_config(&root));

        let mut stream = connect(port);
        stream
            .write_all(b"GET /big.bin HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
            .unwrap();
        let (head, body) = read_response(&mut stream);
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(body.len(), payload.len());
        assert_eq!(body, payload);
    }

    #[test]
    fn test_connection_ceiling_refuses_excess() {
        let root = temp_root("ceiling");
        fs::write(root.join("index.html"), b"one at a time").unwrap();
        let mut config = small_config(&root);
        config.max_connections = 1;
        let port = spawn_server(config);

        // First connection occupies the only slot and stays alive.
        let mut first = connect(port);
        first
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();
        let (head, _) = read_response(&mut first);
        assert!(head.starts_with("HTTP/1.1 200 OK"));

        // The second is accepted by the kernel but refused by the server.
        let mut second = connect(port);
        let mut buf = Vec::new();
        let n = second.read_to_end(&mut buf).unwrap();
        assert_eq!(n, 0);

        // The first connection still works afterwards.
        first
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
            .unwrap();
        let (head, _) = read_response(&mut first);
        assert!(head.starts_with("HTTP/1.1 200 OK"));
    }

    #[test]
    fn test_saturated_queue_sheds_connection() {
        let root = temp_root("shed");
        fs::write(root.join("index.html"), b"never served").unwrap();
        let mut config = small_config(&root);
        config.queue_capacity = 0;
        let port = spawn_server(config);

        let mut stream = connect(port);
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .unwrap();
        // Every submission is rejected, so the connection is closed
        // without a response.
        let mut buf = Vec::new();
        let n = stream.read_to_end(&mut buf).unwrap();
        assert_eq!(n, 0);
    }
}
