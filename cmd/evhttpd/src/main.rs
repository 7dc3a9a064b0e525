//! evhttpd — event-driven static HTTP server.
//!
//! One reactor thread owns the listening socket and the epoll interest
//! set; a fixed worker pool parses requests and stages responses.
//!
//! Usage:
//!     evhttpd <port>
//!
//! Configuration comes from the environment:
//!     EVHTTPD_WORKERS      worker thread count (default 8)
//!     EVHTTPD_QUEUE_CAP    task queue bound (default 10000)
//!     EVHTTPD_MAX_CONNS    connection ceiling (default 65536)
//!     EVHTTPD_MAX_EVENTS   epoll wait batch size (default 10000)
//!     EVHTTPD_DOC_ROOT     document root (default ./webroot)
//!     EVHTTPD_LOG_LEVEL    off|error|warn|info|debug|trace
//!
//! Smoke test:
//!     ./target/release/evhttpd 8080 &
//!     curl -v http://localhost:8080/

use evhttpd_core::{herror, hinfo, hprint};
use evhttpd_reactor::{Reactor, ReactorConfig};
use std::process;

fn main() {
    hprint::init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("evhttpd");
    let program = program.rsplit('/').next().unwrap_or(program);

    let port: u16 = match args.get(1).and_then(|s| s.parse().ok()) {
        Some(p) => p,
        None => {
            eprintln!("usage: {} <port>", program);
            process::exit(1);
        }
    };

    // A peer that resets mid-write must surface EPIPE on the write, not
    // kill the process.
    ignore_sigpipe();

    let config = ReactorConfig::from_env();
    hinfo!(
        "evhttpd: starting on port {} (doc root {})",
        port,
        config.doc_root.display()
    );

    let mut reactor = match Reactor::bind(config, port) {
        Ok(r) => r,
        Err(e) => {
            herror!("evhttpd: startup failed: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = reactor.run() {
        herror!("evhttpd: event loop terminated: {}", e);
        process::exit(1);
    }
}

fn ignore_sigpipe() {
    use nix::sys::signal::{signal, SigHandler, Signal};
    unsafe { signal(Signal::SIGPIPE, SigHandler::SigIgn) }
        .expect("failed to set SIGPIPE disposition");
}
