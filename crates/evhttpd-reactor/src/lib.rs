//! # evhttpd-reactor
//!
//! The Linux platform layer of evhttpd: one reactor thread owning the
//! listening socket and an epoll interest set, a descriptor-indexed
//! connection table, and a fixed pool of worker threads fed from a
//! bounded queue.
//!
//! Per-connection state is synchronized by the one-shot re-arm protocol
//! alone: after an event for a descriptor is delivered, epoll reports
//! nothing further for it until the handler (reactor write path or worker
//! process path) finishes and explicitly re-arms it. There is no
//! per-connection lock; exclusive access passes hand-to-hand from the
//! reactor through the queue to a worker and back.
//!
//! ## Modules
//!
//! - `epoll` - Interest-set wrapper (edge-triggered, one-shot re-arming)
//! - `net` - Listener setup and non-blocking accept
//! - `conn` - Per-connection state machine driver
//! - `table` - Descriptor-indexed connection slots
//! - `pool` - Worker threads and submission queue
//! - `ctx` - Shared server context (epoll + table + config)
//! - `reactor` - The event loop
//! - `error` - Error types

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod conn;
        pub mod ctx;
        pub mod epoll;
        pub mod error;
        pub mod net;
        pub mod pool;
        pub mod reactor;
        pub mod table;

        // Re-exports for convenience
        pub use conn::{Connection, WriteOutcome};
        pub use ctx::ServerCtx;
        pub use epoll::{Epoll, Interest};
        pub use error::{NetError, Result};
        pub use reactor::{Reactor, ReactorConfig};
    } else {
        compile_error!("evhttpd-reactor requires Linux (epoll)");
    }
}
