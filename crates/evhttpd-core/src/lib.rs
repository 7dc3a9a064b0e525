//! # evhttpd-core
//!
//! Platform-agnostic leaves of the evhttpd server. Everything in here is
//! plain std: the OS-facing code (epoll, sockets) lives in
//! `evhttpd-reactor`, the protocol in `evhttpd-http`.
//!
//! ## Modules
//!
//! - `semaphore` - Counting semaphore (mutex + condvar pair)
//! - `queue` - Bounded FIFO task queue with non-blocking insert
//! - `env` - Environment variable utilities
//! - `hprint` - Leveled stderr logging macros

pub mod env;
pub mod hprint;
pub mod queue;
pub mod semaphore;

// Re-exports for convenience
pub use env::{env_get, env_get_bool, env_get_opt};
pub use queue::{QueueFull, TaskQueue};
pub use semaphore::Semaphore;
