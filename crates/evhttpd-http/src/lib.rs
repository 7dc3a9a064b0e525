//! # evhttpd-http
//!
//! The protocol layer of evhttpd: an incremental HTTP/1.x request parser
//! driven by whatever bytes the reactor has buffered so far, plus response
//! head construction and document-root resolution with mmap-backed file
//! bodies.
//!
//! This crate knows nothing about sockets or epoll. The parser operates on
//! a caller-owned byte buffer and keeps only cursors, so a connection can
//! feed it the same growing buffer across any number of partial reads
//! without reprocessing consumed bytes.
//!
//! ## Modules
//!
//! - `request` - Incremental request parser, header map, method/version types
//! - `response` - Status codes, response head building, error pages
//! - `fs` - Document-root resolution and mmap file bodies

pub mod fs;
pub mod request;
pub mod response;

// Re-exports for convenience
pub use fs::FileMap;
pub use request::{HeaderMap, Method, ParseState, Progress, RequestParser, Version};
pub use response::StatusCode;
