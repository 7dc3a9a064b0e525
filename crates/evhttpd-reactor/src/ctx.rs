//! Shared server context
//!
//! The epoll instance, the connection table and the document root,
//! bundled so the reactor and the worker pool see one object instead of
//! process-wide statics. The reactor owns the `Arc`; workers hold clones.

use crate::conn::Connection;
use crate::epoll::Epoll;
use crate::net;
use crate::table::ConnTable;
use evhttpd_core::hdebug;
use std::os::unix::io::RawFd;
use std::path::PathBuf;

pub struct ServerCtx {
    pub(crate) epoll: Epoll,
    pub(crate) table: ConnTable,
    pub(crate) doc_root: PathBuf,
}

impl ServerCtx {
    pub(crate) fn new(epoll: Epoll, table: ConnTable, doc_root: PathBuf) -> ServerCtx {
        ServerCtx {
            epoll,
            table,
            doc_root,
        }
    }

    /// Number of live connections.
    pub fn active_connections(&self) -> usize {
        self.table.active()
    }

    /// See [`ConnTable::conn_mut`].
    ///
    /// # Safety
    ///
    /// Same contract: the caller holds the connection under the one-shot
    /// protocol.
    pub(crate) unsafe fn conn_mut(&self, fd: RawFd) -> Option<&mut Connection> {
        self.table.conn_mut(fd)
    }

    /// Tear a connection down: vacate the slot, drop the epoll
    /// registration, close the socket. Safe to call twice; the second
    /// call finds the slot empty.
    ///
    /// Callers must not hold a borrow of the connection when calling
    /// this — the slot is vacated out from under it.
    pub(crate) fn close_conn(&self, fd: RawFd) {
        if let Some(conn) = self.table.remove(fd) {
            let _ = self.epoll.remove(fd);
            net::close(fd);
            hdebug!(
                "evhttpd: closed {} (fd {}, active {})",
                conn.peer(),
                fd,
                self.table.active()
            );
        }
    }
}
