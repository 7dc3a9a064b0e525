//! Worker pool
//!
//! A fixed set of OS threads consuming connection descriptors from the
//! bounded task queue. The reactor is the only producer; `submit()` never
//! blocks — a saturated queue is reported back so the reactor can shed
//! the connection instead of stalling the event loop.
//!
//! Workers have no teardown protocol. They live for the life of the
//! process and whatever is queued when the process exits is abandoned
//! with it.

use crate::ctx::ServerCtx;
use crate::error::{NetError, Result};
use evhttpd_core::queue::TaskQueue;
use evhttpd_core::{hdebug, herror, hwarn};
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    queue: Arc<TaskQueue<RawFd>>,
}

impl WorkerPool {
    /// Spawn `workers` threads consuming from a queue bounded at
    /// `queue_capacity`.
    pub fn start(ctx: Arc<ServerCtx>, workers: usize, queue_capacity: usize) -> WorkerPool {
        let queue = Arc::new(TaskQueue::with_capacity(queue_capacity));
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let ctx = Arc::clone(&ctx);
            let queue = Arc::clone(&queue);
            let handle = thread::Builder::new()
                .name(format!("evhttpd-worker-{}", i))
                .spawn(move || worker_loop(i, ctx, queue))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }
        WorkerPool { handles, queue }
    }

    /// Hand a readable connection to the pool. Fails when the queue is at
    /// capacity; the caller treats that as a processing failure and
    /// closes the connection.
    pub fn submit(&self, fd: RawFd) -> Result<()> {
        self.queue.push(fd).map_err(|_| NetError::QueueFull)
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

fn worker_loop(id: usize, ctx: Arc<ServerCtx>, queue: Arc<TaskQueue<RawFd>>) {
    hdebug!("evhttpd-worker-{}: up", id);
    loop {
        let fd = queue.pop();

        let interest = {
            // Safety: this fd's readable event was delivered to the
            // reactor, which handed it to exactly this worker; the
            // descriptor stays muted until the re-arm below.
            let conn = match unsafe { ctx.conn_mut(fd) } {
                Some(conn) => conn,
                None => {
                    hwarn!("evhttpd-worker-{}: fd {} vanished before processing", id, fd);
                    continue;
                }
            };
            conn.process(&ctx.doc_root)
        };

        // The borrow is released; only now may the descriptor come back
        // to life.
        if let Err(e) = ctx.epoll.rearm(fd, interest) {
            herror!("evhttpd-worker-{}: rearm fd {} failed: {}", id, fd, e);
            ctx.close_conn(fd);
        }
    }
}
