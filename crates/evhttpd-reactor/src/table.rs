//! Descriptor-indexed connection table
//!
//! An arena of slots addressed by descriptor value. Slots are populated
//! and vacated by the reactor thread; workers reach into an occupied slot
//! through [`ConnTable::conn_mut`] while the one-shot protocol guarantees
//! nobody else is looking. That hand-off is the synchronization — the
//! slots deliberately carry no lock.
//!
//! The `active` counter is the live-connection count checked against the
//! configured ceiling on every insert.

use crate::conn::Connection;
use crate::error::{NetError, Result};
use std::cell::UnsafeCell;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct ConnTable {
    slots: Box<[UnsafeCell<Option<Connection>>]>,
    active: AtomicUsize,
    ceiling: usize,
}

// Safety: slot contents are only touched by the thread currently holding
// the connection under the one-shot protocol (reactor, or the single
// worker a readable connection was handed to). The counter is atomic.
unsafe impl Sync for ConnTable {}

impl ConnTable {
    /// `slot_capacity` bounds the descriptor values the table can index;
    /// `ceiling` bounds how many connections may be live at once.
    pub fn new(slot_capacity: usize, ceiling: usize) -> ConnTable {
        let slots: Vec<UnsafeCell<Option<Connection>>> =
            (0..slot_capacity).map(|_| UnsafeCell::new(None)).collect();
        ConnTable {
            slots: slots.into_boxed_slice(),
            active: AtomicUsize::new(0),
            ceiling,
        }
    }

    /// Number of currently occupied slots.
    #[inline]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Maximum simultaneous connections.
    #[inline]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Number of addressable slots.
    #[inline]
    pub fn slot_capacity(&self) -> usize {
        self.slots.len()
    }

    /// Populate the slot for a freshly accepted descriptor. Fails when
    /// the ceiling is reached or the descriptor value cannot be indexed;
    /// the connection is handed back so the caller can close the socket.
    ///
    /// Called only from the reactor thread.
    pub(crate) fn insert(&self, fd: RawFd, conn: Connection) -> Result<()> {
        let idx = fd as usize;
        if idx >= self.slots.len() || self.active.load(Ordering::Relaxed) >= self.ceiling {
            return Err(NetError::TableFull);
        }
        // Safety: a newly accepted fd has no registration yet, so no other
        // thread can reference this slot.
        unsafe {
            *self.slots[idx].get() = Some(conn);
        }
        self.active.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Vacate a slot, returning the connection for teardown. Idempotent:
    /// a slot already vacated returns `None`.
    pub(crate) fn remove(&self, fd: RawFd) -> Option<Connection> {
        let idx = fd as usize;
        if idx >= self.slots.len() {
            return None;
        }
        // Safety: callers only remove a connection they currently hold
        // under the one-shot protocol.
        let conn = unsafe { (*self.slots[idx].get()).take() };
        if conn.is_some() {
            self.active.fetch_sub(1, Ordering::Relaxed);
        }
        conn
    }

    /// Mutable access to an occupied slot.
    ///
    /// # Safety
    ///
    /// The caller must hold the connection under the one-shot protocol:
    /// the descriptor's event was delivered to this thread and the
    /// descriptor has not been re-armed yet.
    pub(crate) unsafe fn conn_mut(&self, fd: RawFd) -> Option<&mut Connection> {
        let slot = self.slots.get(fd as usize)?;
        (*slot.get()).as_mut()
    }
}
