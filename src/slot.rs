//! Consumer progress tracking.
//!
//! A [`Slot`] is owned by one consumer: a replication session, a checkpoint
//! worker, a backup. While it is added to a [`Wal`](crate::Wal) the log
//! retains every segment holding an LSN above the slot's watermark.
//!
//! A slot also carries a wake channel. Once attached, every append signals
//! it, so that a consumer can block in [`Slot::wait`] instead of polling its
//! cursor:
//!
//! ```text
//! wal.attach(&slot);
//! loop {
//!     while cursor.next()? { ... slot.set(lsn) }
//!     if !slot.wait() { break; } // detached
//! }
//! ```

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use crate::mutex_ext::MutexExt;

#[derive(Debug, Default)]
pub struct Slot {
    /// The highest LSN this consumer has processed.
    lsn: AtomicU64,

    /// Whether this slot is a member of a log's slot set.
    added: AtomicBool,

    event: Mutex<Event>,
    cond: Condvar,
}

#[derive(Debug, Default)]
struct Event {
    attached: bool,
    signaled: bool,
}

impl Slot {
    /// Create a slot with watermark 0.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The watermark: the highest LSN this consumer has processed.
    pub fn lsn(&self) -> u64 {
        self.lsn.load(Ordering::Acquire)
    }

    /// Advance the watermark to `lsn`.
    ///
    /// The watermark never decreases: a smaller `lsn` is ignored.
    pub fn set(&self, lsn: u64) {
        self.lsn.fetch_max(lsn, Ordering::AcqRel);
    }

    /// Reset the watermark when the slot is registered by a snapshot.
    pub(crate) fn pin(&self, lsn: u64) {
        self.lsn.store(lsn, Ordering::Release);
    }

    pub fn is_added(&self) -> bool {
        self.added.load(Ordering::Acquire)
    }

    pub(crate) fn set_added(&self, added: bool) {
        self.added.store(added, Ordering::Release);
    }

    pub fn is_attached(&self) -> bool {
        self.event.locked().attached
    }

    pub(crate) fn attach(&self) {
        self.event.locked().attached = true;
    }

    /// Unwire the wake channel and wake up a blocked waiter.
    pub(crate) fn detach(&self) {
        let mut ev = self.event.locked();
        ev.attached = false;
        ev.signaled = false;
        self.cond.notify_all();
    }

    /// Called by the log after `lsn` is appended.
    pub(crate) fn signal(&self, lsn: u64) {
        if lsn <= self.lsn() {
            return;
        }

        let mut ev = self.event.locked();
        if !ev.attached {
            return;
        }
        ev.signaled = true;
        self.cond.notify_all();
    }

    /// Block until an append signals this slot or the slot is detached.
    ///
    /// Returns `true` if a signal is consumed, `false` if the slot is
    /// detached. A signal raised before this call, while attached, is not
    /// lost.
    pub fn wait(&self) -> bool {
        let mut ev = self.event.locked();
        loop {
            if ev.signaled {
                ev.signaled = false;
                return true;
            }
            if !ev.attached {
                return false;
            }
            ev = self
                .cond
                .wait(ev)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Like [`Self::wait`] but gives up after `timeout` and returns `false`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut ev = self.event.locked();
        loop {
            if ev.signaled {
                ev.signaled = false;
                return true;
            }
            if !ev.attached {
                return false;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            ev = self
                .cond
                .wait_timeout(ev, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }
}
