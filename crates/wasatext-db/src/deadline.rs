//! Caller-supplied deadlines for storage operations.
//!
//! A [`Deadline`] is made active for the current thread by
//! [`Database::with_deadline`](crate::Database::with_deadline). While active,
//! every connection checked out by that thread carries a SQLite progress
//! handler that aborts the running statement with `SQLITE_INTERRUPT` as soon
//! as the deadline expires. Other threads sharing the same connections are
//! unaffected because the handler is removed when the checkout ends.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::error::{DbError, Result};

/// Number of VM instructions between deadline checks.
const PROGRESS_OPS: i32 = 1000;

thread_local! {
    static ACTIVE: RefCell<Option<Deadline>> = const { RefCell::new(None) };
}

/// A point in time after which storage work is abandoned, plus a flag the
/// caller can trip to cancel early. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    at: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Deadline {
    /// No time limit; only [`Deadline::cancel`] stops the work.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_expired(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Marks a deadline active on this thread; restores the previous one on drop.
pub(crate) struct Active {
    previous: Option<Deadline>,
}

impl Active {
    pub(crate) fn set(deadline: &Deadline) -> Result<Self> {
        if deadline.is_expired() {
            return Err(DbError::Cancelled);
        }
        let previous = ACTIVE.with(|slot| slot.replace(Some(deadline.clone())));
        Ok(Self { previous })
    }
}

impl Drop for Active {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Installs the active deadline (if any) on a checked-out connection.
pub(crate) struct Scope<'a> {
    conn: &'a Connection,
    installed: bool,
}

impl<'a> Scope<'a> {
    pub(crate) fn enter(conn: &'a Connection) -> Result<Self> {
        let active = ACTIVE.with(|slot| slot.borrow().clone());
        let Some(deadline) = active else {
            return Ok(Self { conn, installed: false });
        };

        // Waiting for the lock may have used up the budget.
        if deadline.is_expired() {
            return Err(DbError::Cancelled);
        }

        conn.progress_handler(PROGRESS_OPS, Some(move || deadline.is_expired()));
        Ok(Self { conn, installed: true })
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if self.installed {
            self.conn.progress_handler(0, None::<fn() -> bool>);
        }
    }
}
