//! Transactions.
//!
//! A transaction groups writes so that observers see them together. While
//! one is open, writes only mark and enqueue; reactions run once the
//! outermost transaction closes. Nested transactions merge into the
//! outermost one.
//!
//! Every write outside a transaction opens and closes one implicitly, so a
//! single `set` behaves like a one-write transaction.

use std::fmt;

use super::runtime::Runtime;
use crate::error::ReactiveError;

/// Guard for an open transaction.
///
/// Closing happens on [`close`](Transaction::close) or on drop. Only
/// `close` reports errors raised while draining; on drop they are logged.
#[must_use = "the transaction closes as soon as the guard is dropped"]
pub struct Transaction {
    runtime: Runtime,
    closed: bool,
}

impl Transaction {
    pub fn close(mut self) -> Result<(), ReactiveError> {
        self.closed = true;
        self.runtime.end_batch()
    }

    /// True for a transaction opened inside another one.
    pub fn is_nested(&self) -> bool {
        self.runtime.batch_depth() > 1
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.runtime.end_batch() {
            tracing::warn!("transaction closed with error: {}", err);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("depth", &self.runtime.batch_depth())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Runtime {
    /// Run `f` inside a transaction and return its result.
    ///
    /// The error case reports a failure while draining the worklist after
    /// `f` returned, e.g. [`ReactiveError::FlushLimitExceeded`].
    ///
    /// # Example
    ///
    /// ```
    /// use trellis_core::{Observable, Runtime};
    ///
    /// let rt = Runtime::new();
    /// let a = Observable::new(&rt, 1);
    /// let b = Observable::new(&rt, 2);
    /// rt.transaction(|| {
    ///     a.set(10).unwrap();
    ///     b.set(20).unwrap();
    /// })
    /// .unwrap();
    /// ```
    pub fn transaction<T>(&self, f: impl FnOnce() -> T) -> Result<T, ReactiveError> {
        let guard = self.open_transaction()?;
        let value = f();
        guard.close()?;
        Ok(value)
    }

    /// Open a transaction that stays open until the guard is closed or
    /// dropped.
    pub fn open_transaction(&self) -> Result<Transaction, ReactiveError> {
        self.check_alive()?;
        self.begin_batch();
        Ok(Transaction {
            runtime: self.clone(),
            closed: false,
        })
    }

    /// True while a transaction is open.
    pub fn is_batching(&self) -> bool {
        self.batch_depth() > 0
    }

    /// Get the number of reactions waiting for the outermost transaction to
    /// close.
    pub fn pending_reactions(&self) -> usize {
        self.pending_count()
    }
}

// ---- Tests ----
