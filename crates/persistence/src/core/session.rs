//! Connections and transaction handles.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult, TransactionError};

/// A pooled SQLite connection.
pub type PooledSqlite = PooledConnection<SqliteConnectionManager>;

struct HandleInner {
    id: Uuid,
    conn: Mutex<PooledSqlite>,
    active: AtomicBool,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        // Never committed or rolled back: a panic or a cancelled future.
        if self.active.swap(false, Ordering::AcqRel) {
            debug!(transaction_id = %self.id, "rolling back abandoned transaction");
            if let Err(e) = self.conn.get_mut().execute_batch("ROLLBACK") {
                warn!(transaction_id = %self.id, error = %e, "rollback on drop failed");
            }
        }
    }
}

/// An open transaction.
///
/// Cloning a handle shares the same underlying connection. The transaction
/// rolls back when the last clone is dropped without a commit or rollback.
#[derive(Clone)]
pub struct TransactionHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl TransactionHandle {
    /// Starts a transaction on `conn` with the given `BEGIN` statement.
    pub(crate) fn begin(conn: PooledSqlite, immediate: bool) -> StorageResult<Self> {
        let statement = if immediate {
            "BEGIN IMMEDIATE"
        } else {
            "BEGIN DEFERRED"
        };
        conn.execute_batch(statement).map_err(|e| {
            StorageError::Transaction(TransactionError::BeginFailed {
                message: e.to_string(),
            })
        })?;

        Ok(Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                conn: Mutex::new(conn),
                active: AtomicBool::new(true),
            }),
        })
    }

    /// Identifier used in log lines.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns true until the transaction commits or rolls back.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Commits the transaction.
    ///
    /// A failed commit leaves the transaction open so the caller (or the
    /// final drop) can roll it back.
    pub fn commit(&self) -> StorageResult<()> {
        let conn = self.inner.conn.lock();
        if !self.is_active() {
            return Err(TransactionError::InvalidTransaction.into());
        }
        conn.execute_batch("COMMIT").map_err(|e| {
            StorageError::Transaction(TransactionError::CommitFailed {
                transaction_id: self.inner.id.to_string(),
                message: e.to_string(),
            })
        })?;
        self.inner.active.store(false, Ordering::Release);
        Ok(())
    }

    /// Rolls back the transaction.
    pub fn rollback(&self) -> StorageResult<()> {
        let conn = self.inner.conn.lock();
        if !self.inner.active.swap(false, Ordering::AcqRel) {
            return Err(TransactionError::InvalidTransaction.into());
        }
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn with<R>(&self, f: impl FnOnce(&Connection) -> StorageResult<R>) -> StorageResult<R> {
        let conn = self.inner.conn.lock();
        if !self.is_active() {
            return Err(TransactionError::InvalidTransaction.into());
        }
        f(&conn)
    }
}

/// Where a store operation runs: the ambient transaction or its own
/// pooled connection.
pub enum Session {
    /// A pooled connection in autocommit mode.
    Connection(PooledSqlite),
    /// The connection of an open transaction.
    Transaction(TransactionHandle),
}

impl Session {
    /// Runs `f` against the session's connection.
    ///
    /// Fails with [`TransactionError::InvalidTransaction`] if the session is
    /// bound to a transaction that already ended.
    pub fn with<R>(&self, f: impl FnOnce(&Connection) -> StorageResult<R>) -> StorageResult<R> {
        match self {
            Session::Connection(conn) => f(conn),
            Session::Transaction(handle) => handle.with(f),
        }
    }

    /// Returns true if the session is bound to a transaction.
    pub fn is_transaction(&self) -> bool {
        matches!(self, Session::Transaction(_))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Session::Connection(_) => f.write_str("Session::Connection"),
            Session::Transaction(handle) => f.debug_tuple("Session::Transaction").field(handle).finish(),
        }
    }
}
