//! Transaction coordination.
//!
//! Every store resolves its connection through [`TransactionCoordinator::session`],
//! and every multi-statement write goes through
//! [`TransactionCoordinator::run_in_transaction`]. A context that already
//! carries a transaction is reused as-is, so nested calls join the outermost
//! transaction instead of opening their own.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{StorageResult, TransactionError};

use super::context::StoreContext;
use super::session::{Session, TransactionHandle};

/// Options for starting a transaction.
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// Whether this is a read-only transaction.
    pub read_only: bool,
}

impl TransactionOptions {
    /// Creates new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks this as a read-only transaction.
    ///
    /// Read-only transactions begin deferred, so they take no write lock and
    /// see one consistent snapshot for their duration.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Source of connections and transactions.
///
/// Backends implement this to plug into the [`TransactionCoordinator`].
pub trait ConnectionProvider: Send + Sync {
    /// Returns a session for `ctx`: the ambient transaction when there is
    /// one, otherwise a pooled connection.
    fn session(&self, ctx: &StoreContext) -> StorageResult<Session> {
        match ctx.transaction() {
            Some(handle) if handle.is_active() => Ok(Session::Transaction(handle.clone())),
            Some(_) => Err(TransactionError::InvalidTransaction.into()),
            None => self.connection().map(Session::Connection),
        }
    }

    /// Checks out a connection in autocommit mode.
    fn connection(&self) -> StorageResult<super::session::PooledSqlite>;

    /// Begins a new transaction.
    fn begin(&self, options: &TransactionOptions) -> StorageResult<TransactionHandle> {
        TransactionHandle::begin(self.connection()?, !options.read_only)
    }

    /// Returns true if `ctx` carries an open transaction.
    fn is_transaction_context(&self, ctx: &StoreContext) -> bool {
        ctx.in_transaction()
    }
}

/// Opens, commits and rolls back transactions, and hands out sessions.
#[derive(Clone)]
pub struct TransactionCoordinator {
    provider: Arc<dyn ConnectionProvider>,
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator").finish_non_exhaustive()
    }
}

impl TransactionCoordinator {
    /// Creates a coordinator over a connection provider.
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self { provider }
    }

    /// Returns true if `ctx` carries an open transaction.
    pub fn is_in_transaction(&self, ctx: &StoreContext) -> bool {
        self.provider.is_transaction_context(ctx)
    }

    /// Returns the session an operation under `ctx` should run on.
    ///
    /// Checking out a pooled connection blocks. On the single-connection
    /// `:memory:` pool it waits for any open transaction to end, so code
    /// running inside a transaction must pass the transaction's context.
    pub fn session(&self, ctx: &StoreContext) -> StorageResult<Session> {
        self.provider.session(ctx)
    }

    /// Begins a transaction.
    ///
    /// Both the connection checkout and `BEGIN` can wait on another open
    /// transaction, whose owner may itself be suspended at an `.await`. The
    /// wait runs on the blocking pool so the runtime can keep driving it.
    pub async fn begin(&self, options: &TransactionOptions) -> StorageResult<TransactionHandle> {
        let provider = Arc::clone(&self.provider);
        let options = options.clone();
        tokio::task::spawn_blocking(move || provider.begin(&options))
            .await
            .map_err(|e| TransactionError::BeginFailed {
                message: e.to_string(),
            })?
    }

    /// Runs `f` inside a write transaction.
    ///
    /// See [`run_in_transaction_with`](Self::run_in_transaction_with).
    pub async fn run_in_transaction<F, Fut, R>(&self, ctx: &StoreContext, f: F) -> StorageResult<R>
    where
        F: FnOnce(StoreContext) -> Fut + Send,
        Fut: Future<Output = StorageResult<R>> + Send,
        R: Send,
    {
        self.run_in_transaction_with(ctx, &TransactionOptions::new(), f)
            .await
    }

    /// Runs `f` inside a transaction.
    ///
    /// If `ctx` already carries a transaction, `f` runs on it directly and
    /// this call neither commits nor rolls back. Otherwise a transaction is
    /// begun, `f` receives a child context bound to it, and the transaction
    /// commits when `f` returns `Ok` and rolls back when it returns `Err`.
    /// The error from `f` is returned unchanged.
    ///
    /// `f` may await while it holds the transaction; a concurrent call waits
    /// for it (up to the backend's busy timeout) without stalling the runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// coordinator.run_in_transaction(&ctx, |tx| async move {
    ///     let widget = store.create(&tx, widget).await?;
    ///     history.add_history(&tx, widget.id, "alice", snapshot).await?;
    ///     Ok(widget)
    /// }).await?;
    /// ```
    pub async fn run_in_transaction_with<F, Fut, R>(
        &self,
        ctx: &StoreContext,
        options: &TransactionOptions,
        f: F,
    ) -> StorageResult<R>
    where
        F: FnOnce(StoreContext) -> Fut + Send,
        Fut: Future<Output = StorageResult<R>> + Send,
        R: Send,
    {
        if let Some(handle) = ctx.transaction() {
            if !handle.is_active() {
                return Err(TransactionError::InvalidTransaction.into());
            }
            debug!(transaction_id = %handle.id(), "reusing ambient transaction");
            return f(ctx.clone()).await;
        }

        let handle = self.begin(options).await?;
        debug!(
            transaction_id = %handle.id(),
            read_only = options.read_only,
            "began transaction"
        );

        match f(ctx.with_transaction(handle.clone())).await {
            Ok(value) => {
                handle.commit()?;
                debug!(transaction_id = %handle.id(), "committed transaction");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = handle.rollback() {
                    warn!(
                        transaction_id = %handle.id(),
                        error = %rollback_err,
                        "rollback failed"
                    );
                } else {
                    debug!(transaction_id = %handle.id(), "rolled back transaction");
                }
                Err(err)
            }
        }
    }
}
