//! Execution context passed to every store operation.
//!
//! [`StoreContext`] is how an open transaction travels through nested calls.
//! A store never begins its own connection when the context already carries
//! a transaction handle; it runs on that handle's connection instead.

use super::session::TransactionHandle;

/// Context for storage operations.
///
/// A fresh context carries no transaction. The coordinator derives a child
/// context carrying a [`TransactionHandle`] for the duration of one logical
/// transaction.
///
/// # Examples
///
/// ```
/// use tessera_persistence::core::StoreContext;
///
/// let ctx = StoreContext::new()
///     .with_correlation_id("req-123")
///     .with_user_id("alice");
///
/// assert!(!ctx.in_transaction());
/// assert_eq!(ctx.user_id(), Some("alice"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StoreContext {
    /// The ambient transaction, if any.
    transaction: Option<TransactionHandle>,
    /// Optional correlation ID for request tracing.
    correlation_id: Option<String>,
    /// Optional user ID for audit purposes.
    user_id: Option<String>,
}

impl StoreContext {
    /// Creates a context with no transaction.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the correlation ID for request tracing.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets the user ID for audit purposes.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Returns a child context bound to `handle`.
    pub fn with_transaction(&self, handle: TransactionHandle) -> Self {
        Self {
            transaction: Some(handle),
            correlation_id: self.correlation_id.clone(),
            user_id: self.user_id.clone(),
        }
    }

    /// Returns the ambient transaction handle, if any.
    pub fn transaction(&self) -> Option<&TransactionHandle> {
        self.transaction.as_ref()
    }

    /// Returns true if the context carries a transaction that has not ended.
    pub fn in_transaction(&self) -> bool {
        self.transaction
            .as_ref()
            .is_some_and(TransactionHandle::is_active)
    }

    /// Returns the correlation ID, if set.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the user ID, if set.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}
