//! Error types for the persistence layer.
//!
//! This module defines all error types used throughout the persistence layer,
//! following a hierarchy that separates record errors, validation errors,
//! transaction errors, backend errors and cache errors.
//!
//! Engine errors (SQLite and the connection pool) are never retried or
//! reinterpreted here. They are classified (missing row, constraint
//! violation, connectivity, other) and carried with their original error
//! attached as the source.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// The primary error type for all storage operations.
///
/// This enum encompasses all possible errors that can occur during persistence
/// operations, organized by category.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Record state errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Transaction errors
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Cache backend errors
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl StorageError {
    /// Returns true if this error reports a missing row or pointer.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Resource(ResourceError::NotFound { .. }))
    }

    /// Returns true if this error reports a violated constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StorageError::Backend(BackendError::ConstraintViolation { .. })
        )
    }
}

/// Errors related to record state.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The requested row was not found.
    #[error("record not found: {table}/{key}")]
    NotFound { table: String, key: String },
}

impl ResourceError {
    /// Builds a [`ResourceError::NotFound`] for a table and key.
    pub fn not_found(table: impl Into<String>, key: impl ToString) -> Self {
        ResourceError::NotFound {
            table: table.into(),
            key: key.to_string(),
        }
    }
}

/// Errors raised before a statement reaches the engine.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The column name is not a plain identifier.
    #[error("invalid column name: {column}")]
    InvalidColumn { column: String },

    /// A raw predicate is empty or its placeholders do not match its
    /// parameters.
    #[error("invalid predicate {sql:?}: {expected} placeholders, {given} parameters")]
    InvalidPredicate {
        sql: String,
        expected: usize,
        given: usize,
    },

    /// The sort rule could not be parsed.
    #[error("invalid sort rule: {rule}")]
    InvalidSortRule { rule: String },

    /// The record could not be encoded as a JSON object.
    #[error("record for table {table} must serialize to a JSON object")]
    InvalidRecord { table: String },

    /// A configuration value is invalid.
    #[error("invalid configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },
}

/// Errors related to transactions.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// Transaction is no longer valid (already committed or rolled back).
    #[error("transaction no longer valid")]
    InvalidTransaction,

    /// The engine refused to open the transaction.
    #[error("failed to begin transaction: {message}")]
    BeginFailed { message: String },

    /// The engine refused to commit.
    #[error("failed to commit transaction {transaction_id}: {message}")]
    CommitFailed {
        transaction_id: String,
        message: String,
    },
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A uniqueness, not-null or foreign key constraint rejected the write.
    #[error("constraint violation in {backend_name}: {message}")]
    ConstraintViolation {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Errors reported by a cache backend.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The cache could not be reached.
    #[error("cache unavailable: {message}")]
    Unavailable { message: String },

    /// An operation on one key failed, in the backend or while encoding or
    /// decoding the value stored under it.
    #[error("cache operation {operation} failed for key {key}: {message}")]
    Backend {
        operation: String,
        key: String,
        message: String,
    },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// Implement conversions from common error types

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            if failure.code == rusqlite::ErrorCode::ConstraintViolation {
                return StorageError::Backend(BackendError::ConstraintViolation {
                    backend_name: "sqlite".to_string(),
                    message: err.to_string(),
                    source: Some(Box::new(err)),
                });
            }
        }
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

impl From<r2d2::Error> for StorageError {
    fn from(err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::ConnectionFailed {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}
