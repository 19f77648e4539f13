//! Core storage traits and abstractions.
//!
//! This module provides the foundational traits for the persistence layer:
//!
//! - [`Record`] - The entity contract every stored type implements
//! - [`RecordStore`] - Core CRUD operations
//! - [`SearchStore`] - Keyword search over labelled records
//! - [`HistoryStore`] - Append-only history with a latest pointer
//! - [`TransactionCoordinator`] - Transaction boundaries shared by all stores
//!
//! # Trait Hierarchy
//!
//! ```text
//! RecordStore<T>
//!     └── SearchStore<T>
//!
//! HistoryStore<D>
//!
//! ConnectionProvider
//!     └── TransactionCoordinator (holds one)
//! ```
//!
//! # Composition
//!
//! Behaviors are layered by wrapping one store in another. Every layer
//! resolves its connection through the same coordinator, so a transaction
//! begun by any layer is joined by the layers beneath it:
//!
//! ```ignore
//! use tessera_persistence::backends::sqlite::{SearchIndexStore, SqliteRecordStore};
//! use tessera_persistence::decorators::SoftDeleteStore;
//!
//! let base = SqliteRecordStore::<Widget>::new(backend.clone())?;
//! let indexed = SearchIndexStore::new(base)?;
//! let store = SoftDeleteStore::new(indexed);
//!
//! // Soft-deleted widgets never match a search.
//! let hits = store.search(&ctx, "red", &Filter::new(), &[]).await?;
//! ```

pub mod context;
pub mod history;
pub mod record;
pub mod search;
pub mod session;
pub mod storage;
pub mod transaction;

// Re-export main types
pub use context::StoreContext;
pub use history::{HistoryCommit, HistoryEntry, HistoryStore, LatestPointer, Snapshot};
pub use record::{Record, TableNames};
pub use search::{IndexEntry, SearchStore};
pub use session::{PooledSqlite, Session, TransactionHandle};
pub use storage::RecordStore;
pub use transaction::{ConnectionProvider, TransactionCoordinator, TransactionOptions};
