//! Tessera Persistence Layer
//!
//! This crate provides composable record stores over SQLite. A base store
//! keeps JSON record documents; decorators wrap it to add behavior while
//! sharing one transaction coordinator:
//!
//! - **Transactions**: nested calls join the outermost transaction, which
//!   commits or rolls back as a unit
//! - **Soft delete**: deletes set a flag and flagged records disappear from reads
//! - **Keyword search**: records carry labels, and searches match label substrings
//! - **History**: append-only snapshots with a per-record latest pointer
//! - **Caching**: a typed key-value facade with a fixed expiration
//!
//! # Architecture
//!
//! - [`core`] - Store traits, the execution context and the transaction coordinator
//! - [`types`] - Filters, sort rules and pages
//! - [`backends`] - SQLite pool, base store, search index and history store
//! - [`decorators`] - Backend-independent wrappers such as soft delete
//! - [`cache`] - Typed cache facade and cache backends
//! - [`config`] - Configuration from JSON or the environment
//! - [`bootstrap`] - Logging setup and fatal startup checks
//! - [`error`] - Error types for all operations
//!
//! # Quick Start
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use tessera_persistence::backends::sqlite::{SqliteBackend, SqliteRecordStore};
//! use tessera_persistence::core::{Record, RecordStore, StoreContext};
//! use tessera_persistence::types::Filter;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Widget {
//!     #[serde(default)]
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Record for Widget {
//!     const TABLE: &'static str = "widgets";
//!     fn id(&self) -> i64 { self.id }
//!     fn set_id(&mut self, id: i64) { self.id = id; }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tessera_persistence::StorageError> {
//! let backend = SqliteBackend::in_memory()?;
//! let store = SqliteRecordStore::<Widget>::new(backend)?;
//! let ctx = StoreContext::new();
//!
//! let widget = store.create(&ctx, Widget { id: 0, name: "gear".into() }).await?;
//! assert_eq!(store.get(&ctx, widget.id).await?.name, "gear");
//! assert_eq!(store.count(&ctx, &Filter::new().eq("name", "gear")).await?, 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Transactions
//!
//! Work inside [`TransactionCoordinator::run_in_transaction`] receives a
//! context carrying the open transaction. Pass that context to every store
//! call that should take part in it:
//!
//! ```ignore
//! store
//!     .coordinator()
//!     .run_in_transaction(&ctx, |tx| async move {
//!         let widget = store.create(&tx, widget).await?;
//!         history.add_history(&tx, widget.id, "alice", snapshot).await?;
//!         Ok(widget)
//!     })
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod core;
pub mod decorators;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{StorageError, StorageResult};
pub use types::{Filter, FilterValue, Page, SortRule};

// Re-export core traits
pub use core::{
    HistoryStore, Record, RecordStore, SearchStore, StoreContext, TransactionCoordinator,
    TransactionOptions,
};

pub use backends::sqlite::{
    SearchIndexStore, SqliteBackend, SqliteBackendConfig, SqliteHistoryStore, SqliteRecordStore,
};
pub use cache::{CacheBackend, MemoryCache, TypedCache};
pub use config::StoreConfig;
pub use decorators::SoftDeleteStore;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
