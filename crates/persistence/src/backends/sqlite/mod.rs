//! SQLite backend implementation.
//!
//! This module provides the SQLite implementation of the store traits. It
//! supports both in-memory databases (great for testing) and file-based
//! databases (WAL mode, for development and small deployments).
//!
//! # Features
//!
//! - Pooled connections with per-connection PRAGMA setup
//! - Generic CRUD over JSON documents ([`SqliteRecordStore`])
//! - Label search ([`SearchIndexStore`])
//! - Versioned history with a latest pointer ([`SqliteHistoryStore`])
//! - Transactions that nested stores join instead of nesting
//!
//! # Example
//!
//! ```no_run
//! use tessera_persistence::backends::sqlite::{SqliteBackend, SqliteRecordStore};
//! # use serde::{Deserialize, Serialize};
//! # use tessera_persistence::core::Record;
//! # #[derive(Serialize, Deserialize)]
//! # struct Widget { #[serde(default)] id: i64, name: String }
//! # impl Record for Widget {
//! #     const TABLE: &'static str = "widgets";
//! #     fn id(&self) -> i64 { self.id }
//! #     fn set_id(&mut self, id: i64) { self.id = id; }
//! # }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory database
//! let backend = SqliteBackend::in_memory()?;
//!
//! // Creates the `widgets` table if it does not exist
//! let store = SqliteRecordStore::<Widget>::new(backend)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! For a record type with table `T`:
//!
//! ```sql
//! -- Records
//! CREATE TABLE T (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     data TEXT NOT NULL  -- JSON document without "id"
//! );
//!
//! -- Labels (SearchIndexStore)
//! CREATE TABLE T_index (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     target INTEGER NOT NULL,
//!     label TEXT NOT NULL
//! );
//! ```
//!
//! History tables are described in [`history`].

mod backend;
pub mod history;
mod index;
mod query;
pub mod schema;
mod storage;

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use history::SqliteHistoryStore;
pub use index::SearchIndexStore;
pub use storage::SqliteRecordStore;
