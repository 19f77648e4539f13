//! Database backend implementations.
//!
//! This module contains implementations of the store traits for each
//! database backend.
//!
//! # Available Backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | SQLite | Embedded database, pooled through r2d2 |
//!
//! # Example
//!
//! ```no_run
//! use tessera_persistence::backends::sqlite::SqliteBackend;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory SQLite backend
//! let backend = SqliteBackend::in_memory()?;
//!
//! // Or use a file-based database
//! let backend = SqliteBackend::open("./data/tessera.db")?;
//! # Ok(())
//! # }
//! ```

pub mod sqlite;
